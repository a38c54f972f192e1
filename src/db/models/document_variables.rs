use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::variables::Variables;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVariables {
    pub document_id: String,
    pub variables: Variables,
    pub updated_at: DateTime<Utc>,
}
