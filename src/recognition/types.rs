use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::canvas::Raster;
use crate::variables::{VariableDictionary, Variables};

/// One recognized expression, in the order the service returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub expression: String,
    /// Numeric or string, exactly as the service sent it.
    pub value: Value,
    pub is_assignment: bool,
}

/// Everything one recognition round is built from. Not retained after dispatch.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub raster: Raster,
    pub variables: VariableDictionary,
    pub document_id: String,
    /// Canvas generation the raster was captured in.
    pub generation: u64,
}

impl RecognitionRequest {
    /// Wire body: `{canvasData, documentId, variables}`.
    pub fn payload(&self) -> Value {
        json!({
            "canvasData": self.raster.as_str(),
            "documentId": self.document_id,
            "variables": self.variables.to_json(),
        })
    }
}

/// Parsed service answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognitionResponse {
    pub results: Vec<RecognitionResult>,
    /// Full variable map when the service echoes one back.
    pub variables: Option<Variables>,
}
