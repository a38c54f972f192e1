//! Persisted canvas for one document.
//!
//! Both rasters are kept so that a reopened document can be seeded from the
//! clean canvas; seeding from the composite would bake the results band into
//! the strokes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canvas::Raster;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasState {
    pub document_id: String,
    /// What the host last displayed, band included. Empty after a reset.
    pub composite: Raster,
    pub clean: Raster,
    pub updated_at: DateTime<Utc>,
}
