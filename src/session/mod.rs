//! Per-document orchestration of drawing, recognition and persistence.

mod canvas_session;
mod host;

pub use canvas_session::{CanvasSession, EventOutcome, SessionSeed};
pub use host::{CanvasHost, DatabaseCanvasHost};
