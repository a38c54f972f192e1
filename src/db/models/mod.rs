pub mod canvas_state;
pub mod document_variables;

pub use canvas_state::CanvasState;
pub use document_variables::DocumentVariables;
