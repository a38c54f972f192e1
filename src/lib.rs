//! Freehand math canvas engine.
//!
//! Strokes are captured on an owned raster, shipped to a recognition service
//! after a quiet period, and the recognized expressions are drawn back in a
//! results band over a clean copy of the canvas. Assignments feed a
//! per-document variable dictionary that travels with the next request.

pub mod canvas;
pub mod db;
pub mod detector;
pub mod recognition;
pub mod render;
pub mod session;
pub mod settings;
pub mod utils;
pub mod variables;

pub use canvas::{Point, Raster, Shape, StrokeStyle, StrokeSurface, Tool};
pub use db::Database;
pub use detector::{ChangeDetector, PerceptualDetector, PrefixDetector};
pub use recognition::{
    ChannelTransport, HttpTransport, RecognitionClient, RecognitionError, RecognitionResult,
    RecognitionTransport, TokenProvider, Trigger,
};
pub use render::ResultRenderer;
pub use session::{CanvasHost, CanvasSession, DatabaseCanvasHost, EventOutcome, SessionSeed};
pub use settings::{EngineSettings, SettingsStore};
pub use utils::init_logging;
pub use variables::{MemoryVariableStore, VariableDictionary, VariableStore, Variables};
