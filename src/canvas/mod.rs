pub mod history;
pub mod raster;
pub mod surface;
pub mod tools;

pub use history::HistoryStack;
pub use raster::Raster;
pub use surface::StrokeSurface;
pub use tools::{Point, Shape, StrokeStyle, Tool};
