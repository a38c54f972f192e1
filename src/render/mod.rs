//! Results band compositing.

mod font;
mod renderer;

pub use font::load_font;
pub use renderer::{PlacedLabel, ResultRenderer};
