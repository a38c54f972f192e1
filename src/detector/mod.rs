//! Decides whether the canvas changed enough to be worth another recognition round.

mod phash;
mod prefix;

pub use phash::{canvas_phash, PerceptualDetector};
pub use prefix::PrefixDetector;

use crate::canvas::Raster;
use crate::settings::DetectorSettings;

pub trait ChangeDetector: Send + Sync {
    /// Must return `true` when there is no previous raster and `false` for
    /// identical rasters. Must stay cheap enough to run on every stroke.
    fn has_changed_significantly(&self, previous: Option<&Raster>, current: &Raster) -> bool;
}

pub fn detector_from_settings(settings: DetectorSettings) -> Box<dyn ChangeDetector> {
    match settings {
        DetectorSettings::Prefix { sample_len } => Box::new(PrefixDetector::new(sample_len)),
        DetectorSettings::Perceptual { threshold } => Box::new(PerceptualDetector::new(threshold)),
    }
}
