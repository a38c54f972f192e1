use anyhow::Result;
use image_hasher::{HashAlg, Hasher, HasherConfig, ImageHash};

use crate::canvas::raster::pixmap_to_image;
use crate::canvas::Raster;

use super::ChangeDetector;

pub const DEFAULT_PHASH_THRESHOLD: u32 = 4;

fn canvas_hasher() -> Hasher {
    HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher()
}

/// Double-gradient hash of a canvas. `None` for the empty raster.
pub fn canvas_phash(raster: &Raster) -> Result<Option<ImageHash>> {
    let Some(pixmap) = raster.decode()? else {
        return Ok(None);
    };
    let image = pixmap_to_image(&pixmap)?;
    Ok(Some(canvas_hasher().hash_image(&image)))
}

/// Perceptual-hash detector: rasters whose double-gradient hashes are within
/// `threshold` bits of each other count as unchanged.
#[derive(Debug, Clone, Copy)]
pub struct PerceptualDetector {
    threshold: u32,
}

impl PerceptualDetector {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    fn hash(raster: &Raster) -> Option<ImageHash> {
        canvas_phash(raster).unwrap_or_else(|err| {
            log::debug!("phash failed, treating canvas as changed: {err}");
            None
        })
    }
}

impl Default for PerceptualDetector {
    fn default() -> Self {
        Self::new(DEFAULT_PHASH_THRESHOLD)
    }
}

impl ChangeDetector for PerceptualDetector {
    fn has_changed_significantly(&self, previous: Option<&Raster>, current: &Raster) -> bool {
        let Some(previous) = previous else {
            return true;
        };
        if previous == current {
            return false;
        }
        if previous.is_empty() || current.is_empty() {
            return true;
        }

        match (Self::hash(previous), Self::hash(current)) {
            (Some(lhs), Some(rhs)) => lhs.dist(&rhs) >= self.threshold,
            _ => true,
        }
    }
}
