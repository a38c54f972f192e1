use crate::canvas::Raster;

use super::ChangeDetector;

pub const DEFAULT_SAMPLE_LEN: usize = 1000;

/// Compares only the first `sample_len` characters of the encoded rasters.
///
/// Approximate on purpose: a change whose encoding differs only past the
/// sampled prefix goes unnoticed, and any prefix difference counts.
#[derive(Debug, Clone, Copy)]
pub struct PrefixDetector {
    sample_len: usize,
}

impl PrefixDetector {
    pub fn new(sample_len: usize) -> Self {
        Self {
            sample_len: sample_len.max(1),
        }
    }
}

impl Default for PrefixDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_LEN)
    }
}

impl ChangeDetector for PrefixDetector {
    fn has_changed_significantly(&self, previous: Option<&Raster>, current: &Raster) -> bool {
        let Some(previous) = previous else {
            return true;
        };
        prefix(previous.as_str(), self.sample_len) != prefix(current.as_str(), self.sample_len)
    }
}

fn prefix(value: &str, len: usize) -> &str {
    match value.char_indices().nth(len) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_previous_always_counts_as_changed() {
        let detector = PrefixDetector::default();
        assert!(detector.has_changed_significantly(None, &Raster::empty()));
        assert!(detector.has_changed_significantly(None, &Raster::from_encoded("abc")));
    }

    #[test]
    fn identical_rasters_are_unchanged() {
        let detector = PrefixDetector::default();
        let raster = Raster::from_encoded("x".repeat(5000));
        assert!(!detector.has_changed_significantly(Some(&raster), &raster.clone()));
    }

    #[test]
    fn only_the_sampled_prefix_is_compared() {
        let detector = PrefixDetector::new(4);
        let base = Raster::from_encoded("abcdXXXX");
        let tail_change = Raster::from_encoded("abcdYYYY");
        let head_change = Raster::from_encoded("abzdXXXX");

        assert!(!detector.has_changed_significantly(Some(&base), &tail_change));
        assert!(detector.has_changed_significantly(Some(&base), &head_change));
    }

    #[test]
    fn reset_to_empty_counts_as_changed() {
        let detector = PrefixDetector::default();
        let drawn = Raster::from_encoded("data:image/png;base64,AAAA");
        assert!(detector.has_changed_significantly(Some(&drawn), &Raster::empty()));
    }
}
