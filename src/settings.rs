use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf, sync::RwLock};

const ENV_RECOGNITION_URL: &str = "MATHCANVAS_RECOGNITION_URL";
const ENV_DEBOUNCE_MS: &str = "MATHCANVAS_DEBOUNCE_MS";
const ENV_FONT: &str = "MATHCANVAS_FONT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CanvasSettings {
    /// Logical width, in CSS-like pixels.
    pub width: u32,
    pub height: u32,
    /// Backing store pixels per logical pixel.
    pub pixel_ratio: f32,
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
            pixel_ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DetectorSettings {
    Prefix { sample_len: usize },
    Perceptual { threshold: u32 },
}

impl Default for DetectorSettings {
    fn default() -> Self {
        DetectorSettings::Prefix { sample_len: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionSettings {
    pub endpoint: String,
    pub debounce_ms: u64,
    pub timeout_ms: u64,
    pub detector: DetectorSettings,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/api/calculate".into(),
            debounce_ms: 900,
            timeout_ms: 10_000,
            detector: DetectorSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderSettings {
    /// Height of the results band in logical pixels.
    pub band_height: f32,
    pub font_size: f32,
    /// Horizontal gap between two consecutive labels.
    pub spacing: f32,
    pub padding: f32,
    pub font_path: Option<PathBuf>,
    pub band_color: [u8; 4],
    pub separator_color: [u8; 4],
    pub text_color: [u8; 4],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            band_height: 60.0,
            font_size: 22.0,
            spacing: 32.0,
            padding: 16.0,
            font_path: None,
            band_color: [24, 28, 35, 230],
            separator_color: [77, 141, 255, 255],
            text_color: [255, 255, 255, 255],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub canvas: CanvasSettings,
    pub recognition: RecognitionSettings,
    pub render: RenderSettings,
}

impl EngineSettings {
    /// Applies `MATHCANVAS_*` environment overrides on top of the loaded values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = env::var(ENV_RECOGNITION_URL) {
            let url = url.trim();
            if !url.is_empty() {
                self.recognition.endpoint = url.to_string();
            }
        }

        if let Some(debounce_ms) = env::var(ENV_DEBOUNCE_MS)
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
        {
            self.recognition.debounce_ms = debounce_ms;
        }

        if let Ok(font) = env::var(ENV_FONT) {
            if !font.trim().is_empty() {
                self.render.font_path = Some(PathBuf::from(font.trim()));
            }
        }

        self
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<EngineSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Ignoring malformed settings at {}: {err}",
                    path.display()
                );
                EngineSettings::default()
            })
        } else {
            EngineSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Current settings with environment overrides applied.
    pub fn effective(&self) -> EngineSettings {
        self.snapshot().with_env_overrides()
    }

    pub fn snapshot(&self) -> EngineSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: EngineSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: EngineSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Malformed settings in {}", self.path.display()))?;
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &EngineSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore::new(dir.path().join("settings.json")).expect("store");
        assert_eq!(store.snapshot(), EngineSettings::default());
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).expect("store");

        let mut settings = EngineSettings::default();
        settings.recognition.debounce_ms = 1000;
        settings.recognition.detector = DetectorSettings::Perceptual { threshold: 6 };
        store.update(settings.clone()).expect("update");

        let reopened = SettingsStore::new(path).expect("reopen");
        assert_eq!(reopened.snapshot(), settings);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"canvas":{"width":640}}"#).expect("write");

        let store = SettingsStore::new(path).expect("store");
        let settings = store.snapshot();
        assert_eq!(settings.canvas.width, 640);
        assert_eq!(settings.canvas.height, 800);
        assert_eq!(settings.recognition.debounce_ms, 900);
    }
}
