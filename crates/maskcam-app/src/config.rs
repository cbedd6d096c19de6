use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration: defaults, overridden by an optional TOML
/// file, overridden by `MASKCAM_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Detection model file name inside `model_dir`.
    pub detection_model: String,
    /// Classification model file name inside `model_dir`.
    pub classification_model: String,
    /// V4L2 device path for live capture.
    pub camera_device: String,
    /// Requested camera capture size.
    pub capture_width: u32,
    pub capture_height: u32,
    /// Live-capture cycle period in milliseconds.
    pub tick_period_ms: u64,
    /// Detection confidence threshold.
    pub score_threshold: f32,
    /// Display area the overlay is fitted into.
    pub view_width: u32,
    pub view_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            detection_model: "face_detection.onnx".to_string(),
            classification_model: "face_mask_classification.onnx".to_string(),
            camera_device: "/dev/video0".to_string(),
            capture_width: 1280,
            capture_height: 720,
            tick_period_ms: 100,
            score_threshold: 0.5,
            view_width: 1280,
            view_height: 720,
        }
    }
}

impl Config {
    /// Load configuration, layering the optional file and the environment
    /// over the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read config file {}", p.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("failed to parse config file {}", p.display()))?
            }
            None => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        env_override("MASKCAM_MODEL_DIR", &mut self.model_dir);
        env_override("MASKCAM_DETECTION_MODEL", &mut self.detection_model);
        env_override("MASKCAM_CLASSIFICATION_MODEL", &mut self.classification_model);
        env_override("MASKCAM_CAMERA_DEVICE", &mut self.camera_device);
        env_override("MASKCAM_CAPTURE_WIDTH", &mut self.capture_width);
        env_override("MASKCAM_CAPTURE_HEIGHT", &mut self.capture_height);
        env_override("MASKCAM_TICK_PERIOD_MS", &mut self.tick_period_ms);
        env_override("MASKCAM_SCORE_THRESHOLD", &mut self.score_threshold);
        env_override("MASKCAM_VIEW_WIDTH", &mut self.view_width);
        env_override("MASKCAM_VIEW_HEIGHT", &mut self.view_height);
    }

    pub fn detection_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.detection_model)
    }

    pub fn classification_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.classification_model)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}

fn env_override<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(value) = std::env::var(key) {
        match value.parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => tracing::warn!(key, value = %value, "ignoring unparsable env override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.tick_period(), Duration::from_millis(100));
        assert_eq!(config.score_threshold, 0.5);
        assert_eq!(config.capture_width, 1280);
        assert_eq!(config.capture_height, 720);
        assert_eq!(
            config.detection_model_path(),
            PathBuf::from("models/face_detection.onnx")
        );
    }

    #[test]
    fn test_toml_overlays_defaults() {
        let config: Config = toml::from_str(
            r#"
            model_dir = "/opt/maskcam/models"
            score_threshold = 0.6
            tick_period_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.model_dir, PathBuf::from("/opt/maskcam/models"));
        assert_eq!(config.score_threshold, 0.6);
        assert_eq!(config.tick_period_ms, 250);
        // Untouched fields keep their defaults.
        assert_eq!(config.camera_device, "/dev/video0");
    }

    #[test]
    fn test_toml_rejects_unknown_fields() {
        let result: Result<Config, _> = toml::from_str("frame_rate = 30");
        assert!(result.is_err());
    }
}
