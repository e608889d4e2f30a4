// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Processing configuration.
//!
//! [`ProcessorConfig`] controls the sampling rate of the offline pass, the
//! per-frame inference deadline and the playback sync interval. It can be built
//! in code or loaded from a TOML file where every key is optional.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PoseError, Result};

/// Configuration for video pose processing.
///
/// # Example
///
/// ```rust
/// use video_pose::ProcessorConfig;
///
/// let config = ProcessorConfig::new()
///     .with_sample_rate(5.0)
///     .with_inference_timeout_ms(Some(2_000))
///     .with_sync_interval_ms(50);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessorConfig {
    /// Target sampling rate in frames per second of presentation time.
    /// Accepted frames are at least `1 / sample_rate` seconds apart.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
    /// Deadline for a single inference call in milliseconds.
    /// `None` waits indefinitely.
    #[serde(default = "default_inference_timeout_ms")]
    pub inference_timeout_ms: Option<u64>,
    /// Playback sync poll interval in milliseconds.
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
    /// Minimum person score for the ONNX backend (0.0 to 1.0).
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

const fn default_sample_rate() -> f64 {
    10.0
}
#[allow(clippy::unnecessary_wraps)]
const fn default_inference_timeout_ms() -> Option<u64> {
    Some(5_000)
}
const fn default_sync_interval_ms() -> u64 {
    100
}
const fn default_confidence_threshold() -> f32 {
    0.25
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            inference_timeout_ms: default_inference_timeout_ms(),
            sync_interval_ms: default_sync_interval_ms(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl ProcessorConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a TOML file.
    ///
    /// Missing keys take their default values. The result is validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the sampling rate in frames per second.
    ///
    /// # Arguments
    ///
    /// * `rate` - Frames per second of presentation time. Must be positive.
    #[must_use]
    pub const fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Set the per-call inference deadline, or `None` to disable it.
    #[must_use]
    pub const fn with_inference_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.inference_timeout_ms = timeout_ms;
        self
    }

    /// Set the playback sync poll interval.
    #[must_use]
    pub const fn with_sync_interval_ms(mut self, interval_ms: u64) -> Self {
        self.sync_interval_ms = interval_ms;
        self
    }

    /// Set the person score threshold used by the ONNX backend.
    #[must_use]
    pub const fn with_confidence(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Minimum presentation-time gap between two accepted frames.
    ///
    /// Saturates at [`Duration::MAX`] for rates too small to represent;
    /// [`validate`](Self::validate) rejects those.
    #[must_use]
    pub fn min_frame_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.sample_rate).unwrap_or(Duration::MAX)
    }

    /// Per-call inference deadline.
    #[must_use]
    pub fn inference_timeout(&self) -> Option<Duration> {
        self.inference_timeout_ms.map(Duration::from_millis)
    }

    /// Playback sync poll interval.
    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// Check that the values can drive a run.
    pub fn validate(&self) -> Result<()> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(PoseError::ConfigError(format!(
                "sample_rate must be a positive number, got {}",
                self.sample_rate
            )));
        }
        if Duration::try_from_secs_f64(1.0 / self.sample_rate).is_err() {
            return Err(PoseError::ConfigError(format!(
                "sample_rate {} is too small, frame interval is out of range",
                self.sample_rate
            )));
        }
        if self.sync_interval_ms == 0 {
            return Err(PoseError::ConfigError(
                "sync_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.inference_timeout_ms == Some(0) {
            return Err(PoseError::ConfigError(
                "inference_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(PoseError::ConfigError(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ProcessorConfig::default();
        assert!((config.sample_rate - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.min_frame_interval(), Duration::from_millis(100));
        assert_eq!(config.inference_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.sync_interval(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ProcessorConfig::new()
            .with_sample_rate(4.0)
            .with_inference_timeout_ms(None)
            .with_sync_interval_ms(40)
            .with_confidence(0.5);

        assert_eq!(config.min_frame_interval(), Duration::from_millis(250));
        assert_eq!(config.inference_timeout(), None);
        assert_eq!(config.sync_interval(), Duration::from_millis(40));
        assert!((config.confidence_threshold - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_validate_rejects_bad_rate() {
        assert!(ProcessorConfig::new().with_sample_rate(0.0).validate().is_err());
        assert!(ProcessorConfig::new().with_sample_rate(-2.0).validate().is_err());
        assert!(
            ProcessorConfig::new()
                .with_sample_rate(f64::NAN)
                .validate()
                .is_err()
        );
        assert!(ProcessorConfig::new().with_sync_interval_ms(0).validate().is_err());
    }

    #[test]
    fn test_config_validate_rejects_unrepresentable_interval() {
        let config = ProcessorConfig::new().with_sample_rate(1e-20);
        assert!(matches!(config.validate(), Err(PoseError::ConfigError(_))));
        assert_eq!(config.min_frame_interval(), Duration::MAX);

        let slow = ProcessorConfig::new().with_sample_rate(0.001);
        assert!(slow.validate().is_ok());
        assert_eq!(slow.min_frame_interval(), Duration::from_secs(1_000));
    }

    #[test]
    fn test_config_from_toml_partial() {
        let config = ProcessorConfig::from_toml("sample_rate = 2.5\n").unwrap();
        assert!((config.sample_rate - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.sync_interval_ms, 100);
        assert_eq!(config.inference_timeout_ms, Some(5_000));
    }

    #[test]
    fn test_config_from_toml_invalid() {
        let err = ProcessorConfig::from_toml("sample_rate = \"fast\"").unwrap_err();
        assert!(matches!(err, PoseError::ConfigError(_)));

        let err = ProcessorConfig::from_toml("sample_rate = 0.0").unwrap_err();
        assert!(matches!(err, PoseError::ConfigError(_)));
    }

    #[test]
    fn test_config_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pose.toml");
        fs::write(&path, "sync_interval_ms = 50\ninference_timeout_ms = 750\n").unwrap();

        let config = ProcessorConfig::load(&path).unwrap();
        assert_eq!(config.sync_interval(), Duration::from_millis(50));
        assert_eq!(config.inference_timeout(), Some(Duration::from_millis(750)));
    }
}
