// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for pose sampling and caching.

use std::time::Duration;

/// Result type alias for pose operations.
pub type Result<T> = std::result::Result<T, PoseError>;

/// Main error type for the library.
///
/// Only [`PoseError::VideoLoadFailed`] aborts a sampling run. Per-frame kinds
/// ([`PoseError::FrameProcessingFailed`], [`PoseError::InferenceTimeout`]) are
/// absorbed by the sampler and recorded as "no pose" for that frame.
#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    /// The video asset cannot be opened, has no video track, or has no readable duration.
    #[error("Video load failed: {0}")]
    VideoLoadFailed(String),
    /// A single frame could not be handed to the pose model.
    #[error("Frame processing failed: {0}")]
    FrameProcessingFailed(String),
    /// A single inference call exceeded its deadline.
    #[error("Inference timed out after {0:?}")]
    InferenceTimeout(Duration),
    /// Error loading the pose model.
    #[error("Model load error: {0}")]
    ModelLoadFailed(String),
    /// Invalid configuration provided.
    #[error("Config error: {0}")]
    ConfigError(String),
    /// Error decoding or encoding images.
    #[error("Image error: {0}")]
    ImageError(String),
    /// Video decoding error after the stream was opened.
    #[error("Video error: {0}")]
    VideoError(String),
    /// Wrapped `std::io::Error`.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Feature not enabled.
    #[error("Feature not enabled: {0}")]
    FeatureNotEnabled(String),
}

impl PoseError {
    /// Whether this error concerns a single frame rather than the whole asset.
    #[must_use]
    pub const fn is_frame_level(&self) -> bool {
        matches!(
            self,
            Self::FrameProcessingFailed(_) | Self::InferenceTimeout(_) | Self::ImageError(_)
        )
    }
}

impl From<image::ImageError> for PoseError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageError(err.to_string())
    }
}

impl From<toml::de::Error> for PoseError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PoseError::VideoLoadFailed("no video track".to_string());
        assert_eq!(err.to_string(), "Video load failed: no video track");

        let err = PoseError::InferenceTimeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "Inference timed out after 250ms");
    }

    #[test]
    fn test_frame_level_kinds() {
        assert!(PoseError::FrameProcessingFailed("bad buffer".into()).is_frame_level());
        assert!(PoseError::InferenceTimeout(Duration::from_secs(1)).is_frame_level());
        assert!(PoseError::ImageError("truncated png".into()).is_frame_level());
        assert!(!PoseError::VideoLoadFailed("missing".into()).is_frame_level());
        assert!(!PoseError::VideoError("demuxer gone".into()).is_frame_level());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PoseError = io.into();
        assert!(matches!(err, PoseError::Io(_)));
    }
}
