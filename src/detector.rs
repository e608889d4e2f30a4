// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pose inference adapter.
//!
//! The pose model is an opaque capability: one decoded frame in, at most one
//! [`Pose`] out. Any backend can be plugged in by implementing
//! [`PoseDetector`]; tests use a scripted stub.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};

use crate::error::{PoseError, Result};
use crate::keypoint::Pose;

/// Asynchronous single-frame pose detection.
///
/// Implementations must not keep state between calls that changes results,
/// and need not serialize calls themselves: the sampler only ever has one
/// call in flight.
#[async_trait]
pub trait PoseDetector: Send + Sync {
    /// Detect the pose of the first person in `frame`.
    ///
    /// Returns `Ok(None)` when no person is found. Fails with
    /// [`PoseError::FrameProcessingFailed`] only when the frame cannot be
    /// handed to the model at all.
    async fn detect_pose(&self, frame: &DynamicImage) -> Result<Option<Pose>>;
}

#[async_trait]
impl<D: PoseDetector + ?Sized> PoseDetector for Arc<D> {
    async fn detect_pose(&self, frame: &DynamicImage) -> Result<Option<Pose>> {
        (**self).detect_pose(frame).await
    }
}

#[async_trait]
impl<D: PoseDetector + ?Sized> PoseDetector for Box<D> {
    async fn detect_pose(&self, frame: &DynamicImage) -> Result<Option<Pose>> {
        (**self).detect_pose(frame).await
    }
}

/// Run one detection, failing with [`PoseError::InferenceTimeout`] if it
/// takes longer than `timeout`.
pub async fn detect_with_timeout(
    detector: &dyn PoseDetector,
    frame: &DynamicImage,
    timeout: Option<Duration>,
) -> Result<Option<Pose>> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, detector.detect_pose(frame))
            .await
            .map_err(|_| PoseError::InferenceTimeout(limit))?,
        None => detector.detect_pose(frame).await,
    }
}

/// Reject frames no model can consume.
pub fn check_frame(frame: &DynamicImage) -> Result<()> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(PoseError::FrameProcessingFailed(format!(
            "empty frame ({width}x{height})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoint::{Joint, Keypoint};

    struct Fixed;

    #[async_trait]
    impl PoseDetector for Fixed {
        async fn detect_pose(&self, frame: &DynamicImage) -> Result<Option<Pose>> {
            check_frame(frame)?;
            Ok(Some(Pose::new([Keypoint::new(Joint::Nose, 0.5, 0.5, 0.9)])))
        }
    }

    struct Stalled;

    #[async_trait]
    impl PoseDetector for Stalled {
        async fn detect_pose(&self, _frame: &DynamicImage) -> Result<Option<Pose>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_detect_through_arc() {
        let detector: Arc<dyn PoseDetector> = Arc::new(Fixed);
        let pose = detector
            .detect_pose(&DynamicImage::new_rgb8(4, 4))
            .await
            .unwrap();
        assert!(pose.unwrap().has_reliable_keypoint(Joint::Nose));
    }

    #[tokio::test]
    async fn test_empty_frame_is_rejected() {
        let err = Fixed
            .detect_pose(&DynamicImage::new_rgb8(0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, PoseError::FrameProcessingFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_elapses() {
        let frame = DynamicImage::new_rgb8(2, 2);
        let err = detect_with_timeout(&Stalled, &frame, Some(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, PoseError::InferenceTimeout(d) if d == Duration::from_millis(200)));
    }

    #[tokio::test]
    async fn test_no_timeout_passes_through() {
        let frame = DynamicImage::new_rgb8(2, 2);
        let pose = detect_with_timeout(&Fixed, &frame, None).await.unwrap();
        assert!(pose.is_some());
    }
}
