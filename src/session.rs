// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Video session orchestration.
//!
//! A [`VideoSession`] ties a [`VideoPoseProcessor`] to a [`PlaybackSync`] loop
//! the way a player screen uses them: loading a video first tears down
//! everything belonging to the previous one, then processes the new video in
//! the background and only starts publishing poses once every frame has been
//! sampled.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{PoseError, Result};
use crate::playback::PlaybackClock;
use crate::processor::VideoPoseProcessor;
use crate::sampler::{RunOutcome, SamplingReport};
use crate::source::VideoAsset;
use crate::sync::{CurrentPose, PlaybackSync};
use crate::verbose;

type LoadSlot = Arc<Mutex<Option<CancellationToken>>>;

fn lock(slot: &LoadSlot) -> MutexGuard<'_, Option<CancellationToken>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A processor and a sync loop driven as one unit.
#[derive(Debug)]
pub struct VideoSession {
    processor: Arc<VideoPoseProcessor>,
    sync: Arc<PlaybackSync>,
    load: LoadSlot,
}

impl VideoSession {
    /// Create a session; the sync interval comes from the processor's config.
    #[must_use]
    pub fn new(processor: Arc<VideoPoseProcessor>) -> Self {
        let sync = Arc::new(PlaybackSync::from_config(processor.config()));
        Self {
            processor,
            sync,
            load: Arc::new(Mutex::new(None)),
        }
    }

    /// The underlying processor.
    #[must_use]
    pub const fn processor(&self) -> &Arc<VideoPoseProcessor> {
        &self.processor
    }

    /// The sync loop.
    #[must_use]
    pub fn sync(&self) -> &PlaybackSync {
        &self.sync
    }

    /// Pose currently published by the sync loop.
    #[must_use]
    pub fn current_pose(&self) -> CurrentPose {
        self.sync.current_pose()
    }

    /// Receiver woken whenever the published pose changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CurrentPose> {
        self.sync.subscribe()
    }

    /// Switch to a new video.
    ///
    /// Stops the sync loop, cancels and awaits the previous run, clears the
    /// cache and the published pose, then starts processing `asset`. The sync
    /// loop is started against `clock` once processing completes; a cancelled
    /// or failed run leaves it stopped.
    ///
    /// The returned handle resolves to the processing result.
    pub async fn load_video(
        &self,
        asset: Arc<dyn VideoAsset>,
        clock: Arc<dyn PlaybackClock>,
    ) -> JoinHandle<Result<SamplingReport>> {
        self.stop_all().await;
        verbose!("Loading {}", asset.describe());

        let token = CancellationToken::new();
        *lock(&self.load) = Some(token.clone());

        let run = self.processor.spawn(asset);
        let sync = Arc::clone(&self.sync);
        let cache = self.processor.cache();
        let load = Arc::clone(&self.load);

        tokio::spawn(async move {
            let result = match run.await {
                Ok(result) => result,
                Err(e) => Err(PoseError::VideoError(format!("Processing task failed: {e}"))),
            };
            if matches!(&result, Ok(report) if report.outcome == RunOutcome::Completed) {
                // Checked under the slot lock so a concurrent teardown wins.
                let _slot = lock(&load);
                if !token.is_cancelled() {
                    sync.start(cache, clock);
                }
            }
            result
        })
    }

    /// Stop processing and syncing and drop every cached pose.
    pub async fn teardown(&self) {
        self.stop_all().await;
        verbose!("Session torn down");
    }

    async fn stop_all(&self) {
        if let Some(token) = lock(&self.load).take() {
            token.cancel();
        }
        self.sync.stop().await;
        self.processor.cancel().await;
        self.processor.clear();
        self.sync.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessorConfig;
    use crate::detector::PoseDetector;
    use crate::keypoint::{Joint, Keypoint, Pose};
    use crate::playback::ManualClock;
    use crate::source::{FrameReader, FrameSequence};
    use async_trait::async_trait;
    use image::DynamicImage;
    use std::time::Duration;

    struct AlwaysFound;

    #[async_trait]
    impl PoseDetector for AlwaysFound {
        async fn detect_pose(&self, _frame: &DynamicImage) -> Result<Option<Pose>> {
            Ok(Some(Pose::new([Keypoint::new(Joint::Root, 0.5, 0.4, 0.7)])))
        }
    }

    struct Unreadable;

    impl VideoAsset for Unreadable {
        fn duration(&self) -> Result<Duration> {
            Err(PoseError::VideoLoadFailed("missing file".to_string()))
        }

        fn open_reader(&self) -> Result<Box<dyn FrameReader>> {
            Err(PoseError::VideoLoadFailed("missing file".to_string()))
        }
    }

    fn session() -> VideoSession {
        let processor =
            VideoPoseProcessor::new(Arc::new(AlwaysFound), ProcessorConfig::new()).unwrap();
        VideoSession::new(Arc::new(processor))
    }

    fn clock(at_ms: u64) -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Duration::from_millis(at_ms)))
    }

    #[tokio::test]
    async fn test_sync_starts_after_completion() {
        let session = session();
        let mut rx = session.subscribe();

        let handle = session
            .load_video(Arc::new(FrameSequence::uniform(30, 60, 4, 4)), clock(1_000))
            .await;
        let report = handle.await.unwrap().unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert!(session.processor().state().is_complete);
        assert!(session.sync().is_running());

        rx.wait_for(Option::is_some).await.unwrap();
        assert!(session.current_pose().unwrap().has_reliable_keypoint(Joint::Root));
        session.teardown().await;
    }

    #[tokio::test]
    async fn test_failed_load_never_starts_sync() {
        let session = session();
        let handle = session.load_video(Arc::new(Unreadable), clock(0)).await;

        assert!(handle.await.unwrap().is_err());
        assert!(!session.sync().is_running());
        assert!(session.processor().state().is_failed());
    }

    #[tokio::test]
    async fn test_reload_replaces_previous_video() {
        let session = session();
        let first = session
            .load_video(Arc::new(FrameSequence::uniform(30, 300, 2, 2)), clock(0))
            .await;
        let second = session
            .load_video(Arc::new(FrameSequence::uniform(30, 30, 2, 2)), clock(0))
            .await;

        let _ = first.await.unwrap();
        second.await.unwrap().unwrap();

        let frames = session.processor().cache().snapshot();
        assert!(!frames.is_empty());
        assert!(frames.iter().all(|f| f.time < Duration::from_secs(1)));
        session.teardown().await;
    }

    #[tokio::test]
    async fn test_teardown_clears_everything() {
        let session = session();
        let handle = session
            .load_video(Arc::new(FrameSequence::uniform(30, 30, 2, 2)), clock(500))
            .await;
        handle.await.unwrap().unwrap();

        session.teardown().await;
        assert!(!session.sync().is_running());
        assert!(session.processor().cache().is_empty());
        assert!(session.current_pose().is_none());
        assert!(!session.processor().state().is_processing);
    }
}
