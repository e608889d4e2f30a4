// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Video pose processing runs.
//!
//! [`VideoPoseProcessor`] owns the [`PoseCache`] and drives one
//! [`FrameSampler`] run at a time. Its [`ProcessingState`] is published on a
//! `tokio::sync::watch` channel so a UI layer can tell a run in progress from a
//! finished run and from a run that failed outright.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use video_pose::{ProcessorConfig, VideoPoseProcessor, source::open_asset};
//! # use video_pose::{PoseDetector, Pose, Result};
//! # struct Stub;
//! # #[async_trait::async_trait]
//! # impl PoseDetector for Stub {
//! #     async fn detect_pose(&self, _: &image::DynamicImage) -> Result<Option<Pose>> { Ok(None) }
//! # }
//!
//! # async fn demo() -> Result<()> {
//! let processor = Arc::new(VideoPoseProcessor::new(Arc::new(Stub), ProcessorConfig::new())?);
//! let asset = open_asset("frames/", 30.0)?;
//!
//! let report = processor.process_video(asset.as_ref()).await?;
//! println!("{} frames sampled", report.stats.accepted);
//!
//! let pose = processor.get_pose(Duration::from_millis(1_500));
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::PoseCache;
use crate::config::ProcessorConfig;
use crate::detector::PoseDetector;
use crate::error::Result;
use crate::keypoint::Pose;
use crate::sampler::{FrameSampler, RunOutcome, SamplingReport, SamplingStats};
use crate::source::VideoAsset;
use crate::{verbose, warn};

/// Observable state of the processor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingState {
    /// A run is active or queued.
    pub is_processing: bool,
    /// The last run drained its whole frame stream.
    pub is_complete: bool,
    /// Fraction of the estimated frames processed, in `[0, 1]`.
    pub progress: f64,
    /// Asset-level failure of the last run.
    pub error: Option<String>,
    /// Counters of the last run.
    pub stats: SamplingStats,
}

impl ProcessingState {
    /// Whether the last run failed before or while reading the asset.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

struct ActiveRun {
    id: u64,
    token: CancellationToken,
}

/// Samples videos into a pose cache and serves nearest-time lookups.
pub struct VideoPoseProcessor {
    config: ProcessorConfig,
    sampler: FrameSampler,
    detector: Arc<dyn PoseDetector>,
    cache: Arc<PoseCache>,
    state: watch::Sender<ProcessingState>,
    active: Mutex<Option<ActiveRun>>,
    next_run: AtomicU64,
    // Held for the whole of a run; one writer at a time.
    run_lock: tokio::sync::Mutex<()>,
}

impl VideoPoseProcessor {
    /// Create a processor around a detector.
    ///
    /// Fails with [`crate::PoseError::ConfigError`] if the configuration is invalid.
    pub fn new(detector: Arc<dyn PoseDetector>, config: ProcessorConfig) -> Result<Self> {
        config.validate()?;
        let (state, _) = watch::channel(ProcessingState::default());
        Ok(Self {
            sampler: FrameSampler::new(&config),
            config,
            detector,
            cache: Arc::new(PoseCache::new()),
            state,
            active: Mutex::new(None),
            next_run: AtomicU64::new(0),
            run_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Processing configuration.
    #[must_use]
    pub const fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Shared handle to the pose cache.
    #[must_use]
    pub fn cache(&self) -> Arc<PoseCache> {
        Arc::clone(&self.cache)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ProcessingState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProcessingState> {
        self.state.subscribe()
    }

    /// Pose cached nearest to playback time `at`.
    #[must_use]
    pub fn get_pose(&self, at: Duration) -> Option<Arc<Pose>> {
        self.cache.get_pose(at)
    }

    /// Sample `asset` and wait for the run to finish.
    ///
    /// Any previous run is cancelled first. The cache is cleared only once the
    /// previous run has stopped writing. Cancellation is not an error: the
    /// report then carries [`RunOutcome::Cancelled`] and the entries appended
    /// so far remain in the cache.
    pub async fn process_video(&self, asset: &dyn VideoAsset) -> Result<SamplingReport> {
        let run = self.install_run();
        self.run(asset, run).await
    }

    /// Start sampling `asset` on a background task.
    ///
    /// The run is registered before this returns, so a following
    /// [`cancel`](Self::cancel) always applies to it.
    pub fn spawn(self: &Arc<Self>, asset: Arc<dyn VideoAsset>) -> JoinHandle<Result<SamplingReport>> {
        let run = self.install_run();
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(asset.as_ref(), run).await })
    }

    /// Cancel the active run and wait until it has stopped writing to the cache.
    ///
    /// Entries appended before cancellation are kept. Afterwards the state is
    /// "not processing" and `is_complete` is unchanged.
    pub async fn cancel(&self) {
        if let Some(run) = self.lock_active().take() {
            verbose!("Cancelling pose processing");
            run.token.cancel();
        }
        drop(self.run_lock.lock().await);
        self.state.send_if_modified(|s| {
            let changed = s.is_processing;
            s.is_processing = false;
            changed
        });
    }

    /// Discard all cached entries and reset progress and completion.
    ///
    /// Call after [`cancel`](Self::cancel) when switching videos, so that no
    /// run can append to the cleared cache.
    pub fn clear(&self) {
        verbose!("Clearing cached poses");
        self.cache.clear();
        self.state.send_modify(|s| {
            s.progress = 0.0;
            s.is_complete = false;
            s.error = None;
            s.stats = SamplingStats::default();
        });
    }

    /// Wait until no run is active and return the resulting state.
    pub async fn wait_until_finished(&self) -> ProcessingState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|s| !s.is_processing).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, id: u64) -> bool {
        self.lock_active().as_ref().is_some_and(|run| run.id == id)
    }

    /// Register a new run, cancelling the previous one.
    fn install_run(&self) -> (u64, CancellationToken) {
        let id = self.next_run.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = self.lock_active().replace(ActiveRun {
            id,
            token: token.clone(),
        });
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        self.state.send_modify(|s| s.is_processing = true);
        (id, token)
    }

    async fn run(&self, asset: &dyn VideoAsset, (id, token): (u64, CancellationToken)) -> Result<SamplingReport> {
        let _guard = RunGuard { processor: self, id };
        let _running = self.run_lock.lock().await;

        if token.is_cancelled() {
            return Ok(SamplingReport {
                outcome: RunOutcome::Cancelled,
                stats: SamplingStats::default(),
            });
        }

        self.cache.clear();
        self.state.send_replace(ProcessingState {
            is_processing: true,
            ..ProcessingState::default()
        });

        let result = self
            .sampler
            .run(asset, self.detector.as_ref(), &self.cache, &token, |progress, stats| {
                if self.is_current(id) {
                    self.state.send_modify(|s| {
                        s.progress = progress;
                        s.stats = *stats;
                    });
                }
            })
            .await;

        if !self.is_current(id) {
            return result;
        }

        match &result {
            Ok(report) => {
                let complete = report.outcome == RunOutcome::Completed;
                verbose!(
                    "Pose processing {}: {} sampled, {} with pose, {} failed",
                    if complete { "completed" } else { "cancelled" },
                    report.stats.accepted,
                    report.stats.detected,
                    report.stats.failed
                );
                self.state.send_modify(|s| {
                    s.is_processing = false;
                    s.is_complete = complete;
                    s.stats = report.stats;
                    if complete {
                        s.progress = 1.0;
                    }
                });
            }
            Err(e) => {
                warn!("Pose processing failed: {e}");
                self.state.send_modify(|s| {
                    s.is_processing = false;
                    s.is_complete = false;
                    s.error = Some(e.to_string());
                });
            }
        }

        result
    }
}

impl std::fmt::Debug for VideoPoseProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoPoseProcessor")
            .field("config", &self.config)
            .field("cached", &self.cache.len())
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

/// Clears the processing flag if a run ends without being superseded,
/// including when its future is dropped mid-run.
struct RunGuard<'a> {
    processor: &'a VideoPoseProcessor,
    id: u64,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.processor.lock_active();
        if active.as_ref().is_some_and(|run| run.id == self.id) {
            *active = None;
            drop(active);
            self.processor.state.send_if_modified(|s| {
                let changed = s.is_processing;
                s.is_processing = false;
                changed
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PoseError;
    use crate::keypoint::{Joint, Keypoint};
    use crate::source::{FrameReader, FrameSequence, VideoFrame};
    use async_trait::async_trait;
    use image::DynamicImage;

    struct AlwaysFound;

    #[async_trait]
    impl PoseDetector for AlwaysFound {
        async fn detect_pose(&self, _frame: &DynamicImage) -> Result<Option<Pose>> {
            Ok(Some(Pose::new([Keypoint::new(Joint::Neck, 0.5, 0.6, 0.8)])))
        }
    }

    struct Unreadable;

    impl VideoAsset for Unreadable {
        fn duration(&self) -> Result<Duration> {
            Ok(Duration::from_secs(2))
        }

        fn open_reader(&self) -> Result<Box<dyn FrameReader>> {
            Err(PoseError::VideoLoadFailed("no video track".to_string()))
        }
    }

    /// Three good frames, then a reader error that is not frame-level.
    struct BrokenStream;

    impl VideoAsset for BrokenStream {
        fn duration(&self) -> Result<Duration> {
            Ok(Duration::from_secs(1))
        }

        fn open_reader(&self) -> Result<Box<dyn FrameReader>> {
            Ok(Box::new((1..=4u64).map(|i| {
                if i == 4 {
                    return Err(PoseError::VideoError("decoder reset".to_string()));
                }
                Ok(VideoFrame::new(Duration::from_millis(i * 100), DynamicImage::new_rgb8(2, 2)))
            })))
        }
    }

    fn processor() -> Arc<VideoPoseProcessor> {
        Arc::new(VideoPoseProcessor::new(Arc::new(AlwaysFound), ProcessorConfig::new()).unwrap())
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = VideoPoseProcessor::new(
            Arc::new(AlwaysFound),
            ProcessorConfig::new().with_sample_rate(0.0),
        );
        assert!(matches!(result, Err(PoseError::ConfigError(_))));

        let result = VideoPoseProcessor::new(
            Arc::new(AlwaysFound),
            ProcessorConfig::new().with_sample_rate(1e-20),
        );
        assert!(matches!(result, Err(PoseError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_completed_run_state() {
        let processor = processor();
        let asset = FrameSequence::uniform(30, 90, 4, 4);

        let report = processor.process_video(&asset).await.unwrap();
        let state = processor.state();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert!(!state.is_processing);
        assert!(state.is_complete);
        assert!(!state.is_failed());
        assert!((state.progress - 1.0).abs() < f64::EPSILON);
        assert_eq!(state.stats.accepted, processor.cache().len());
        assert!(processor.get_pose(Duration::from_secs(1)).is_some());
    }

    #[tokio::test]
    async fn test_asset_failure_is_reported() {
        let processor = processor();

        let err = processor.process_video(&Unreadable).await.unwrap_err();
        let state = processor.state();

        assert!(matches!(err, PoseError::VideoLoadFailed(_)));
        assert!(!state.is_processing);
        assert!(!state.is_complete);
        assert!(state.is_failed());
    }

    #[tokio::test]
    async fn test_stream_failure_is_not_reported_complete() {
        let processor = processor();

        let err = processor.process_video(&BrokenStream).await.unwrap_err();
        let state = processor.state();

        assert!(matches!(err, PoseError::VideoError(_)));
        assert!(!state.is_processing);
        assert!(!state.is_complete);
        assert!(state.is_failed());
        assert!(state.progress < 1.0);
        assert_eq!(processor.cache().len(), 3);
    }

    #[tokio::test]
    async fn test_clear_resets_state() {
        let processor = processor();
        processor
            .process_video(&FrameSequence::uniform(30, 30, 2, 2))
            .await
            .unwrap();
        assert!(!processor.cache().is_empty());

        processor.clear();
        let state = processor.state();
        assert!(processor.cache().is_empty());
        assert!(state.progress.abs() < f64::EPSILON);
        assert!(!state.is_complete);
    }

    #[tokio::test]
    async fn test_new_run_starts_from_empty_cache() {
        let processor = processor();
        processor
            .process_video(&FrameSequence::uniform(30, 90, 2, 2))
            .await
            .unwrap();
        let first = processor.cache().len();

        processor
            .process_video(&FrameSequence::uniform(30, 30, 2, 2))
            .await
            .unwrap();
        assert!(processor.cache().len() < first);
    }

    #[tokio::test]
    async fn test_cancel_without_run_is_noop() {
        let processor = processor();
        processor.cancel().await;
        assert!(!processor.state().is_processing);
    }

    #[tokio::test]
    async fn test_spawn_then_cancel_before_start() {
        let processor = processor();
        let handle = processor.spawn(Arc::new(FrameSequence::uniform(30, 300, 2, 2)));
        processor.cancel().await;

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert!(!processor.state().is_processing);
        assert!(!processor.state().is_complete);
    }
}
