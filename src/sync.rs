// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Periodic playback synchronisation.
//!
//! While running, [`PlaybackSync`] polls a [`PlaybackClock`] at a fixed
//! interval, looks up the nearest cached pose and publishes it on a watch
//! channel. Subscribers are only woken when the published pose changes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::cache::PoseCache;
use crate::config::ProcessorConfig;
use crate::keypoint::Pose;
use crate::playback::PlaybackClock;
use crate::verbose;

/// Pose currently shown, if any.
pub type CurrentPose = Option<Arc<Pose>>;

struct SyncTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Publishes the cached pose nearest to the playback position.
pub struct PlaybackSync {
    interval: Duration,
    current: watch::Sender<CurrentPose>,
    task: Mutex<Option<SyncTask>>,
}

impl PlaybackSync {
    /// Create a stopped sync loop polling every `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            interval,
            current,
            task: Mutex::new(None),
        }
    }

    /// Create a stopped sync loop using the configured interval.
    #[must_use]
    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self::new(config.sync_interval())
    }

    fn lock(&self) -> MutexGuard<'_, Option<SyncTask>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start polling `clock` against `cache`, replacing any running loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, cache: Arc<PoseCache>, clock: Arc<dyn PlaybackClock>) {
        let token = CancellationToken::new();
        let publisher = self.current.clone();
        let interval = self.interval;
        let child = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    () = child.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let pose = cache.get_pose(clock.current_time());
                publish(&publisher, pose);
            }
        });

        let previous = self.lock().replace(SyncTask { token, handle });
        if let Some(previous) = previous {
            previous.token.cancel();
            previous.handle.abort();
        }
        verbose!("Playback sync started ({:?} interval)", interval);
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(&self) {
        let task = self.lock().take();
        if let Some(task) = task {
            task.token.cancel();
            // A cancelled or aborted loop has nothing to report.
            let _ = task.handle.await;
            verbose!("Playback sync stopped");
        }
    }

    /// Whether a loop is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|task| !task.token.is_cancelled() && !task.handle.is_finished())
    }

    /// Last published pose.
    #[must_use]
    pub fn current_pose(&self) -> CurrentPose {
        self.current.borrow().clone()
    }

    /// Receiver woken whenever the published pose changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CurrentPose> {
        self.current.subscribe()
    }

    /// Publish "no pose".
    pub fn reset(&self) {
        publish(&self.current, None);
    }
}

impl Drop for PlaybackSync {
    fn drop(&mut self) {
        if let Some(task) = self.lock().take() {
            task.token.cancel();
            task.handle.abort();
        }
    }
}

impl std::fmt::Debug for PlaybackSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSync")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

fn publish(sender: &watch::Sender<CurrentPose>, pose: CurrentPose) {
    sender.send_if_modified(|current| {
        let same = match (current.as_ref(), pose.as_ref()) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !same {
            *current = pose;
        }
        !same
    });
}
