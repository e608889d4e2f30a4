// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Playback clocks.
//!
//! The sync loop only needs the player's current position. [`ManualClock`] is
//! driven by hand; [`SimulatedPlayer`] advances with wall time while playing
//! and is what the CLI replays against.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Source of the current playback position.
pub trait PlaybackClock: Send + Sync {
    /// Current playback time.
    fn current_time(&self) -> Duration;
}

impl<C: PlaybackClock + ?Sized> PlaybackClock for Arc<C> {
    fn current_time(&self) -> Duration {
        (**self).current_time()
    }
}

/// Clock set explicitly by the caller.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Create a clock at `start`.
    #[must_use]
    pub fn new(start: Duration) -> Self {
        let clock = Self::default();
        clock.set(start);
        clock
    }

    /// Jump to `time`.
    pub fn set(&self, time: Duration) {
        let nanos = u64::try_from(time.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.store(nanos, Ordering::Release);
    }

    /// Move forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let delta = u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .nanos
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_add(delta)));
    }
}

impl PlaybackClock for ManualClock {
    fn current_time(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

#[derive(Debug)]
struct PlayerState {
    position: Duration,
    playing_since: Option<Instant>,
}

/// Player that advances in real time between [`play`](Self::play) and
/// [`pause`](Self::pause), stopping at the end of the video.
#[derive(Debug)]
pub struct SimulatedPlayer {
    duration: Duration,
    state: Mutex<PlayerState>,
}

impl SimulatedPlayer {
    /// Create a paused player at the start of a video of length `duration`.
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self {
            duration,
            state: Mutex::new(PlayerState {
                position: Duration::ZERO,
                playing_since: None,
            }),
        }
    }

    /// Video length.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    fn lock(&self) -> MutexGuard<'_, PlayerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn position(&self, state: &PlayerState) -> Duration {
        let elapsed = state.playing_since.map_or(Duration::ZERO, |since| since.elapsed());
        state.position.saturating_add(elapsed).min(self.duration)
    }

    /// Start or resume playback.
    pub fn play(&self) {
        let mut state = self.lock();
        if state.playing_since.is_none() {
            state.playing_since = Some(Instant::now());
        }
    }

    /// Pause at the current position.
    pub fn pause(&self) {
        let mut state = self.lock();
        state.position = self.position(&state);
        state.playing_since = None;
    }

    /// Jump to `time`, clamped to the video length. Keeps playing if playing.
    pub fn seek(&self, time: Duration) {
        let mut state = self.lock();
        state.position = time.min(self.duration);
        if state.playing_since.is_some() {
            state.playing_since = Some(Instant::now());
        }
    }

    /// Whether the player is playing and has not reached the end.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        let state = self.lock();
        state.playing_since.is_some() && self.position(&state) < self.duration
    }
}

impl PlaybackClock for SimulatedPlayer {
    fn current_time(&self) -> Duration {
        let state = self.lock();
        self.position(&state)
    }
}
