// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Rate-limited frame sampling.
//!
//! The [`FrameSampler`] drains an asset's frame stream once, keeps frames that
//! are at least `1 / rate` seconds of presentation time apart, runs pose
//! inference on each kept frame and appends the result to a [`PoseCache`].
//!
//! Decoding happens on a blocking thread and feeds a small bounded channel, so
//! at most a handful of decoded frames are buffered ahead of inference.
//! Inference is sequential: exactly one call is in flight at any time, which
//! keeps cache entries in sampling order.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cache::{PoseCache, ProcessedFrame};
use crate::config::ProcessorConfig;
use crate::detector::{PoseDetector, detect_with_timeout};
use crate::error::{PoseError, Result};
use crate::source::{VideoAsset, VideoFrame};
use crate::{verbose, warn};

/// Decoded frames buffered between the decoder thread and inference.
const FRAME_BUFFER: usize = 4;

/// Counters for one sampling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplingStats {
    /// Frames read from the stream.
    pub decoded: usize,
    /// Frames kept by the rate limit and sent to inference.
    pub accepted: usize,
    /// Frames dropped by the rate limit.
    pub skipped: usize,
    /// Accepted frames for which a pose was found.
    pub detected: usize,
    /// Accepted frames whose inference call failed or timed out.
    pub failed: usize,
    /// Stream items that could not be decoded and were skipped.
    pub unreadable: usize,
}

/// How a sampling pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The frame stream was exhausted.
    Completed,
    /// The run was stopped through its cancellation token.
    Cancelled,
}

/// Result of a sampling pass that did not fail at the asset level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingReport {
    /// How the pass ended.
    pub outcome: RunOutcome,
    /// Frame counters.
    pub stats: SamplingStats,
}

/// Whether a frame at `time` passes the rate limit after `last_accepted`.
#[must_use]
pub fn accepts(last_accepted: Duration, time: Duration, min_interval: Duration) -> bool {
    time >= last_accepted.saturating_add(min_interval)
}

/// Fraction of the estimated frame count processed so far, capped at `1.0`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn progress(accepted: usize, estimated_total: f64) -> f64 {
    if estimated_total <= 0.0 {
        return 1.0;
    }
    (accepted as f64 / estimated_total).min(1.0)
}

/// Samples frames from a [`VideoAsset`] into a [`PoseCache`].
#[derive(Debug, Clone)]
pub struct FrameSampler {
    sample_rate: f64,
    min_interval: Duration,
    inference_timeout: Option<Duration>,
}

impl FrameSampler {
    /// Create a sampler from a validated configuration.
    #[must_use]
    pub fn new(config: &ProcessorConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            min_interval: config.min_frame_interval(),
            inference_timeout: config.inference_timeout(),
        }
    }

    /// Minimum gap between accepted frames.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Estimated number of accepted frames for an asset of this length.
    #[must_use]
    pub fn estimated_frames(&self, duration: Duration) -> f64 {
        duration.as_secs_f64() * self.sample_rate
    }

    /// Drain `asset` once, appending one cache entry per accepted frame.
    ///
    /// `on_progress` is called after every accepted frame with a value in
    /// `[0, 1]`. Only asset-level failures are returned as errors; a failed
    /// inference call is recorded as a frame without a pose, and a frame that
    /// cannot be decoded is skipped. Any other reader error fails the run,
    /// keeping the entries appended before it. Cancelling
    /// `cancel` stops the pass promptly and leaves the entries appended so far
    /// in place.
    pub async fn run<F>(
        &self,
        asset: &dyn VideoAsset,
        detector: &dyn PoseDetector,
        cache: &PoseCache,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<SamplingReport>
    where
        F: FnMut(f64, &SamplingStats) + Send,
    {
        let duration = asset.duration()?;
        let estimated_total = self.estimated_frames(duration);
        let reader = asset.open_reader()?;

        verbose!(
            "Sampling {} at {} fps (~{:.0} frames)",
            asset.describe(),
            self.sample_rate,
            estimated_total
        );

        let (tx, mut rx) = mpsc::channel::<Result<VideoFrame>>(FRAME_BUFFER);
        let decoder = tokio::task::spawn_blocking(move || {
            for item in reader {
                if tx.blocking_send(item).is_err() {
                    break;
                }
            }
        });

        let mut stats = SamplingStats::default();
        let mut last_accepted = Duration::ZERO;
        let mut outcome = RunOutcome::Completed;
        let mut stream_error = None;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    outcome = RunOutcome::Cancelled;
                    break;
                }
                next = rx.recv() => next,
            };

            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) if e.is_frame_level() => {
                    warn!("Skipping undecodable frame: {e}");
                    stats.unreadable += 1;
                    continue;
                }
                Some(Err(e)) => {
                    stream_error = Some(e);
                    break;
                }
                None => break,
            };
            stats.decoded += 1;

            if !accepts(last_accepted, frame.time, self.min_interval) {
                stats.skipped += 1;
                continue;
            }

            let detection = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    outcome = RunOutcome::Cancelled;
                    break;
                }
                detection = detect_with_timeout(detector, &frame.image, self.inference_timeout) => detection,
            };

            let pose = match detection {
                Ok(pose) => pose,
                Err(e) => {
                    warn!("Pose detection failed at {:.3}s: {e}", frame.time.as_secs_f64());
                    stats.failed += 1;
                    None
                }
            };
            if pose.is_some() {
                stats.detected += 1;
            }

            cache.push(ProcessedFrame::new(frame.time, pose));
            last_accepted = frame.time;
            stats.accepted += 1;

            on_progress(progress(stats.accepted, estimated_total), &stats);
        }

        // Unblocks the decoder thread if it is waiting on a full channel.
        drop(rx);
        if let Err(e) = decoder.await {
            return Err(PoseError::VideoError(format!("Decoder thread failed: {e}")));
        }
        if let Some(e) = stream_error {
            return Err(e);
        }

        if outcome == RunOutcome::Completed {
            on_progress(1.0, &stats);
        }

        Ok(SamplingReport { outcome, stats })
    }
}
