// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::cli::args::ProcessArgs;
use crate::config::ProcessorConfig;
use crate::detector::PoseDetector;
use crate::error::{PoseError, Result};
use crate::keypoint::{Joint, Pose};
use crate::playback::{PlaybackClock, SimulatedPlayer};
use crate::processor::{ProcessingState, VideoPoseProcessor};
use crate::sampler::RunOutcome;
use crate::session::VideoSession;
use crate::source::open_asset;
use crate::{VERSION, info, logging, section, success, verbose, warn};

/// Sample a video and report the cached poses.
#[allow(clippy::cast_precision_loss)]
pub async fn run_process(args: &ProcessArgs) -> Result<()> {
    logging::set_verbose(args.verbose);
    let config = args.to_config()?;

    section!("video-pose {VERSION}");
    let asset = open_asset(&args.source, args.fps)?;
    let duration = asset.duration()?;
    info!("Source: {} ({:.2}s)", asset.describe(), duration.as_secs_f64());
    verbose!(
        "Sampling at {} fps, inference timeout {}",
        config.sample_rate,
        config
            .inference_timeout()
            .map_or_else(|| "off".to_string(), |t| format!("{t:?}"))
    );

    let detector = load_detector(&args.model, &config)?;
    let processor = Arc::new(VideoPoseProcessor::new(detector, config)?);
    let session = VideoSession::new(Arc::clone(&processor));
    let player = Arc::new(SimulatedPlayer::new(duration));

    let progress = tokio::spawn(report_progress(processor.subscribe()));
    let start = Instant::now();
    let mut handle = session
        .load_video(Arc::clone(&asset), Arc::clone(&player) as Arc<dyn PlaybackClock>)
        .await;

    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, keeping partial results");
            processor.cancel().await;
            handle.await
        }
    };
    progress.abort();
    let report = joined.map_err(|e| PoseError::VideoError(format!("Processing task failed: {e}")))??;

    let stats = report.stats;
    let elapsed = start.elapsed().as_secs_f64();
    match report.outcome {
        RunOutcome::Completed => success!(
            "Sampled {} of {} frames, {} with pose, {} failed, {} unreadable ({elapsed:.1}s)",
            stats.accepted,
            stats.decoded,
            stats.detected,
            stats.failed,
            stats.unreadable
        ),
        RunOutcome::Cancelled => warn!(
            "Cancelled after {} sampled frames, {} with pose ({elapsed:.1}s)",
            stats.accepted,
            stats.detected
        ),
    }

    for &at in &args.at {
        let Some(time) = query_time(at) else {
            warn!("Skipping invalid time {at}");
            continue;
        };
        let pose = processor.get_pose(time);
        info!("{at:>8.2}s  {}", describe_pose(pose.as_deref()));
    }

    #[cfg(feature = "annotate")]
    if let Some(base) = &args.save {
        let dir = save::save_annotated(Arc::clone(&asset), processor.cache(), base.clone()).await?;
        success!("Annotated frames saved to {}", dir.display());
    }

    if args.replay {
        replay(&session, &player, tokio::signal::ctrl_c()).await;
    }

    session.teardown().await;
    Ok(())
}

#[cfg(feature = "onnx")]
fn load_detector(model: &str, config: &ProcessorConfig) -> Result<Arc<dyn PoseDetector>> {
    Ok(Arc::new(crate::onnx::OnnxPoseDetector::load(model, config)?))
}

#[cfg(not(feature = "onnx"))]
fn load_detector(_model: &str, _config: &ProcessorConfig) -> Result<Arc<dyn PoseDetector>> {
    Err(PoseError::FeatureNotEnabled(
        "ONNX pose backend requires the 'onnx' feature".to_string(),
    ))
}

/// Print progress in 10% steps.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
async fn report_progress(mut rx: watch::Receiver<ProcessingState>) {
    let mut last_step = 0;
    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();
        let step = (state.progress * 10.0).floor() as u32;
        if step > last_step {
            last_step = step;
            verbose!(
                "  {:>3.0}%  {} sampled, {} with pose",
                state.progress * 100.0,
                state.stats.accepted,
                state.stats.detected
            );
        } else if step < last_step {
            last_step = step;
        }
    }
}

/// Play the video back in real time and print each pose change, until the
/// player reaches the end or `stop` resolves.
async fn replay<F: Future>(session: &VideoSession, player: &SimulatedPlayer, stop: F) {
    if !session.sync().is_running() {
        warn!("Replay skipped, processing did not complete");
        return;
    }
    section!("Replay ({:.2}s)", player.duration().as_secs_f64());

    let mut rx = session.subscribe();
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    tokio::pin!(stop);
    player.play();
    while player.is_playing() {
        tokio::select! {
            biased;
            _ = &mut stop => {
                player.pause();
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let pose = rx.borrow_and_update().clone();
                info!("{:>8.2}s  {}", player.current_time().as_secs_f64(), describe_pose(pose.as_deref()));
            }
            _ = ticker.tick() => {}
        }
    }
}

/// A `--at` value as a timeline position, if it is a representable non-negative time.
fn query_time(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds).ok()
}

/// One-line summary of a cached pose.
fn describe_pose(pose: Option<&Pose>) -> String {
    pose.map_or_else(
        || "no pose".to_string(),
        |pose| {
            format!(
                "{}/{} joints reliable, mean confidence {:.2}",
                pose.reliable_count(),
                Joint::COUNT,
                pose.average_confidence()
            )
        },
    )
}

#[cfg(feature = "annotate")]
mod save {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::annotate::{draw_pose, find_next_run_dir};
    use crate::cache::PoseCache;
    use crate::error::{PoseError, Result};
    use crate::source::VideoAsset;

    /// Write every sampled frame, with its pose drawn, to a fresh run directory.
    pub async fn save_annotated(asset: Arc<dyn VideoAsset>, cache: Arc<PoseCache>, base: PathBuf) -> Result<PathBuf> {
        tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            let dir = find_next_run_dir(&base, "process");
            fs::create_dir_all(&dir)?;

            // Entries are in stream order, so one pass over the frames suffices.
            let entries = cache.snapshot();
            let mut pending = entries.iter().peekable();
            for frame in asset.open_reader()? {
                let Some(entry) = pending.peek() else {
                    break;
                };
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) if e.is_frame_level() => continue,
                    Err(e) => return Err(e),
                };
                if frame.time != entry.time {
                    continue;
                }
                let image = match &entry.pose {
                    Some(pose) => draw_pose(&frame.image, pose),
                    None => frame.image,
                };
                image.to_rgb8().save(dir.join(format!("frame_{:08}.jpg", frame.time.as_millis())))?;
                pending.next();
            }
            Ok(dir)
        })
        .await
        .map_err(|e| PoseError::ImageError(format!("Save task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoint::Keypoint;
    use crate::source::FrameSequence;
    use async_trait::async_trait;
    use image::DynamicImage;

    struct AlwaysFound;

    #[async_trait]
    impl PoseDetector for AlwaysFound {
        async fn detect_pose(&self, _frame: &DynamicImage) -> Result<Option<Pose>> {
            Ok(Some(Pose::new([Keypoint::new(Joint::Nose, 0.5, 0.5, 0.9)])))
        }
    }

    /// A session whose two-second video has finished processing.
    async fn loaded_session() -> (VideoSession, Arc<SimulatedPlayer>) {
        let processor =
            VideoPoseProcessor::new(Arc::new(AlwaysFound), ProcessorConfig::new()).unwrap();
        let session = VideoSession::new(Arc::new(processor));
        let player = Arc::new(SimulatedPlayer::new(Duration::from_secs(2)));
        let handle = session
            .load_video(
                Arc::new(FrameSequence::uniform(30, 60, 2, 2)),
                Arc::clone(&player) as Arc<dyn PlaybackClock>,
            )
            .await;
        handle.await.unwrap().unwrap();
        (session, player)
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_stops_when_signalled() {
        let (session, player) = loaded_session().await;

        replay(&session, &player, std::future::ready(())).await;

        assert!(!player.is_playing());
        assert!(player.current_time() < player.duration());
        session.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_runs_to_the_end() {
        let (session, player) = loaded_session().await;

        replay(&session, &player, std::future::pending::<()>()).await;

        assert_eq!(player.current_time(), player.duration());
        assert!(session.current_pose().is_some());
        session.teardown().await;
    }

    #[test]
    fn test_describe_pose() {
        assert_eq!(describe_pose(None), "no pose");

        let pose = Pose::new([
            Keypoint::new(Joint::Nose, 0.5, 0.5, 0.9),
            Keypoint::new(Joint::Neck, 0.5, 0.4, 0.05),
        ]);
        let text = describe_pose(Some(&pose));
        assert!(text.starts_with("1/19 joints reliable"));
    }

    #[test]
    fn test_query_time_rejects_unrepresentable_values() {
        assert_eq!(query_time(1.5), Some(Duration::from_millis(1_500)));
        assert_eq!(query_time(0.0), Some(Duration::ZERO));
        assert_eq!(query_time(-0.5), None);
        assert_eq!(query_time(f64::NAN), None);
        assert_eq!(query_time(f64::INFINITY), None);
        assert_eq!(query_time(1e30), None);
    }
}
