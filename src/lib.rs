// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Video Pose
//!
//! Offline frame sampling and pose caching for pose-overlay video playback.
//!
//! A video is decoded once, sampled at a limited rate of presentation time
//! (10 frames per second by default), and every sampled frame is sent to a
//! pose detector one at a time. The results are kept as
//! `(time, pose-or-none)` entries in a [`PoseCache`]. During playback a
//! [`PlaybackSync`] loop polls the player clock at 10 Hz and publishes the pose
//! cached nearest to the current position.
//!
//! ## Features
//!
//! - **Rate-limited sampling** - Frames closer than `1 / rate` seconds to the last kept frame are skipped
//! - **Cooperative cancellation** - Cancelling a run keeps every pose sampled so far
//! - **Nearest-time lookup** - Deterministic, tie-stable queries from any thread
//! - **Observable state** - Progress, completion and failures on a `watch` channel
//! - **ONNX backend** - YOLO pose models through ONNX Runtime
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use video_pose::{OnnxPoseDetector, ProcessorConfig, VideoPoseProcessor, source::open_asset};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProcessorConfig::new().with_sample_rate(10.0);
//!     let detector = OnnxPoseDetector::load("yolo11n-pose.onnx", &config)?;
//!     let processor = VideoPoseProcessor::new(Arc::new(detector), config)?;
//!
//!     let asset = open_asset("frames/", 30.0)?;
//!     let report = processor.process_video(asset.as_ref()).await?;
//!     println!("{} frames sampled", report.stats.accepted);
//!
//!     if let Some(pose) = processor.get_pose(Duration::from_secs(2)) {
//!         println!("{} reliable joints", pose.reliable_count());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Sample a video and print poses at given times
//! video-pose process --source clip.mp4 --at 0.5 1.0 2.0
//!
//! # Sample a directory of frames recorded at 24 fps, 5 samples per second
//! video-pose process --source frames/ --fps 24 --rate 5
//!
//! # Replay in real time and print every pose change
//! video-pose process --source clip.mp4 --replay
//! ```
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`keypoint`] | Joints, keypoints and poses |
//! | [`detector`] | Pose detector trait and timeout wrapper |
//! | [`source`] | Video assets and frame readers |
//! | [`sampler`] | Rate-limited sampling into the cache |
//! | [`cache`] | Time-keyed pose cache |
//! | [`processor`] | Run lifecycle, cancellation and state |
//! | [`playback`] | Playback clocks |
//! | [`sync`] | Periodic pose publication during playback |
//! | [`session`] | Load/teardown orchestration |
//! | [`orientation`] | Track orientation and point mapping |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `onnx` | YOLO pose backend on ONNX Runtime (default) |
//! | `annotate` | Skeleton drawing onto frames (default) |
//! | `cli` | `video-pose` command-line tool (default) |
//! | `video` | Video file decoding through FFmpeg |
//! | `cuda` | NVIDIA CUDA acceleration |
//! | `coreml` | Apple `CoreML` |

// Modules
#[cfg(feature = "annotate")]
pub mod annotate;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod detector;
pub mod error;
pub mod keypoint;
pub mod logging;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod orientation;
pub mod playback;
pub mod processor;
pub mod sampler;
pub mod session;
pub mod source;
pub mod sync;
pub mod visualizer;

// Re-export main types for convenience
pub use cache::{PoseCache, ProcessedFrame};
pub use config::ProcessorConfig;
pub use detector::{PoseDetector, detect_with_timeout};
pub use error::{PoseError, Result};
pub use keypoint::{Joint, Keypoint, Pose, RELIABILITY_THRESHOLD};
#[cfg(feature = "onnx")]
pub use onnx::OnnxPoseDetector;
pub use orientation::VideoOrientation;
pub use playback::{ManualClock, PlaybackClock, SimulatedPlayer};
pub use processor::{ProcessingState, VideoPoseProcessor};
pub use sampler::{FrameSampler, RunOutcome, SamplingReport, SamplingStats};
pub use session::VideoSession;
pub use source::{FrameReader, FrameSequence, ImageSequenceAsset, VideoAsset, VideoFrame};
pub use sync::PlaybackSync;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
