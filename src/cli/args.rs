// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ProcessorConfig;
use crate::error::Result;

/// Default pose model file.
pub const DEFAULT_MODEL: &str = "yolo11n-pose.onnx";

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Process Options:
    --source, -s <SOURCE>  Video file or directory of frames
    --model, -m <MODEL>    Path to ONNX pose model [default: yolo11n-pose.onnx]
    --rate <RATE>          Frames sampled per second of video [default: 10]
    --timeout-ms <MS>      Per-frame inference deadline [default: 5000]
    --no-timeout           Wait for inference indefinitely
    --fps <FPS>            Frame rate of an image directory [default: 30]
    --config <FILE>        TOML file with processor settings
    --at <SECS>...         Print the cached pose nearest to each time
    --replay               Play back the video and print each pose change
    --save <DIR>           Save annotated sampled frames under DIR/process
    --verbose              Show verbose output

Examples:
    video-pose process --source clip.mp4
    video-pose process -s frames/ --fps 24 --rate 5 --at 0.5 1.0 1.5
    video-pose process -s clip.mp4 -m yolo11s-pose.onnx --replay
    video-pose process -s clip.mp4 --config pose.toml --save runs/pose"#)]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sample a video into the pose cache
    Process(ProcessArgs),
}

/// Arguments for the process command.
#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Video file or directory of frames
    #[arg(short, long)]
    pub source: PathBuf,

    /// Path to ONNX pose model file
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Frames sampled per second of video
    #[arg(long)]
    pub rate: Option<f64>,

    /// Per-frame inference deadline in milliseconds
    #[arg(long, conflicts_with = "no_timeout")]
    pub timeout_ms: Option<u64>,

    /// Disable the inference deadline
    #[arg(long, default_value_t = false)]
    pub no_timeout: bool,

    /// Person confidence threshold
    #[arg(long)]
    pub conf: Option<f32>,

    /// Frame rate used for image directories
    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,

    /// TOML file with processor settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Playback times in seconds to look up after processing
    #[arg(long = "at", num_args = 1..)]
    pub at: Vec<f64>,

    /// Replay the video and print pose changes
    #[arg(long, default_value_t = false)]
    pub replay: bool,

    /// Save annotated sampled frames under this directory
    #[cfg(feature = "annotate")]
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Show verbose output
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub verbose: bool,
}

impl ProcessArgs {
    /// Build the processor configuration: file (or defaults) first, then flags.
    pub fn to_config(&self) -> Result<ProcessorConfig> {
        let mut config = match &self.config {
            Some(path) => ProcessorConfig::load(path)?,
            None => ProcessorConfig::new(),
        };
        if let Some(rate) = self.rate {
            config = config.with_sample_rate(rate);
        }
        if self.no_timeout {
            config = config.with_inference_timeout_ms(None);
        } else if let Some(ms) = self.timeout_ms {
            config = config.with_inference_timeout_ms(Some(ms));
        }
        if let Some(conf) = self.conf {
            config = config.with_confidence(conf);
        }
        config.validate()?;
        Ok(config)
    }
}
