// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::process;

use clap::Parser;
use video_pose::cli::args::{Cli, Commands};
use video_pose::cli::process::run_process;
use video_pose::error;

fn main() {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {e}");
            process::exit(1);
        }
    };

    let result = match &cli.command {
        Commands::Process(args) => runtime.block_on(run_process(args)),
    };

    if let Err(e) = result {
        error!("{e}");
        process::exit(1);
    }
}
