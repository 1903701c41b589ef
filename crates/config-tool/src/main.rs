//! CLI binary changing the configuration of a local cluster.
#![warn(missing_docs)]
#![warn(clippy::all)]

use std::process::ExitCode;

use clap::Parser;
use dynconf_config_tool::{Args, run};
use tracing::Level;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.debug { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
