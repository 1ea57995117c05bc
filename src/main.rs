// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::process;

use clap::Parser;
use garbage_detect::cli::{self, args::Cli};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "garbage_detect=info,tower_http=info";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_target(false)
        .init();

    let args = Cli::parse();
    if let Err(e) = cli::run(&args) {
        garbage_detect::error!("{e}");
        process::exit(1);
    }
}
