// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Command-line interface.
//!
//! Argument parsing lives in [`args`]; each command has its own runner.

/// CLI arguments.
pub mod args;

/// Console output macros.
pub mod logging;

/// The `predict` command.
pub mod predict;

/// The `serve` command.
pub mod serve;

/// The `webcam` command.
pub mod stream;

/// The `benchmark`, `dataset` and `check` commands.
pub mod tools;

use crate::error::Result;
use args::{Cli, Commands};

/// Run the parsed command.
///
/// # Errors
///
/// Returns whatever the command failed with.
pub fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Predict(args) => predict::run_prediction(args),
        Commands::Webcam(args) => stream::run_webcam(args),
        Commands::Serve(args) => serve::run_server(args),
        Commands::Benchmark(args) => tools::run_benchmark(args),
        Commands::Dataset(command) => tools::run_dataset(command),
        Commands::Check(args) => tools::run_check(args),
    }
}
