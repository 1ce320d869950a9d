//! Metadata indexer service binary.
//!
//! Parses the command line, initializes tracing and runs the indexing pipeline until a
//! shutdown signal or a fatal error.

use std::process::ExitCode;

use clap::Parser;
use config::shared::PipelineConfig;
use telemetry::tracing::init_tracing;
use tracing::error;

use crate::cli::Args;
use crate::core::start_indexer_with_config;
use crate::error::{ReplicatorError, ReplicatorResult};

mod cli;
mod core;
mod error;

/// Entry point for the indexer service.
///
/// `--help` and `--version` are handled by the argument parser, which exits successfully.
/// Every other failure is reported on stderr with a failure exit status.
fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> ReplicatorResult<()> {
    init_tracing(env!("CARGO_BIN_NAME"), args.log_level.into()).map_err(ReplicatorError::config)?;

    let config = args.pipeline_config();
    config.validate().map_err(ReplicatorError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(config, args.skewed_values_schema))?;

    Ok(())
}

async fn async_main(
    config: PipelineConfig,
    skewed_values_schema: Option<String>,
) -> ReplicatorResult<()> {
    if let Err(err) = start_indexer_with_config(config, skewed_values_schema).await {
        error!("{err}");

        return Err(err);
    }

    Ok(())
}
