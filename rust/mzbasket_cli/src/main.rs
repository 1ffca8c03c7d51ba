mod cli;
mod commands;
mod config;
mod error;

use clap::Parser;
use std::path::Path;
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing::subscriber::set_global_default;
use tracing::{
    info,
    warn,
};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::EnvFilter;

use crate::cli::{
    Args,
    Commands,
};
use crate::commands::{
    main_basket,
    main_replicate,
    main_run,
    main_write_template,
};
use crate::error::CliError;

// mimalloc seems to work better for windows
#[cfg(target_os = "windows")]
use mimalloc::MiMalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const LOG_FILE_NAME: &str = "mzbasket.log";

/// Logs to stderr and, when `log_dir` is given, appends a plain text copy to
/// `<log_dir>/mzbasket.log`.
fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Result<(), CliError> {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(LOG_FILE_NAME))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let subscriber = Registry::default()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE),
        )
        .with(file_layer);

    set_global_default(subscriber).map_err(|e| CliError::Logging(e.to_string()))
}

fn main() -> Result<(), CliError> {
    let args = Args::parse();

    match args.command {
        Some(Commands::WriteTemplate(args)) => {
            init_logging(false, None)?;
            let path = main_write_template(args)?;
            println!("Wrote configuration template to: {}", path.display());
        }
        Some(Commands::Replicate(args)) => {
            init_logging(args.verbose, Some(&args.output_dir))?;
            let report = main_replicate(args)?;
            if report.all_failed() {
                warn!("No sample produced a replicate table");
            }
        }
        Some(Commands::Basket(args)) => {
            init_logging(args.verbose, Some(&args.output_dir))?;
            let path = main_basket(args)?;
            info!("Baskets written to {}", path.display());
        }
        Some(Commands::Run(args)) => {
            init_logging(args.verbose, Some(&args.output_dir))?;
            let path = main_run(args)?;
            info!("Baskets written to {}", path.display());
        }
        None => {
            println!("No command provided, see --help");
        }
    }
    Ok(())
}
