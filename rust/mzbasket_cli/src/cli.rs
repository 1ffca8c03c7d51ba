use clap::{
    Parser,
    Subcommand,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a template configuration file.
    WriteTemplate(WriteTemplateArgs),
    /// Collapse the replicates of every sample into one table per sample.
    Replicate(RunArgs),
    /// Cluster the per-sample tables together into baskets.
    Basket(RunArgs),
    /// Replicate comparison followed by basketing.
    Run(RunArgs),
}

#[derive(Parser, Debug)]
pub struct WriteTemplateArgs {
    /// Directory to write the template to.
    #[arg(short, long)]
    pub output_path: PathBuf,
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Directory with the input CSV tables.
    #[arg(short, long)]
    pub input_dir: PathBuf,

    /// Directory for the results (and the log file).
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Path to the JSON configuration file, defaults are used if missing.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum number of samples processed in parallel (will over-write the
    /// config file).
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Log debug messages.
    #[arg(short, long)]
    pub verbose: bool,
}
