use mzbasket::batch::{
    basket_tables,
    effective_workers,
    group_replicates,
    process_samples,
    BatchReport,
    ConsensusSink,
    SampleJob,
    TableSource,
};
use mzbasket::engine::RunOutput;
use mzbasket::serde::{
    read_feature_csv,
    write_consensus_csv,
    ColumnsConfig,
};
use mzbasket::{
    FeatureTable,
    MzBasketError,
};
use serde::Serialize;
use std::path::{
    Path,
    PathBuf,
};
use tracing::{
    debug,
    error,
    info,
    warn,
};

use crate::cli::{
    RunArgs,
    WriteTemplateArgs,
};
use crate::config::Config;
use crate::error::CliError;

pub const TEMPLATE_FILE_NAME: &str = "mzbasket_config.json";
pub const REPLICATED_DIR: &str = "replicated";
pub const REPLICATED_SUFFIX: &str = "_replicated.csv";
pub const BASKETED_FILE_NAME: &str = "basketed.csv";
pub const FAILURES_FILE_NAME: &str = "failures.json";

/// Main function for the 'write-template' subcommand.
pub fn main_write_template(args: WriteTemplateArgs) -> Result<PathBuf, CliError> {
    std::fs::create_dir_all(&args.output_path)?;
    let path = args.output_path.join(TEMPLATE_FILE_NAME);
    if path.exists() {
        return Err(CliError::AlreadyExists(path));
    }
    let template = serde_json::to_string_pretty(&Config::default())?;
    std::fs::write(&path, template)?;
    info!("Wrote configuration template to {}", path.display());
    Ok(path)
}

fn load_config(args: &RunArgs) -> Result<Config, CliError> {
    let mut config = match &args.config {
        Some(path) => Config::from_path(path)?,
        None => {
            info!("No configuration file given, using defaults");
            Config::default()
        }
    };
    if let Some(workers) = args.workers {
        config.workers = Some(workers);
    }
    debug!("Using configuration: {:#?}", config);
    Ok(config)
}

/// CSV files directly under `dir`, sorted by path.
fn list_csv_files(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>, CliError> {
    let entries = std::fs::read_dir(dir).map_err(|source| CliError::IoPath {
        source,
        path: dir.to_path_buf(),
    })?;
    let mut out = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let matches = path.is_file()
            && path
                .file_name()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x.to_ascii_lowercase().ends_with(suffix));
        if matches {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Reads every replicate file of a sample into a single table.
struct CsvReplicateSource<'a> {
    columns: &'a ColumnsConfig,
    min_intensity: f64,
}

impl TableSource for CsvReplicateSource<'_> {
    fn load(&self, job: &SampleJob) -> Result<FeatureTable, MzBasketError> {
        let mut tables = Vec::with_capacity(job.sources.len());
        for path in job.sources.iter() {
            let mut table = read_feature_csv(path, self.columns)?;
            let dropped =
                table.retain_min_value(&self.columns.intensity_column, self.min_intensity)?;
            debug!(
                "{}: kept {} rows, {} below the minimum intensity",
                path.display(),
                table.len(),
                dropped
            );
            tables.push(table);
        }
        FeatureTable::concat(tables)?.ok_or(MzBasketError::NoReplicateInputs)
    }
}

struct CsvConsensusSink {
    directory: PathBuf,
}

impl ConsensusSink for CsvConsensusSink {
    fn store(&self, job: &SampleJob, output: &RunOutput) -> Result<(), MzBasketError> {
        let path = self
            .directory
            .join(format!("{}{}", job.name, REPLICATED_SUFFIX));
        write_consensus_csv(&path, &output.consensus)?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct FailureRecord<'a> {
    sample: &'a str,
    error: String,
}

fn write_failures(report: &BatchReport, directory: &Path) -> Result<(), CliError> {
    let failures: Vec<FailureRecord> = report
        .failures()
        .map(|(sample, e)| FailureRecord {
            sample,
            error: e.to_string(),
        })
        .collect();
    if failures.is_empty() {
        return Ok(());
    }
    let path = directory.join(FAILURES_FILE_NAME);
    std::fs::write(&path, serde_json::to_string_pretty(&failures)?)?;
    warn!(
        "{} samples failed, details in {}",
        failures.len(),
        path.display()
    );
    Ok(())
}

fn replicate(config: &Config, input_dir: &Path, output_dir: &Path) -> Result<BatchReport, CliError> {
    let engine = config.replicate_engine()?;
    let files = list_csv_files(input_dir, ".csv")?;
    let jobs = group_replicates(files);
    if jobs.is_empty() {
        return Err(CliError::NoInputs(input_dir.to_path_buf()));
    }
    info!(
        "Found {} samples with {} replicate files in {}",
        jobs.len(),
        jobs.iter().map(|j| j.sources.len()).sum::<usize>(),
        input_dir.display()
    );

    let directory = output_dir.join(REPLICATED_DIR);
    std::fs::create_dir_all(&directory)?;
    let source = CsvReplicateSource {
        columns: &config.columns,
        min_intensity: config.replicate.min_intensity,
    };
    let sink = CsvConsensusSink {
        directory: directory.clone(),
    };
    let workers = effective_workers(config.workers);
    let report = process_samples(&jobs, &engine, &source, &sink, workers)?;
    write_failures(&report, &directory)?;
    Ok(report)
}

fn basket(config: &Config, input_dir: &Path, output_dir: &Path) -> Result<PathBuf, CliError> {
    let engine = config.basket_engine()?;
    let files = list_csv_files(input_dir, REPLICATED_SUFFIX)?;
    if files.is_empty() {
        return Err(CliError::NoInputs(input_dir.to_path_buf()));
    }

    let mut tables = Vec::with_capacity(files.len());
    for path in files.iter() {
        match read_feature_csv(path, &config.columns) {
            Ok(table) => tables.push(table),
            Err(e) => error!("Skipping {}: {}", path.display(), e),
        }
    }
    if tables.is_empty() {
        return Err(MzBasketError::NoReplicateInputs.into());
    }

    let mut output = basket_tables(tables, &engine)?;
    // Match columns in reverse, RetTime then PrecMz with the default columns.
    let mut sort_columns: Vec<&str> = engine.dimensions().columns().collect();
    sort_columns.reverse();
    output.consensus.sort_by_columns(&sort_columns)?;

    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(BASKETED_FILE_NAME);
    write_consensus_csv(&path, &output.consensus)?;
    info!(
        "Wrote {} baskets to {}",
        output.consensus.len(),
        path.display()
    );
    Ok(path)
}

/// Main function for the 'replicate' subcommand.
pub fn main_replicate(args: RunArgs) -> Result<BatchReport, CliError> {
    let config = load_config(&args)?;
    replicate(&config, &args.input_dir, &args.output_dir)
}

/// Main function for the 'basket' subcommand.
pub fn main_basket(args: RunArgs) -> Result<PathBuf, CliError> {
    let config = load_config(&args)?;
    basket(&config, &args.input_dir, &args.output_dir)
}

/// Main function for the 'run' subcommand.
pub fn main_run(args: RunArgs) -> Result<PathBuf, CliError> {
    let config = load_config(&args)?;
    let report = replicate(&config, &args.input_dir, &args.output_dir)?;
    if report.all_failed() {
        error!("Every sample failed, skipping basketing");
        return Err(MzBasketError::NoReplicateInputs.into());
    }
    basket(
        &config,
        &args.output_dir.join(REPLICATED_DIR),
        &args.output_dir,
    )
}
