//! Fans the engine out over many independent samples, then runs it once
//! more over every sample's consensus.

use crate::engine::{
    ClusteringEngine,
    RunOutput,
};
use crate::errors::MzBasketError;
use crate::models::FeatureTable;
use indicatif::{
    ParallelProgressIterator,
    ProgressStyle,
};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::panic::{
    catch_unwind,
    AssertUnwindSafe,
};
use std::path::{
    Path,
    PathBuf,
};
use std::time::{
    Duration,
    Instant,
};
use tracing::{
    error,
    info,
    warn,
};

/// All the replicate files of one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleJob {
    pub name: String,
    pub sources: Vec<PathBuf>,
}

/// Sample a replicate file belongs to: its file stem up to the first `_`.
///
/// `S12_rep1.csv`, `S12_rep2.csv` and `S12.csv` all belong to `S12`.
pub fn sample_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let name = stem.split('_').next().unwrap_or(stem);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Groups replicate files into samples. Samples come out sorted by name and
/// the files of every sample sorted by path.
pub fn group_replicates<I: IntoIterator<Item = PathBuf>>(paths: I) -> Vec<SampleJob> {
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for path in paths {
        match sample_name(&path) {
            Some(name) => groups.entry(name).or_default().push(path),
            None => warn!("Unable to derive a sample name from {}, skipping", path.display()),
        }
    }
    groups
        .into_iter()
        .map(|(name, mut sources)| {
            sources.sort();
            SampleJob { name, sources }
        })
        .collect()
}

/// Loads the table of one sample.
pub trait TableSource: Sync {
    fn load(&self, job: &SampleJob) -> Result<FeatureTable, MzBasketError>;
}

/// Persists the result of one sample run.
pub trait ConsensusSink: Sync {
    fn store(&self, job: &SampleJob, output: &RunOutput) -> Result<(), MzBasketError>;
}

#[derive(Debug)]
pub enum SampleOutcome {
    Completed { rows: usize, rejected: usize },
    Failed { error: MzBasketError },
}

#[derive(Debug)]
pub struct SampleReport {
    pub name: String,
    pub outcome: SampleOutcome,
}

#[derive(Debug)]
pub struct BatchReport {
    pub samples: Vec<SampleReport>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn num_completed(&self) -> usize {
        self.samples
            .iter()
            .filter(|s| matches!(s.outcome, SampleOutcome::Completed { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &MzBasketError)> {
        self.samples.iter().filter_map(|s| match &s.outcome {
            SampleOutcome::Failed { error } => Some((s.name.as_str(), error)),
            SampleOutcome::Completed { .. } => None,
        })
    }

    /// True when no sample produced a consensus, which leaves nothing to
    /// basket.
    pub fn all_failed(&self) -> bool {
        self.num_completed() == 0
    }
}

#[tracing::instrument(level = "debug", skip_all, fields(sample = %job.name))]
fn run_sample<S: TableSource, K: ConsensusSink>(
    job: &SampleJob,
    engine: &ClusteringEngine,
    source: &S,
    sink: &K,
) -> Result<SampleOutcome, MzBasketError> {
    let table = source.load(job)?.align_to(engine.schema())?;
    let output = engine.run(&table)?;
    sink.store(job, &output)?;
    Ok(SampleOutcome::Completed {
        rows: output.consensus.len(),
        rejected: output.rejected.len(),
    })
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Number of worker threads for a requested cap, never more than the
/// machine has and never less than one.
pub fn effective_workers(requested: Option<usize>) -> usize {
    let available = std::thread::available_parallelism()
        .map(|x| x.get())
        .unwrap_or(1);
    requested.unwrap_or(available).clamp(1, available)
}

/// Runs every job on a dedicated pool of at most `workers` threads.
///
/// Each job is isolated: a job that fails (or panics) is logged and
/// reported, the others carry on. Reports come back in job order.
pub fn process_samples<S: TableSource, K: ConsensusSink>(
    jobs: &[SampleJob],
    engine: &ClusteringEngine,
    source: &S,
    sink: &K,
    workers: usize,
) -> Result<BatchReport, MzBasketError> {
    let st = Instant::now();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()?;
    info!(
        "Processing {} samples with {} workers",
        jobs.len(),
        pool.current_num_threads()
    );

    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} samples ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());

    let samples: Vec<SampleReport> = pool.install(|| {
        jobs.par_iter()
            .progress_with_style(style)
            .map(|job| {
                let result = catch_unwind(AssertUnwindSafe(|| run_sample(job, engine, source, sink)))
                    .unwrap_or_else(|payload| Err(MzBasketError::WorkerPanic(panic_message(payload))));
                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("Sample {} failed: {}", job.name, e);
                        SampleOutcome::Failed { error: e }
                    }
                };
                SampleReport {
                    name: job.name.clone(),
                    outcome,
                }
            })
            .collect()
    });

    let report = BatchReport {
        samples,
        elapsed: st.elapsed(),
    };
    info!(
        "Finished {} samples ({} failed) in {:.2?}",
        report.samples.len(),
        report.samples.len() - report.num_completed(),
        report.elapsed
    );
    Ok(report)
}

/// The global pass: clusters the consensus rows of every sample together.
pub fn basket_tables(
    tables: Vec<FeatureTable>,
    engine: &ClusteringEngine,
) -> Result<RunOutput, MzBasketError> {
    let n_tables = tables.len();
    let combined = FeatureTable::concat(tables)?.ok_or(MzBasketError::NoReplicateInputs)?;
    let combined = combined.align_to(engine.schema())?;
    info!(
        "Basketing {} rows from {} tables",
        combined.len(),
        n_tables
    );
    engine.run(&combined)
}
