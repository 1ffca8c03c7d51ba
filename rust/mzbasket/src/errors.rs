use crate::models::TableSchema;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid configuration, raised before any data is processed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown tolerance kind '{0}', expected one of: none, ppm, percent, factor, window")]
    UnknownToleranceKind(String),
    #[error("Malformed tolerance '{0}', expected '<kind>,<value>' (eg. 'ppm,30' or 'None,None')")]
    MalformedTolerance(String),
    #[error("Tolerance kind '{kind}' does not take a value, got {value}")]
    UnexpectedToleranceValue { kind: &'static str, value: f64 },
    #[error("Tolerance kind '{kind}' requires a value")]
    MissingToleranceValue { kind: &'static str },
    #[error("Tolerance value for '{kind}' must be finite and non-negative, got {value}")]
    InvalidToleranceValue { kind: &'static str, value: f64 },
    #[error("At least one column to match is required")]
    NoMatchColumns,
    #[error("Column '{0}' is listed more than once in the columns to match")]
    DuplicateMatchColumn(String),
    #[error("Column '{column}' is not one of the numeric columns {available:?}")]
    UnknownNumericColumn {
        column: String,
        available: Vec<String>,
    },
    #[error("Column '{column}' is not one of the text columns {available:?}")]
    UnknownTextColumn {
        column: String,
        available: Vec<String>,
    },
    #[error("No tolerance declared for match column '{0}'")]
    MissingTolerance(String),
    #[error("Minimum occurrences must be at least 1")]
    ZeroThreshold,
}

/// Problem with a single input row. Never aborts a run, the row is excluded
/// from clustering and reported.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Row {row} has a non-finite value ({value}) in match column '{column}'")]
    NonFiniteValue {
        row: usize,
        column: String,
        value: f64,
    },
}

impl DataError {
    pub fn row(&self) -> usize {
        match self {
            DataError::NonFiniteValue { row, .. } => *row,
        }
    }
}

/// Failure to acquire the memory a run needs.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Unable to reserve space for {requested} {what}: {source}")]
    Allocation {
        what: &'static str,
        requested: usize,
        #[source]
        source: std::collections::TryReserveError,
    },
    #[error("Unable to index {requested} boxes, at most {max} are supported")]
    IndexCapacity { requested: usize, max: usize },
}

/// Errors raised by the table readers/writers.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("I/O error on {path}: {source}")]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("CSV error on {path}: {source}")]
    Csv {
        #[source]
        source: csv::Error,
        path: PathBuf,
    },
    #[error("Required column '{column}' not found in {path}")]
    MissingColumn { column: String, path: PathBuf },
    #[error("Unable to parse '{value}' as a number (column '{column}', line {line}) in {path}")]
    ParseNumber {
        value: String,
        column: String,
        line: u64,
        path: PathBuf,
    },
    #[error("Tables do not share the same numeric columns: {left:?} vs {right:?}")]
    SchemaMismatch {
        left: Vec<String>,
        right: Vec<String>,
    },
    #[error("Table layout {found:?} does not match the engine layout {expected:?}")]
    LayoutMismatch {
        expected: Box<TableSchema>,
        found: Box<TableSchema>,
    },
}

#[derive(Error, Debug)]
pub enum MzBasketError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("Unable to build the worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("No replicate-consensus input available, every sample failed")]
    NoReplicateInputs,
    #[error("Worker panicked: {0}")]
    WorkerPanic(String),
}
