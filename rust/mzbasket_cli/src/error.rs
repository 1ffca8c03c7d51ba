use mzbasket::{
    ConfigError,
    MzBasketError,
    TableError,
};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on {path}: {source}")]
    IoPath {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error(transparent)]
    Processing(#[from] MzBasketError),

    #[error("Refusing to overwrite existing file {0}")]
    AlreadyExists(PathBuf),

    #[error("No input tables found in {0}")]
    NoInputs(PathBuf),

    #[error("Unable to set up logging: {0}")]
    Logging(String),
}
