#![doc = include_str!("../README.md")]

// Re-export main structures
pub use crate::engine::{
    AggregationConfig,
    AggregationMode,
    ClusteringEngine,
    ConsensusTable,
    EngineConfig,
    RunOutput,
    ThresholdBasis,
};
pub use crate::models::{
    FeatureRow,
    FeatureTable,
    TableSchema,
    Tolerance,
    ToleranceMap,
};

// Declare modules
pub mod batch;
pub mod engine;
pub mod errors;
pub mod models;
pub mod serde;
pub mod utils;
pub use crate::utils::TupleRange;

// Re-export errors
pub use crate::errors::{
    ConfigError,
    DataError,
    MzBasketError,
    ResourceError,
    TableError,
};
