use mzbasket::engine::{
    AggregationConfig,
    AggregationMode,
    ClusteringEngine,
    EngineConfig,
    ThresholdBasis,
    DEFAULT_NODE_CAPACITY,
};
use mzbasket::models::tolerance::default_tolerances;
use mzbasket::serde::ColumnsConfig;
use mzbasket::{
    ConfigError,
    TableSchema,
    ToleranceMap,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::path::Path;

use crate::error::CliError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub columns: ColumnsConfig,
    /// Tolerance of every matched column, either `{"kind": "ppm", "value": 30}`
    /// or the short `"ppm,30"` form.
    pub tolerances: ToleranceMap,
    pub replicate: ReplicateConfig,
    pub basket: BasketConfig,
    /// Maximum number of samples processed at once. Defaults to the number
    /// of available cores, lower it if memory runs short.
    pub workers: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReplicateConfig {
    /// A feature has to be seen this many times across replicates.
    pub min_occurrences: usize,
    /// Rows below this intensity are dropped when the tables are read.
    pub min_intensity: f64,
    /// Count distinct values of this text column instead of rows.
    pub count_distinct: Option<String>,
    /// Overrides `columns.match_columns` for this stage.
    pub match_columns: Option<Vec<String>>,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 2,
            min_intensity: 2e3,
            count_distinct: None,
            match_columns: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BasketConfig {
    pub min_occurrences: usize,
    /// Columns (besides the matched ones) whose min and max are reported.
    pub min_max_columns: Vec<String>,
    /// Adds a `BasketInfo` JSON column with the extent of every numeric
    /// column.
    pub basket_info: bool,
    pub count_distinct: Option<String>,
    pub match_columns: Option<Vec<String>>,
}

impl Default for BasketConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 1,
            min_max_columns: vec!["PrecIntensity".to_string()],
            basket_info: false,
            count_distinct: None,
            match_columns: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            columns: ColumnsConfig::default(),
            tolerances: default_tolerances(),
            replicate: ReplicateConfig::default(),
            basket: BasketConfig::default(),
            workers: None,
        }
    }
}

fn threshold_basis(count_distinct: &Option<String>) -> ThresholdBasis {
    match count_distinct {
        Some(col) => ThresholdBasis::DistinctValues(col.clone()),
        None => ThresholdBasis::Rows,
    }
}

impl Config {
    /// Reads and validates a configuration file.
    pub fn from_path(path: &Path) -> Result<Self, CliError> {
        let file = std::fs::File::open(path).map_err(|source| CliError::IoPath {
            source,
            path: path.to_path_buf(),
        })?;
        let config: Config = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Layout every input table is aligned to: the numeric columns, the
    /// file name column and the optional payload.
    pub fn feature_schema(&self) -> TableSchema {
        TableSchema {
            numeric_columns: self.columns.numeric_columns.clone(),
            text_columns: vec![self.columns.filename_column.clone()],
            payload_column: self.columns.payload_column.clone(),
        }
    }

    pub fn replicate_engine_config(&self) -> EngineConfig {
        let match_columns = self
            .replicate
            .match_columns
            .clone()
            .unwrap_or_else(|| self.columns.match_columns.clone());
        EngineConfig {
            match_columns,
            tolerances: self.tolerances.clone(),
            aggregation: AggregationConfig {
                min_occurrences: self.replicate.min_occurrences,
                mode: AggregationMode::Mean,
                threshold_basis: threshold_basis(&self.replicate.count_distinct),
                min_max_columns: Vec::new(),
                basket_info: false,
            },
            node_capacity: DEFAULT_NODE_CAPACITY,
        }
    }

    pub fn basket_engine_config(&self) -> EngineConfig {
        let match_columns = self
            .basket
            .match_columns
            .clone()
            .unwrap_or_else(|| self.columns.match_columns.clone());
        EngineConfig {
            match_columns,
            tolerances: self.tolerances.clone(),
            aggregation: AggregationConfig {
                min_occurrences: self.basket.min_occurrences,
                mode: AggregationMode::Range,
                threshold_basis: threshold_basis(&self.basket.count_distinct),
                min_max_columns: self.basket.min_max_columns.clone(),
                basket_info: self.basket.basket_info,
            },
            node_capacity: DEFAULT_NODE_CAPACITY,
        }
    }

    pub fn replicate_engine(&self) -> Result<ClusteringEngine, ConfigError> {
        ClusteringEngine::new(self.replicate_engine_config(), &self.feature_schema())
    }

    pub fn basket_engine(&self) -> Result<ClusteringEngine, ConfigError> {
        ClusteringEngine::new(self.basket_engine_config(), &self.feature_schema())
    }

    /// Checks everything that can be checked without data, so a bad
    /// configuration fails before any file is read.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.feature_schema()
            .numeric_index(&self.columns.intensity_column)?;
        self.replicate_engine()?;
        self.basket_engine()?;
        Ok(())
    }
}
