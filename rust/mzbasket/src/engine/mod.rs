//! Clustering engine: tolerance boxes, spatial index, connected components
//! and consensus aggregation, wired into a single run over one table.

pub mod aggregate;
pub mod components;
pub mod hyperrectangle;
pub mod index;

pub use aggregate::{
    AggregationConfig,
    AggregationMode,
    ConsensusAggregator,
    ConsensusRow,
    ConsensusSchema,
    ConsensusTable,
    ThresholdBasis,
};
pub use components::{
    connected_components,
    Component,
};
pub use hyperrectangle::{
    build_hyperrectangles,
    row_hyperrectangle,
    HyperrectangleSet,
    MatchDimensions,
};
pub use index::{
    BuildError,
    IndexStats,
    SpatialIndex,
    DEFAULT_NODE_CAPACITY,
};

use crate::errors::{
    ConfigError,
    DataError,
    MzBasketError,
    TableError,
};
use crate::models::{
    FeatureTable,
    TableSchema,
    ToleranceMap,
};
use std::time::{
    Duration,
    Instant,
};
use tracing::{
    debug,
    info,
    warn,
};

/// Everything a run needs besides the data.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Numeric columns rows are matched on, in box dimension order.
    pub match_columns: Vec<String>,
    pub tolerances: ToleranceMap,
    pub aggregation: AggregationConfig,
    pub node_capacity: usize,
}

impl EngineConfig {
    pub fn new(match_columns: Vec<String>, tolerances: ToleranceMap) -> Self {
        Self {
            match_columns,
            tolerances,
            aggregation: AggregationConfig::default(),
            node_capacity: DEFAULT_NODE_CAPACITY,
        }
    }

    pub fn with_aggregation(self, aggregation: AggregationConfig) -> Self {
        Self {
            aggregation,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunStats {
    pub input_rows: usize,
    pub rejected_rows: usize,
    pub num_components: usize,
    pub consensus_rows: usize,
    /// `None` when nothing was indexed.
    pub index: Option<IndexStats>,
    pub elapsed: Duration,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rows in, {} rejected, {} components, {} consensus rows out in {:.2?}",
            self.input_rows,
            self.rejected_rows,
            self.num_components,
            self.consensus_rows,
            self.elapsed
        )
    }
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub consensus: ConsensusTable,
    /// Rows excluded from clustering, in row order.
    pub rejected: Vec<DataError>,
    pub stats: RunStats,
}

/// A validated clustering configuration bound to one table layout.
///
/// Building the engine is where configuration mistakes surface, before any
/// data is touched. A single engine can then run any number of tables that
/// share the layout, from as many threads as needed.
///
/// ```
/// use mzbasket::engine::{AggregationConfig, ClusteringEngine, EngineConfig};
/// use mzbasket::models::{FeatureRow, FeatureTable, TableSchema};
/// use mzbasket::models::tolerance::default_tolerances;
///
/// let schema = TableSchema::new(
///     vec!["PrecMz".into(), "RetTime".into()],
///     vec!["UniqueFiles".into()],
/// );
/// let config = EngineConfig::new(vec!["PrecMz".into(), "RetTime".into()], default_tolerances())
///     .with_aggregation(AggregationConfig {
///         min_occurrences: 2,
///         ..Default::default()
///     });
/// let engine = ClusteringEngine::new(config, &schema).unwrap();
///
/// let table = FeatureTable::try_from_rows(
///     schema,
///     vec![
///         FeatureRow::new(vec![500.0, 3.00], vec!["rep1.csv".into()]),
///         FeatureRow::new(vec![500.01, 3.01], vec!["rep2.csv".into()]),
///         FeatureRow::new(vec![800.0, 3.00], vec!["rep1.csv".into()]),
///     ],
/// )
/// .unwrap();
/// let out = engine.run(&table).unwrap();
/// assert_eq!(out.consensus.len(), 1);
/// assert_eq!(out.consensus.rows[0].occurrences, 2);
/// assert_eq!(out.consensus.rows[0].text[0], "rep1.csv|rep2.csv");
/// ```
#[derive(Debug, Clone)]
pub struct ClusteringEngine {
    schema: TableSchema,
    dims: MatchDimensions,
    aggregator: ConsensusAggregator,
    node_capacity: usize,
}

impl ClusteringEngine {
    pub fn new(config: EngineConfig, schema: &TableSchema) -> Result<Self, ConfigError> {
        let dims = MatchDimensions::resolve(schema, &config.match_columns, &config.tolerances)?;
        let aggregator = ConsensusAggregator::new(&config.aggregation, schema, dims.columns())?;
        Ok(Self {
            schema: schema.clone(),
            dims,
            aggregator,
            node_capacity: config.node_capacity,
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn dimensions(&self) -> &MatchDimensions {
        &self.dims
    }

    pub fn consensus_schema(&self) -> &ConsensusSchema {
        self.aggregator.schema()
    }

    /// Clusters `table` and collapses every component that reaches the
    /// threshold.
    ///
    /// `table` must have the layout the engine was built for, otherwise
    /// [`TableError::LayoutMismatch`] is returned before any work is done
    /// (see [`FeatureTable::align_to`]). Non-finite rows are reported in the
    /// output, an empty table (or one where every row was rejected) yields no
    /// consensus rows.
    #[tracing::instrument(level = "debug", skip_all, fields(rows = table.len()))]
    pub fn run(&self, table: &FeatureTable) -> Result<RunOutput, MzBasketError> {
        let st = Instant::now();
        if table.schema() != &self.schema {
            return Err(TableError::LayoutMismatch {
                expected: Box::new(self.schema.clone()),
                found: Box::new(table.schema().clone()),
            }
            .into());
        }
        let mut stats = RunStats {
            input_rows: table.len(),
            ..Default::default()
        };

        let built = build_hyperrectangles(table, &self.dims)?;
        stats.rejected_rows = built.rejected.len();
        if !built.rejected.is_empty() {
            for e in built.rejected.iter() {
                debug!("{}", e);
            }
            warn!(
                "Excluded {} of {} rows with non-finite matched values",
                built.rejected.len(),
                table.len()
            );
        }
        debug!(
            "Built {} hyperrectangles, ~{} bytes",
            built.rects.len(),
            built.memory_usage_bytes()
        );

        let index = match SpatialIndex::bulk_load(&built.rects, self.node_capacity) {
            Ok(index) => index,
            Err(BuildError::EmptyBatch) => {
                info!("Nothing to cluster, {} input rows", table.len());
                stats.elapsed = st.elapsed();
                return Ok(RunOutput {
                    consensus: ConsensusTable::empty(self.aggregator.schema().clone()),
                    rejected: built.rejected,
                    stats,
                });
            }
            Err(BuildError::Resource(e)) => return Err(e.into()),
        };

        let components = connected_components(&built.rects, &index);
        stats.index = Some(index.release());
        stats.num_components = components.len();
        drop(built.rects);

        let consensus = self.aggregator.aggregate_all(table, &components);
        stats.consensus_rows = consensus.len();
        stats.elapsed = st.elapsed();
        info!("Clustering run: {}", stats);

        Ok(RunOutput {
            consensus,
            rejected: built.rejected,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tolerance::default_tolerances;
    use crate::models::{
        FeatureRow,
        Tolerance,
    };

    fn schema() -> TableSchema {
        TableSchema::new(
            vec!["PrecMz".into(), "RetTime".into(), "PrecIntensity".into()],
            vec!["UniqueFiles".into()],
        )
    }

    fn config(min_occurrences: usize) -> EngineConfig {
        EngineConfig::new(vec!["PrecMz".into(), "RetTime".into()], default_tolerances())
            .with_aggregation(AggregationConfig {
                min_occurrences,
                ..Default::default()
            })
    }

    fn row(mz: f64, rt: f64, file: &str) -> FeatureRow {
        FeatureRow::new(vec![mz, rt, 1e4], vec![file.into()])
    }

    #[test]
    fn test_config_errors_surface_at_build() {
        let mut bad = config(1);
        bad.tolerances.remove("RetTime");
        assert_eq!(
            ClusteringEngine::new(bad, &schema()).unwrap_err(),
            ConfigError::MissingTolerance("RetTime".into())
        );
        assert_eq!(
            ClusteringEngine::new(config(0), &schema()).unwrap_err(),
            ConfigError::ZeroThreshold
        );
        let mut negative = config(1);
        negative
            .tolerances
            .insert("PrecMz".into(), Tolerance::Ppm(-5.0));
        assert!(matches!(
            ClusteringEngine::new(negative, &schema()),
            Err(ConfigError::InvalidToleranceValue { .. })
        ));
    }

    #[test]
    fn test_empty_batch_is_not_an_error() {
        let engine = ClusteringEngine::new(config(1), &schema()).unwrap();
        let out = engine.run(&FeatureTable::new(schema())).unwrap();
        assert!(out.consensus.is_empty());
        assert!(out.rejected.is_empty());
        assert!(out.stats.index.is_none());
    }

    #[test]
    fn test_all_rows_rejected() {
        let engine = ClusteringEngine::new(config(1), &schema()).unwrap();
        let table = FeatureTable::try_from_rows(
            schema(),
            vec![row(f64::NAN, 1.0, "a"), row(100.0, f64::NAN, "b")],
        )
        .unwrap();
        let out = engine.run(&table).unwrap();
        assert!(out.consensus.is_empty());
        assert_eq!(out.rejected.len(), 2);
        assert_eq!(out.stats.rejected_rows, 2);
    }

    #[test]
    fn test_layout_mismatch_is_rejected() {
        let schema = TableSchema::new(vec!["PrecMz".into(), "RetTime".into()], vec![]);
        let mut tolerances = default_tolerances();
        tolerances.insert("RetTime".into(), Tolerance::Window(5.0));
        let engine = ClusteringEngine::new(
            EngineConfig::new(vec!["PrecMz".into(), "RetTime".into()], tolerances),
            &schema,
        )
        .unwrap();

        // Same columns, swapped: the retention time window must not be
        // applied to m/z.
        let swapped = FeatureTable::try_from_rows(
            TableSchema::new(vec!["RetTime".into(), "PrecMz".into()], vec![]),
            vec![
                FeatureRow::new(vec![1.0, 100.0], vec![]),
                FeatureRow::new(vec![1.0, 104.0], vec![]),
            ],
        )
        .unwrap();
        assert!(matches!(
            engine.run(&swapped),
            Err(MzBasketError::Table(TableError::LayoutMismatch { .. }))
        ));

        let narrow = FeatureTable::try_from_rows(
            TableSchema::new(vec!["PrecMz".into()], vec![]),
            vec![FeatureRow::new(vec![100.0], vec![])],
        )
        .unwrap();
        assert!(matches!(
            engine.run(&narrow),
            Err(MzBasketError::Table(TableError::LayoutMismatch { .. }))
        ));

        let aligned = swapped.align_to(&schema);
        assert!(matches!(aligned, Err(TableError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_run_stats() {
        let engine = ClusteringEngine::new(config(2), &schema()).unwrap();
        let table = FeatureTable::try_from_rows(
            schema(),
            vec![
                row(300.0, 2.0, "a"),
                row(300.001, 2.01, "b"),
                row(450.0, 2.0, "a"),
                row(f64::NAN, 2.0, "b"),
            ],
        )
        .unwrap();
        let out = engine.run(&table).unwrap();
        assert_eq!(out.stats.input_rows, 4);
        assert_eq!(out.stats.rejected_rows, 1);
        assert_eq!(out.stats.num_components, 2);
        assert_eq!(out.stats.consensus_rows, 1);
        assert_eq!(out.stats.index.as_ref().unwrap().num_boxes, 3);
        assert_eq!(out.rejected[0].row(), 3);
    }
}
