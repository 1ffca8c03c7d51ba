use crate::engine::components::Component;
use crate::errors::ConfigError;
use crate::models::{
    FeatureRow,
    FeatureTable,
    TableSchema,
};
use crate::utils::{
    RunningStats,
    TupleRange,
    FIELD_DELIMITER,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::HashSet;
use tracing::debug;

/// How the numeric values of a component are collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// Mean of every numeric column. Used to compare replicates.
    #[default]
    Mean,
    /// Mean plus the observed `[min, max]` of the range columns. Used for
    /// basketing, where the extent of the bin matters downstream.
    Range,
}

/// What is counted against the minimum occurrence threshold.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThresholdBasis {
    /// Number of rows in the component.
    #[default]
    Rows,
    /// Number of distinct tokens of a text column across the component,
    /// eg. the number of different source files.
    DistinctValues(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationConfig {
    pub min_occurrences: usize,
    pub mode: AggregationMode,
    pub threshold_basis: ThresholdBasis,
    /// Extra numeric columns (besides the matched ones) that get a
    /// `[min, max]` extent in range mode.
    pub min_max_columns: Vec<String>,
    /// Attach a JSON summary of the numeric extents to every consensus row.
    pub basket_info: bool,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 1,
            mode: AggregationMode::Mean,
            threshold_basis: ThresholdBasis::Rows,
            min_max_columns: Vec::new(),
            basket_info: false,
        }
    }
}

/// Column layout of a [`ConsensusTable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsensusSchema {
    pub numeric_columns: Vec<String>,
    /// Columns with a recorded extent, empty in mean mode.
    pub range_columns: Vec<String>,
    pub text_columns: Vec<String>,
    pub payload_column: Option<String>,
    pub basket_info: bool,
}

/// One retained component, collapsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusRow {
    /// Mean of each numeric column over the finite member values, NaN if
    /// there were none.
    pub numeric: Vec<f64>,
    /// Extent of each range column, `None` if no member value was finite.
    pub extents: Vec<Option<TupleRange<f64>>>,
    /// Distinct `|`-separated tokens of each text column, first-seen order.
    pub text: Vec<String>,
    /// Number of member rows.
    pub occurrences: usize,
    /// Member payloads as a JSON array string.
    pub payload: Option<String>,
    pub basket_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusTable {
    pub schema: ConsensusSchema,
    pub rows: Vec<ConsensusRow>,
}

impl ConsensusTable {
    pub fn empty(schema: ConsensusSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Stable sort on the (mean) values of `columns`, in priority order.
    pub fn sort_by_columns(&mut self, columns: &[&str]) -> Result<(), ConfigError> {
        let indices = columns
            .iter()
            .map(|c| {
                self.schema
                    .numeric_columns
                    .iter()
                    .position(|x| x == c)
                    .ok_or_else(|| ConfigError::UnknownNumericColumn {
                        column: c.to_string(),
                        available: self.schema.numeric_columns.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.rows.sort_by(|a, b| {
            indices
                .iter()
                .map(|i| a.numeric[*i].total_cmp(&b.numeric[*i]))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(())
    }

    /// Turns the consensus rows back into plain feature rows, so they can be
    /// clustered again. Means become the values, extents are dropped.
    pub fn into_feature_table(self) -> FeatureTable {
        let schema = TableSchema {
            numeric_columns: self.schema.numeric_columns,
            text_columns: self.schema.text_columns,
            payload_column: self.schema.payload_column,
        };
        let rows = self
            .rows
            .into_iter()
            .map(|r| FeatureRow {
                numeric: r.numeric,
                text: r.text,
                payload: r.payload,
            })
            .collect::<Vec<_>>();
        // Widths come from the same schema, so this cannot fail.
        let mut out = FeatureTable::new(schema);
        for row in rows {
            if let Err(e) = out.push(row) {
                debug!("Dropping malformed consensus row: {}", e);
            }
        }
        out
    }
}

/// Reduces components to consensus rows, resolved against one table schema.
#[derive(Debug, Clone)]
pub struct ConsensusAggregator {
    min_occurrences: usize,
    schema: ConsensusSchema,
    range_indices: Vec<usize>,
    distinct_index: Option<usize>,
}

impl ConsensusAggregator {
    pub fn new<'a>(
        config: &AggregationConfig,
        table_schema: &TableSchema,
        match_columns: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ConfigError> {
        if config.min_occurrences == 0 {
            return Err(ConfigError::ZeroThreshold);
        }

        let mut range_columns: Vec<String> = Vec::new();
        if config.mode == AggregationMode::Range {
            let requested = match_columns
                .into_iter()
                .map(|x| x.to_string())
                .chain(config.min_max_columns.iter().cloned());
            for col in requested {
                if !range_columns.contains(&col) {
                    range_columns.push(col);
                }
            }
        }
        let range_indices = range_columns
            .iter()
            .map(|c| table_schema.numeric_index(c))
            .collect::<Result<Vec<_>, _>>()?;

        let distinct_index = match &config.threshold_basis {
            ThresholdBasis::Rows => None,
            ThresholdBasis::DistinctValues(col) => Some(table_schema.text_index(col)?),
        };

        Ok(Self {
            min_occurrences: config.min_occurrences,
            schema: ConsensusSchema {
                numeric_columns: table_schema.numeric_columns.clone(),
                range_columns,
                text_columns: table_schema.text_columns.clone(),
                payload_column: table_schema.payload_column.clone(),
                basket_info: config.basket_info,
            },
            range_indices,
            distinct_index,
        })
    }

    pub fn schema(&self) -> &ConsensusSchema {
        &self.schema
    }

    /// The count compared against the threshold.
    pub fn support(&self, table: &FeatureTable, component: &Component) -> usize {
        match self.distinct_index {
            None => component.len(),
            Some(col) => {
                distinct_tokens(component.members.iter().map(|&i| table.rows()[i].text[col].as_str()))
                    .len()
            }
        }
    }

    /// Collapses one component, `None` when it does not reach the threshold.
    pub fn aggregate(&self, table: &FeatureTable, component: &Component) -> Option<ConsensusRow> {
        if self.support(table, component) < self.min_occurrences {
            return None;
        }
        let rows = table.rows();
        let members = move || component.members.iter().map(move |&i| &rows[i]);

        let n_numeric = self.schema.numeric_columns.len();
        let mut stats = vec![RunningStats::default(); n_numeric];
        for row in members() {
            for (acc, value) in stats.iter_mut().zip(row.numeric.iter()) {
                if value.is_finite() {
                    acc.add(*value);
                }
            }
        }

        let numeric = stats.iter().map(|s| s.mean().unwrap_or(f64::NAN)).collect();
        let extents = self
            .range_indices
            .iter()
            .map(|&i| extent(&stats[i]))
            .collect();

        let delimiter = FIELD_DELIMITER.to_string();
        let text = (0..self.schema.text_columns.len())
            .map(|col| distinct_tokens(members().map(|r| r.text[col].as_str())).join(delimiter.as_str()))
            .collect();

        let payload = self
            .schema
            .payload_column
            .as_ref()
            .map(|_| merge_payloads(members().filter_map(|r| r.payload.as_deref())));

        let basket_info = self
            .schema
            .basket_info
            .then(|| self.basket_info(&stats, component.len()));

        Some(ConsensusRow {
            numeric,
            extents,
            text,
            occurrences: component.len(),
            payload,
            basket_info,
        })
    }

    /// Collapses every component, in component order.
    pub fn aggregate_all(&self, table: &FeatureTable, components: &[Component]) -> ConsensusTable {
        let rows = components
            .iter()
            .filter_map(|c| self.aggregate(table, c))
            .collect();
        ConsensusTable {
            schema: self.schema.clone(),
            rows,
        }
    }

    fn basket_info(&self, stats: &[RunningStats], n: usize) -> String {
        let mut map = serde_json::Map::new();
        for (name, s) in self.schema.numeric_columns.iter().zip(stats.iter()) {
            if let (Ok(min), Ok(max)) = (s.min(), s.max()) {
                map.insert(name.clone(), serde_json::json!([min, max]));
            }
        }
        map.insert("n".to_string(), serde_json::json!(n));
        serde_json::Value::Object(map).to_string()
    }
}

fn extent(stats: &RunningStats) -> Option<TupleRange<f64>> {
    match (stats.min(), stats.max()) {
        (Ok(min), Ok(max)) => TupleRange::try_new(min, max).ok(),
        _ => None,
    }
}

/// Distinct non-empty tokens in first-seen order, compared verbatim. Values
/// that already are `|`-joined lists are split first.
fn distinct_tokens<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for token in values.flat_map(|v| v.split(FIELD_DELIMITER)) {
        if !token.is_empty() && seen.insert(token) {
            out.push(token);
        }
    }
    out
}

/// Merges member payloads into one JSON array. Payloads that are
/// themselves JSON arrays (from a previous pass) are flattened.
fn merge_payloads<'a>(payloads: impl Iterator<Item = &'a str>) -> String {
    let mut out: Vec<serde_json::Value> = Vec::new();
    for payload in payloads {
        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(serde_json::Value::Array(inner)) => out.extend(inner),
            _ => out.push(serde_json::Value::String(payload.to_string())),
        }
    }
    serde_json::Value::Array(out).to_string()
}
