use crate::errors::{
    ConfigError,
    TableError,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Column layout of a [`FeatureTable`].
///
/// Numeric columns hold the measured values (some of them are matched, the
/// rest are only averaged), text columns are passed through and concatenated
/// when rows merge. The optional payload column carries an opaque per-row
/// blob (eg. a serialized MS2 spectrum) that is never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub numeric_columns: Vec<String>,
    pub text_columns: Vec<String>,
    pub payload_column: Option<String>,
}

impl TableSchema {
    pub fn new(numeric_columns: Vec<String>, text_columns: Vec<String>) -> Self {
        Self {
            numeric_columns,
            text_columns,
            payload_column: None,
        }
    }

    pub fn with_payload_column(self, column: impl Into<String>) -> Self {
        Self {
            payload_column: Some(column.into()),
            ..self
        }
    }

    pub fn numeric_index(&self, column: &str) -> Result<usize, ConfigError> {
        self.numeric_columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| ConfigError::UnknownNumericColumn {
                column: column.to_string(),
                available: self.numeric_columns.clone(),
            })
    }

    pub fn text_index(&self, column: &str) -> Result<usize, ConfigError> {
        self.text_columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| ConfigError::UnknownTextColumn {
                column: column.to_string(),
                available: self.text_columns.clone(),
            })
    }
}

/// One detected feature. Its identity is its position in the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub numeric: Vec<f64>,
    pub text: Vec<String>,
    pub payload: Option<String>,
}

impl FeatureRow {
    pub fn new(numeric: Vec<f64>, text: Vec<String>) -> Self {
        Self {
            numeric,
            text,
            payload: None,
        }
    }

    pub fn with_payload(self, payload: impl Into<String>) -> Self {
        Self {
            payload: Some(payload.into()),
            ..self
        }
    }
}

/// A batch of feature rows sharing a schema.
///
/// This is the unit the engine clusters: all the replicates of one sample,
/// or all the replicate-consensus rows of every sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    schema: TableSchema,
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Builds a table, checking every row matches the schema widths.
    pub fn try_from_rows(schema: TableSchema, rows: Vec<FeatureRow>) -> Result<Self, TableError> {
        let mut out = Self::new(schema);
        out.rows.reserve(rows.len());
        for row in rows {
            out.push(row)?;
        }
        Ok(out)
    }

    pub fn push(&mut self, row: FeatureRow) -> Result<(), TableError> {
        if row.numeric.len() != self.schema.numeric_columns.len()
            || row.text.len() != self.schema.text_columns.len()
        {
            return Err(TableError::SchemaMismatch {
                left: self.schema.numeric_columns.clone(),
                right: vec![format!(
                    "row with {} numeric and {} text values",
                    row.numeric.len(),
                    row.text.len()
                )],
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keeps only rows whose value in `column` is at least `min`.
    /// Returns how many rows were dropped.
    pub fn retain_min_value(&mut self, column: &str, min: f64) -> Result<usize, ConfigError> {
        let idx = self.schema.numeric_index(column)?;
        let before = self.rows.len();
        self.rows.retain(|r| r.numeric[idx] >= min);
        Ok(before - self.rows.len())
    }

    /// Rearranges the text columns to match `schema`.
    ///
    /// Numeric columns must be the same. Text columns missing here are left
    /// empty, text columns `schema` does not have are dropped. Payloads are
    /// kept only if `schema` has a payload column.
    pub fn align_to(self, schema: &TableSchema) -> Result<FeatureTable, TableError> {
        if self.schema.numeric_columns != schema.numeric_columns {
            return Err(TableError::SchemaMismatch {
                left: schema.numeric_columns.clone(),
                right: self.schema.numeric_columns,
            });
        }
        if &self.schema == schema {
            return Ok(self);
        }

        let mapping: Vec<Option<usize>> = schema
            .text_columns
            .iter()
            .map(|c| self.schema.text_columns.iter().position(|x| x == c))
            .collect();
        let keep_payload = schema.payload_column.is_some();
        let rows = self
            .rows
            .into_iter()
            .map(|row| FeatureRow {
                text: mapping
                    .iter()
                    .map(|m| m.map(|i| row.text[i].clone()).unwrap_or_default())
                    .collect(),
                numeric: row.numeric,
                payload: if keep_payload { row.payload } else { None },
            })
            .collect();

        Ok(FeatureTable {
            schema: schema.clone(),
            rows,
        })
    }

    /// Concatenates tables that share their numeric columns.
    ///
    /// Text columns are unioned (in first-seen order), cells missing from one
    /// of the tables are left empty. Row order is preserved: all rows of the
    /// first table, then all rows of the second, and so on.
    pub fn concat(tables: Vec<FeatureTable>) -> Result<Option<FeatureTable>, TableError> {
        let Some(first) = tables.first() else {
            return Ok(None);
        };

        let mut schema = first.schema.clone();
        for t in tables.iter().skip(1) {
            if t.schema.numeric_columns != schema.numeric_columns {
                return Err(TableError::SchemaMismatch {
                    left: schema.numeric_columns.clone(),
                    right: t.schema.numeric_columns.clone(),
                });
            }
            for col in t.schema.text_columns.iter() {
                if !schema.text_columns.contains(col) {
                    schema.text_columns.push(col.clone());
                }
            }
            if schema.payload_column.is_none() {
                schema.payload_column = t.schema.payload_column.clone();
            }
        }

        let total = tables.iter().map(|t| t.len()).sum::<usize>();
        let mut rows = Vec::with_capacity(total);
        for t in tables {
            rows.extend(t.align_to(&schema)?.rows);
        }

        Ok(Some(FeatureTable { schema, rows }))
    }
}
