use super::consensus_csv::is_generated_column;
use crate::errors::TableError;
use crate::models::{
    FeatureRow,
    FeatureTable,
    TableSchema,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::path::Path;
use tracing::debug;

/// Which columns of an input table mean what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnsConfig {
    /// Text column naming the source file of each row. Filled with the
    /// file name when a table does not have it.
    pub filename_column: String,
    /// Columns parsed as numbers. Every other column is kept as text.
    pub numeric_columns: Vec<String>,
    /// Numeric columns rows are matched on.
    pub match_columns: Vec<String>,
    /// Column used for the minimum intensity filter.
    pub intensity_column: String,
    /// Opaque per-row blob carried through clustering (eg. an MS2 spectrum).
    pub payload_column: Option<String>,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            filename_column: "UniqueFiles".to_string(),
            numeric_columns: vec![
                "PrecMz".to_string(),
                "RetTime".to_string(),
                "PrecIntensity".to_string(),
            ],
            match_columns: vec!["PrecMz".to_string(), "RetTime".to_string()],
            intensity_column: "PrecIntensity".to_string(),
            payload_column: None,
        }
    }
}

fn parse_number(value: &str, column: &str, line: u64, path: &Path) -> Result<f64, TableError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(f64::NAN);
    }
    value.parse::<f64>().map_err(|_| TableError::ParseNumber {
        value: value.to_string(),
        column: column.to_string(),
        line,
        path: path.to_path_buf(),
    })
}

/// Reads a comma separated feature table.
///
/// All `numeric_columns` must be present. Empty numeric cells become NaN (and
/// are later rejected if they are in a matched column). Columns written by
/// [`write_consensus_csv`](super::write_consensus_csv) that do not describe
/// a feature (occurrence counts, extents, basket info) are skipped, so
/// consensus tables can be read back for another pass.
pub fn read_feature_csv<T: AsRef<Path>>(
    path: T,
    columns: &ColumnsConfig,
) -> Result<FeatureTable, TableError> {
    let path = path.as_ref();
    let csv_err = |source: csv::Error| TableError::Csv {
        source,
        path: path.to_path_buf(),
    };
    let file = std::fs::File::open(path).map_err(|source| TableError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    let mut rdr = csv::ReaderBuilder::new().from_reader(file);
    let headers = rdr.headers().map_err(csv_err)?.clone();

    let numeric_idx = columns
        .numeric_columns
        .iter()
        .map(|c| {
            headers
                .iter()
                .position(|h| h == c.as_str())
                .ok_or_else(|| TableError::MissingColumn {
                    column: c.clone(),
                    path: path.to_path_buf(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let payload_idx = columns
        .payload_column
        .as_ref()
        .and_then(|c| headers.iter().position(|h| h == c.as_str()));

    let text_idx: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(i, h)| {
            !numeric_idx.contains(i)
                && Some(*i) != payload_idx
                && !is_generated_column(h, &columns.numeric_columns)
        })
        .map(|(i, _)| i)
        .collect();
    let mut text_columns: Vec<String> = text_idx.iter().map(|&i| headers[i].to_string()).collect();
    let fill_filename = !headers.iter().any(|h| h == columns.filename_column);
    if fill_filename {
        text_columns.push(columns.filename_column.clone());
    }
    let file_name = path
        .file_name()
        .map(|x| x.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut schema = TableSchema::new(columns.numeric_columns.clone(), text_columns);
    if payload_idx.is_some() {
        schema.payload_column = columns.payload_column.clone();
    }
    let mut table = FeatureTable::new(schema);

    let mut record = csv::StringRecord::new();
    while rdr.read_record(&mut record).map_err(csv_err)? {
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let numeric = numeric_idx
            .iter()
            .zip(columns.numeric_columns.iter())
            .map(|(&i, name)| parse_number(record.get(i).unwrap_or(""), name, line, path))
            .collect::<Result<Vec<_>, _>>()?;
        let mut text: Vec<String> = text_idx
            .iter()
            .map(|&i| record.get(i).unwrap_or("").to_string())
            .collect();
        if fill_filename {
            text.push(file_name.clone());
        }
        let payload = payload_idx.and_then(|i| record.get(i)).map(|x| x.to_string());
        table.push(FeatureRow {
            numeric,
            text,
            payload,
        })?;
    }

    debug!("Read {} rows from {}", table.len(), path.display());
    Ok(table)
}
