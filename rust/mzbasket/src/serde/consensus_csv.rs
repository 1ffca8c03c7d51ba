use crate::engine::{
    ConsensusRow,
    ConsensusTable,
};
use crate::errors::TableError;
use std::path::Path;
use tracing::debug;

pub const OCCURRENCES_COLUMN: &str = "Occurrences";
pub const BASKET_INFO_COLUMN: &str = "BasketInfo";

fn min_column(column: &str) -> String {
    format!("Min{}", column)
}

fn max_column(column: &str) -> String {
    format!("Max{}", column)
}

/// True for columns that [`write_consensus_csv`] adds on top of the
/// feature columns.
pub(crate) fn is_generated_column(header: &str, numeric_columns: &[String]) -> bool {
    if header == OCCURRENCES_COLUMN || header == BASKET_INFO_COLUMN {
        return true;
    }
    numeric_columns.iter().any(|c| {
        header
            .strip_prefix("Min")
            .or_else(|| header.strip_prefix("Max"))
            .is_some_and(|rest| rest == c)
    })
}

fn format_number(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

fn header(table: &ConsensusTable) -> Vec<String> {
    let schema = &table.schema;
    let mut out: Vec<String> = schema.numeric_columns.clone();
    for col in schema.range_columns.iter() {
        out.push(min_column(col));
        out.push(max_column(col));
    }
    out.extend(schema.text_columns.iter().cloned());
    out.push(OCCURRENCES_COLUMN.to_string());
    if schema.basket_info {
        out.push(BASKET_INFO_COLUMN.to_string());
    }
    if let Some(payload) = &schema.payload_column {
        out.push(payload.clone());
    }
    out
}

fn record(table: &ConsensusTable, row: &ConsensusRow) -> Vec<String> {
    let mut out: Vec<String> = row.numeric.iter().map(|x| format_number(*x)).collect();
    for extent in row.extents.iter() {
        match extent {
            Some(range) => {
                out.push(format_number(range.start()));
                out.push(format_number(range.end()));
            }
            None => {
                out.push(String::new());
                out.push(String::new());
            }
        }
    }
    out.extend(row.text.iter().cloned());
    out.push(row.occurrences.to_string());
    if table.schema.basket_info {
        out.push(row.basket_info.clone().unwrap_or_default());
    }
    if table.schema.payload_column.is_some() {
        out.push(row.payload.clone().unwrap_or_default());
    }
    out
}

/// Writes a consensus table as CSV.
///
/// Columns are, in order: the numeric means, a `Min<col>`/`Max<col>` pair per
/// range column, the text columns, `Occurrences`, then `BasketInfo` and the
/// payload column when the table has them. Missing values are left empty.
pub fn write_consensus_csv<T: AsRef<Path>>(
    path: T,
    table: &ConsensusTable,
) -> Result<(), TableError> {
    let path = path.as_ref();
    let csv_err = |source: csv::Error| TableError::Csv {
        source,
        path: path.to_path_buf(),
    };
    let mut wtr = csv::WriterBuilder::default()
        .has_headers(true)
        .from_path(path)
        .map_err(csv_err)?;
    wtr.write_record(header(table)).map_err(csv_err)?;
    for row in table.rows.iter() {
        wtr.write_record(record(table, row)).map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| TableError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    debug!("Wrote {} consensus rows to {}", table.len(), path.display());
    Ok(())
}
