use crate::errors::{
    ConfigError,
    DataError,
    ResourceError,
};
use crate::models::{
    FeatureRow,
    FeatureTable,
    TableSchema,
    Tolerance,
    ToleranceMap,
};
use crate::utils::TupleRange;
use serde::Serialize;

/// A matched column, resolved against a table schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchDimension {
    pub column: String,
    pub column_index: usize,
    pub tolerance: Tolerance,
}

/// Ordered list of the dimensions every row is matched on.
///
/// The order is fixed for a whole run, every hyperrectangle lists its
/// intervals in this order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchDimensions {
    dims: Vec<MatchDimension>,
}

impl MatchDimensions {
    /// Resolves column names to numeric column positions and attaches their
    /// tolerance. Fails on unknown columns, duplicated columns, or columns
    /// without a declared tolerance.
    pub fn resolve(
        schema: &TableSchema,
        columns: &[String],
        tolerances: &ToleranceMap,
    ) -> Result<Self, ConfigError> {
        if columns.is_empty() {
            return Err(ConfigError::NoMatchColumns);
        }
        let mut dims: Vec<MatchDimension> = Vec::with_capacity(columns.len());
        for column in columns {
            if dims.iter().any(|d| &d.column == column) {
                return Err(ConfigError::DuplicateMatchColumn(column.clone()));
            }
            let column_index = schema.numeric_index(column)?;
            let tolerance = *tolerances
                .get(column)
                .ok_or_else(|| ConfigError::MissingTolerance(column.clone()))?;
            tolerance.validate()?;
            dims.push(MatchDimension {
                column: column.clone(),
                column_index,
                tolerance,
            });
        }
        Ok(Self { dims })
    }

    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchDimension> {
        self.dims.iter()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.dims.iter().map(|d| d.column.as_str())
    }
}

/// Builds the tolerance box of a single row.
///
/// Rows with a NaN or infinite value in any matched column have no box.
pub fn row_hyperrectangle(
    row: &FeatureRow,
    row_index: usize,
    dims: &MatchDimensions,
) -> Result<Vec<TupleRange<f64>>, DataError> {
    let mut out = Vec::with_capacity(dims.len());
    push_row_hyperrectangle(row, row_index, dims, &mut out)?;
    Ok(out)
}

fn push_row_hyperrectangle(
    row: &FeatureRow,
    row_index: usize,
    dims: &MatchDimensions,
    out: &mut Vec<TupleRange<f64>>,
) -> Result<(), DataError> {
    let start = out.len();
    for dim in dims.iter() {
        let value = row.numeric[dim.column_index];
        match dim.tolerance.range(value) {
            Some(range) => out.push(range),
            None => {
                out.truncate(start);
                return Err(DataError::NonFiniteValue {
                    row: row_index,
                    column: dim.column.clone(),
                    value,
                });
            }
        }
    }
    Ok(())
}

/// Closed-interval overlap on every dimension.
pub fn overlaps(a: &[TupleRange<f64>], b: &[TupleRange<f64>]) -> bool {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).all(|(x, y)| x.intersects(*y))
}

/// All the hyperrectangles of a run, stored contiguously.
///
/// Rectangle `i` occupies `bounds[i * n_dims..(i + 1) * n_dims]` and was built
/// from table row `row_ids[i]`. Rows that could not be boxed are not present,
/// so `i` and `row_ids[i]` only coincide when nothing was rejected.
#[derive(Debug, Clone)]
pub struct HyperrectangleSet {
    n_dims: usize,
    bounds: Vec<TupleRange<f64>>,
    row_ids: Vec<usize>,
}

impl HyperrectangleSet {
    pub fn len(&self) -> usize {
        self.row_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_ids.is_empty()
    }

    pub fn n_dims(&self) -> usize {
        self.n_dims
    }

    pub fn get(&self, i: usize) -> &[TupleRange<f64>] {
        &self.bounds[i * self.n_dims..(i + 1) * self.n_dims]
    }

    pub fn row_id(&self, i: usize) -> usize {
        self.row_ids[i]
    }

    pub fn row_ids(&self) -> &[usize] {
        &self.row_ids
    }

    pub fn overlap(&self, i: usize, j: usize) -> bool {
        overlaps(self.get(i), self.get(j))
    }

    pub fn iter(&self) -> impl Iterator<Item = &[TupleRange<f64>]> {
        self.bounds.chunks_exact(self.n_dims)
    }

    fn aproximate_memory_usage(&self) -> usize {
        self.bounds.capacity() * std::mem::size_of::<TupleRange<f64>>()
            + self.row_ids.capacity() * std::mem::size_of::<usize>()
    }
}

/// Output of [`build_hyperrectangles`].
#[derive(Debug, Clone)]
pub struct BuiltHyperrectangles {
    pub rects: HyperrectangleSet,
    pub rejected: Vec<DataError>,
}

impl BuiltHyperrectangles {
    pub fn memory_usage_bytes(&self) -> usize {
        self.rects.aproximate_memory_usage()
    }
}

/// Builds one box per row of `table`.
///
/// Rows with non-finite matched values are excluded and reported in
/// `rejected`, in row order.
pub fn build_hyperrectangles(
    table: &FeatureTable,
    dims: &MatchDimensions,
) -> Result<BuiltHyperrectangles, ResourceError> {
    let n_dims = dims.len();
    let mut bounds: Vec<TupleRange<f64>> = Vec::new();
    bounds
        .try_reserve_exact(table.len() * n_dims)
        .map_err(|source| ResourceError::Allocation {
            what: "hyperrectangle bounds",
            requested: table.len() * n_dims,
            source,
        })?;
    let mut row_ids = Vec::new();
    row_ids
        .try_reserve_exact(table.len())
        .map_err(|source| ResourceError::Allocation {
            what: "row ids",
            requested: table.len(),
            source,
        })?;

    let mut rejected = Vec::new();
    for (i, row) in table.rows().iter().enumerate() {
        match push_row_hyperrectangle(row, i, dims, &mut bounds) {
            Ok(()) => row_ids.push(i),
            Err(e) => rejected.push(e),
        }
    }

    Ok(BuiltHyperrectangles {
        rects: HyperrectangleSet {
            n_dims,
            bounds,
            row_ids,
        },
        rejected,
    })
}
