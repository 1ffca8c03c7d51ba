pub mod feature;
pub mod tolerance;

pub use feature::{
    FeatureRow,
    FeatureTable,
    TableSchema,
};
pub use tolerance::{
    Tolerance,
    ToleranceKind,
    ToleranceMap,
};
