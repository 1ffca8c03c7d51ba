pub mod running_stats;
pub mod tuple_range;
pub use running_stats::{
    RunningStats,
    StreamingAggregatorError,
};
pub use tuple_range::{
    TupleRange,
    TupleRangeError,
};

/// Separator used when concatenating identifying fields of merged rows.
pub const FIELD_DELIMITER: char = '|';
