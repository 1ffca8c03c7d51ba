pub mod consensus_csv;
pub mod feature_csv;

pub use consensus_csv::{
    write_consensus_csv,
    BASKET_INFO_COLUMN,
    OCCURRENCES_COLUMN,
};
pub use feature_csv::{
    read_feature_csv,
    ColumnsConfig,
};
