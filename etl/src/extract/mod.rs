mod builder;
mod row;

pub use builder::{BuildOutput, CacheBuilder, RowRejection};
pub use row::{CacheRow, RowError};
