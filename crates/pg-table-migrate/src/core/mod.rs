//! Core data model and pipeline seams.

pub mod traits;
pub mod value;

pub use traits::{ColumnInfo, Cursor, Extract, Load, TableProfile};
pub use value::{Chunk, Record, Value, ValueKind};
