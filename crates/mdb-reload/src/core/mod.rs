//! Core abstractions shared by every destination engine.
//!
//! - [`schema`]: table, index and column metadata, table snapshots
//! - [`value`]: SQL values held in snapshots
//! - [`mapping`]: alignment of snapshot columns onto destination columns
//! - [`traits`]: [`Dialect`] and [`Destination`], implemented per engine in
//!   the `drivers` module

pub mod mapping;
pub mod schema;
pub mod traits;
pub mod value;

pub use mapping::{Alignment, ColumnMapping};
pub use schema::{
    is_internal_table, ColumnDescriptor, IndexRecord, PrimitiveType, SourceCatalog, TableRecord,
    TableSnapshot, SQLITE_INTERNAL_PREFIX,
};
pub use traits::{Destination, Dialect};
pub use value::{Row, SqlValue};
