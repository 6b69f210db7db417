//! Core abstractions shared by the drivers and the migration engine.
//!
//! - [`identifier`]: Identifier validation and per-dialect quoting
//! - [`value`]: Owned row values and batches
//! - [`traits`]: Source reader, destination writer and dialect traits

pub mod identifier;
pub mod traits;
pub mod value;

pub use traits::{strip_terminator, Dialect, SourceReader, TargetWriter};
pub use value::{Batch, Row, SqlValue};
