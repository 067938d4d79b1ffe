//! # gridbase-core
//!
//! Core schema data structures for the gridbase table backend.
//!
//! This crate provides the fundamental types used throughout gridbase:
//! - [`TableId`] and [`FieldId`] - Stable identifiers for schema objects
//! - [`FieldSchema`] and [`FieldKind`] - User-visible columns and their types
//! - [`TableSchema`] - An ordered collection of fields with primary/trash rules
//! - [`RowValue`] - Literal row values substituted during expression compilation
//!
//! Formula-specific logic (parsing, typing, compilation) lives in the
//! `gridbase-formula` crate; this crate only carries the schema attributes a
//! formula field persists between recalculations.

pub mod error;
pub mod field;
pub mod formula_type;
pub mod id;
pub mod table;
pub mod value;

// Re-exports for convenience
pub use error::{Error, Result};
pub use field::{FieldKind, FieldSchema, FormulaMeta, SelectOption};
pub use formula_type::FormulaType;
pub use id::{FieldId, TableId};
pub use table::{DatabaseSchema, TableSchema};
pub use value::{Row, RowValue};

/// Maximum number of significant digits a formula number may carry.
///
/// Matches the precision of the backing database's widest numeric column, so
/// chained integer arithmetic never silently truncates.
pub const NUMBER_MAX_DIGITS: u32 = 50;
