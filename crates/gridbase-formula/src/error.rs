//! Formula error types
//!
//! Only schema DDL failures (`Schema`) are fatal to an enclosing
//! transaction. Every other error raised while typing a single field is
//! caught by the recalculation engine and converted into that field's
//! invalid-type state plus a stored diagnostic, so one broken formula never
//! aborts a whole pass.

use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// A syntax error with the byte position it was detected at
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parse error at position {position}: {message}")]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

/// Errors that can occur while parsing, typing or compiling a formula
#[derive(Debug, Error)]
pub enum FormulaError {
    /// Malformed formula source; blocks saving the field
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A field reference could not be resolved against the current schema
    #[error("references the deleted or unknown field '{name}'")]
    UnknownFieldReference { name: String },

    /// Parse or type recursion exceeded the nesting limit
    #[error("the formula is too large to process")]
    MaximumFormulaSize,

    /// A formula referencing the field it defines
    #[error("a formula field cannot reference itself")]
    SelfReference,

    /// Adding this formula would make the dependency graph cyclic
    #[error("circular reference detected between formula fields")]
    CircularReference,

    /// Call to a function that does not exist in the registry
    #[error("unknown function '{0}'")]
    InvalidFunction(String),

    /// Schema DDL failure; fatal to the enclosing transaction
    #[error(transparent)]
    Schema(#[from] gridbase_core::Error),
}
