//! Core schema error types

use thiserror::Error;

use crate::id::FieldId;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while mutating a table schema
#[derive(Debug, Error)]
pub enum Error {
    /// No field with the given id exists (or it is trashed)
    #[error("Field {0} does not exist")]
    FieldNotFound(FieldId),

    /// A field with this name already exists in the table
    #[error("A field with the name '{0}' already exists")]
    DuplicateFieldName(String),

    /// The primary field of a table cannot be deleted
    #[error("Field {0} is the primary field and cannot be deleted")]
    PrimaryFieldNotDeletable(FieldId),

    /// Some field types cannot serve as the primary field
    #[error("A {0} field cannot be the primary field")]
    TypeCannotBePrimary(&'static str),

    /// The storage engine rejected the column type migration
    #[error("The column for field {field} could not be changed: {reason}")]
    CannotChangeFieldType { field: FieldId, reason: String },
}
