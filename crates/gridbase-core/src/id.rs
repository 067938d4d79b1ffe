//! Stable identifiers for schema objects
//!
//! Fields and tables are always addressed by id in caches, dependency graphs
//! and compiled expressions. Display names are resolved to ids exactly once,
//! at dependency-extraction time.

use std::fmt;

/// Unique identifier of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u64);

/// Unique identifier of a field (a user-visible column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u64);

impl FieldId {
    /// The name of the database column backing this field.
    pub fn db_column(&self) -> String {
        format!("field_{}", self.0)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table_{}", self.0)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field_{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_column_name() {
        assert_eq!(FieldId(42).db_column(), "field_42");
        assert_eq!(FieldId(42).to_string(), "field_42");
    }
}
