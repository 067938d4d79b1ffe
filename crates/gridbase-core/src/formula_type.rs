//! The formula value type system
//!
//! Every formula expression resolves to one of these types. `Invalid` is a
//! terminal state carrying a diagnostic, not an error: one broken formula
//! must never abort a whole recalculation pass.
//!
//! Multi-valued results (lookups through link fields, multiple select) are
//! wrapped in `Array`; aggregate functions collapse the wrapper back to the
//! inner scalar type.

use std::fmt;

use bigdecimal::BigDecimal;

use crate::value::RowValue;

/// The resolved type of a (sub)expression of a formula
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaType {
    /// Typing failed; the message is surfaced to the user and the compiled
    /// value of the field is null.
    Invalid { error: String },
    Text,
    /// Fixed-point number with up to 50 significant digits.
    Number { decimal_places: u32 },
    Boolean,
    Date { include_time: bool },
    /// A duration between two dates.
    DateInterval,
    /// A single select option, serialized as `{id, value, color}`.
    SingleSelect,
    /// A link row relation; only meaningful as the start of a lookup.
    Link,
    /// Many values of the inner type, produced by lookups and multiple
    /// selects. Must be collapsed by an aggregate function before most other
    /// functions accept it.
    Array(Box<FormulaType>),
}

impl FormulaType {
    pub fn is_valid(&self) -> bool {
        !matches!(self, FormulaType::Invalid { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, FormulaType::Array(_))
    }

    /// Wrap this type as "many of".
    pub fn array_of(self) -> FormulaType {
        FormulaType::Array(Box::new(self))
    }

    /// The inner type if this is an array, otherwise the type itself.
    pub fn unwrap_array(&self) -> &FormulaType {
        match self {
            FormulaType::Array(inner) => inner,
            other => other,
        }
    }

    /// The stored diagnostic if this type is invalid.
    pub fn error(&self) -> Option<&str> {
        match self {
            FormulaType::Invalid { error } => Some(error),
            _ => None,
        }
    }

    /// Whether rows can be ordered by a value of this type.
    pub fn can_order_by(&self) -> bool {
        match self {
            FormulaType::Invalid { .. } | FormulaType::Link | FormulaType::Array(_) => false,
            _ => true,
        }
    }

    /// Whether a formula field of this result type may be the table's
    /// primary field.
    pub fn can_be_primary(&self) -> bool {
        match self {
            FormulaType::Invalid { .. }
            | FormulaType::Link
            | FormulaType::Array(_)
            | FormulaType::Boolean => false,
            _ => true,
        }
    }

    /// Whether values of this type can be compared against `other` with the
    /// ordering operators.
    pub fn comparable_with(&self, other: &FormulaType) -> bool {
        use FormulaType::*;
        match (self, other) {
            (Number { .. }, Number { .. }) => true,
            (Text, Text) => true,
            (Boolean, Boolean) => true,
            (Date { .. }, Date { .. }) => true,
            (DateInterval, DateInterval) => true,
            _ => false,
        }
    }

    /// The placeholder value used when a real aggregate cannot be computed,
    /// e.g. when compiling for an INSERT where the row has no identity yet
    /// to join on. Types with no natural empty value fall back to null.
    pub fn placeholder_empty_value(&self) -> RowValue {
        match self {
            FormulaType::Text => RowValue::Text(String::new()),
            FormulaType::Number { .. } => RowValue::Number(BigDecimal::from(0)),
            FormulaType::Boolean => RowValue::Boolean(false),
            FormulaType::Invalid { .. }
            | FormulaType::Date { .. }
            | FormulaType::DateInterval
            | FormulaType::SingleSelect
            | FormulaType::Link
            | FormulaType::Array(_) => RowValue::Null,
        }
    }

    /// Short type tag used in diagnostics.
    pub fn name(&self) -> String {
        match self {
            FormulaType::Invalid { .. } => "invalid".to_string(),
            FormulaType::Text => "text".to_string(),
            FormulaType::Number { .. } => "number".to_string(),
            FormulaType::Boolean => "boolean".to_string(),
            FormulaType::Date { .. } => "date".to_string(),
            FormulaType::DateInterval => "date_interval".to_string(),
            FormulaType::SingleSelect => "single_select".to_string(),
            FormulaType::Link => "link".to_string(),
            FormulaType::Array(inner) => format!("array({})", inner.name()),
        }
    }
}

impl fmt::Display for FormulaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_wrapping() {
        let t = FormulaType::Number { decimal_places: 2 }.array_of();
        assert!(t.is_array());
        assert_eq!(t.unwrap_array(), &FormulaType::Number { decimal_places: 2 });
        assert!(!t.can_order_by());
    }

    #[test]
    fn test_comparability() {
        let n0 = FormulaType::Number { decimal_places: 0 };
        let n2 = FormulaType::Number { decimal_places: 2 };
        assert!(n0.comparable_with(&n2));
        assert!(!n0.comparable_with(&FormulaType::Text));
    }

    #[test]
    fn test_placeholder_values() {
        assert_eq!(
            FormulaType::Text.placeholder_empty_value(),
            RowValue::Text(String::new())
        );
        assert_eq!(
            FormulaType::Number { decimal_places: 1 }.placeholder_empty_value(),
            RowValue::Number(BigDecimal::from(0))
        );
        assert_eq!(
            FormulaType::Date { include_time: false }.placeholder_empty_value(),
            RowValue::Null
        );
    }
}
