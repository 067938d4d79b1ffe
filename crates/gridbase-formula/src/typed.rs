//! Typed formula expressions
//!
//! The output of the typer: an immutable tree where every node knows its
//! resolved [`FormulaType`], field references are addressed by database
//! column instead of display name, and same-table formula references have
//! been inlined. Trees are rebuilt wholesale on every re-type, never
//! mutated in place.

use std::fmt;

use bigdecimal::BigDecimal;
use gridbase_core::FormulaType;

use crate::functions::FunctionDef;

/// A typed formula expression node
#[derive(Debug, Clone)]
pub struct TypedExpr {
    pub kind: TypedExprKind,
    /// The resolved type of this subexpression.
    pub ty: FormulaType,
    /// True if this subtree contains an aggregate function call.
    pub aggregate: bool,
    /// True if this node produces many values (an array) that still need to
    /// be collapsed by an aggregate function before a scalar consumer can
    /// use them.
    pub requires_aggregate_wrapper: bool,
}

#[derive(Debug, Clone)]
pub enum TypedExprKind {
    StringLiteral(String),
    NumberLiteral(BigDecimal),
    BooleanLiteral(bool),
    /// A reference to a database column. `target_column` is set for lookup
    /// traversals: the value lives in the related table, reached through the
    /// link column named by `column`.
    FieldRef {
        column: String,
        target_column: Option<String>,
    },
    Call {
        function: &'static FunctionDef,
        args: Vec<TypedExpr>,
    },
}

impl TypedExpr {
    pub fn string(s: impl Into<String>) -> Self {
        Self {
            kind: TypedExprKind::StringLiteral(s.into()),
            ty: FormulaType::Text,
            aggregate: false,
            requires_aggregate_wrapper: false,
        }
    }

    pub fn number(value: BigDecimal, decimal_places: u32) -> Self {
        Self {
            kind: TypedExprKind::NumberLiteral(value),
            ty: FormulaType::Number { decimal_places },
            aggregate: false,
            requires_aggregate_wrapper: false,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            kind: TypedExprKind::BooleanLiteral(value),
            ty: FormulaType::Boolean,
            aggregate: false,
            requires_aggregate_wrapper: false,
        }
    }

    pub fn field_ref(column: impl Into<String>, ty: FormulaType) -> Self {
        let requires_aggregate_wrapper = ty.is_array();
        Self {
            kind: TypedExprKind::FieldRef {
                column: column.into(),
                target_column: None,
            },
            ty,
            aggregate: false,
            requires_aggregate_wrapper,
        }
    }

    pub fn lookup_ref(
        column: impl Into<String>,
        target_column: impl Into<String>,
        ty: FormulaType,
    ) -> Self {
        let requires_aggregate_wrapper = ty.is_array();
        Self {
            kind: TypedExprKind::FieldRef {
                column: column.into(),
                target_column: Some(target_column.into()),
            },
            ty,
            aggregate: false,
            requires_aggregate_wrapper,
        }
    }

    /// Build a validated call node. The aggregate flag propagates up from
    /// the arguments; aggregate functions collapse the pending-array state.
    pub fn call(function: &'static FunctionDef, args: Vec<TypedExpr>, ty: FormulaType) -> Self {
        let aggregate = function.aggregate || args.iter().any(|a| a.aggregate);
        let requires_aggregate_wrapper = ty.is_array();
        Self {
            kind: TypedExprKind::Call { function, args },
            ty,
            aggregate,
            requires_aggregate_wrapper,
        }
    }

    /// Serialize this tree as internal formula text: the canonical,
    /// db-column addressed form persisted on the field and re-typed on load.
    pub fn internal_formula(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypedExprKind::StringLiteral(s) => {
                write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
            }
            TypedExprKind::NumberLiteral(n) => write!(f, "{}", n),
            TypedExprKind::BooleanLiteral(b) => write!(f, "{}", b),
            TypedExprKind::FieldRef {
                column,
                target_column: None,
            } => write!(f, "field('{}')", column),
            TypedExprKind::FieldRef {
                column,
                target_column: Some(target),
            } => write!(f, "lookup('{}','{}')", column, target),
            TypedExprKind::Call { function, args } => {
                write!(f, "{}(", function.name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}
