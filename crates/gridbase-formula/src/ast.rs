//! Untyped formula AST
//!
//! The intermediate representation between the raw source string and the
//! typed expression tree. Operators are already desugared to function calls
//! by the parser, so the node set stays small: literals, field references
//! and calls.
//!
//! `Display` emits canonical formula text; parsing that text again yields an
//! equal tree (the round-trip property the rename tooling and the internal
//! formula persistence both rely on).

use std::fmt;

use bigdecimal::BigDecimal;
use gridbase_core::FieldId;

/// Untyped formula expression
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaExpr {
    /// String literal
    StringLiteral(String),
    /// Integer literal, carried at full 50-digit precision
    IntLiteral(BigDecimal),
    /// Decimal literal with its exact written scale
    DecimalLiteral(BigDecimal),
    /// Boolean literal
    BooleanLiteral(bool),
    /// `field('name')`, or a lookup traversal `lookup('link', 'target')`
    /// when `target` is set
    FieldReference {
        name: String,
        target: Option<String>,
    },
    /// Legacy `field_by_id(N)` reference kept as its own node so rename
    /// tooling can rewrite between the two forms
    FieldByIdReference(FieldId),
    /// Function call; arithmetic and comparison operators desugar to these
    FunctionCall {
        name: String,
        args: Vec<FormulaExpr>,
    },
}

impl FormulaExpr {
    /// Convenience constructor for a call node.
    pub fn call(name: impl Into<String>, args: Vec<FormulaExpr>) -> Self {
        FormulaExpr::FunctionCall {
            name: name.into(),
            args,
        }
    }

    /// Convenience constructor for a plain field reference.
    pub fn field(name: impl Into<String>) -> Self {
        FormulaExpr::FieldReference {
            name: name.into(),
            target: None,
        }
    }

    /// Convenience constructor for a lookup traversal reference.
    pub fn lookup(link: impl Into<String>, target: impl Into<String>) -> Self {
        FormulaExpr::FieldReference {
            name: link.into(),
            target: Some(target.into()),
        }
    }
}

/// Escape a string for embedding in a single-quoted formula literal.
pub(crate) fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out
}

impl fmt::Display for FormulaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaExpr::StringLiteral(s) => write!(f, "'{}'", escape(s)),
            FormulaExpr::IntLiteral(n) => write!(f, "{}", n),
            FormulaExpr::DecimalLiteral(n) => write!(f, "{}", n),
            FormulaExpr::BooleanLiteral(b) => write!(f, "{}", b),
            FormulaExpr::FieldReference { name, target: None } => {
                write!(f, "field('{}')", escape(name))
            }
            FormulaExpr::FieldReference {
                name,
                target: Some(target),
            } => write!(f, "lookup('{}','{}')", escape(name), escape(target)),
            FormulaExpr::FieldByIdReference(id) => write!(f, "field_by_id({})", id.0),
            FormulaExpr::FunctionCall { name, args } => {
                write!(f, "{}(", name)?;
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
