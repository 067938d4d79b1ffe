//! Arithmetic and comparison operators
//!
//! The parser desugars `+ - * / = != > >= < <=` into calls to these
//! functions, so their typing rules are the operator typing rules.

use gridbase_core::FormulaType;

use super::{max_decimal_places, ArgCount, ArgType, FunctionDef, FunctionRegistry};
use crate::engine::{CastType, EngineExpr, EngineOp};
use crate::typed::TypedExpr;

pub(super) fn register(registry: &mut FunctionRegistry) {
    arithmetic(registry, "add", EngineOp::Add);
    arithmetic(registry, "minus", EngineOp::Sub);
    arithmetic(registry, "multiply", EngineOp::Mul);

    // Division carries an explicit cast so the engine truncates the result
    // to the resolved scale instead of its own default.
    registry.register(FunctionDef {
        name: "divide",
        arg_count: ArgCount::Exactly(2),
        arg_types: &[ArgType::Number, ArgType::Number],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: tr_number,
        compile_rule: |node, args| {
            let decimal_places = match node.ty {
                FormulaType::Number { decimal_places } => decimal_places,
                _ => 0,
            };
            EngineExpr::Cast {
                expr: Box::new(EngineExpr::Op {
                    op: EngineOp::Div,
                    args,
                }),
                to: CastType::Numeric { decimal_places },
            }
        },
    });

    comparison(registry, "equal", EngineOp::Equal);
    comparison(registry, "not_equal", EngineOp::NotEqual);
    comparison(registry, "greater_than", EngineOp::GreaterThan);
    comparison(registry, "greater_than_or_equal", EngineOp::GreaterEqual);
    comparison(registry, "less_than", EngineOp::LessThan);
    comparison(registry, "less_than_or_equal", EngineOp::LessEqual);
}

fn arithmetic(registry: &mut FunctionRegistry, name: &'static str, op: EngineOp) {
    let compile_rule: super::CompileRule = match op {
        EngineOp::Add => |_, args| EngineExpr::Op {
            op: EngineOp::Add,
            args,
        },
        EngineOp::Sub => |_, args| EngineExpr::Op {
            op: EngineOp::Sub,
            args,
        },
        _ => |_, args| EngineExpr::Op {
            op: EngineOp::Mul,
            args,
        },
    };
    registry.register(FunctionDef {
        name,
        arg_count: ArgCount::Exactly(2),
        arg_types: &[ArgType::Number, ArgType::Number],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: tr_number,
        compile_rule,
    });
}

fn comparison(registry: &mut FunctionRegistry, name: &'static str, op: EngineOp) {
    let compile_rule: super::CompileRule = match op {
        EngineOp::Equal => |_, args| EngineExpr::Op {
            op: EngineOp::Equal,
            args,
        },
        EngineOp::NotEqual => |_, args| EngineExpr::Op {
            op: EngineOp::NotEqual,
            args,
        },
        EngineOp::GreaterThan => |_, args| EngineExpr::Op {
            op: EngineOp::GreaterThan,
            args,
        },
        EngineOp::GreaterEqual => |_, args| EngineExpr::Op {
            op: EngineOp::GreaterEqual,
            args,
        },
        EngineOp::LessThan => |_, args| EngineExpr::Op {
            op: EngineOp::LessThan,
            args,
        },
        _ => |_, args| EngineExpr::Op {
            op: EngineOp::LessEqual,
            args,
        },
    };
    registry.register(FunctionDef {
        name,
        arg_count: ArgCount::Exactly(2),
        arg_types: &[ArgType::Comparable, ArgType::Comparable],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: tr_comparison,
        compile_rule,
    });
}

/// Binary arithmetic keeps the widest operand scale.
fn tr_number(args: &[TypedExpr]) -> FormulaType {
    FormulaType::Number {
        decimal_places: max_decimal_places(args),
    }
}

/// Both sides must be of the same comparable kind.
fn tr_comparison(args: &[TypedExpr]) -> FormulaType {
    let (a, b) = (args[0].ty.unwrap_array(), args[1].ty.unwrap_array());
    if a.comparable_with(b) {
        FormulaType::Boolean
    } else {
        FormulaType::Invalid {
            error: format!("cannot compare {} with {}", a.name(), b.name()),
        }
    }
}
