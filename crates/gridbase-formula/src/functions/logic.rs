//! Logical functions

use gridbase_core::FormulaType;

use super::{cast_to_text, max_decimal_places, ArgCount, ArgType, FunctionDef, FunctionRegistry};
use crate::engine::{EngineExpr, EngineOp};
use crate::typed::{TypedExpr, TypedExprKind};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(FunctionDef {
        name: "if",
        arg_count: ArgCount::Exactly(3),
        arg_types: &[ArgType::Boolean, ArgType::Any, ArgType::Any],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: tr_if,
        compile_rule: cr_if,
    });

    registry.register(FunctionDef {
        name: "and",
        arg_count: ArgCount::Exactly(2),
        arg_types: &[ArgType::Boolean, ArgType::Boolean],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: |_| FormulaType::Boolean,
        compile_rule: |_, args| EngineExpr::Op {
            op: EngineOp::And,
            args,
        },
    });

    registry.register(FunctionDef {
        name: "or",
        arg_count: ArgCount::Exactly(2),
        arg_types: &[ArgType::Boolean, ArgType::Boolean],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: |_| FormulaType::Boolean,
        compile_rule: |_, args| EngineExpr::Op {
            op: EngineOp::Or,
            args,
        },
    });

    registry.register(FunctionDef {
        name: "not",
        arg_count: ArgCount::Exactly(1),
        arg_types: &[ArgType::Boolean],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: |_| FormulaType::Boolean,
        compile_rule: |_, args| EngineExpr::Op {
            op: EngineOp::Not,
            args,
        },
    });

    registry.register(FunctionDef {
        name: "isblank",
        arg_count: ArgCount::Exactly(1),
        arg_types: &[ArgType::Any],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: |_| FormulaType::Boolean,
        compile_rule: |_, args| EngineExpr::Op {
            op: EngineOp::IsNull,
            args,
        },
    });
}

/// The two branches must agree: same-kind branches unify (numbers widen to
/// the widest scale, dates keep time if either side has it), anything else
/// coerces both branches to text.
fn tr_if(args: &[TypedExpr]) -> FormulaType {
    use FormulaType::*;
    let (a, b) = (args[1].ty.unwrap_array(), args[2].ty.unwrap_array());
    match (a, b) {
        (Number { .. }, Number { .. }) => Number {
            decimal_places: max_decimal_places(&args[1..]),
        },
        (Date { include_time: t1 }, Date { include_time: t2 }) => Date {
            include_time: *t1 || *t2,
        },
        _ if a == b => a.clone(),
        _ => Text,
    }
}

fn cr_if(node: &TypedExpr, mut args: Vec<EngineExpr>) -> EngineExpr {
    let typed_args = match &node.kind {
        TypedExprKind::Call { args, .. } => args,
        _ => unreachable!("compile rule invoked on a non-call node"),
    };
    let otherwise = args.remove(2);
    let then = args.remove(1);
    let when = args.remove(0);
    // When the branches coerced to text, cast each branch on the way out.
    let (then, otherwise) = if node.ty == FormulaType::Text {
        (
            cast_to_text(&typed_args[1].ty, then),
            cast_to_text(&typed_args[2].ty, otherwise),
        )
    } else {
        (then, otherwise)
    };
    EngineExpr::Case {
        when: Box::new(when),
        then: Box::new(then),
        otherwise: Box::new(otherwise),
    }
}
