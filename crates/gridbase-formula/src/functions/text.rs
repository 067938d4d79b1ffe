//! Text functions

use gridbase_core::FormulaType;

use super::{cast_to_text, ArgCount, ArgType, FunctionDef, FunctionRegistry};
use crate::engine::{CastType, EngineExpr, EngineOp};
use crate::typed::{TypedExpr, TypedExprKind};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(FunctionDef {
        name: "concat",
        arg_count: ArgCount::AtLeast(2),
        arg_types: &[ArgType::Any],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: |_| FormulaType::Text,
        compile_rule: cr_concat,
    });

    registry.register(FunctionDef {
        name: "upper",
        arg_count: ArgCount::Exactly(1),
        arg_types: &[ArgType::Text],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: |_| FormulaType::Text,
        compile_rule: |_, args| EngineExpr::Op {
            op: EngineOp::Upper,
            args,
        },
    });

    registry.register(FunctionDef {
        name: "lower",
        arg_count: ArgCount::Exactly(1),
        arg_types: &[ArgType::Text],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: |_| FormulaType::Text,
        compile_rule: |_, args| EngineExpr::Op {
            op: EngineOp::Lower,
            args,
        },
    });

    registry.register(FunctionDef {
        name: "totext",
        arg_count: ArgCount::Exactly(1),
        arg_types: &[ArgType::Any],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: |_| FormulaType::Text,
        compile_rule: |_, mut args| EngineExpr::Cast {
            expr: Box::new(args.remove(0)),
            to: CastType::Text,
        },
    });

    registry.register(FunctionDef {
        name: "length",
        arg_count: ArgCount::Exactly(1),
        arg_types: &[ArgType::Text],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: |_| FormulaType::Number { decimal_places: 0 },
        compile_rule: |_, args| EngineExpr::Op {
            op: EngineOp::Length,
            args,
        },
    });

    registry.register(FunctionDef {
        name: "replace",
        arg_count: ArgCount::Exactly(3),
        arg_types: &[ArgType::Text, ArgType::Text, ArgType::Text],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: |_| FormulaType::Text,
        compile_rule: |_, args| EngineExpr::Op {
            op: EngineOp::Replace,
            args,
        },
    });
}

/// Mixed-type concat arguments are coerced to text at the engine level.
fn cr_concat(node: &TypedExpr, args: Vec<EngineExpr>) -> EngineExpr {
    let typed_args = match &node.kind {
        TypedExprKind::Call { args, .. } => args,
        _ => unreachable!("compile rule invoked on a non-call node"),
    };
    let args = typed_args
        .iter()
        .zip(args)
        .map(|(typed, compiled)| cast_to_text(&typed.ty, compiled))
        .collect();
    EngineExpr::Op {
        op: EngineOp::Concat,
        args,
    }
}
