//! Aggregate functions
//!
//! Aggregates are the only way to collapse a many-valued (array) expression
//! back to a scalar. Their compile rules emit an [`EngineExpr::AggregateSubquery`]
//! with an empty join chain; the compiler fills in the joins it collected
//! while lowering the array-producing arguments.

use gridbase_core::FormulaType;

use super::{ArgCount, ArgType, FunctionDef, FunctionRegistry, TypeRule};
use crate::engine::{AggOp, EngineExpr};
use crate::typed::TypedExpr;

pub(super) fn register(registry: &mut FunctionRegistry) {
    aggregate(registry, "sum", &[ArgType::Number], tr_same_number, AggOp::Sum);
    aggregate(registry, "avg", &[ArgType::Number], tr_same_number, AggOp::Avg);
    aggregate(registry, "min", &[ArgType::NumberOrDate], tr_element, AggOp::Min);
    aggregate(registry, "max", &[ArgType::NumberOrDate], tr_element, AggOp::Max);
    aggregate(registry, "count", &[ArgType::Any], tr_count, AggOp::Count);
    aggregate(registry, "any", &[ArgType::Boolean], tr_boolean, AggOp::BoolOr);
    aggregate(registry, "every", &[ArgType::Boolean], tr_boolean, AggOp::BoolAnd);

    // join(array, separator)
    registry.register(FunctionDef {
        name: "join",
        arg_count: ArgCount::Exactly(2),
        arg_types: &[ArgType::Text, ArgType::Text],
        aggregate: true,
        requires_refresh_after_insert: false,
        type_rule: |_| FormulaType::Text,
        compile_rule: |_, args| EngineExpr::AggregateSubquery {
            aggregate: AggOp::JoinString,
            args,
            joins: vec![],
        },
    });
}

fn aggregate(
    registry: &mut FunctionRegistry,
    name: &'static str,
    arg_types: &'static [ArgType],
    type_rule: TypeRule,
    op: AggOp,
) {
    let compile_rule: super::CompileRule = match op {
        AggOp::Sum => |_, args| subquery(AggOp::Sum, args),
        AggOp::Avg => |_, args| subquery(AggOp::Avg, args),
        AggOp::Min => |_, args| subquery(AggOp::Min, args),
        AggOp::Max => |_, args| subquery(AggOp::Max, args),
        AggOp::Count => |_, args| subquery(AggOp::Count, args),
        AggOp::BoolOr => |_, args| subquery(AggOp::BoolOr, args),
        _ => |_, args| subquery(AggOp::BoolAnd, args),
    };
    registry.register(FunctionDef {
        name,
        arg_count: ArgCount::Exactly(1),
        arg_types,
        aggregate: true,
        requires_refresh_after_insert: false,
        type_rule,
        compile_rule,
    });
}

fn subquery(aggregate: AggOp, args: Vec<EngineExpr>) -> EngineExpr {
    EngineExpr::AggregateSubquery {
        aggregate,
        args,
        joins: vec![],
    }
}

/// Summing numbers keeps the element scale.
fn tr_same_number(args: &[TypedExpr]) -> FormulaType {
    args[0].ty.unwrap_array().clone()
}

/// min/max return whatever scalar kind the elements are.
fn tr_element(args: &[TypedExpr]) -> FormulaType {
    args[0].ty.unwrap_array().clone()
}

fn tr_count(_: &[TypedExpr]) -> FormulaType {
    FormulaType::Number { decimal_places: 0 }
}

fn tr_boolean(_: &[TypedExpr]) -> FormulaType {
    FormulaType::Boolean
}
