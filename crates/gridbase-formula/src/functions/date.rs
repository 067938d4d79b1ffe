//! Date functions

use gridbase_core::FormulaType;

use super::{ArgCount, ArgType, FunctionDef, FunctionRegistry};
use crate::engine::{EngineExpr, EngineOp};

pub(super) fn register(registry: &mut FunctionRegistry) {
    // todate('2024-01-31', 'YYYY-MM-DD')
    registry.register(FunctionDef {
        name: "todate",
        arg_count: ArgCount::Exactly(2),
        arg_types: &[ArgType::Text, ArgType::Text],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: |_| FormulaType::Date {
            include_time: false,
        },
        compile_rule: |_, args| EngineExpr::Op {
            op: EngineOp::ToDate,
            args,
        },
    });

    registry.register(FunctionDef {
        name: "day",
        arg_count: ArgCount::Exactly(1),
        arg_types: &[ArgType::Date],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: |_| FormulaType::Number { decimal_places: 0 },
        compile_rule: |_, args| EngineExpr::Op {
            op: EngineOp::Day,
            args,
        },
    });

    // date_diff('day', start, end)
    registry.register(FunctionDef {
        name: "date_diff",
        arg_count: ArgCount::Exactly(3),
        arg_types: &[ArgType::Text, ArgType::Date, ArgType::Date],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: |_| FormulaType::Number { decimal_places: 0 },
        compile_rule: |_, args| EngineExpr::Op {
            op: EngineOp::DateDiff,
            args,
        },
    });

    // date_interval('1 day')
    registry.register(FunctionDef {
        name: "date_interval",
        arg_count: ArgCount::Exactly(1),
        arg_types: &[ArgType::Text],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: |_| FormulaType::DateInterval,
        compile_rule: |_, args| EngineExpr::Op {
            op: EngineOp::ToInterval,
            args,
        },
    });

    registry.register(FunctionDef {
        name: "datetime_format",
        arg_count: ArgCount::Exactly(2),
        arg_types: &[ArgType::Date, ArgType::Text],
        aggregate: false,
        requires_refresh_after_insert: false,
        type_rule: |_| FormulaType::Text,
        compile_rule: |_, args| EngineExpr::Op {
            op: EngineOp::DateTimeFormat,
            args,
        },
    });
}
