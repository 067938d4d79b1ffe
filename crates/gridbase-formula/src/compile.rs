//! Lowering typed expressions to engine expressions
//!
//! Compilation happens in one of three modes. A bulk update (recomputing a
//! whole column) references other columns directly. A single-row update
//! substitutes same-table references with the row's literal values. An
//! insert does the same, except aggregates compile to a typed placeholder:
//! the row has no identity yet, so there is nothing to join on, and the
//! caller runs a follow-up row-update once it does.

use gridbase_core::{Row, RowValue, SelectOption};

use crate::engine::{AggOp, EngineExpr, Join};
use crate::typed::{TypedExpr, TypedExprKind};

/// The mode a formula is compiled in
#[derive(Debug, Clone, Copy)]
pub enum CompileContext<'a> {
    /// Recompute the field for every row; references stay columns.
    BulkUpdate,
    /// Recompute the field for one existing row.
    RowUpdate { row: &'a Row },
    /// Compute the field for a row being inserted.
    Insert { row: &'a Row },
}

impl<'a> CompileContext<'a> {
    fn row(&self) -> Option<&'a Row> {
        match self {
            CompileContext::BulkUpdate => None,
            CompileContext::RowUpdate { row } | CompileContext::Insert { row } => Some(row),
        }
    }

    fn is_insert(&self) -> bool {
        matches!(self, CompileContext::Insert { .. })
    }
}

/// Compile a typed expression for the storage engine.
///
/// Invalid-typed expressions compile to a null literal: the field stays
/// addressable but its value is empty.
pub fn compile(expr: &TypedExpr, ctx: &CompileContext) -> EngineExpr {
    if !expr.ty.is_valid() {
        return EngineExpr::Literal(RowValue::Null);
    }
    if ctx.is_insert() && requires_refresh_after_insert(expr) {
        // The row has no identity yet, so there is nothing to join on; the
        // caller runs a row-update refresh once it does.
        return EngineExpr::Literal(expr.ty.placeholder_empty_value());
    }
    let mut joins = Vec::new();
    let compiled = compile_node(expr, ctx, &mut joins);
    if expr.requires_aggregate_wrapper {
        // A bare many-valued expression (the whole formula of a lookup
        // field) materializes as the collected values, reached through the
        // same join chain an aggregate over it would use.
        return EngineExpr::AggregateSubquery {
            aggregate: AggOp::ArrayAgg,
            args: vec![compiled],
            joins,
        };
    }
    compiled
}

/// True if the expression's value can only be final after the row exists,
/// so an INSERT must be followed by a row-update refresh. Lookup references
/// qualify: the row's link relations do not exist yet either.
pub fn requires_refresh_after_insert(expr: &TypedExpr) -> bool {
    match &expr.kind {
        TypedExprKind::FieldRef { target_column, .. } => target_column.is_some(),
        TypedExprKind::Call { function, args } => {
            function.aggregate
                || function.requires_refresh_after_insert
                || args.iter().any(requires_refresh_after_insert)
        }
        _ => false,
    }
}

fn compile_node(expr: &TypedExpr, ctx: &CompileContext, joins: &mut Vec<Join>) -> EngineExpr {
    match &expr.kind {
        TypedExprKind::StringLiteral(s) => EngineExpr::Literal(RowValue::Text(s.clone())),
        TypedExprKind::NumberLiteral(n) => EngineExpr::Literal(RowValue::Number(n.clone())),
        TypedExprKind::BooleanLiteral(b) => EngineExpr::Literal(RowValue::Boolean(*b)),

        TypedExprKind::FieldRef {
            column,
            target_column: None,
        } => match ctx.row() {
            Some(row) => literal_ref(expr, row.get(column)),
            None => column_ref(expr, column),
        },

        TypedExprKind::FieldRef {
            column,
            target_column: Some(target),
        } => {
            // The value lives in the related table; even single-row modes
            // reach it through the link join.
            let join = Join::through(column.clone());
            if !joins.contains(&join) {
                joins.push(join);
            }
            column_ref(expr, target)
        }

        TypedExprKind::Call { function, args } => {
            if function.aggregate {
                // Joins contributed by the array arguments belong to this
                // aggregate's subquery, not to any enclosing scope.
                let mut inner_joins = Vec::new();
                let compiled = args
                    .iter()
                    .map(|arg| compile_node(arg, ctx, &mut inner_joins))
                    .collect();
                let mut lowered = (function.compile_rule)(expr, compiled);
                if let EngineExpr::AggregateSubquery { joins, .. } = &mut lowered {
                    *joins = inner_joins;
                }
                lowered
            } else {
                let compiled = args
                    .iter()
                    .map(|arg| compile_node(arg, ctx, joins))
                    .collect();
                (function.compile_rule)(expr, compiled)
            }
        }
    }
}

/// A column reference, shaped for the expression's type. Single selects
/// always come out as the structured `{id, value, color}` object.
fn column_ref(expr: &TypedExpr, column: &str) -> EngineExpr {
    use gridbase_core::FormulaType;
    match expr.ty.unwrap_array() {
        FormulaType::SingleSelect => EngineExpr::JsonObject(vec![
            (
                "id".to_string(),
                EngineExpr::Column {
                    name: format!("{}__id", column),
                },
            ),
            (
                "value".to_string(),
                EngineExpr::Column {
                    name: format!("{}__value", column),
                },
            ),
            (
                "color".to_string(),
                EngineExpr::Column {
                    name: format!("{}__color", column),
                },
            ),
        ]),
        _ => EngineExpr::Column {
            name: column.to_string(),
        },
    }
}

fn literal_ref(expr: &TypedExpr, value: RowValue) -> EngineExpr {
    use gridbase_core::FormulaType;
    match (expr.ty.unwrap_array(), value) {
        (FormulaType::SingleSelect, RowValue::Select(option)) => select_object(&option),
        (FormulaType::SingleSelect, _) => EngineExpr::Literal(RowValue::Null),
        (_, value) => EngineExpr::Literal(value),
    }
}

fn select_object(option: &SelectOption) -> EngineExpr {
    EngineExpr::JsonObject(vec![
        (
            "id".to_string(),
            EngineExpr::Literal(RowValue::Number(option.id.into())),
        ),
        (
            "value".to_string(),
            EngineExpr::Literal(RowValue::Text(option.value.clone())),
        ),
        (
            "color".to_string(),
            EngineExpr::Literal(RowValue::Text(option.color.clone())),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AggOp, EngineOp};
    use crate::functions::registry;
    use bigdecimal::BigDecimal;
    use gridbase_core::FormulaType;
    use pretty_assertions::assert_eq;

    fn sum_of_lookup() -> TypedExpr {
        let many = TypedExpr::lookup_ref(
            "field_11",
            "field_2",
            FormulaType::Number { decimal_places: 2 }.array_of(),
        );
        TypedExpr::call(
            registry().get("sum").unwrap(),
            vec![many],
            FormulaType::Number { decimal_places: 2 },
        )
    }

    #[test]
    fn test_bulk_update_compiles_columns() {
        let expr = TypedExpr::call(
            registry().get("add").unwrap(),
            vec![
                TypedExpr::field_ref("field_2", FormulaType::Number { decimal_places: 2 }),
                TypedExpr::number(BigDecimal::from(1), 0),
            ],
            FormulaType::Number { decimal_places: 2 },
        );
        let compiled = compile(&expr, &CompileContext::BulkUpdate);
        assert_eq!(
            compiled,
            EngineExpr::Op {
                op: EngineOp::Add,
                args: vec![
                    EngineExpr::Column {
                        name: "field_2".to_string()
                    },
                    EngineExpr::Literal(RowValue::Number(BigDecimal::from(1))),
                ],
            }
        );
    }

    #[test]
    fn test_row_update_substitutes_same_table_values() {
        let expr = TypedExpr::field_ref("field_2", FormulaType::Number { decimal_places: 2 });
        let row = Row::new().with("field_2", BigDecimal::from(7));
        let compiled = compile(&expr, &CompileContext::RowUpdate { row: &row });
        assert_eq!(
            compiled,
            EngineExpr::Literal(RowValue::Number(BigDecimal::from(7)))
        );
    }

    #[test]
    fn test_aggregate_joins_through_the_link() {
        let compiled = compile(&sum_of_lookup(), &CompileContext::BulkUpdate);
        assert_eq!(
            compiled,
            EngineExpr::AggregateSubquery {
                aggregate: AggOp::Sum,
                args: vec![EngineExpr::Column {
                    name: "field_2".to_string()
                }],
                joins: vec![Join::through("field_11")],
            }
        );
    }

    #[test]
    fn test_row_update_still_joins_for_aggregates() {
        let row = Row::new();
        let compiled = compile(&sum_of_lookup(), &CompileContext::RowUpdate { row: &row });
        assert!(matches!(compiled, EngineExpr::AggregateSubquery { .. }));
    }

    #[test]
    fn test_insert_mode_substitutes_aggregate_placeholder() {
        let row = Row::new();
        let compiled = compile(&sum_of_lookup(), &CompileContext::Insert { row: &row });
        assert_eq!(
            compiled,
            EngineExpr::Literal(RowValue::Number(BigDecimal::from(0)))
        );
        assert!(requires_refresh_after_insert(&sum_of_lookup()));
    }

    #[test]
    fn test_bare_lookup_materializes_with_its_join() {
        let expr = TypedExpr::lookup_ref(
            "field_11",
            "field_2",
            FormulaType::Number { decimal_places: 2 }.array_of(),
        );
        let compiled = compile(&expr, &CompileContext::BulkUpdate);
        assert_eq!(
            compiled,
            EngineExpr::AggregateSubquery {
                aggregate: AggOp::ArrayAgg,
                args: vec![EngineExpr::Column {
                    name: "field_2".to_string()
                }],
                joins: vec![Join::through("field_11")],
            }
        );
        let row = Row::new();
        let updated = compile(&expr, &CompileContext::RowUpdate { row: &row });
        assert_eq!(updated, compiled);
    }

    #[test]
    fn test_bare_lookup_insert_compiles_to_placeholder() {
        let expr = TypedExpr::lookup_ref(
            "field_11",
            "field_2",
            FormulaType::Number { decimal_places: 2 }.array_of(),
        );
        assert!(requires_refresh_after_insert(&expr));
        let row = Row::new();
        assert_eq!(
            compile(&expr, &CompileContext::Insert { row: &row }),
            EngineExpr::Literal(RowValue::Null)
        );
    }

    #[test]
    fn test_invalid_expression_compiles_to_null() {
        let expr = TypedExpr::field_ref(
            "field_2",
            FormulaType::Invalid {
                error: "broken".to_string(),
            },
        );
        assert_eq!(
            compile(&expr, &CompileContext::BulkUpdate),
            EngineExpr::Literal(RowValue::Null)
        );
    }

    #[test]
    fn test_single_select_reference_compiles_to_object() {
        let expr = TypedExpr::field_ref("field_5", FormulaType::SingleSelect);
        let compiled = compile(&expr, &CompileContext::BulkUpdate);
        let EngineExpr::JsonObject(pairs) = compiled else {
            panic!("expected a json object");
        };
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["id", "value", "color"]);
    }

    #[test]
    fn test_row_id_forces_refresh_after_insert() {
        let expr = TypedExpr::call(
            registry().get("row_id").unwrap(),
            vec![],
            FormulaType::Number { decimal_places: 0 },
        );
        assert!(requires_refresh_after_insert(&expr));
        let row = Row::new();
        assert_eq!(
            compile(&expr, &CompileContext::Insert { row: &row }),
            EngineExpr::Literal(RowValue::Number(BigDecimal::from(0)))
        );
    }
}
