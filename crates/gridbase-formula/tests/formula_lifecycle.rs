//! End-to-end tests for the formula field lifecycle: typing, dependency
//! tracking, schema mutations and compilation across two linked tables.

use bigdecimal::BigDecimal;
use gridbase_core::{
    DatabaseSchema, FieldId, FieldKind, FieldSchema, FormulaMeta, FormulaType, Row, RowValue,
    TableId, TableSchema,
};
use gridbase_formula::{
    compile, parse, requires_refresh_after_insert, CompileContext, DependencyGraph, EngineExpr,
    FieldCache, FormulaError, Join, MutexEpochLock, NullStorageEngine, RecalcEngine,
    FORMULA_VERSION,
};

const PROJECTS: TableId = TableId(1);
const ORDERS: TableId = TableId(2);

const PROJECT_NAME: FieldId = FieldId(1);
const PROJECT_COST: FieldId = FieldId(2);
const ORDER_REF: FieldId = FieldId(10);
const ORDER_PROJECT: FieldId = FieldId(11);
const ORDER_TOTAL: FieldId = FieldId(12);

/// Projects(Name, Cost) <- Orders(Ref, Project link, Total formula).
fn linked_schema() -> DatabaseSchema {
    let mut projects = TableSchema::new(PROJECTS, "Projects");
    let mut name = FieldSchema::new(PROJECT_NAME, PROJECTS, "Name", FieldKind::Text);
    name.primary = true;
    projects.insert_field(name).unwrap();
    projects
        .insert_field(FieldSchema::new(
            PROJECT_COST,
            PROJECTS,
            "Cost",
            FieldKind::Number { decimal_places: 2 },
        ))
        .unwrap();

    let mut orders = TableSchema::new(ORDERS, "Orders");
    let mut reference = FieldSchema::new(ORDER_REF, ORDERS, "Ref", FieldKind::Text);
    reference.primary = true;
    orders.insert_field(reference).unwrap();
    orders
        .insert_field(FieldSchema::new(
            ORDER_PROJECT,
            ORDERS,
            "Project",
            FieldKind::Link {
                link_table: PROJECTS,
            },
        ))
        .unwrap();
    orders
        .insert_field(FieldSchema::new(
            ORDER_TOTAL,
            ORDERS,
            "Total",
            FieldKind::Formula(FormulaMeta::new("sum(lookup('Project', 'Cost'))")),
        ))
        .unwrap();

    let mut schema = DatabaseSchema::new();
    schema.add_table(projects);
    schema.add_table(orders);
    schema
}

fn recalculate(schema: &mut DatabaseSchema, graph: &mut DependencyGraph) {
    let mut storage = NullStorageEngine;
    let lock = MutexEpochLock::default();
    RecalcEngine::new(schema, graph, &mut storage)
        .recalculate_all(&lock)
        .unwrap();
}

#[test]
fn test_parse_round_trip_is_idempotent() {
    for source in [
        "sum(lookup('Orders', 'Total')) / count(field('Orders'))",
        "if(field('Done'), concat('项目: ', field('Name')), 'n/a')",
        "todate('2024-01-31', 'YYYY-MM-DD') > field('Deadline')",
        "-1.50 * field_by_id(7)",
    ] {
        let first = parse(source).unwrap();
        let second = parse(&first.to_string()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
    }
}

#[test]
fn test_lookup_formula_types_and_tracks_dependencies() {
    let mut schema = linked_schema();
    let mut graph = DependencyGraph::new();
    recalculate(&mut schema, &mut graph);

    let meta = schema
        .field(ORDER_TOTAL)
        .unwrap()
        .formula_meta()
        .unwrap()
        .clone();
    assert_eq!(meta.version, FORMULA_VERSION);
    assert_eq!(meta.formula_type, FormulaType::Number { decimal_places: 2 });
    assert_eq!(meta.internal_formula, "sum(lookup('field_11','field_2'))");
    assert!(meta.requires_refresh_after_insert);

    // Total depends on Cost (through the link) and on the link itself.
    assert_eq!(graph.dependants_of(PROJECT_COST), vec![ORDER_TOTAL]);
    assert_eq!(graph.dependants_of(ORDER_PROJECT), vec![ORDER_TOTAL]);
}

#[test]
fn test_deleting_a_looked_up_field_invalidates_across_tables() {
    let mut schema = linked_schema();
    let mut graph = DependencyGraph::new();
    recalculate(&mut schema, &mut graph);

    let mut storage = NullStorageEngine;
    let updates = RecalcEngine::new(&mut schema, &mut graph, &mut storage)
        .field_deleted(PROJECT_COST)
        .unwrap();

    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].field, ORDER_TOTAL);
    assert_eq!(updates[0].table, ORDERS);
    assert_eq!(updates[0].expression, EngineExpr::Literal(RowValue::Null));

    let meta = schema.field(ORDER_TOTAL).unwrap().formula_meta().unwrap();
    assert_eq!(
        meta.error.as_deref(),
        Some("references the deleted or unknown field 'Cost'")
    );

    // Restoring brings the formula back.
    let mut storage = NullStorageEngine;
    RecalcEngine::new(&mut schema, &mut graph, &mut storage)
        .field_restored(PROJECT_COST)
        .unwrap();
    let meta = schema.field(ORDER_TOTAL).unwrap().formula_meta().unwrap();
    assert!(meta.formula_type.is_valid());
}

#[test]
fn test_cycle_rejection_over_a_long_chain() {
    let mut table = TableSchema::new(TableId(5), "Chain");
    let mut first = FieldSchema::new(FieldId(100), TableId(5), "f0", FieldKind::Text);
    first.primary = true;
    table.insert_field(first).unwrap();
    // f1 -> f0, f2 -> f1, ... f60 -> f59.
    for i in 1..=60u64 {
        table
            .insert_field(FieldSchema::new(
                FieldId(100 + i),
                TableId(5),
                format!("f{}", i),
                FieldKind::Formula(FormulaMeta::new(format!("concat(field('f{}'), '!')", i - 1))),
            ))
            .unwrap();
    }
    let mut schema = DatabaseSchema::new();
    schema.add_table(table);
    let mut graph = DependencyGraph::new();
    recalculate(&mut schema, &mut graph);

    // Rewriting the bottom of the chain to reference the top would close a
    // 60-edge cycle; it must be rejected, not recursed into.
    schema
        .field_mut(FieldId(101))
        .unwrap()
        .formula_meta_mut()
        .unwrap()
        .formula = "concat(field('f60'), '!')".to_string();
    let mut storage = NullStorageEngine;
    let err = RecalcEngine::new(&mut schema, &mut graph, &mut storage)
        .recalculate_field(FieldId(101))
        .unwrap_err();
    assert!(matches!(err, FormulaError::CircularReference));

    // The old metadata is untouched.
    let meta = schema.field(FieldId(101)).unwrap().formula_meta().unwrap();
    assert!(meta.formula_type.is_valid());
}

#[test]
fn test_aggregate_rules() {
    let mut schema = linked_schema();
    let mut graph = DependencyGraph::new();

    // sum of a same-table scalar fails to type.
    schema
        .table_mut(ORDERS)
        .unwrap()
        .insert_field(FieldSchema::new(
            FieldId(13),
            ORDERS,
            "Bad",
            FieldKind::Formula(FormulaMeta::new("sum(field('Ref'))")),
        ))
        .unwrap();
    recalculate(&mut schema, &mut graph);

    let meta = schema.field(FieldId(13)).unwrap().formula_meta().unwrap();
    assert!(meta
        .error
        .as_deref()
        .unwrap()
        .contains("must be an aggregate formula"));

    // sum of a lookup resolves to the scalar element type.
    let meta = schema.field(ORDER_TOTAL).unwrap().formula_meta().unwrap();
    assert_eq!(meta.formula_type, FormulaType::Number { decimal_places: 2 });
}

#[test]
fn test_insert_and_row_update_compilation_of_an_aggregate() {
    let mut schema = linked_schema();
    let mut graph = DependencyGraph::new();
    recalculate(&mut schema, &mut graph);

    let mut cache = FieldCache::new();
    let typed = gridbase_formula::type_field(&schema, ORDER_TOTAL, &mut cache).unwrap();
    assert!(requires_refresh_after_insert(&typed));

    // Inserting: no row identity to join on, so the placeholder stands in.
    let row = Row::new();
    let inserted = compile(&typed, &CompileContext::Insert { row: &row });
    assert_eq!(
        inserted,
        EngineExpr::Literal(RowValue::Number(BigDecimal::from(0)))
    );

    // The follow-up row update does the real join.
    let updated = compile(&typed, &CompileContext::RowUpdate { row: &row });
    assert!(matches!(updated, EngineExpr::AggregateSubquery { .. }));
}

#[test]
fn test_recalculation_is_idempotent() {
    let mut schema = linked_schema();
    let mut graph = DependencyGraph::new();
    let mut storage = NullStorageEngine;
    let lock = MutexEpochLock::default();

    let mut engine = RecalcEngine::new(&mut schema, &mut graph, &mut storage);
    assert!(engine.recalculate_all(&lock).unwrap() > 0);
    assert_eq!(engine.recalculate_all(&lock).unwrap(), 0);
    assert_eq!(engine.recalculate_all(&lock).unwrap(), 0);
}

#[test]
fn test_fifty_digit_literals_survive_the_pipeline() {
    let digits = "1".repeat(50);
    let mut schema = linked_schema();
    schema
        .table_mut(PROJECTS)
        .unwrap()
        .insert_field(FieldSchema::new(
            FieldId(3),
            PROJECTS,
            "Big",
            FieldKind::Formula(FormulaMeta::new(digits.clone())),
        ))
        .unwrap();
    let mut graph = DependencyGraph::new();
    recalculate(&mut schema, &mut graph);

    let meta = schema.field(FieldId(3)).unwrap().formula_meta().unwrap();
    assert_eq!(meta.internal_formula, digits);

    let mut cache = FieldCache::new();
    let typed = gridbase_formula::type_field(&schema, FieldId(3), &mut cache).unwrap();
    let compiled = compile(&typed, &CompileContext::BulkUpdate);
    assert_eq!(
        compiled,
        EngineExpr::Literal(RowValue::Number(digits.parse::<BigDecimal>().unwrap()))
    );
}

#[test]
fn test_rename_through_link_rewrites_lookup_target() {
    let mut schema = linked_schema();
    let mut graph = DependencyGraph::new();
    recalculate(&mut schema, &mut graph);

    let mut storage = NullStorageEngine;
    let updates = RecalcEngine::new(&mut schema, &mut graph, &mut storage)
        .field_renamed(PROJECT_COST, "Amount")
        .unwrap();
    // Ids did not move, so nothing recompiles.
    assert!(updates.is_empty());
    assert_eq!(
        schema
            .field(ORDER_TOTAL)
            .unwrap()
            .formula_meta()
            .unwrap()
            .formula,
        "sum(lookup('Project', 'Amount'))"
    );

    // Renaming the link field itself rewrites the first lookup argument.
    let mut storage = NullStorageEngine;
    RecalcEngine::new(&mut schema, &mut graph, &mut storage)
        .field_renamed(ORDER_PROJECT, "Job")
        .unwrap();
    assert_eq!(
        schema
            .field(ORDER_TOTAL)
            .unwrap()
            .formula_meta()
            .unwrap()
            .formula,
        "sum(lookup('Job', 'Amount'))"
    );
}

#[test]
fn test_lookup_field_kind_synthesizes_its_formula() {
    let mut schema = linked_schema();
    schema
        .table_mut(ORDERS)
        .unwrap()
        .insert_field(FieldSchema::new(
            FieldId(14),
            ORDERS,
            "Project Cost",
            FieldKind::Lookup {
                through_field_name: "Project".to_string(),
                target_field_name: "Cost".to_string(),
                meta: FormulaMeta::new(""),
            },
        ))
        .unwrap();
    let mut graph = DependencyGraph::new();
    recalculate(&mut schema, &mut graph);

    let meta = schema.field(FieldId(14)).unwrap().formula_meta().unwrap();
    assert_eq!(
        meta.formula_type,
        FormulaType::Number { decimal_places: 2 }.array_of()
    );
    assert_eq!(meta.internal_formula, "lookup('field_11','field_2')");
    assert!(meta.requires_refresh_after_insert);
}

#[test]
fn test_lookup_field_compiles_with_its_join_in_every_mode() {
    let mut schema = linked_schema();
    schema
        .table_mut(ORDERS)
        .unwrap()
        .insert_field(FieldSchema::new(
            FieldId(14),
            ORDERS,
            "Project Cost",
            FieldKind::Lookup {
                through_field_name: "Project".to_string(),
                target_field_name: "Cost".to_string(),
                meta: FormulaMeta::new(""),
            },
        ))
        .unwrap();
    let mut graph = DependencyGraph::new();
    recalculate(&mut schema, &mut graph);

    // The bulk update reaches the related table's column through the link.
    let mut storage = NullStorageEngine;
    let updates = RecalcEngine::new(&mut schema, &mut graph, &mut storage)
        .recalculate_field(FieldId(14))
        .unwrap();
    assert_eq!(updates.len(), 1);
    let EngineExpr::AggregateSubquery { args, joins, .. } = &updates[0].expression else {
        panic!("expected the lookup to materialize as a subquery");
    };
    assert_eq!(
        args,
        &vec![EngineExpr::Column {
            name: "field_2".to_string()
        }]
    );
    assert_eq!(joins, &vec![Join::through("field_11")]);

    // Inserting: no relations exist yet, so the value starts empty and the
    // caller refreshes with a row update, which joins like the bulk form.
    let mut cache = FieldCache::new();
    let typed = gridbase_formula::type_field(&schema, FieldId(14), &mut cache).unwrap();
    assert!(requires_refresh_after_insert(&typed));
    let row = Row::new();
    assert_eq!(
        compile(&typed, &CompileContext::Insert { row: &row }),
        EngineExpr::Literal(RowValue::Null)
    );
    assert!(matches!(
        compile(&typed, &CompileContext::RowUpdate { row: &row }),
        EngineExpr::AggregateSubquery { .. }
    ));
}
