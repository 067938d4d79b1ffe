//! Field dependency extraction and the dependency graph
//!
//! Field references in a formula are resolved against the schema exactly
//! once, here, producing id-keyed dependency records that survive renames.
//! The graph is kept a DAG by construction: every field create or update
//! first asks `would_create_cycle` before its edges are installed.

use std::collections::HashSet;

use ahash::AHashMap;
use gridbase_core::{DatabaseSchema, FieldId, FieldKind, TableSchema};

use crate::ast::FormulaExpr;
use crate::error::{FormulaError, FormulaResult};

/// A lookup traversal: which link field the dependency is reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViaPath {
    pub link_field: FieldId,
    pub target_field: FieldId,
}

/// One edge of the dependency graph, as extracted from a formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldDependency {
    /// The field whose value this formula reads.
    pub field: FieldId,
    /// Set when the value is read through a link field in the same table.
    pub via: Option<ViaPath>,
}

impl FieldDependency {
    pub fn direct(field: FieldId) -> Self {
        Self { field, via: None }
    }

    pub fn through(link_field: FieldId, target_field: FieldId) -> Self {
        Self {
            field: target_field,
            via: Some(ViaPath {
                link_field,
                target_field,
            }),
        }
    }
}

/// Resolve every field reference in `expr` against the schema and return
/// the set of fields it depends on.
///
/// A reference to a link field depends on the linked table's primary field,
/// since that is the value the reference reads.
pub fn extract_dependencies(
    expr: &FormulaExpr,
    schema: &DatabaseSchema,
    table: &TableSchema,
) -> FormulaResult<HashSet<FieldDependency>> {
    let mut deps = HashSet::new();
    collect(expr, schema, table, &mut deps)?;
    Ok(deps)
}

fn collect(
    expr: &FormulaExpr,
    schema: &DatabaseSchema,
    table: &TableSchema,
    deps: &mut HashSet<FieldDependency>,
) -> FormulaResult<()> {
    match expr {
        FormulaExpr::StringLiteral(_)
        | FormulaExpr::IntLiteral(_)
        | FormulaExpr::DecimalLiteral(_)
        | FormulaExpr::BooleanLiteral(_) => {}
        FormulaExpr::FieldReference { name, target: None } => {
            let field = table
                .field_by_name(name)
                .ok_or_else(|| FormulaError::UnknownFieldReference { name: name.clone() })?;
            match &field.kind {
                FieldKind::Link { .. } => {
                    let primary = schema.related_primary_field(field).ok_or_else(|| {
                        FormulaError::UnknownFieldReference { name: name.clone() }
                    })?;
                    deps.insert(FieldDependency::through(field.id, primary.id));
                }
                _ => {
                    deps.insert(FieldDependency::direct(field.id));
                }
            }
        }
        FormulaExpr::FieldReference {
            name,
            target: Some(target),
        } => {
            let link = table
                .field_by_name(name)
                .ok_or_else(|| FormulaError::UnknownFieldReference { name: name.clone() })?;
            let FieldKind::Link { link_table } = link.kind else {
                // Lookup through a non-link field is a typing problem, not
                // an unknown reference; the only dependency is the field
                // itself.
                deps.insert(FieldDependency::direct(link.id));
                return Ok(());
            };
            let target_field = schema
                .table(link_table)
                .and_then(|t| t.field_by_name(target))
                .ok_or_else(|| FormulaError::UnknownFieldReference {
                    name: target.clone(),
                })?;
            deps.insert(FieldDependency::through(link.id, target_field.id));
        }
        FormulaExpr::FieldByIdReference(id) => {
            let field = table
                .field_by_id(*id)
                .ok_or_else(|| FormulaError::UnknownFieldReference {
                    name: format!("field_by_id({})", id.0),
                })?;
            deps.insert(FieldDependency::direct(field.id));
        }
        FormulaExpr::FunctionCall { args, .. } => {
            for arg in args {
                collect(arg, schema, table, deps)?;
            }
        }
    }
    Ok(())
}

/// The database-wide field dependency graph
///
/// Edges point from a formula field to the fields it reads. The reverse
/// map is maintained alongside so propagation can walk dependants without
/// scanning.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Field → fields it depends on.
    dependencies: AHashMap<FieldId, HashSet<FieldDependency>>,
    /// Field → formula fields that depend on it.
    dependants: AHashMap<FieldId, HashSet<FieldId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the outgoing edges of `field`.
    pub fn set_dependencies(&mut self, field: FieldId, deps: HashSet<FieldDependency>) {
        self.clear_dependencies(field);
        for dep in &deps {
            self.dependants.entry(dep.field).or_default().insert(field);
            if let Some(via) = dep.via {
                // A change to the link field itself (row added/removed)
                // also invalidates the dependant.
                self.dependants
                    .entry(via.link_field)
                    .or_default()
                    .insert(field);
            }
        }
        self.dependencies.insert(field, deps);
    }

    /// Remove all edges touching `field` as a dependant.
    pub fn clear_dependencies(&mut self, field: FieldId) {
        if let Some(old) = self.dependencies.remove(&field) {
            for dep in old {
                if let Some(set) = self.dependants.get_mut(&dep.field) {
                    set.remove(&field);
                }
                if let Some(via) = dep.via {
                    if let Some(set) = self.dependants.get_mut(&via.link_field) {
                        set.remove(&field);
                    }
                }
            }
        }
    }

    /// Drop a deleted field from the graph entirely. Its dependants keep
    /// their edges until they are re-typed (and fail with an unknown-field
    /// diagnostic).
    pub fn remove_field(&mut self, field: FieldId) {
        self.clear_dependencies(field);
        self.dependants.remove(&field);
    }

    pub fn dependencies_of(&self, field: FieldId) -> impl Iterator<Item = &FieldDependency> + '_ {
        self.dependencies.get(&field).into_iter().flatten()
    }

    /// The formula fields that directly read `field`.
    pub fn dependants_of(&self, field: FieldId) -> Vec<FieldId> {
        let mut out: Vec<FieldId> = self
            .dependants
            .get(&field)
            .into_iter()
            .flatten()
            .copied()
            .collect();
        out.sort_unstable_by_key(|id| id.0);
        out
    }

    /// Whether installing `new_deps` as the edges of `field` would make the
    /// graph cyclic. Iterative DFS over the existing edges; never recurses,
    /// so pathological graphs cannot overflow the stack.
    pub fn would_create_cycle(
        &self,
        field: FieldId,
        new_deps: &HashSet<FieldDependency>,
    ) -> bool {
        let mut stack: Vec<FieldId> = new_deps.iter().map(|d| d.field).collect();
        let mut visited: HashSet<FieldId> = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == field {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            for dep in self.dependencies_of(current) {
                stack.push(dep.field);
            }
        }
        false
    }
}
