//! The recalculation engine
//!
//! Owns the lifecycle of formula field metadata: typing on create/update,
//! version migration on startup, and the ripple of re-typing that follows
//! schema mutations (delete, restore, rename). Typing failures are never
//! fatal here; they become the field's stored `Invalid` state. Only schema
//! DDL failures abort a unit.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use gridbase_core::{DatabaseSchema, FieldId, FieldKind, RowValue, TableId};

use crate::cache::FieldCache;
use crate::compile::{compile, requires_refresh_after_insert, CompileContext};
use crate::deps::{extract_dependencies, DependencyGraph};
use crate::engine::{EngineExpr, StorageEngine};
use crate::error::{FormulaError, FormulaResult};
use crate::parser::parse;
use crate::parser::rename::rename_field_references;
use crate::typed::TypedExpr;
use crate::typer::{formula_source, type_field};

/// The version of the formula language. Fields typed against an older
/// version are stale and get re-typed by [`RecalcEngine::recalculate_all`].
pub const FORMULA_VERSION: u32 = 2;

/// Cross-process mutual exclusion around the version migration pass.
///
/// Backed by an advisory database lock in production; the in-process
/// [`MutexEpochLock`] is enough for tests and single-process use.
pub trait EpochLock {
    fn acquire(&self) -> Box<dyn EpochGuard + '_>;
}

/// Held for the duration of a migration pass; releasing it is dropping it.
pub trait EpochGuard {}

#[derive(Debug, Default)]
pub struct MutexEpochLock {
    inner: Mutex<()>,
}

impl EpochLock for MutexEpochLock {
    fn acquire(&self) -> Box<dyn EpochGuard + '_> {
        // A poisoned lock only means another thread panicked mid-pass; the
        // re-check after acquiring makes that safe to ignore.
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Box::new(MutexEpochGuard { _guard: guard })
    }
}

struct MutexEpochGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl EpochGuard for MutexEpochGuard<'_> {}

/// One UPDATE statement the caller must run: recompute `field`'s column
/// for every row of `table` from `expression`.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    pub table: TableId,
    pub field: FieldId,
    pub expression: EngineExpr,
}

struct RetypeOutcome {
    /// Whether the persisted internal formula or type changed.
    changed: bool,
    /// The typed tree, absent when typing failed and the field went invalid.
    typed: Option<TypedExpr>,
}

/// Drives typing and re-typing over a schema, its dependency graph and the
/// storage engine.
pub struct RecalcEngine<'a> {
    schema: &'a mut DatabaseSchema,
    graph: &'a mut DependencyGraph,
    storage: &'a mut dyn StorageEngine,
}

impl<'a> RecalcEngine<'a> {
    pub fn new(
        schema: &'a mut DatabaseSchema,
        graph: &'a mut DependencyGraph,
        storage: &'a mut dyn StorageEngine,
    ) -> Self {
        Self {
            schema,
            graph,
            storage,
        }
    }

    /// Bring every formula field up to [`FORMULA_VERSION`], depth-first over
    /// dependencies so a field is always typed after the fields it reads.
    /// Returns how many fields were re-typed; zero when nothing is stale,
    /// in which case the lock is never taken.
    pub fn recalculate_all(&mut self, lock: &dyn EpochLock) -> FormulaResult<usize> {
        if !self.any_stale() {
            return Ok(0);
        }
        let _guard = lock.acquire();
        // Another process may have finished the migration while we waited.
        if !self.any_stale() {
            log::debug!("formula fields already at version {}", FORMULA_VERSION);
            return Ok(0);
        }

        let mut cache = FieldCache::new();
        let mut visited = std::collections::HashSet::new();
        let mut updated = 0;
        for id in self.schema.formula_field_ids() {
            updated += self.visit_depth_first(id, &mut cache, &mut visited)?;
        }
        log::info!(
            "recalculated {} formula fields to version {}",
            updated,
            FORMULA_VERSION
        );
        Ok(updated)
    }

    fn visit_depth_first(
        &mut self,
        field_id: FieldId,
        cache: &mut FieldCache,
        visited: &mut std::collections::HashSet<FieldId>,
    ) -> FormulaResult<usize> {
        if !visited.insert(field_id) {
            return Ok(0);
        }
        let mut updated = 0;
        for dep in self.formula_dependencies(field_id) {
            updated += self.visit_depth_first(dep, cache, visited)?;
        }
        if self.is_stale(field_id) {
            self.retype_field(field_id, cache)?;
            updated += 1;
        }
        Ok(updated)
    }

    /// The formula-backed fields this field's source references. Unresolvable
    /// sources contribute nothing; retyping stores their diagnostic.
    fn formula_dependencies(&self, field_id: FieldId) -> Vec<FieldId> {
        let Some(field) = self.schema.field(field_id) else {
            return vec![];
        };
        let Some(source) = formula_source(field) else {
            return vec![];
        };
        let Some(table) = self.schema.table(field.table_id) else {
            return vec![];
        };
        let Ok(expr) = parse(&source) else {
            return vec![];
        };
        let Ok(deps) = extract_dependencies(&expr, self.schema, table) else {
            return vec![];
        };
        deps.into_iter()
            .map(|d| d.field)
            .filter(|id| self.schema.field(*id).map_or(false, |f| f.is_formula()))
            .collect()
    }

    fn is_stale(&self, field_id: FieldId) -> bool {
        self.schema
            .field(field_id)
            .and_then(|f| f.formula_meta())
            .map_or(false, |meta| meta.version != FORMULA_VERSION)
    }

    fn any_stale(&self) -> bool {
        self.schema
            .formula_field_ids()
            .into_iter()
            .any(|id| self.is_stale(id))
    }

    /// Type a field after it was created or its formula changed, then ripple
    /// the change to every transitive dependant until the typed forms stop
    /// changing. Returns one pending bulk update per affected field.
    ///
    /// A formula whose dependencies would close a cycle in the graph is
    /// rejected before anything is persisted.
    pub fn recalculate_field(&mut self, field_id: FieldId) -> FormulaResult<Vec<PendingUpdate>> {
        let is_formula = self
            .schema
            .field(field_id)
            .ok_or(gridbase_core::Error::FieldNotFound(field_id))?
            .is_formula();

        let mut updates = Vec::new();
        if is_formula {
            self.check_for_cycle(field_id)?;
            let mut cache = FieldCache::new();
            let outcome = self.retype_field(field_id, &mut cache)?;
            updates.push(self.pending_update(field_id, outcome.typed.as_ref())?);
        }
        let dependants = self.graph.dependants_of(field_id);
        self.propagate_from(dependants, &mut updates)?;
        log::debug!(
            "recalculated field {}: {} pending updates",
            field_id,
            updates.len()
        );
        Ok(updates)
    }

    fn check_for_cycle(&self, field_id: FieldId) -> FormulaResult<()> {
        let Some(field) = self.schema.field(field_id) else {
            return Ok(());
        };
        let Some(source) = formula_source(field) else {
            return Ok(());
        };
        let Some(table) = self.schema.table(field.table_id) else {
            return Ok(());
        };
        // Unparseable or unresolvable sources cannot form cycles; typing
        // will store the real diagnostic.
        if let Ok(expr) = parse(&source) {
            if let Ok(deps) = extract_dependencies(&expr, self.schema, table) {
                if deps.iter().any(|d| d.field == field_id) {
                    return Err(FormulaError::SelfReference);
                }
                if self.graph.would_create_cycle(field_id, &deps) {
                    return Err(FormulaError::CircularReference);
                }
            }
        }
        Ok(())
    }

    /// Soft-delete a field and re-type everything that referenced it; those
    /// formulas go invalid with an unknown-field diagnostic and their
    /// columns are nulled by the returned updates.
    pub fn field_deleted(&mut self, field_id: FieldId) -> FormulaResult<Vec<PendingUpdate>> {
        let table_id = self
            .schema
            .field(field_id)
            .ok_or(gridbase_core::Error::FieldNotFound(field_id))?
            .table_id;
        self.schema
            .table_mut(table_id)
            .ok_or(gridbase_core::Error::FieldNotFound(field_id))?
            .trash_field(field_id)?;

        let dependants = self.graph.dependants_of(field_id);
        self.graph.remove_field(field_id);

        let mut updates = Vec::new();
        self.propagate_from(dependants, &mut updates)?;
        log::info!(
            "trashed field {}; {} dependant updates",
            field_id,
            updates.len()
        );
        Ok(updates)
    }

    /// Restore a trashed field and give every invalid formula a chance to
    /// become valid again, since any of them may have gone invalid when the
    /// field was trashed.
    pub fn field_restored(&mut self, field_id: FieldId) -> FormulaResult<Vec<PendingUpdate>> {
        let table_id = self
            .schema
            .tables()
            .find(|t| t.all_fields().any(|f| f.id == field_id))
            .map(|t| t.id)
            .ok_or(gridbase_core::Error::FieldNotFound(field_id))?;
        let restored_name = self
            .schema
            .table_mut(table_id)
            .ok_or(gridbase_core::Error::FieldNotFound(field_id))?
            .restore_field(field_id)?;

        let mut seeds = Vec::new();
        if self
            .schema
            .field(field_id)
            .map_or(false, |f| f.is_formula())
        {
            seeds.push(field_id);
        }
        for id in self.schema.formula_field_ids() {
            let invalid = self
                .schema
                .field(id)
                .and_then(|f| f.formula_meta())
                .map_or(false, |meta| !meta.formula_type.is_valid());
            if invalid && id != field_id {
                seeds.push(id);
            }
        }

        let mut updates = Vec::new();
        self.propagate_from(seeds, &mut updates)?;
        log::info!(
            "restored field '{}'; {} updates",
            restored_name,
            updates.len()
        );
        Ok(updates)
    }

    /// Rename a field and rewrite the formula source of every dependant so
    /// it references the new name, byte-preserving everything else. The
    /// internal (id-addressed) formulas do not change, so this produces no
    /// pending updates in the common case.
    pub fn field_renamed(
        &mut self,
        field_id: FieldId,
        new_name: &str,
    ) -> FormulaResult<Vec<PendingUpdate>> {
        let (table_id, old_name) = {
            let field = self
                .schema
                .field(field_id)
                .ok_or(gridbase_core::Error::FieldNotFound(field_id))?;
            (field.table_id, field.name.clone())
        };
        self.schema
            .table_mut(table_id)
            .ok_or(gridbase_core::Error::FieldNotFound(field_id))?
            .rename_field(field_id, new_name)?;

        let mut renames = HashMap::new();
        renames.insert(old_name.clone(), new_name.to_string());

        let dependants = self.graph.dependants_of(field_id);
        for dep_id in &dependants {
            self.rewrite_dependant_source(*dep_id, field_id, table_id, &old_name, new_name, &renames)?;
        }

        let mut updates = Vec::new();
        self.propagate_from(dependants, &mut updates)?;
        Ok(updates)
    }

    fn rewrite_dependant_source(
        &mut self,
        dep_id: FieldId,
        renamed: FieldId,
        renamed_table: TableId,
        old_name: &str,
        new_name: &str,
        renames: &HashMap<String, String>,
    ) -> FormulaResult<()> {
        let (dep_table, via_link) = {
            let Some(dep) = self.schema.field(dep_id) else {
                return Ok(());
            };
            let via_link = self
                .graph
                .dependencies_of(dep_id)
                .find(|d| d.field == renamed && d.via.is_some())
                .and_then(|d| d.via)
                .map(|v| v.link_field);
            (dep.table_id, via_link)
        };
        // Same-table references use the plain name; cross-table references
        // go through a link field, and only lookups through that link see
        // the renamed target.
        let via_name = if dep_table == renamed_table {
            None
        } else {
            match via_link.and_then(|id| self.schema.field(id)) {
                Some(link) => Some(link.name.clone()),
                None => return Ok(()),
            }
        };

        let Some(dep) = self.schema.field_mut(dep_id) else {
            return Ok(());
        };
        match &mut dep.kind {
            FieldKind::Formula(meta) => {
                meta.formula =
                    rename_field_references(&meta.formula, renames, via_name.as_deref())?;
            }
            FieldKind::Lookup {
                through_field_name,
                target_field_name,
                ..
            } => {
                if via_name.is_none() && through_field_name == old_name {
                    *through_field_name = new_name.to_string();
                }
                if via_name.is_some() && target_field_name == old_name {
                    *target_field_name = new_name.to_string();
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Re-type fields breadth-first from `seeds`, following dependants of
    /// whatever actually changed until a fixed point.
    fn propagate_from(
        &mut self,
        seeds: Vec<FieldId>,
        updates: &mut Vec<PendingUpdate>,
    ) -> FormulaResult<()> {
        let mut queue: VecDeque<FieldId> = seeds.into();
        while let Some(id) = queue.pop_front() {
            if !self.schema.field(id).map_or(false, |f| f.is_formula()) {
                continue;
            }
            let mut cache = FieldCache::new();
            let outcome = self.retype_field(id, &mut cache)?;
            if outcome.changed {
                updates.push(self.pending_update(id, outcome.typed.as_ref())?);
                queue.extend(self.graph.dependants_of(id));
            }
        }
        Ok(())
    }

    /// Type one formula field and persist the result on its metadata,
    /// refreshing its dependency edges and altering the backing column when
    /// the resolved type changed.
    fn retype_field(
        &mut self,
        field_id: FieldId,
        cache: &mut FieldCache,
    ) -> FormulaResult<RetypeOutcome> {
        let (table_id, column, old_internal, old_ty) = {
            let field = self
                .schema
                .field(field_id)
                .ok_or(gridbase_core::Error::FieldNotFound(field_id))?;
            let meta = field
                .formula_meta()
                .ok_or(gridbase_core::Error::FieldNotFound(field_id))?;
            (
                field.table_id,
                field.db_column(),
                meta.internal_formula.clone(),
                meta.formula_type.clone(),
            )
        };

        match type_field(self.schema, field_id, cache) {
            Ok(typed) => {
                let internal = typed.internal_formula();
                let new_ty = typed.ty.clone();
                let refresh = requires_refresh_after_insert(&typed);
                // The column migration goes first: if the engine rejects it
                // the unit fails with the old metadata and edges intact.
                if new_ty != old_ty {
                    self.storage.alter_column(table_id, &column, &new_ty)?;
                }

                let deps = self.resolved_dependencies(field_id);
                self.graph.set_dependencies(field_id, deps);
                {
                    let meta = self
                        .schema
                        .field_mut(field_id)
                        .and_then(|f| f.formula_meta_mut())
                        .ok_or(gridbase_core::Error::FieldNotFound(field_id))?;
                    meta.internal_formula = internal.clone();
                    meta.formula_type = new_ty.clone();
                    meta.error = new_ty.error().map(String::from);
                    meta.version = FORMULA_VERSION;
                    meta.requires_refresh_after_insert = refresh;
                }
                Ok(RetypeOutcome {
                    changed: internal != old_internal || new_ty != old_ty,
                    typed: Some(typed),
                })
            }
            Err(FormulaError::Schema(e)) => Err(e.into()),
            Err(e) => {
                // Typing failed: the field goes invalid with the diagnostic
                // and keeps no dependency edges.
                self.graph.clear_dependencies(field_id);
                let error = e.to_string();
                let changed = old_ty.is_valid() || old_ty.error() != Some(error.as_str());
                let meta = self
                    .schema
                    .field_mut(field_id)
                    .and_then(|f| f.formula_meta_mut())
                    .ok_or(gridbase_core::Error::FieldNotFound(field_id))?;
                meta.internal_formula = String::new();
                meta.formula_type = gridbase_core::FormulaType::Invalid {
                    error: error.clone(),
                };
                meta.error = Some(error);
                meta.version = FORMULA_VERSION;
                meta.requires_refresh_after_insert = false;
                Ok(RetypeOutcome {
                    changed,
                    typed: None,
                })
            }
        }
    }

    fn resolved_dependencies(
        &self,
        field_id: FieldId,
    ) -> std::collections::HashSet<crate::deps::FieldDependency> {
        let Some(field) = self.schema.field(field_id) else {
            return Default::default();
        };
        let Some(source) = formula_source(field) else {
            return Default::default();
        };
        let Some(table) = self.schema.table(field.table_id) else {
            return Default::default();
        };
        parse(&source)
            .ok()
            .and_then(|expr| extract_dependencies(&expr, self.schema, table).ok())
            .unwrap_or_default()
    }

    fn pending_update(
        &self,
        field_id: FieldId,
        typed: Option<&TypedExpr>,
    ) -> FormulaResult<PendingUpdate> {
        let field = self
            .schema
            .field(field_id)
            .ok_or(gridbase_core::Error::FieldNotFound(field_id))?;
        let expression = match typed {
            Some(typed) => compile(typed, &CompileContext::BulkUpdate),
            None => EngineExpr::Literal(RowValue::Null),
        };
        Ok(PendingUpdate {
            table: field.table_id,
            field: field_id,
            expression,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NullStorageEngine;
    use gridbase_core::{FieldSchema, FormulaMeta, FormulaType, TableSchema};
    use pretty_assertions::assert_eq;

    fn schema_with_formulas() -> DatabaseSchema {
        let mut table = TableSchema::new(TableId(1), "Projects");
        let mut name = FieldSchema::new(FieldId(1), TableId(1), "Name", FieldKind::Text);
        name.primary = true;
        table.insert_field(name).unwrap();
        table
            .insert_field(FieldSchema::new(
                FieldId(2),
                TableId(1),
                "Cost",
                FieldKind::Number { decimal_places: 2 },
            ))
            .unwrap();
        table
            .insert_field(FieldSchema::new(
                FieldId(3),
                TableId(1),
                "Doubled",
                FieldKind::Formula(FormulaMeta::new("field('Cost') * 2")),
            ))
            .unwrap();
        table
            .insert_field(FieldSchema::new(
                FieldId(4),
                TableId(1),
                "Quadrupled",
                FieldKind::Formula(FormulaMeta::new("field('Doubled') * 2")),
            ))
            .unwrap();
        let mut schema = DatabaseSchema::new();
        schema.add_table(table);
        schema
    }

    #[test]
    fn test_recalculate_all_is_idempotent() {
        let mut schema = schema_with_formulas();
        let mut graph = DependencyGraph::new();
        let mut storage = NullStorageEngine;
        let lock = MutexEpochLock::default();

        let mut engine = RecalcEngine::new(&mut schema, &mut graph, &mut storage);
        assert_eq!(engine.recalculate_all(&lock).unwrap(), 2);
        assert_eq!(engine.recalculate_all(&lock).unwrap(), 0);

        let meta = schema
            .field(FieldId(4))
            .unwrap()
            .formula_meta()
            .unwrap()
            .clone();
        assert_eq!(meta.version, FORMULA_VERSION);
        assert_eq!(meta.formula_type, FormulaType::Number { decimal_places: 2 });
        assert_eq!(
            meta.internal_formula,
            "multiply(multiply(field('field_2'),2),2)"
        );
    }

    #[test]
    fn test_recalculate_field_propagates_to_dependants() {
        let mut schema = schema_with_formulas();
        let mut graph = DependencyGraph::new();
        let mut storage = NullStorageEngine;
        let lock = MutexEpochLock::default();
        RecalcEngine::new(&mut schema, &mut graph, &mut storage)
            .recalculate_all(&lock)
            .unwrap();

        // Change Doubled's formula; Quadrupled must be re-typed too.
        schema
            .field_mut(FieldId(3))
            .unwrap()
            .formula_meta_mut()
            .unwrap()
            .formula = "field('Cost') + 1".to_string();
        let updates = RecalcEngine::new(&mut schema, &mut graph, &mut storage)
            .recalculate_field(FieldId(3))
            .unwrap();
        let updated: Vec<FieldId> = updates.iter().map(|u| u.field).collect();
        assert_eq!(updated, vec![FieldId(3), FieldId(4)]);
        assert_eq!(
            schema
                .field(FieldId(4))
                .unwrap()
                .formula_meta()
                .unwrap()
                .internal_formula,
            "multiply(add(field('field_2'),1),2)"
        );
    }

    #[test]
    fn test_cycle_is_rejected_before_persisting() {
        let mut schema = schema_with_formulas();
        let mut graph = DependencyGraph::new();
        let mut storage = NullStorageEngine;
        let lock = MutexEpochLock::default();
        RecalcEngine::new(&mut schema, &mut graph, &mut storage)
            .recalculate_all(&lock)
            .unwrap();

        // Doubled referencing Quadrupled closes Doubled -> Quadrupled -> Doubled.
        schema
            .field_mut(FieldId(3))
            .unwrap()
            .formula_meta_mut()
            .unwrap()
            .formula = "field('Quadrupled') / 4".to_string();
        let err = RecalcEngine::new(&mut schema, &mut graph, &mut storage)
            .recalculate_field(FieldId(3))
            .unwrap_err();
        assert!(matches!(err, FormulaError::CircularReference));
    }

    #[test]
    fn test_deleting_a_field_invalidates_dependants() {
        let mut schema = schema_with_formulas();
        let mut graph = DependencyGraph::new();
        let mut storage = NullStorageEngine;
        let lock = MutexEpochLock::default();
        RecalcEngine::new(&mut schema, &mut graph, &mut storage)
            .recalculate_all(&lock)
            .unwrap();

        let updates = RecalcEngine::new(&mut schema, &mut graph, &mut storage)
            .field_deleted(FieldId(2))
            .unwrap();
        // Both formulas go invalid and get nulled.
        let updated: Vec<FieldId> = updates.iter().map(|u| u.field).collect();
        assert!(updated.contains(&FieldId(3)));
        assert!(updated.contains(&FieldId(4)));
        for update in &updates {
            assert_eq!(update.expression, EngineExpr::Literal(RowValue::Null));
        }
        let meta = schema.field(FieldId(3)).unwrap().formula_meta().unwrap();
        assert_eq!(
            meta.error.as_deref(),
            Some("references the deleted or unknown field 'Cost'")
        );
    }

    #[test]
    fn test_restoring_a_field_revalidates_dependants() {
        let mut schema = schema_with_formulas();
        let mut graph = DependencyGraph::new();
        let mut storage = NullStorageEngine;
        let lock = MutexEpochLock::default();
        RecalcEngine::new(&mut schema, &mut graph, &mut storage)
            .recalculate_all(&lock)
            .unwrap();
        RecalcEngine::new(&mut schema, &mut graph, &mut storage)
            .field_deleted(FieldId(2))
            .unwrap();

        RecalcEngine::new(&mut schema, &mut graph, &mut storage)
            .field_restored(FieldId(2))
            .unwrap();
        let meta = schema.field(FieldId(3)).unwrap().formula_meta().unwrap();
        assert!(meta.formula_type.is_valid());
        assert_eq!(meta.error, None);
    }

    struct RejectingStorageEngine;

    impl StorageEngine for RejectingStorageEngine {
        fn alter_column(
            &mut self,
            _: TableId,
            _: &str,
            _: &FormulaType,
        ) -> gridbase_core::Result<()> {
            Err(gridbase_core::Error::CannotChangeFieldType {
                field: FieldId(3),
                reason: "existing values are incompatible".to_string(),
            })
        }
    }

    #[test]
    fn test_failed_column_migration_leaves_metadata_untouched() {
        let mut schema = schema_with_formulas();
        let mut graph = DependencyGraph::new();
        let mut storage = NullStorageEngine;
        let lock = MutexEpochLock::default();
        RecalcEngine::new(&mut schema, &mut graph, &mut storage)
            .recalculate_all(&lock)
            .unwrap();
        let before = schema
            .field(FieldId(3))
            .unwrap()
            .formula_meta()
            .unwrap()
            .clone();

        // Number -> Text needs a column migration, which the engine rejects.
        schema
            .field_mut(FieldId(3))
            .unwrap()
            .formula_meta_mut()
            .unwrap()
            .formula = "concat(field('Cost'), '!')".to_string();
        let mut rejecting = RejectingStorageEngine;
        let err = RecalcEngine::new(&mut schema, &mut graph, &mut rejecting)
            .recalculate_field(FieldId(3))
            .unwrap_err();
        assert!(matches!(err, FormulaError::Schema(_)));

        let after = schema.field(FieldId(3)).unwrap().formula_meta().unwrap();
        assert_eq!(after.internal_formula, before.internal_formula);
        assert_eq!(after.formula_type, before.formula_type);
        assert_eq!(after.version, before.version);
        assert_eq!(graph.dependants_of(FieldId(2)), vec![FieldId(3)]);
    }

    #[test]
    fn test_rename_rewrites_dependant_sources() {
        let mut schema = schema_with_formulas();
        let mut graph = DependencyGraph::new();
        let mut storage = NullStorageEngine;
        let lock = MutexEpochLock::default();
        RecalcEngine::new(&mut schema, &mut graph, &mut storage)
            .recalculate_all(&lock)
            .unwrap();

        let updates = RecalcEngine::new(&mut schema, &mut graph, &mut storage)
            .field_renamed(FieldId(2), "Amount")
            .unwrap();
        // The internal formulas reference ids, so nothing recompiles.
        assert!(updates.is_empty());
        assert_eq!(
            schema
                .field(FieldId(3))
                .unwrap()
                .formula_meta()
                .unwrap()
                .formula,
            "field('Amount') * 2"
        );
    }
}
