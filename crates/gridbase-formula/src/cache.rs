//! Per-pass field cache
//!
//! One recalculation pass types each field at most once. The cache holds
//! the memoized typed trees plus the visit bookkeeping for the depth-first
//! walk. It lives for a single pass and is never shared across passes.

use ahash::{AHashMap, AHashSet};
use gridbase_core::FieldId;

use crate::typed::TypedExpr;

#[derive(Debug, Default)]
pub struct FieldCache {
    typed: AHashMap<FieldId, TypedExpr>,
    in_progress: AHashSet<FieldId>,
}

impl FieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The memoized typed tree of a field, if it was typed this pass.
    pub fn typed(&self, field: FieldId) -> Option<&TypedExpr> {
        self.typed.get(&field)
    }

    pub fn insert_typed(&mut self, field: FieldId, expr: TypedExpr) {
        self.typed.insert(field, expr);
    }

    /// Mark a field as being typed. The graph is a DAG by construction, so
    /// re-entering a field mid-visit is a logic error, not a user error.
    pub fn start(&mut self, field: FieldId) {
        let fresh = self.in_progress.insert(field);
        debug_assert!(fresh, "field {} re-entered while being typed", field);
    }

    pub fn is_in_progress(&self, field: FieldId) -> bool {
        self.in_progress.contains(&field)
    }

    pub fn finish(&mut self, field: FieldId) {
        self.in_progress.remove(&field);
    }
}
