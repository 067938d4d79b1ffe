//! Table schemas and the database-wide schema set
//!
//! A [`TableSchema`] owns its fields in rank order and enforces the
//! schema-level invariants: unique names among live fields, at most one
//! primary field, primary not deletable. Soft deletion keeps trashed fields
//! in the schema (so they can be restored) but hides them from lookups.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::field::{FieldKind, FieldSchema};
use crate::id::{FieldId, TableId};

/// One user-defined table
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub id: TableId,
    pub name: String,
    fields: Vec<FieldSchema>,
}

impl TableSchema {
    pub fn new(id: TableId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field to the table, validating name uniqueness and primary
    /// rules. The field is appended at the end of the rank order.
    pub fn insert_field(&mut self, mut field: FieldSchema) -> Result<()> {
        if self.field_by_name(&field.name).is_some() {
            return Err(Error::DuplicateFieldName(field.name));
        }
        if field.primary {
            if !field.kind.can_be_primary() {
                return Err(Error::TypeCannotBePrimary(field.kind.name()));
            }
            if self.primary_field().is_some() {
                // Only one primary per table; demote the incoming field.
                field.primary = false;
            }
        }
        field.table_id = self.id;
        field.rank = self.fields.iter().map(|f| f.rank + 1).max().unwrap_or(0);
        self.fields.push(field);
        Ok(())
    }

    /// Live (non-trashed) fields in rank order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| !f.trashed)
    }

    /// All fields, including trashed ones.
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter()
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| !f.trashed && f.name == name)
    }

    pub fn field_by_id(&self, id: FieldId) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| !f.trashed && f.id == id)
    }

    pub fn field_by_id_mut(&mut self, id: FieldId) -> Option<&mut FieldSchema> {
        self.fields.iter_mut().find(|f| !f.trashed && f.id == id)
    }

    pub fn primary_field(&self) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| !f.trashed && f.primary)
    }

    /// Rename a field. The caller is responsible for rewriting formula
    /// source texts that reference the old name.
    pub fn rename_field(&mut self, id: FieldId, new_name: impl Into<String>) -> Result<()> {
        let new_name = new_name.into();
        if let Some(existing) = self.field_by_name(&new_name) {
            if existing.id != id {
                return Err(Error::DuplicateFieldName(new_name));
            }
        }
        let field = self.field_by_id_mut(id).ok_or(Error::FieldNotFound(id))?;
        field.name = new_name;
        Ok(())
    }

    /// Soft-delete a field. The primary field cannot be trashed.
    pub fn trash_field(&mut self, id: FieldId) -> Result<FieldSchema> {
        let field = self.field_by_id_mut(id).ok_or(Error::FieldNotFound(id))?;
        if field.primary {
            return Err(Error::PrimaryFieldNotDeletable(id));
        }
        field.trashed = true;
        Ok(field.clone())
    }

    /// Restore a trashed field, re-validating name uniqueness. If another
    /// live field took the name in the meantime the restored field gets a
    /// `(Restored)` suffix. Returns the name the field ended up with.
    pub fn restore_field(&mut self, id: FieldId) -> Result<String> {
        let taken = {
            let field = self
                .fields
                .iter()
                .find(|f| f.trashed && f.id == id)
                .ok_or(Error::FieldNotFound(id))?;
            self.field_by_name(&field.name).is_some()
        };
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.trashed && f.id == id)
            .ok_or(Error::FieldNotFound(id))?;
        if taken {
            field.name = format!("{} (Restored)", field.name);
        }
        field.trashed = false;
        Ok(field.name.clone())
    }
}

/// The whole schema the recalculation engine operates over.
///
/// Fields are always addressed by id into this set during a recalculation
/// pass; no live references to field objects are held across mutations.
#[derive(Debug, Default, Clone)]
pub struct DatabaseSchema {
    tables: BTreeMap<TableId, TableSchema>,
}

impl DatabaseSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: TableSchema) {
        self.tables.insert(table.id, table);
    }

    pub fn table(&self, id: TableId) -> Option<&TableSchema> {
        self.tables.get(&id)
    }

    pub fn table_mut(&mut self, id: TableId) -> Option<&mut TableSchema> {
        self.tables.get_mut(&id)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    /// Look up a live field anywhere in the schema.
    pub fn field(&self, id: FieldId) -> Option<&FieldSchema> {
        self.tables.values().find_map(|t| t.field_by_id(id))
    }

    pub fn field_mut(&mut self, id: FieldId) -> Option<&mut FieldSchema> {
        self.tables.values_mut().find_map(|t| t.field_by_id_mut(id))
    }

    /// Ids of every live formula-backed field, across all tables.
    pub fn formula_field_ids(&self) -> Vec<FieldId> {
        self.tables
            .values()
            .flat_map(|t| t.fields())
            .filter(|f| f.is_formula())
            .map(|f| f.id)
            .collect()
    }

    /// The primary field of the table a link field points at. Lookups read
    /// this field when no explicit target is given.
    pub fn related_primary_field(&self, link_field: &FieldSchema) -> Option<&FieldSchema> {
        match &link_field.kind {
            FieldKind::Link { link_table } => {
                self.table(*link_table).and_then(|t| t.primary_field())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldKind;
    use pretty_assertions::assert_eq;

    fn text_field(id: u64, name: &str) -> FieldSchema {
        FieldSchema::new(FieldId(id), TableId(0), name, FieldKind::Text)
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut table = TableSchema::new(TableId(1), "Projects");
        table.insert_field(text_field(1, "Name")).unwrap();
        let err = table.insert_field(text_field(2, "Name")).unwrap_err();
        assert!(matches!(err, Error::DuplicateFieldName(_)));
    }

    #[test]
    fn test_primary_cannot_be_trashed() {
        let mut table = TableSchema::new(TableId(1), "Projects");
        let mut primary = text_field(1, "Name");
        primary.primary = true;
        table.insert_field(primary).unwrap();
        let err = table.trash_field(FieldId(1)).unwrap_err();
        assert!(matches!(err, Error::PrimaryFieldNotDeletable(_)));
    }

    #[test]
    fn test_trash_hides_field_from_lookups() {
        let mut table = TableSchema::new(TableId(1), "Projects");
        table.insert_field(text_field(1, "Name")).unwrap();
        table.insert_field(text_field(2, "Notes")).unwrap();
        table.trash_field(FieldId(2)).unwrap();
        assert!(table.field_by_name("Notes").is_none());
        assert!(table.field_by_id(FieldId(2)).is_none());
        assert_eq!(table.fields().count(), 1);
    }

    #[test]
    fn test_restore_renames_on_clash() {
        let mut table = TableSchema::new(TableId(1), "Projects");
        table.insert_field(text_field(1, "Notes")).unwrap();
        table.trash_field(FieldId(1)).unwrap();
        table.insert_field(text_field(2, "Notes")).unwrap();
        let restored_name = table.restore_field(FieldId(1)).unwrap();
        assert_eq!(restored_name, "Notes (Restored)");
        assert!(table.field_by_name("Notes (Restored)").is_some());
    }

    #[test]
    fn test_boolean_cannot_be_primary() {
        let mut table = TableSchema::new(TableId(1), "Projects");
        let mut field = FieldSchema::new(FieldId(1), TableId(1), "Done", FieldKind::Boolean);
        field.primary = true;
        let err = table.insert_field(field).unwrap_err();
        assert!(matches!(err, Error::TypeCannotBePrimary(_)));
    }
}
