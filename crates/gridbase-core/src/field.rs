//! Field schema types
//!
//! A field is one user-visible column of a table. The declared type of a
//! field is a closed [`FieldKind`] enum; per-variant behavior (primary
//! eligibility, the formula type a reference to the field resolves to) is a
//! capability table on the enum rather than open-ended subtyping.

use crate::formula_type::FormulaType;
use crate::id::{FieldId, TableId};

/// One choice of a single/multiple select field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub id: u64,
    pub value: String,
    pub color: String,
}

/// The internal attributes a formula field persists between recalculations.
///
/// Everything here except `formula` is derived: the typer rewrites the user
/// source into the field-id addressed `internal_formula`, resolves
/// `formula_type`, and tags the result with the formula-language `version`
/// so out-of-date fields can be found after an upgrade.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaMeta {
    /// The formula source text exactly as the user wrote it.
    pub formula: String,
    /// The typed internal form: field references are db-column addressed and
    /// all typing transformations (e.g. totext coercion) have been applied.
    pub internal_formula: String,
    /// The resolved result type, or `Invalid` carrying a diagnostic.
    pub formula_type: FormulaType,
    /// Stored diagnostic when `formula_type` is invalid.
    pub error: Option<String>,
    /// The formula-language version this field was last typed against.
    pub version: u32,
    /// True if after an INSERT the row must be re-selected (via an UPDATE
    /// compiled in row-update mode) to get this field's correct value.
    pub requires_refresh_after_insert: bool,
}

impl FormulaMeta {
    /// Create metadata for a freshly written formula that has not been typed
    /// yet. `version` starts at 0 so the recalculation engine sees it as
    /// stale.
    pub fn new(formula: impl Into<String>) -> Self {
        Self {
            formula: formula.into(),
            internal_formula: String::new(),
            formula_type: FormulaType::Invalid {
                error: "formula has not been typed yet".to_string(),
            },
            error: None,
            version: 0,
            requires_refresh_after_insert: false,
        }
    }
}

/// The declared type of a field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Single line of text
    Text,
    /// Multi-line text
    LongText,
    /// Fixed-point number
    Number { decimal_places: u32 },
    Boolean,
    Date { include_time: bool },
    SingleSelect { options: Vec<SelectOption> },
    MultipleSelect { options: Vec<SelectOption> },
    /// Relation to rows of another table
    Link { link_table: TableId },
    /// Column computed by a user-authored formula
    Formula(FormulaMeta),
    /// Lookup of a target field through a link field; internally a formula
    /// whose source is synthesized from the two names.
    Lookup {
        through_field_name: String,
        target_field_name: String,
        meta: FormulaMeta,
    },
}

impl FieldKind {
    /// Short type tag used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::LongText => "long_text",
            FieldKind::Number { .. } => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Date { .. } => "date",
            FieldKind::SingleSelect { .. } => "single_select",
            FieldKind::MultipleSelect { .. } => "multiple_select",
            FieldKind::Link { .. } => "link_row",
            FieldKind::Formula(_) => "formula",
            FieldKind::Lookup { .. } => "lookup",
        }
    }

    /// Whether a field of this kind may serve as the table's primary field.
    pub fn can_be_primary(&self) -> bool {
        !matches!(
            self,
            FieldKind::Link { .. } | FieldKind::MultipleSelect { .. } | FieldKind::Boolean
        )
    }

    /// Whether rows can be ordered by this field's values. Multi-valued
    /// kinds (links, multiple selects, many-valued formulas) cannot.
    pub fn can_order_by(&self) -> bool {
        self.formula_type().can_order_by()
    }

    /// The formula type a `field(...)` reference to a field of this kind
    /// resolves to. For formula/lookup fields this is the stored result type
    /// from the last recalculation.
    pub fn formula_type(&self) -> FormulaType {
        match self {
            FieldKind::Text | FieldKind::LongText => FormulaType::Text,
            FieldKind::Number { decimal_places } => FormulaType::Number {
                decimal_places: *decimal_places,
            },
            FieldKind::Boolean => FormulaType::Boolean,
            FieldKind::Date { include_time } => FormulaType::Date {
                include_time: *include_time,
            },
            FieldKind::SingleSelect { .. } => FormulaType::SingleSelect,
            FieldKind::MultipleSelect { .. } => {
                FormulaType::Array(Box::new(FormulaType::SingleSelect))
            }
            FieldKind::Link { .. } => FormulaType::Link,
            FieldKind::Formula(meta) | FieldKind::Lookup { meta, .. } => {
                meta.formula_type.clone()
            }
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, FieldKind::Formula(_) | FieldKind::Lookup { .. })
    }

    /// The formula metadata if this is a formula-backed kind.
    pub fn formula_meta(&self) -> Option<&FormulaMeta> {
        match self {
            FieldKind::Formula(meta) | FieldKind::Lookup { meta, .. } => Some(meta),
            _ => None,
        }
    }

    pub fn formula_meta_mut(&mut self) -> Option<&mut FormulaMeta> {
        match self {
            FieldKind::Formula(meta) | FieldKind::Lookup { meta, .. } => Some(meta),
            _ => None,
        }
    }
}

/// One user-visible column of a table
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub id: FieldId,
    pub table_id: TableId,
    pub name: String,
    /// Ordering rank within the table.
    pub rank: u32,
    /// At most one primary field per table; the primary cannot be deleted.
    pub primary: bool,
    /// Soft-deleted fields stay in the schema but are skipped by lookups.
    pub trashed: bool,
    pub kind: FieldKind,
}

impl FieldSchema {
    pub fn new(id: FieldId, table_id: TableId, name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id,
            table_id,
            name: name.into(),
            rank: 0,
            primary: false,
            trashed: false,
            kind,
        }
    }

    /// The database column backing this field.
    pub fn db_column(&self) -> String {
        self.id.db_column()
    }

    pub fn is_formula(&self) -> bool {
        self.kind.is_formula()
    }

    pub fn formula_meta(&self) -> Option<&FormulaMeta> {
        self.kind.formula_meta()
    }

    pub fn formula_meta_mut(&mut self) -> Option<&mut FormulaMeta> {
        self.kind.formula_meta_mut()
    }
}
