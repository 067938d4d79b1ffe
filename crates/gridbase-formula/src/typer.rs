//! The formula typer
//!
//! Walks an untyped AST post-order, resolves every field reference against
//! the schema, and produces a [`TypedExpr`] where each node knows its type.
//! Same-table formula references are inlined with the referenced field's
//! typed tree, so a compiled formula never reads another formula column of
//! its own row; lookups and link references stay column references because
//! their values live in other tables.
//!
//! A reference to a stale formula field re-types that field first (memoized
//! in the per-pass [`FieldCache`]), which is what gives the recalculation
//! engine its depth-first order.

use gridbase_core::{
    DatabaseSchema, FieldId, FieldKind, FieldSchema, FormulaType, TableId, TableSchema,
};

use crate::ast::{escape, FormulaExpr};
use crate::cache::FieldCache;
use crate::error::{FormulaError, FormulaResult};
use crate::parser::{parse, MAX_FORMULA_DEPTH};
use crate::typed::TypedExpr;

/// How `field(...)` arguments are matched against the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameResolution {
    /// User-facing source: arguments are display names.
    DisplayNames,
    /// Internal formulas: arguments are database column names (`field_{id}`).
    DbColumns,
}

/// Type a formula source string in the context of the field it defines.
pub fn type_formula(
    schema: &DatabaseSchema,
    table_id: TableId,
    field_id: FieldId,
    source: &str,
    cache: &mut FieldCache,
) -> FormulaResult<TypedExpr> {
    let expr = parse(source)?;
    type_expression(schema, table_id, field_id, &expr, cache)
}

/// Type an already-parsed expression in the context of the field it defines.
pub fn type_expression(
    schema: &DatabaseSchema,
    table_id: TableId,
    field_id: FieldId,
    expr: &FormulaExpr,
    cache: &mut FieldCache,
) -> FormulaResult<TypedExpr> {
    Typer::new(schema, table_id, field_id, NameResolution::DisplayNames, cache)?
        .type_expr(expr, 0)
}

/// Rebuild a typed tree from persisted internal formula text, where field
/// references are db-column addressed.
pub fn type_internal_formula(
    schema: &DatabaseSchema,
    table_id: TableId,
    field_id: FieldId,
    internal: &str,
    cache: &mut FieldCache,
) -> FormulaResult<TypedExpr> {
    let expr = parse(internal)?;
    Typer::new(schema, table_id, field_id, NameResolution::DbColumns, cache)?
        .type_expr(&expr, 0)
}

/// Type a formula-backed field from its stored source, memoized in `cache`.
///
/// Lookup fields have no user-written source; theirs is synthesized from
/// the through/target field names.
pub fn type_field(
    schema: &DatabaseSchema,
    field_id: FieldId,
    cache: &mut FieldCache,
) -> FormulaResult<TypedExpr> {
    if let Some(typed) = cache.typed(field_id) {
        return Ok(typed.clone());
    }

    let field = schema
        .field(field_id)
        .ok_or_else(|| FormulaError::UnknownFieldReference {
            name: format!("field_by_id({})", field_id.0),
        })?;
    let source = formula_source(field).ok_or_else(|| FormulaError::UnknownFieldReference {
        name: field.name.clone(),
    })?;

    cache.start(field_id);
    let result = type_formula(schema, field.table_id, field_id, &source, cache);
    cache.finish(field_id);

    if let Ok(typed) = &result {
        cache.insert_typed(field_id, typed.clone());
    }
    result
}

/// The formula source of a formula-backed field.
pub fn formula_source(field: &FieldSchema) -> Option<String> {
    match &field.kind {
        FieldKind::Formula(meta) => Some(meta.formula.clone()),
        FieldKind::Lookup {
            through_field_name,
            target_field_name,
            ..
        } => Some(format!(
            "lookup('{}','{}')",
            escape(through_field_name),
            escape(target_field_name)
        )),
        _ => None,
    }
}

struct Typer<'a> {
    schema: &'a DatabaseSchema,
    table: &'a TableSchema,
    field_id: FieldId,
    resolution: NameResolution,
    cache: &'a mut FieldCache,
}

impl<'a> Typer<'a> {
    fn new(
        schema: &'a DatabaseSchema,
        table_id: TableId,
        field_id: FieldId,
        resolution: NameResolution,
        cache: &'a mut FieldCache,
    ) -> FormulaResult<Self> {
        let table = schema
            .table(table_id)
            .ok_or_else(|| FormulaError::UnknownFieldReference {
                name: format!("table_{}", table_id.0),
            })?;
        Ok(Self {
            schema,
            table,
            field_id,
            resolution,
            cache,
        })
    }

    fn resolve<'t>(&self, table: &'t TableSchema, name: &str) -> Option<&'t FieldSchema> {
        match self.resolution {
            NameResolution::DisplayNames => table.field_by_name(name),
            NameResolution::DbColumns => table.fields().find(|f| f.db_column() == name),
        }
    }

    fn type_expr(&mut self, expr: &FormulaExpr, depth: usize) -> FormulaResult<TypedExpr> {
        if depth > MAX_FORMULA_DEPTH {
            return Err(FormulaError::MaximumFormulaSize);
        }
        match expr {
            FormulaExpr::StringLiteral(s) => Ok(TypedExpr::string(s.clone())),
            FormulaExpr::IntLiteral(n) => Ok(TypedExpr::number(n.clone(), 0)),
            FormulaExpr::DecimalLiteral(n) => {
                let decimal_places = n.fractional_digit_count().max(0) as u32;
                Ok(TypedExpr::number(n.clone(), decimal_places))
            }
            FormulaExpr::BooleanLiteral(b) => Ok(TypedExpr::boolean(*b)),
            FormulaExpr::FieldReference { name, target: None } => {
                let field = self.resolve(self.table, name).ok_or_else(|| {
                    FormulaError::UnknownFieldReference { name: name.clone() }
                })?;
                if field.id == self.field_id {
                    return Err(FormulaError::SelfReference);
                }
                self.type_field_reference(field)
            }
            FormulaExpr::FieldReference {
                name,
                target: Some(target),
            } => self.type_lookup(name, target),
            FormulaExpr::FieldByIdReference(id) => {
                let field = self.table.field_by_id(*id).ok_or_else(|| {
                    FormulaError::UnknownFieldReference {
                        name: format!("field_by_id({})", id.0),
                    }
                })?;
                if field.id == self.field_id {
                    return Err(FormulaError::SelfReference);
                }
                self.type_field_reference(field)
            }
            FormulaExpr::FunctionCall { name, args } => {
                let typed_args = args
                    .iter()
                    .map(|arg| self.type_expr(arg, depth + 1))
                    .collect::<FormulaResult<Vec<_>>>()?;
                crate::functions::type_call(name, typed_args)
            }
        }
    }

    /// Type a resolved plain `field(...)` reference.
    fn type_field_reference(&mut self, field: &FieldSchema) -> FormulaResult<TypedExpr> {
        match &field.kind {
            FieldKind::Formula(_) | FieldKind::Lookup { .. } => {
                // Same-table formula reference: inline the referenced
                // field's typed tree so the compiled expression does not
                // read a possibly-stale formula column of its own row. A
                // dependency that fails to type makes this reference
                // invalid, not this field's typing fatal.
                match self.type_dependency(field.id) {
                    Ok(inlined) if inlined.ty.is_valid() => Ok(inlined),
                    Err(FormulaError::Schema(e)) => Err(FormulaError::Schema(e)),
                    Err(FormulaError::MaximumFormulaSize) => {
                        Err(FormulaError::MaximumFormulaSize)
                    }
                    Ok(_) | Err(_) => Ok(TypedExpr::field_ref(
                        field.db_column(),
                        FormulaType::Invalid {
                            error: format!("references the invalid field '{}'", field.name),
                        },
                    )),
                }
            }
            FieldKind::Link { .. } => {
                // Reading a link field reads the primary values of the
                // linked rows: many values, reached through the link.
                let primary = self.schema.related_primary_field(field).ok_or_else(|| {
                    FormulaError::UnknownFieldReference {
                        name: field.name.clone(),
                    }
                })?;
                let element = self.remote_scalar_type(primary)?;
                Ok(TypedExpr::lookup_ref(
                    field.db_column(),
                    primary.db_column(),
                    element.array_of(),
                ))
            }
            _ => Ok(TypedExpr::field_ref(
                field.db_column(),
                field.kind.formula_type(),
            )),
        }
    }

    /// Type a `lookup('link', 'target')` traversal.
    fn type_lookup(&mut self, link_name: &str, target_name: &str) -> FormulaResult<TypedExpr> {
        let link = self.resolve(self.table, link_name).ok_or_else(|| {
            FormulaError::UnknownFieldReference {
                name: link_name.to_string(),
            }
        })?;
        if link.id == self.field_id {
            return Err(FormulaError::SelfReference);
        }
        let FieldKind::Link { link_table } = link.kind else {
            return Ok(TypedExpr::field_ref(
                link.db_column(),
                FormulaType::Invalid {
                    error: format!(
                        "the first argument of lookup must be a link field, but '{}' is a {} field",
                        link.name,
                        link.kind.name()
                    ),
                },
            ));
        };
        let related = self.schema.table(link_table).ok_or_else(|| {
            FormulaError::UnknownFieldReference {
                name: target_name.to_string(),
            }
        })?;
        let target = self.resolve(related, target_name).ok_or_else(|| {
            FormulaError::UnknownFieldReference {
                name: target_name.to_string(),
            }
        })?;
        let element = self.remote_scalar_type(target)?;
        Ok(TypedExpr::lookup_ref(
            link.db_column(),
            target.db_column(),
            element.array_of(),
        ))
    }

    /// The scalar type a remote (other-table) field contributes per joined
    /// row. Formula-backed targets are re-typed first so a stale stored
    /// type is never propagated; their values are still read from their
    /// materialized column, not inlined.
    fn remote_scalar_type(&mut self, field: &FieldSchema) -> FormulaResult<FormulaType> {
        let ty = if field.is_formula() {
            match self.type_dependency(field.id) {
                Ok(typed) => typed.ty,
                Err(FormulaError::Schema(e)) => return Err(FormulaError::Schema(e)),
                Err(FormulaError::MaximumFormulaSize) => {
                    return Err(FormulaError::MaximumFormulaSize)
                }
                Err(_) => FormulaType::Invalid {
                    error: String::new(),
                },
            }
        } else {
            field.kind.formula_type()
        };
        if ty.is_valid() {
            Ok(ty.unwrap_array().clone())
        } else {
            Ok(FormulaType::Invalid {
                error: format!("references the invalid field '{}'", field.name),
            })
        }
    }

    /// Type another formula field this one depends on, memoized per pass.
    fn type_dependency(&mut self, field_id: FieldId) -> FormulaResult<TypedExpr> {
        if let Some(typed) = self.cache.typed(field_id) {
            return Ok(typed.clone());
        }
        // The dependency graph is a DAG by construction; revisiting a field
        // mid-visit means the graph invariant was broken upstream.
        debug_assert!(
            !self.cache.is_in_progress(field_id),
            "dependency cycle reached the typer for field {}",
            field_id
        );
        if self.cache.is_in_progress(field_id) {
            return Err(FormulaError::CircularReference);
        }
        type_field(self.schema, field_id, self.cache)
    }
}
