//! # gridbase-formula
//!
//! The formula subsystem of gridbase: everything between a user typing
//! `sum(lookup('Orders', 'Total'))` into a field and the storage engine
//! receiving an expression it can execute.
//!
//! This crate provides:
//! - Formula parsing (text → AST) with syntax-preserving rename rewrites
//! - Typing (AST → [`typed::TypedExpr`]) against a schema, including
//!   same-table inlining and lookup traversals
//! - A registry of built-in functions with typing and lowering rules
//! - Field dependency extraction and the database-wide dependency graph
//! - The recalculation engine that keeps formula metadata consistent
//!   across schema mutations and language-version upgrades
//! - Compilation of typed trees into storage-engine expressions, in bulk,
//!   single-row and insert modes
//!
//! ## Example
//!
//! ```rust,ignore
//! use gridbase_formula::{parse, typer, compile};
//!
//! let mut cache = FieldCache::new();
//! let typed = typer::type_formula(&schema, table_id, field_id, "field('Cost') * 2", &mut cache)?;
//! let expr = compile::compile(&typed, &CompileContext::BulkUpdate);
//! ```

pub mod ast;
pub mod cache;
pub mod compile;
pub mod deps;
pub mod engine;
pub mod error;
pub mod functions;
pub mod parser;
pub mod recalc;
pub mod typed;
pub mod typer;

pub use ast::FormulaExpr;
pub use cache::FieldCache;
pub use compile::{compile, requires_refresh_after_insert, CompileContext};
pub use deps::{extract_dependencies, DependencyGraph, FieldDependency, ViaPath};
pub use engine::{AggOp, CastType, EngineExpr, EngineOp, Join, NullStorageEngine, StorageEngine};
pub use error::{FormulaError, FormulaResult, ParseError};
pub use functions::{registry, ArgCount, ArgType, FunctionDef, FunctionRegistry};
pub use parser::rename::{rename_field_references, replace_field_by_id};
pub use parser::{parse, MAX_FORMULA_DEPTH};
pub use recalc::{
    EpochGuard, EpochLock, MutexEpochLock, PendingUpdate, RecalcEngine, FORMULA_VERSION,
};
pub use typed::{TypedExpr, TypedExprKind};
pub use typer::{type_expression, type_field, type_formula, type_internal_formula, NameResolution};
