//! Built-in formula functions
//!
//! Every function is a fixed-shape [`FunctionDef`] record in a process-wide
//! registry: argument count, per-position argument checkers, an aggregate
//! flag, a typing rule and a compile rule. Adding a function means adding
//! one record; nothing else in the typer or compiler changes.
//!
//! Functions here carry typing contracts and lowering rules only; the
//! runtime semantics live in the storage engine that executes the compiled
//! expression.

pub mod aggregate;
pub mod date;
pub mod logic;
pub mod math;
pub mod text;

use std::fmt;

use ahash::AHashMap;
use gridbase_core::FormulaType;
use once_cell::sync::Lazy;

use crate::engine::{CastType, EngineExpr, EngineOp};
use crate::error::{FormulaError, FormulaResult};
use crate::typed::TypedExpr;

/// Typing rule: computes the result type from already-validated arguments.
pub type TypeRule = fn(&[TypedExpr]) -> FormulaType;

/// Compile rule: lowers a validated call into an engine expression, given
/// the typed call node and its already-compiled arguments.
pub type CompileRule = fn(&TypedExpr, Vec<EngineExpr>) -> EngineExpr;

/// Argument count constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgCount {
    Exactly(usize),
    AtLeast(usize),
}

impl ArgCount {
    pub fn accepts(&self, n: usize) -> bool {
        match self {
            ArgCount::Exactly(count) => n == *count,
            ArgCount::AtLeast(min) => n >= *min,
        }
    }
}

impl fmt::Display for ArgCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgCount::Exactly(1) => write!(f, "exactly 1 argument"),
            ArgCount::Exactly(n) => write!(f, "exactly {} arguments", n),
            ArgCount::AtLeast(n) => write!(f, "more than {} arguments", n.saturating_sub(1)),
        }
    }
}

/// Per-position argument type checker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// Any valid type.
    Any,
    Number,
    Text,
    Boolean,
    Date,
    NumberOrText,
    NumberOrDate,
    /// Any type the ordering operators can work with; the typing rule
    /// additionally checks the two sides against each other.
    Comparable,
}

impl ArgType {
    pub fn check(&self, ty: &FormulaType) -> bool {
        use FormulaType::*;
        match self {
            ArgType::Any => ty.is_valid(),
            ArgType::Number => matches!(ty, Number { .. }),
            ArgType::Text => matches!(ty, Text),
            ArgType::Boolean => matches!(ty, Boolean),
            ArgType::Date => matches!(ty, Date { .. }),
            ArgType::NumberOrText => matches!(ty, Number { .. } | Text),
            ArgType::NumberOrDate => matches!(ty, Number { .. } | Date { .. }),
            ArgType::Comparable => matches!(
                ty,
                Number { .. } | Text | Boolean | Date { .. } | DateInterval
            ),
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArgType::Any => "any value",
            ArgType::Number => "a number",
            ArgType::Text => "text",
            ArgType::Boolean => "a boolean",
            ArgType::Date => "a date",
            ArgType::NumberOrText => "a number or text",
            ArgType::NumberOrDate => "a number or a date",
            ArgType::Comparable => "a comparable value",
        };
        write!(f, "{}", s)
    }
}

/// Function definition
#[derive(Debug)]
pub struct FunctionDef {
    /// Function name (lowercase)
    pub name: &'static str,
    pub arg_count: ArgCount,
    /// Per-position checkers; the last one repeats for variadic functions.
    pub arg_types: &'static [ArgType],
    /// Aggregate functions require at least one array argument and collapse
    /// it to a scalar result.
    pub aggregate: bool,
    /// True if the value can only be computed once the row exists, so an
    /// INSERT must be followed by a refresh UPDATE.
    pub requires_refresh_after_insert: bool,
    pub type_rule: TypeRule,
    pub compile_rule: CompileRule,
}

/// Function registry
pub struct FunctionRegistry {
    functions: AHashMap<&'static str, FunctionDef>,
}

impl FunctionRegistry {
    fn new() -> Self {
        let mut registry = Self {
            functions: AHashMap::new(),
        };

        text::register(&mut registry);
        math::register(&mut registry);
        logic::register(&mut registry);
        date::register(&mut registry);
        aggregate::register(&mut registry);

        // row_id: the value does not exist until the row is inserted.
        registry.register(FunctionDef {
            name: "row_id",
            arg_count: ArgCount::Exactly(0),
            arg_types: &[],
            aggregate: false,
            requires_refresh_after_insert: true,
            type_rule: |_| FormulaType::Number { decimal_places: 0 },
            compile_rule: |_, _| EngineExpr::Op {
                op: EngineOp::RowId,
                args: vec![],
            },
        });

        registry
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name)
    }

    pub(crate) fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name, def);
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.keys().copied()
    }
}

static REGISTRY: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::new);

/// The process-wide registry of built-in functions.
pub fn registry() -> &'static FunctionRegistry {
    &REGISTRY
}

/// Validate and type a function call.
///
/// Unknown function names are hard errors (they block saving the field);
/// every other failure produces an `Invalid`-typed node so the diagnostic
/// lands on the field instead of aborting the pass.
pub fn type_call(name: &str, args: Vec<TypedExpr>) -> FormulaResult<TypedExpr> {
    let def = registry()
        .get(name)
        .ok_or_else(|| FormulaError::InvalidFunction(name.to_string()))?;

    // An invalid argument collapses the whole call to that diagnostic.
    if let Some(bad) = args.iter().find(|a| !a.ty.is_valid()) {
        let ty = bad.ty.clone();
        return Ok(TypedExpr::call(def, args, ty));
    }

    if !def.arg_count.accepts(args.len()) {
        let error = format!(
            "'{}' was called with the wrong number of arguments: it must be called with {} but was given {}",
            name,
            def.arg_count,
            args.len()
        );
        return Ok(TypedExpr::call(def, args, FormulaType::Invalid { error }));
    }

    if def.aggregate {
        if !args.iter().any(|a| a.ty.is_array()) {
            let error = format!(
                "the argument given to '{}' must be an aggregate formula, e.g. a lookup or a link field reference",
                name
            );
            return Ok(TypedExpr::call(def, args, FormulaType::Invalid { error }));
        }
    } else if let Some(pos) = args.iter().position(|a| a.ty.is_array()) {
        let error = format!(
            "argument {} of '{}' produces many values and must be directly wrapped by an aggregate function like sum, avg, count etc",
            pos + 1,
            name
        );
        return Ok(TypedExpr::call(def, args, FormulaType::Invalid { error }));
    }

    if !def.arg_types.is_empty() {
        for (i, arg) in args.iter().enumerate() {
            let expected = def.arg_types[i.min(def.arg_types.len() - 1)];
            // Aggregate functions check the element type of their arrays.
            if !expected.check(arg.ty.unwrap_array()) {
                let error = format!(
                    "argument {} of '{}' must be {}, but was {}",
                    i + 1,
                    name,
                    expected,
                    arg.ty.name()
                );
                return Ok(TypedExpr::call(def, args, FormulaType::Invalid { error }));
            }
        }
    }

    let ty = (def.type_rule)(&args);
    Ok(TypedExpr::call(def, args, ty))
}

// === Shared rule helpers ===

/// Result scale for binary numeric operations: the widest operand scale.
pub(crate) fn max_decimal_places(args: &[TypedExpr]) -> u32 {
    args.iter()
        .filter_map(|a| match a.ty.unwrap_array() {
            FormulaType::Number { decimal_places } => Some(*decimal_places),
            _ => None,
        })
        .max()
        .unwrap_or(0)
}

/// Wrap a compiled argument with a text cast unless it already is text.
pub(crate) fn cast_to_text(ty: &FormulaType, expr: EngineExpr) -> EngineExpr {
    match ty.unwrap_array() {
        FormulaType::Text => expr,
        _ => EngineExpr::Cast {
            expr: Box::new(expr),
            to: CastType::Text,
        },
    }
}
