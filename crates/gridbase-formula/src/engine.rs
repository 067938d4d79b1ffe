//! Storage engine expression trees
//!
//! The narrow interface between the formula subsystem and whatever executes
//! queries. The compiler lowers a [`crate::typed::TypedExpr`] into this
//! tree; the storage layer renders it into its own query language. Nothing
//! in here knows about field names or formula types, only columns, literal
//! values and engine primitives.

use gridbase_core::{FormulaType, Result, RowValue, TableId};

/// A compiled expression ready to hand to the storage engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineExpr {
    /// A constant value.
    Literal(RowValue),
    /// A column of the row being computed.
    Column { name: String },
    /// An explicit cast.
    Cast { expr: Box<EngineExpr>, to: CastType },
    /// A primitive engine operation applied to arguments.
    Op { op: EngineOp, args: Vec<EngineExpr> },
    /// A structured JSON object, used for single select values which always
    /// serialize as `{id, value, color}`.
    JsonObject(Vec<(String, EngineExpr)>),
    /// `CASE WHEN cond THEN a ELSE b END`.
    Case {
        when: Box<EngineExpr>,
        then: Box<EngineExpr>,
        otherwise: Box<EngineExpr>,
    },
    /// An aggregate computed over related rows reached through a chain of
    /// link joins, correlated on the row being computed.
    AggregateSubquery {
        aggregate: AggOp,
        args: Vec<EngineExpr>,
        joins: Vec<Join>,
    },
}

/// One hop through a link relation inside an aggregate subquery
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// The relation (junction) backing the link field.
    pub relation: String,
    /// The link column joined through.
    pub via_column: String,
    /// Joined rows of trashed relations never contribute values.
    pub exclude_trashed: bool,
}

impl Join {
    pub fn through(via_column: impl Into<String>) -> Self {
        let via_column = via_column.into();
        Self {
            relation: format!("{}_relation", via_column),
            via_column,
            exclude_trashed: true,
        }
    }
}

/// Scalar engine primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOp {
    Add,
    Sub,
    Mul,
    Div,
    Concat,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    And,
    Or,
    Not,
    IsNull,
    Upper,
    Lower,
    Length,
    Replace,
    ToDate,
    ToInterval,
    Day,
    DateDiff,
    DateTimeFormat,
    /// The id of the row being computed.
    RowId,
}

/// Aggregations available inside [`EngineExpr::AggregateSubquery`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggOp {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    /// True if any joined value is true.
    BoolOr,
    /// True if every joined value is true.
    BoolAnd,
    /// String-join the values with a separator (second argument).
    JoinString,
    /// Collect every joined value into one array value; how a bare lookup
    /// expression materializes without an explicit aggregate around it.
    ArrayAgg,
}

/// Target types for [`EngineExpr::Cast`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastType {
    Text,
    Numeric { decimal_places: u32 },
    Boolean,
    Date,
    Timestamp,
    Interval,
}

/// The schema-mutation hooks the recalculation engine drives.
///
/// Implemented by the storage layer; tests use [`NullStorageEngine`].
pub trait StorageEngine {
    /// Change the database column type backing a formula field whose
    /// resolved type changed. Failures abort the recalculation unit.
    fn alter_column(
        &mut self,
        table: TableId,
        column: &str,
        new_type: &FormulaType,
    ) -> Result<()>;
}

/// A no-op engine for passes that only need typing side effects.
#[derive(Debug, Default)]
pub struct NullStorageEngine;

impl StorageEngine for NullStorageEngine {
    fn alter_column(&mut self, _: TableId, _: &str, _: &FormulaType) -> Result<()> {
        Ok(())
    }
}
