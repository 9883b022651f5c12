//! relc Intermediate Representation (IR)
//!
//! Immutable operator trees: typed scalar expressions (`Expr`) and
//! relational nodes (`Rel`) whose output schemas are resolved at
//! construction. `PlanSpec` is the JSON wire form of the same trees.

mod error;
pub mod expr;
pub mod plan;
pub mod rel;
mod types;

pub use error::{IrError, IrResult};
pub use expr::{
    count_star, dense_rank, lit, rank, row_number, AggFunc, BinaryOp, ColumnRef, DatePart, Expr,
    ExprKind, NamedExpr, ScalarFunc, SortKey, UnaryOp, Value, WindowFunc,
};
pub use plan::{
    CaseBranchSpec, ExprSpec, InMemoryCatalog, NamedExprSpec, PlanSpec, SchemaProvider,
    SortKeySpec, TableSchema,
};
pub use rel::{GroupedRel, JoinKind, JoinSide, Origin, Rel, RelExt, RelKind, RelNode};
pub use types::*;
