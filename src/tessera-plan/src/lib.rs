//! Trace builder and optimizer for the tessera query compiler.
//!
//! `tessera-plan` lowers a parsed PartiQL [`Query`](tessera_expr::Query)
//! into an optimized [`Trace`]: an ordered, linear chain of relational
//! steps (scan, filter, bind, aggregate, distinct, order, limit, unpivot,
//! output) plus a list of hoisted replacement sub-traces that the step
//! expressions reference by integer index. The optimized trace is the
//! contract handed to the vector execution layer.
//!
//! # Pipeline
//!
//! `Query AST -> [build] -> Trace -> [optimizer passes] -> canonical Trace`
//!
//! [`build`] walks SELECT clauses in binding order, rewrites windowed
//! aggregates into hash-lookup joins, hoists sub-queries into replacements
//! with cardinality analysis (so the runtime never recurses), and then
//! runs a fixed, ordered pipeline of algebraic rewrites that converges to
//! the canonical shape the executor consumes.
//!
//! # Example
//!
//! ```rust
//! use tessera_expr::{lit, path, Binding, CmpOp, Expr, FromClause, Query, SelectStmt};
//! use tessera_plan::{build, NoEnv, Step};
//!
//! // SELECT a FROM t WHERE a > 1
//! let query = Query::from_select(SelectStmt {
//!     columns: vec![Binding::new(path("a"))],
//!     from: Some(FromClause::Table(Binding::new(path("t")))),
//!     where_clause: Some(Expr::compare(CmpOp::Gt, path("a"), lit(1i64))),
//!     ..SelectStmt::default()
//! });
//! let trace = build(&query, &NoEnv).unwrap();
//! assert!(matches!(trace.steps[0], Step::Scan(_)));
//! assert!(matches!(trace.steps[1], Step::Filter(_)));
//! assert!(matches!(trace.steps[2], Step::Bind(_)));
//! ```
//!
//! The whole crate is single-threaded and purely computational: nothing
//! here suspends, performs I/O, or touches shared state. A finished trace
//! is safe to share read-only across executor threads.

mod build;
pub mod env;
mod hint;
mod hoist;
mod optimize;
mod render;
pub mod steps;
mod timerange;
mod trace;
mod windows;

pub use build::build;
pub use env::{Env, Index, NoEnv, SchemaHint};
pub use hint::StepHint;
pub use optimize::{optimize, optimize_with_trace, postcheck, PassTrace};
pub use render::to_query;
pub use steps::{
    AggregateStep, BindStep, DistinctStep, ExprRole, FilterStep, IterateStep, LimitStep,
    OrderStep, OutputStep, ScanStep, Step, UnpivotStep,
};
pub use trace::{SizeClass, Trace, TraceId, EXACT_SMALL_LIMIT};
