//! Expression kernel for the tessera query compiler.
//!
//! `tessera-expr` provides the AST node model shared by the whole compiler,
//! plus the pure operations the trace builder and optimizer are built from:
//!
//! - **Node model**: the closed [`Expr`] variant set (paths, literals,
//!   operators, aggregates, nested SELECTs, table constructs, `*`)
//! - **Walk/rewrite**: structural traversal with early abort and post-order
//!   rewriting ([`walk`])
//! - **Simplification**: constant folding and identity collapse under a
//!   caller-supplied type hint ([`simplify`])
//! - **Equivalence**: syntactic equivalence for ORDER BY/SELECT matching
//!   ([`equivalent`])
//! - **Type inference**: bitmask type sets that track exactly when an
//!   expression can produce MISSING ([`types`])
//! - **Copy**: deep copy through the binary codec ([`copy`])
//! - **Check**: semantic validation of SELECT statements ([`check`])
//!
//! All operations are pure; errors surface only through
//! [`CompileError`], which carries the offending node for diagnostics.
//!
//! # Example
//!
//! ```rust
//! use tessera_expr::{lit, path, simplify, CmpOp, Expr, NoHint};
//!
//! let pred = Expr::compare(CmpOp::Gt, path("a"), lit(1i64)).and(lit(true));
//! let simplified = simplify(pred, &NoHint);
//! assert_eq!(simplified, Expr::compare(CmpOp::Gt, path("a"), lit(1i64)));
//! ```

mod check;
mod copy;
mod error;
mod expr;
mod simplify;
mod types;
pub mod walk;

pub use check::check;
pub use copy::{copy, copy_select};
pub use error::{CompileError, CompileResult};
pub use expr::{
    conjoin, conjuncts, equivalent, lit, path, Accessor, AggOp, Aggregate, ArithOp, Binding,
    BuiltinFunc, Call, CmpOp, Cte, Expr, FromClause, IsKey, JoinKind, Literal, LogicOp, OrderKey, Path,
    Query, SelectStmt, Unpivot, Window,
};
pub use simplify::{simplify, simplify_shallow};
pub use types::{can_be_missing, is_key_constant, literal_type, type_of, NoHint, TypeHint, TypeSet};
pub use walk::{has_aggregate, walk_fn};
