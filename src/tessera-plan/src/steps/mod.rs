//! Trace steps.
//!
//! A trace is an ordered, linear chain of steps; this module provides the
//! closed step set a downstream engine must handle. Each step exposes its
//! expressions for visiting and rewriting, tagged with the role they play,
//! so the optimizer passes can treat predicates, projections, and table
//! references differently.

mod aggregate;
mod bind;
mod filter;
mod order;
mod scan;

pub use aggregate::AggregateStep;
pub use bind::BindStep;
pub use filter::{DistinctStep, FilterStep};
pub use order::{LimitStep, OrderStep, UnpivotStep};
pub use scan::{IterateStep, OutputStep, ScanStep};

use serde::{Deserialize, Serialize};

use tessera_expr::Expr;

/// The position an expression occupies within a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprRole {
    /// A value-producing expression (projection, grouping, order key).
    Scalar,
    /// A boolean row predicate.
    Predicate,
    /// A table reference (scan or iteration source).
    Table,
}

/// One node in a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    /// Leaf; sources a table expression.
    Scan(ScanStep),
    /// Cross-product iteration over a list-producing expression.
    Iterate(IterateStep),
    /// Retains rows where the predicate is TRUE.
    Filter(FilterStep),
    /// Projection producing a new set of named columns.
    Bind(BindStep),
    /// Projection passing through every input field.
    BindStar,
    /// Grouped aggregation.
    Aggregate(AggregateStep),
    /// Distinct-on; an empty expression list means distinct-row.
    Distinct(DistinctStep),
    /// Sort.
    Order(OrderStep),
    /// LIMIT/OFFSET.
    LimitOffset(LimitStep),
    /// Row-per-field expansion of a structure.
    Unpivot(UnpivotStep),
    /// INTO sink.
    Output(OutputStep),
    /// Zero-row source (empty FROM).
    DummyOutput,
    /// Transient marker erased during optimization.
    PseudoTable,
}

impl Step {
    /// The step name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scan(_) => "Scan",
            Self::Iterate(_) => "Iterate",
            Self::Filter(_) => "Filter",
            Self::Bind(_) => "Bind",
            Self::BindStar => "BindStar",
            Self::Aggregate(_) => "Aggregate",
            Self::Distinct(_) => "Distinct",
            Self::Order(_) => "Order",
            Self::LimitOffset(_) => "LimitOffset",
            Self::Unpivot(_) => "Unpivot",
            Self::Output(_) => "Output",
            Self::DummyOutput => "DummyOutput",
            Self::PseudoTable => "PseudoTable",
        }
    }

    /// Visit every expression held by this step.
    pub fn visit_exprs(&self, f: &mut dyn FnMut(&Expr, ExprRole)) {
        match self {
            Self::Scan(s) => f(&s.table.expr, ExprRole::Table),
            Self::Iterate(it) => f(&it.binding.expr, ExprRole::Table),
            Self::Filter(fi) => f(&fi.predicate, ExprRole::Predicate),
            Self::Bind(b) => {
                for binding in &b.bindings {
                    f(&binding.expr, ExprRole::Scalar);
                }
            }
            Self::Aggregate(a) => {
                for g in &a.group_by {
                    f(&g.expr, ExprRole::Scalar);
                }
                for agg in &a.aggs {
                    f(&agg.expr, ExprRole::Scalar);
                }
            }
            Self::Distinct(d) => {
                for e in &d.exprs {
                    f(e, ExprRole::Scalar);
                }
            }
            Self::Order(o) => {
                for k in &o.keys {
                    f(&k.expr, ExprRole::Scalar);
                }
            }
            Self::Output(o) => f(&o.path, ExprRole::Table),
            Self::BindStar
            | Self::LimitOffset(_)
            | Self::Unpivot(_)
            | Self::DummyOutput
            | Self::PseudoTable => {}
        }
    }

    /// Rewrite every expression held by this step.
    pub fn rewrite_exprs(&mut self, f: &mut dyn FnMut(Expr, ExprRole) -> Expr) {
        let take = |slot: &mut Expr| std::mem::replace(slot, Expr::Star);
        match self {
            Self::Scan(s) => {
                let e = take(&mut s.table.expr);
                s.table.expr = f(e, ExprRole::Table);
            }
            Self::Iterate(it) => {
                let e = take(&mut it.binding.expr);
                it.binding.expr = f(e, ExprRole::Table);
            }
            Self::Filter(fi) => {
                let e = take(&mut fi.predicate);
                fi.predicate = f(e, ExprRole::Predicate);
            }
            Self::Bind(b) => {
                for binding in &mut b.bindings {
                    let e = take(&mut binding.expr);
                    binding.expr = f(e, ExprRole::Scalar);
                }
            }
            Self::Aggregate(a) => {
                for g in &mut a.group_by {
                    let e = take(&mut g.expr);
                    g.expr = f(e, ExprRole::Scalar);
                }
                for agg in &mut a.aggs {
                    let e = take(&mut agg.expr);
                    agg.expr = f(e, ExprRole::Scalar);
                }
            }
            Self::Distinct(d) => {
                for slot in &mut d.exprs {
                    let e = take(slot);
                    *slot = f(e, ExprRole::Scalar);
                }
            }
            Self::Order(o) => {
                for k in &mut o.keys {
                    let e = take(&mut k.expr);
                    k.expr = f(e, ExprRole::Scalar);
                }
            }
            Self::Output(o) => {
                let e = take(&mut o.path);
                o.path = f(e, ExprRole::Table);
            }
            Self::BindStar
            | Self::LimitOffset(_)
            | Self::Unpivot(_)
            | Self::DummyOutput
            | Self::PseudoTable => {}
        }
    }

    /// Whether this step passes rows through one-for-one in input order.
    pub fn is_streaming_projection(&self) -> bool {
        matches!(self, Self::Bind(_) | Self::BindStar)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scan(s) => write!(f, "{s}"),
            Self::Iterate(s) => write!(f, "{s}"),
            Self::Filter(s) => write!(f, "{s}"),
            Self::Bind(s) => write!(f, "{s}"),
            Self::BindStar => write!(f, "BindStar"),
            Self::Aggregate(s) => write!(f, "{s}"),
            Self::Distinct(s) => write!(f, "{s}"),
            Self::Order(s) => write!(f, "{s}"),
            Self::LimitOffset(s) => write!(f, "{s}"),
            Self::Unpivot(s) => write!(f, "{s}"),
            Self::Output(s) => write!(f, "{s}"),
            Self::DummyOutput => write!(f, "DummyOutput"),
            Self::PseudoTable => write!(f, "PseudoTable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_expr::{lit, path, Binding, CmpOp};

    #[test]
    fn test_visit_roles() {
        let step = Step::Filter(FilterStep::new(Expr::compare(
            CmpOp::Gt,
            path("a"),
            lit(1i64),
        )));
        let mut roles = Vec::new();
        step.visit_exprs(&mut |_, role| roles.push(role));
        assert_eq!(roles, vec![ExprRole::Predicate]);
    }

    #[test]
    fn test_rewrite_exprs() {
        let mut step = Step::Bind(BindStep::new(vec![Binding::named(path("a"), "a")]));
        step.rewrite_exprs(&mut |_, _| path("b"));
        if let Step::Bind(b) = &step {
            assert_eq!(b.bindings[0].expr, path("b"));
        } else {
            panic!("expected Bind");
        }
    }

    #[test]
    fn test_display() {
        let step = Step::Scan(ScanStep::new(Binding::named(path("t"), "t")));
        assert_eq!(step.to_string(), "Scan: t AS t");
        assert_eq!(Step::DummyOutput.to_string(), "DummyOutput");
    }
}
