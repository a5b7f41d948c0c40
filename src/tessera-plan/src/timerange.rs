//! Time-range filter pruning.
//!
//! When the environment exposes a block index for the scanned table,
//! comparisons between a timestamp path and a timestamp literal can be
//! decided at compile time whenever the index's min/max range proves them
//! constant. The folded TRUE/FALSE literals are cleaned up by the
//! filter-elimination pass.

use tessera_expr::{lit, walk::rewrite_fn, CmpOp, Expr, Literal};

use crate::build::BuildCtx;
use crate::env::Index;
use crate::steps::Step;
use crate::trace::Trace;

pub(crate) fn prune_time_filters(ctx: &mut BuildCtx<'_>, t: &mut Trace) {
    let Some(Step::Scan(scan)) = t.steps.first() else {
        return;
    };
    let index = match ctx.env.index(&scan.table.expr) {
        Ok(Some(ix)) => ix,
        Ok(None) => return,
        Err(e) => {
            // transient index errors mean "no index available"
            log::debug!("index unavailable for {}: {e}", scan.table.expr);
            return;
        }
    };
    for step in t.steps.iter_mut().skip(1) {
        match step {
            Step::Filter(f) => {
                let pred = std::mem::replace(&mut f.predicate, Expr::Star);
                f.predicate = rewrite_fn(pred, &mut |e| prune_one(index.as_ref(), e));
            }
            // past a projection or row-shape change, paths no longer name
            // scan fields
            Step::Bind(_)
            | Step::BindStar
            | Step::Aggregate(_)
            | Step::Unpivot(_)
            | Step::Iterate(_) => break,
            _ => {}
        }
    }
}

fn prune_one(ix: &dyn Index, e: Expr) -> Expr {
    let Expr::Compare { op, left, right } = &e else {
        return e;
    };
    let (path_expr, value, op) = match (left.as_ref(), right.as_ref()) {
        (p @ Expr::Path(_), Expr::Lit(Literal::Timestamp(v))) => (p, *v, *op),
        (Expr::Lit(Literal::Timestamp(v)), p @ Expr::Path(_)) => (p, *v, op.flip()),
        _ => return e,
    };
    let Some((min, max)) = ix.time_range(path_expr) else {
        return e;
    };
    let decided = match op {
        CmpOp::Lt => range_decide(max < value, min >= value),
        CmpOp::Le => range_decide(max <= value, min > value),
        CmpOp::Gt => range_decide(min > value, max <= value),
        CmpOp::Ge => range_decide(min >= value, max < value),
        CmpOp::Eq => {
            if value < min || value > max {
                Some(false)
            } else if min == max && min == value {
                Some(true)
            } else {
                None
            }
        }
        CmpOp::Ne => {
            if value < min || value > max {
                Some(true)
            } else if min == max && min == value {
                Some(false)
            } else {
                None
            }
        }
    };
    match decided {
        Some(b) => lit(b),
        None => e,
    }
}

fn range_decide(always: bool, never: bool) -> Option<bool> {
    if always {
        Some(true)
    } else if never {
        Some(false)
    } else {
        None
    }
}
