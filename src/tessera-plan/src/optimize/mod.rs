//! The optimizer pipeline.
//!
//! A fixed, ordered sequence of rewrite passes over a built trace. The
//! order is part of the contract: later passes rely on shapes established
//! by earlier ones (filter pushdown assumes simplification has normalised
//! boolean predicates, projection merging runs both before and after
//! elimination, the post-check freezes the invariants the executor relies
//! on). Every pass is idempotent on its own output, so running the whole
//! pipeline twice is a no-op.

mod aggregates;
mod filters;
mod freeze;
mod joinelim;
mod order;
mod post;
mod projections;
mod replace;
mod simplify;
mod strength;

pub use post::postcheck;
pub(crate) use projections::substitute;

use tessera_expr::CompileResult;

use crate::trace::Trace;

/// One optimization pass over a trace.
pub(crate) trait Pass {
    /// The pass name, for logs and traces.
    fn name(&self) -> &'static str;

    /// Apply the pass, reporting whether the trace changed.
    fn apply(&self, t: &mut Trace) -> CompileResult<bool>;
}

/// A record of one pass application, for diagnostics.
#[derive(Debug, Clone)]
pub struct PassTrace {
    /// The pass that ran.
    pub pass: &'static str,
    /// The trace rendering before the pass.
    pub before: String,
    /// The trace rendering after the pass.
    pub after: String,
}

fn pipeline() -> Vec<Box<dyn Pass>> {
    vec![
        Box::new(freeze::FreezeFinal),
        Box::new(freeze::SubFlatten),
        Box::new(simplify::SimplifySteps),
        Box::new(aggregates::AggElim),
        Box::new(aggregates::AggFilter),
        Box::new(order::OrderElim),
        Box::new(projections::ProjectPushdown),
        Box::new(projections::LiftProjectAgg),
        Box::new(aggregates::DistinctElim),
        Box::new(aggregates::CountDistinctToCount),
        Box::new(strength::StrengthReduce),
        Box::new(filters::FilterElim),
        Box::new(filters::FilterPushdown),
        Box::new(order::LimitPushdown),
        Box::new(joinelim::JoinElim),
        Box::new(projections::ProjectElim),
        Box::new(projections::ProjectPushdown),
        Box::new(simplify::SimplifySteps),
        Box::new(post::PostCheck),
        Box::new(post::Partition),
        Box::new(replace::MergeReplacements),
    ]
}

/// Run the full pass pipeline over a trace.
pub fn optimize(t: &mut Trace) -> CompileResult<()> {
    for pass in pipeline() {
        if pass.apply(t)? {
            log::trace!("optimizer pass {} rewrote the trace", pass.name());
        }
    }
    Ok(())
}

/// Run the pipeline, recording a before/after rendering for every pass
/// that changed the trace.
pub fn optimize_with_trace(t: &mut Trace) -> CompileResult<Vec<PassTrace>> {
    let mut traces = Vec::new();
    for pass in pipeline() {
        let before = t.explain();
        if pass.apply(t)? {
            traces.push(PassTrace {
                pass: pass.name(),
                before,
                after: t.explain(),
            });
        }
    }
    Ok(traces)
}
