//! Ordering and limit passes.

use tessera_expr::CompileResult;

use crate::steps::Step;
use crate::trace::Trace;

use super::Pass;

/// Drop sorts whose order no step downstream observes: a later aggregate
/// or distinct consumes rows order-insensitively, and a later sort
/// overrides the earlier one.
pub(super) struct OrderElim;

impl Pass for OrderElim {
    fn name(&self) -> &'static str {
        "orderelim"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let mut changed = false;
        let mut destroyed = false;
        let mut idx = t.steps.len();
        while idx > 0 {
            idx -= 1;
            match &t.steps[idx] {
                Step::Aggregate(_) | Step::Distinct(_) => destroyed = true,
                Step::Order(_) => {
                    if destroyed {
                        t.steps.remove(idx);
                        changed = true;
                    } else {
                        // the surviving sort overrides anything below it
                        destroyed = true;
                    }
                }
                _ => {}
            }
        }
        Ok(changed)
    }
}

/// Compose stacked limits and push limits below streaming projections.
pub(super) struct LimitPushdown;

impl Pass for LimitPushdown {
    fn name(&self) -> &'static str {
        "limitpushdown"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let mut changed = false;
        loop {
            let mut progress = false;
            for i in 1..t.steps.len() {
                let Step::LimitOffset(outer) = &t.steps[i] else {
                    continue;
                };
                let outer = *outer;
                enum Prev {
                    Compose(crate::steps::LimitStep),
                    Swap,
                    Stop,
                }
                let prev = match &t.steps[i - 1] {
                    Step::LimitOffset(inner) => Prev::Compose(*inner),
                    p if p.is_streaming_projection() => Prev::Swap,
                    _ => Prev::Stop,
                };
                match prev {
                    Prev::Compose(inner) => {
                        t.steps[i - 1] = Step::LimitOffset(inner.compose(outer));
                        t.steps.remove(i);
                        progress = true;
                    }
                    Prev::Swap => {
                        t.steps.swap(i - 1, i);
                        progress = true;
                    }
                    Prev::Stop => {}
                }
                if progress {
                    break;
                }
            }
            if !progress {
                break;
            }
            changed = true;
        }
        Ok(changed)
    }
}
