//! Per-step expression simplification.

use tessera_expr::{simplify_shallow, CompileResult};

use crate::hint::StepHint;
use crate::steps::ExprRole;
use crate::trace::Trace;

use super::Pass;

/// Simplify every expression in every step, with type hints derived from
/// the step chain below it. Hoisted sub-traces are already simplified and
/// are not entered.
pub(super) struct SimplifySteps;

impl Pass for SimplifySteps {
    fn name(&self) -> &'static str {
        "simplify"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let mut changed = false;
        for i in 0..t.steps.len() {
            let (below, rest) = t.steps.split_at_mut(i);
            let hint = StepHint::new(below);
            rest[0].rewrite_exprs(&mut |e, role| {
                if role == ExprRole::Table {
                    return e;
                }
                let out = simplify_shallow(e.clone(), &hint);
                if out != e {
                    changed = true;
                }
                out
            });
        }
        Ok(changed)
    }
}
