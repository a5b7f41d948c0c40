//! Final-binding freezing and pseudo-table removal.

use tessera_expr::{CompileResult, Expr};

use crate::steps::Step;
use crate::trace::Trace;

use super::Pass;

/// Lock explicit names on the final bindings. Downstream, the identity of
/// a column is its name, so the final list is normalised to explicit
/// name-to-name references.
pub(super) struct FreezeFinal;

impl Pass for FreezeFinal {
    fn name(&self) -> &'static str {
        "freezefinal"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let mut changed = false;
        for b in t.final_bindings_mut() {
            let name = b.result();
            if name.is_empty() {
                // postcheck reports this as an internal error
                continue;
            }
            if !b.explicit() {
                b.set_name(name.clone());
                changed = true;
            }
            let canonical = Expr::path(name);
            if b.expr != canonical {
                b.expr = canonical;
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// Splice out `PseudoTable` markers left behind by FROM sub-selects.
pub(super) struct SubFlatten;

impl Pass for SubFlatten {
    fn name(&self) -> &'static str {
        "subflatten"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let before = t.steps.len();
        t.steps.retain(|s| !matches!(s, Step::PseudoTable));
        Ok(t.steps.len() != before)
    }
}
