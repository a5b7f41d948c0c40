//! Shape specializations.

use std::collections::HashSet;

use tessera_expr::{CompileResult, Expr};

use crate::steps::Step;
use crate::trace::Trace;

use super::Pass;

/// Specialise steps against known input shapes: `LIMIT 0` is a zero-row
/// source, restriction steps over a zero-row source are dead, and a
/// distinct-on covering exactly the projection below it degrades to the
/// cheaper distinct-row form.
pub(super) struct StrengthReduce;

impl Pass for StrengthReduce {
    fn name(&self) -> &'static str {
        "strengthreduce"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let mut changed = false;

        // LIMIT 0 truncates everything below it
        loop {
            let zero = t
                .steps
                .iter()
                .position(|s| matches!(s, Step::LimitOffset(l) if l.limit == 0));
            let Some(i) = zero else { break };
            t.steps.splice(0..=i, [Step::DummyOutput]);
            changed = true;
        }

        // row-restricting steps above a zero-row source do nothing
        if let Some(dummy) = t
            .steps
            .iter()
            .position(|s| matches!(s, Step::DummyOutput))
        {
            let before = t.steps.len();
            let mut idx = 0;
            t.steps.retain(|s| {
                let keep = {
                    idx += 1;
                    idx - 1 <= dummy
                        || !matches!(
                            s,
                            Step::Filter(_)
                                | Step::Order(_)
                                | Step::Distinct(_)
                                | Step::LimitOffset(_)
                        )
                };
                keep
            });
            changed |= t.steps.len() != before;
        }

        // Distinct over exactly the projection's outputs is distinct-row
        for i in 1..t.steps.len() {
            let names: Option<HashSet<String>> = match &t.steps[i - 1] {
                Step::Bind(b) => Some(b.names().into_iter().collect()),
                _ => None,
            };
            let Some(names) = names else { continue };
            if let Step::Distinct(d) = &mut t.steps[i] {
                if d.exprs.is_empty() {
                    continue;
                }
                let all_paths: Option<HashSet<String>> = d
                    .exprs
                    .iter()
                    .map(|e| match e {
                        Expr::Path(p) if p.rest.is_empty() => Some(p.first.clone()),
                        _ => None,
                    })
                    .collect();
                if all_paths.is_some_and(|set| set == names) {
                    d.exprs.clear();
                    changed = true;
                }
            }
        }

        Ok(changed)
    }
}
