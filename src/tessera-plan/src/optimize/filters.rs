//! Filter passes: elimination and pushdown.

use tessera_expr::{CompileResult, Expr, Literal};

use crate::steps::{FilterStep, Step};
use crate::trace::Trace;

use super::projections::substitute;
use super::Pass;

/// Drop `Filter(TRUE)`; an unsatisfiable filter truncates its input to a
/// zero-row source.
pub(super) struct FilterElim;

impl Pass for FilterElim {
    fn name(&self) -> &'static str {
        "filterelim"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let mut changed = false;
        loop {
            let mut action = None;
            for (i, step) in t.steps.iter().enumerate() {
                let Step::Filter(f) = step else { continue };
                match &f.predicate {
                    Expr::Lit(Literal::Bool(true)) => {
                        action = Some((i, false));
                        break;
                    }
                    Expr::Lit(Literal::Bool(false))
                    | Expr::Lit(Literal::Null)
                    | Expr::Lit(Literal::Missing) => {
                        action = Some((i, true));
                        break;
                    }
                    _ => {}
                }
            }
            match action {
                Some((i, false)) => {
                    t.steps.remove(i);
                }
                Some((i, true)) => {
                    // no row can pass: everything below is dead
                    t.steps.splice(0..=i, [Step::DummyOutput]);
                }
                None => break,
            }
            changed = true;
        }
        Ok(changed)
    }
}

/// Merge adjacent filters and move filters below projections and sorts.
pub(super) struct FilterPushdown;

impl Pass for FilterPushdown {
    fn name(&self) -> &'static str {
        "filterpushdown"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let mut changed = false;
        loop {
            let mut progress = false;
            for i in 1..t.steps.len() {
                if !matches!(t.steps[i], Step::Filter(_)) {
                    continue;
                }
                enum Prev {
                    Merge,
                    Push,
                    Swap,
                    Stop,
                }
                let prev = match &t.steps[i - 1] {
                    Step::Filter(_) => Prev::Merge,
                    Step::Bind(_) => Prev::Push,
                    Step::BindStar | Step::Order(_) => Prev::Swap,
                    _ => Prev::Stop,
                };
                match prev {
                    Prev::Merge => {
                        let outer = match t.steps.remove(i) {
                            Step::Filter(f) => f.predicate,
                            other => {
                                t.steps.insert(i, other);
                                continue;
                            }
                        };
                        if let Step::Filter(inner) = &mut t.steps[i - 1] {
                            let lower = std::mem::replace(&mut inner.predicate, Expr::Star);
                            inner.predicate = lower.and(outer);
                        }
                        progress = true;
                    }
                    Prev::Push => {
                        // only when every referenced column pre-exists
                        // below the projection
                        let pushed = match (&t.steps[i - 1], &t.steps[i]) {
                            (Step::Bind(b), Step::Filter(f)) => {
                                substitute(&f.predicate, &b.bindings)
                            }
                            _ => None,
                        };
                        let Some(pushed) = pushed else {
                            continue;
                        };
                        t.steps[i] = Step::Filter(FilterStep::new(pushed));
                        t.steps.swap(i - 1, i);
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
