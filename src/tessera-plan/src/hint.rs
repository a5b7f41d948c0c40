//! Per-step type hints.
//!
//! A [`StepHint`] answers type questions about path references against the
//! output schema of the step chain below: projections define the whole
//! namespace (an unbound name is MISSING), aggregates type their outputs,
//! and scans consult the environment's schema hint.

use tessera_expr::{literal_type, type_of, Expr, NoHint, Path, TypeHint, TypeSet};

use crate::steps::Step;

/// A [`TypeHint`] backed by the steps below the one being rewritten.
pub struct StepHint<'a> {
    below: &'a [Step],
}

impl<'a> StepHint<'a> {
    /// Create a hint from the steps feeding the current one.
    pub fn new(below: &'a [Step]) -> Self {
        Self { below }
    }

    fn lookup(&self, p: &Path) -> Option<TypeSet> {
        let mut path = p.clone();
        let mut i = self.below.len();
        while i > 0 {
            i -= 1;
            match &self.below[i] {
                Step::Bind(b) => match b.find(&path.first) {
                    Some(binding) => match &binding.expr {
                        Expr::Lit(l) if path.rest.is_empty() => {
                            return Some(literal_type(l))
                        }
                        // a rename: keep resolving below the projection
                        Expr::Path(bp) => {
                            let mut rest = bp.rest.clone();
                            rest.extend(path.rest.iter().cloned());
                            path = Path {
                                first: bp.first.clone(),
                                rest,
                            };
                        }
                        _ => return None,
                    },
                    // a projection defines the whole namespace
                    None => return Some(TypeSet::MISSING),
                },
                Step::Aggregate(a) => {
                    for agg in &a.aggs {
                        if agg.result() == path.first {
                            return path
                                .rest
                                .is_empty()
                                .then(|| type_of(&agg.expr, &NoHint));
                        }
                    }
                    for g in &a.group_by {
                        if g.result() == path.first {
                            return None;
                        }
                    }
                    return Some(TypeSet::MISSING);
                }
                Step::Scan(s) => {
                    return s.hint.as_ref().and_then(|h| h.lookup(&path));
                }
                Step::Unpivot(u) => {
                    if u.at_label.as_deref() == Some(path.first.as_str()) {
                        return Some(TypeSet::STRING);
                    }
                    return None;
                }
                Step::DummyOutput => return Some(TypeSet::MISSING),
                Step::Iterate(it) => {
                    if it.binding.result() == path.first {
                        return None;
                    }
                    // fields of the left side stay visible below
                }
                _ => {}
            }
        }
        None
    }
}

impl TypeHint for StepHint<'_> {
    fn type_of(&self, e: &Expr) -> Option<TypeSet> {
        let p = e.as_path()?;
        self.lookup(p)
    }
}
