//! Replacement deduplication.

use tessera_expr::{walk::rewrite_fn, CompileResult, Expr};

use crate::trace::Trace;

use super::Pass;

/// Deduplicate replacement traces whose canonical form is identical and
/// remap every replacement reference accordingly.
pub(super) struct MergeReplacements;

impl Pass for MergeReplacements {
    fn name(&self) -> &'static str {
        "mergereplacements"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        if t.replacements.len() < 2 {
            return Ok(false);
        }
        let mut kept: Vec<Trace> = Vec::with_capacity(t.replacements.len());
        let mut remap = Vec::with_capacity(t.replacements.len());
        for r in t.replacements.drain(..) {
            match kept.iter().position(|k| *k == r) {
                Some(j) => remap.push(j),
                None => {
                    kept.push(r);
                    remap.push(kept.len() - 1);
                }
            }
        }
        t.replacements = kept;
        if remap.iter().enumerate().all(|(i, j)| i == *j) {
            return Ok(false);
        }
        for step in &mut t.steps {
            step.rewrite_exprs(&mut |e, _| {
                rewrite_fn(e, &mut |n| match n {
                    Expr::Call(mut c) if c.func.is_replacement() => {
                        if let Some(idx) = c.replacement_index() {
                            c.set_replacement_index(remap[idx]);
                        }
                        Expr::Call(c)
                    }
                    other => other,
                })
            });
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_expr::{lit, path, Binding, BuiltinFunc};

    fn scalar_rep() -> Trace {
        let mut r = Trace::new(1, Some(0));
        r.push_scan(Binding::named(path("u"), "u"), None);
        r.push_aggregate(
            vec![Binding::named(
                Expr::Agg(tessera_expr::Aggregate::new(
                    tessera_expr::AggOp::Max,
                    path("x"),
                )),
                "m",
            )],
            Vec::new(),
        );
        r
    }

    #[test]
    fn test_merge_identical_replacements() {
        let mut t = Trace::new(0, None);
        t.push_scan(Binding::named(path("t"), "t"), None);
        t.push_bind(vec![
            Binding::named(
                Expr::call(BuiltinFunc::ScalarReplacement, vec![lit(0i64)]),
                "a",
            ),
            Binding::named(
                Expr::call(BuiltinFunc::ScalarReplacement, vec![lit(1i64)]),
                "b",
            ),
        ]);
        let mut r0 = scalar_rep();
        r0.parent = Some(t.id);
        let mut r1 = scalar_rep();
        r1.parent = Some(t.id);
        t.replacements.push(r0);
        t.replacements.push(r1);

        assert!(MergeReplacements.apply(&mut t).unwrap());
        assert_eq!(t.replacements.len(), 1);

        // both references now point at index 0
        let mut indices = Vec::new();
        for step in &t.steps {
            step.visit_exprs(&mut |e, _| {
                tessera_expr::walk_fn(e, &mut |n| {
                    if let Expr::Call(c) = n {
                        if let Some(i) = c.replacement_index() {
                            indices.push(i);
                        }
                    }
                    true
                });
            });
        }
        assert_eq!(indices, vec![0, 0]);
    }
}
