//! Projection passes: merging, lifting over aggregates, and elimination.

use std::collections::{HashMap, HashSet};

use tessera_expr::{walk::map_children, walk_fn, Binding, CompileResult, Expr};

use crate::steps::{BindStep, Step};
use crate::trace::Trace;

use super::Pass;

/// Rewrite `e` so that it reads from the namespace below `bindings`:
/// every path head naming a binding is replaced by that binding's
/// expression (with trailing accessors re-applied when the expression is
/// itself a path). Returns `None` when a head is unbound or the
/// composition is not expressible.
pub(crate) fn substitute(e: &Expr, bindings: &[Binding]) -> Option<Expr> {
    match e {
        Expr::Path(p) => {
            let b = bindings.iter().find(|b| b.result() == p.first)?;
            match &b.expr {
                Expr::Path(bp) => {
                    let mut rest = bp.rest.clone();
                    rest.extend(p.rest.iter().cloned());
                    Some(Expr::path_with(bp.first.clone(), rest))
                }
                other if p.rest.is_empty() => Some(other.clone()),
                _ => None,
            }
        }
        Expr::Lit(_) => Some(e.clone()),
        Expr::Star | Expr::QualifiedStar(_) | Expr::Select(_) => None,
        other => {
            let mut ok = true;
            let out = map_children(other.clone(), &mut |c| {
                if !ok {
                    return c;
                }
                match substitute(&c, bindings) {
                    Some(v) => v,
                    None => {
                        ok = false;
                        c
                    }
                }
            });
            ok.then_some(out)
        }
    }
}

/// Path heads referenced by an expression; `None` when the expression
/// observes the whole row (`*`).
pub(super) fn expr_heads(e: &Expr, out: &mut HashSet<String>) -> bool {
    let mut whole_row = false;
    walk_fn(e, &mut |n| {
        match n {
            Expr::Path(p) => {
                out.insert(p.first.clone());
                return false;
            }
            Expr::Star | Expr::QualifiedStar(_) => whole_row = true,
            _ => {}
        }
        true
    });
    !whole_row
}

/// Merge adjacent projections and absorb projections into star
/// projections, pushing computed columns toward the scan.
pub(super) struct ProjectPushdown;

impl Pass for ProjectPushdown {
    fn name(&self) -> &'static str {
        "projectpushdown"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let mut changed = false;
        loop {
            let mut progress = false;
            for i in 0..t.steps.len().saturating_sub(1) {
                match (&t.steps[i], &t.steps[i + 1]) {
                    (Step::BindStar, Step::Bind(_)) => {
                        t.steps.remove(i);
                        progress = true;
                        break;
                    }
                    (Step::Bind(a), Step::Bind(b)) => {
                        if let Some(merged) = merge_binds(a, b) {
                            t.steps[i + 1] = Step::Bind(merged);
                            t.steps.remove(i);
                            progress = true;
                            break;
                        }
                    }
                    _ => {}
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

fn merge_binds(a: &BindStep, b: &BindStep) -> Option<BindStep> {
    // substituting a computed expression more than once would duplicate
    // work, so only cheap inner bindings may fan out
    let mut uses: HashMap<String, usize> = HashMap::new();
    for binding in &b.bindings {
        let mut heads = HashSet::new();
        if !expr_heads(&binding.expr, &mut heads) {
            return None;
        }
        for h in heads {
            *uses.entry(h).or_insert(0) += 1;
        }
    }
    for inner in &a.bindings {
        let cheap = matches!(inner.expr, Expr::Path(_) | Expr::Lit(_));
        if !cheap && uses.get(&inner.result()).copied().unwrap_or(0) > 1 {
            return None;
        }
    }
    let mut merged = Vec::with_capacity(b.bindings.len());
    for binding in &b.bindings {
        let expr = substitute(&binding.expr, &a.bindings)?;
        merged.push(Binding::named(expr, binding.result()));
    }
    Some(BindStep::new(merged))
}

/// Elide a rename-only projection directly above an aggregate by renaming
/// the aggregate's outputs in place.
pub(super) struct LiftProjectAgg;

impl Pass for LiftProjectAgg {
    fn name(&self) -> &'static str {
        "liftprojectagg"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let mut changed = false;
        loop {
            let mut lift: Option<(usize, Vec<(String, String)>)> = None;
            for i in 0..t.steps.len().saturating_sub(1) {
                let (Step::Aggregate(a), Step::Bind(b)) = (&t.steps[i], &t.steps[i + 1]) else {
                    continue;
                };
                if let Some(renames) = rename_map(a.output_names(), b) {
                    lift = Some((i, renames));
                    break;
                }
            }
            let Some((i, renames)) = lift else {
                break;
            };
            if let Step::Aggregate(a) = &mut t.steps[i] {
                for binding in a.group_by.iter_mut().chain(a.aggs.iter_mut()) {
                    if let Some((_, new)) =
                        renames.iter().find(|(old, _)| *old == binding.result())
                    {
                        binding.set_name(new.clone());
                    }
                }
            }
            t.steps.remove(i + 1);
            changed = true;
        }
        Ok(changed)
    }
}

/// Whether `b` is a pure, injective renaming of a subset of `outputs`;
/// returns the old-to-new name pairs.
fn rename_map(outputs: Vec<String>, b: &BindStep) -> Option<Vec<(String, String)>> {
    let mut pairs = Vec::with_capacity(b.bindings.len());
    let mut olds = HashSet::new();
    let mut news = HashSet::new();
    for binding in &b.bindings {
        let Expr::Path(p) = &binding.expr else {
            return None;
        };
        if !p.rest.is_empty() || !outputs.iter().any(|o| *o == p.first) {
            return None;
        }
        let new = binding.result();
        if !olds.insert(p.first.clone()) || !news.insert(new.clone()) {
            return None;
        }
        pairs.push((p.first.clone(), new));
    }
    // outputs that are not renamed must not collide with the new names
    for o in &outputs {
        if !olds.contains(o) && news.contains(o) {
            return None;
        }
    }
    Some(pairs)
}

/// Drop bindings nothing upstream references.
pub(super) struct ProjectElim;

impl Pass for ProjectElim {
    fn name(&self) -> &'static str {
        "projectelim"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let mut changed = false;
        let len = t.steps.len();
        // needed names flowing from the terminal step toward the leaf;
        // None means "everything"
        let mut needed: Option<HashSet<String>> = if t.star_output {
            None
        } else {
            Some(t.final_bindings().iter().map(Binding::result).collect())
        };
        for idx in (0..len).rev() {
            let terminal = idx == len - 1;
            match &mut t.steps[idx] {
                Step::Bind(b) => {
                    if let Some(need) = &needed {
                        if !terminal {
                            let before = b.bindings.len();
                            b.bindings.retain(|x| need.contains(&x.result()));
                            changed |= b.bindings.len() != before;
                        }
                    }
                    let mut heads = HashSet::new();
                    let mut bounded = true;
                    for x in &b.bindings {
                        bounded &= expr_heads(&x.expr, &mut heads);
                    }
                    needed = bounded.then_some(heads);
                }
                Step::BindStar => needed = None,
                Step::Aggregate(a) => {
                    if let Some(need) = &needed {
                        if !terminal {
                            let before = a.aggs.len();
                            a.aggs.retain(|x| need.contains(&x.result()));
                            changed |= a.aggs.len() != before;
                        }
                    }
                    let mut heads = HashSet::new();
                    let mut bounded = true;
                    for x in a.group_by.iter().chain(&a.aggs) {
                        bounded &= expr_heads(&x.expr, &mut heads);
                    }
                    needed = bounded.then_some(heads);
                }
                Step::Filter(f) => {
                    extend_needed(&mut needed, &[&f.predicate]);
                }
                Step::Distinct(d) => {
                    let exprs: Vec<&Expr> = d.exprs.iter().collect();
                    extend_needed(&mut needed, &exprs);
                }
                Step::Order(o) => {
                    let exprs: Vec<&Expr> = o.keys.iter().map(|k| &k.expr).collect();
                    extend_needed(&mut needed, &exprs);
                }
                Step::Iterate(it) => {
                    let name = it.binding.result();
                    if let Some(need) = &mut needed {
                        need.remove(&name);
                    }
                    extend_needed(&mut needed, &[&it.binding.expr]);
                }
                Step::Unpivot(_) => needed = None,
                Step::Scan(_)
                | Step::LimitOffset(_)
                | Step::Output(_)
                | Step::DummyOutput
                | Step::PseudoTable => {}
            }
        }
        Ok(changed)
    }
}

fn extend_needed(needed: &mut Option<HashSet<String>>, exprs: &[&Expr]) {
    let Some(need) = needed else {
        return;
    };
    for e in exprs {
        if !expr_heads(e, need) {
            *needed = None;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_expr::{lit, path, ArithOp};

    #[test]
    fn test_substitute_through_paths() {
        let bindings = vec![
            Binding::named(Expr::field("t", "a"), "x"),
            Binding::named(lit(2i64), "two"),
        ];
        // x + two  =>  t.a + 2
        let e = Expr::arith(ArithOp::Add, path("x"), path("two"));
        assert_eq!(
            substitute(&e, &bindings),
            Some(Expr::arith(ArithOp::Add, Expr::field("t", "a"), lit(2i64)))
        );

        // unbound head fails
        assert_eq!(substitute(&path("zzz"), &bindings), None);

        // field access into a computed value fails
        let bindings = vec![Binding::named(
            Expr::arith(ArithOp::Add, path("a"), lit(1i64)),
            "x",
        )];
        assert_eq!(substitute(&Expr::field("x", "f"), &bindings), None);
    }

    #[test]
    fn test_merge_binds() {
        let a = BindStep::new(vec![Binding::named(Expr::field("t", "a"), "x")]);
        let b = BindStep::new(vec![Binding::named(
            Expr::arith(ArithOp::Add, path("x"), lit(1i64)),
            "y",
        )]);
        let merged = merge_binds(&a, &b).unwrap();
        assert_eq!(merged.bindings.len(), 1);
        assert_eq!(
            merged.bindings[0].expr,
            Expr::arith(ArithOp::Add, Expr::field("t", "a"), lit(1i64))
        );

        // computed inner binding used twice: no merge
        let a = BindStep::new(vec![Binding::named(
            Expr::arith(ArithOp::Add, path("a"), lit(1i64)),
            "x",
        )]);
        let b = BindStep::new(vec![Binding::named(
            Expr::arith(ArithOp::Mul, path("x"), path("x")),
            "y",
        )]);
        assert!(merge_binds(&a, &b).is_none());
    }
}
