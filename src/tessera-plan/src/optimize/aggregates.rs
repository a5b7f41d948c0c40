//! Aggregate-related passes: constant elimination, HAVING pushdown,
//! distinct elimination, and COUNT(DISTINCT) strength reduction.

use tessera_expr::{
    can_be_missing, conjoin, conjuncts, equivalent, lit, AggOp, Binding, CompileResult, Expr,
};

use crate::hint::StepHint;
use crate::steps::{BindStep, FilterStep, Step};
use crate::trace::{SizeClass, Trace};

use super::projections::substitute;
use super::Pass;

/// Replace aggregates with row expressions where derivable: over a
/// class-One input every aggregate folds to its argument (`COUNT(*)` to
/// 1), and `MIN`/`MAX` of a constant folds to the constant under any
/// grouping.
pub(super) struct AggElim;

impl Pass for AggElim {
    fn name(&self) -> &'static str {
        "aggelim"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let mut changed = false;
        let mut i = 0;
        while i < t.steps.len() {
            if !matches!(t.steps[i], Step::Aggregate(_)) {
                i += 1;
                continue;
            }

            // global fold: legal only when the input is exactly one row
            // (class One alone still admits zero rows)
            if exactly_one_row(&t.steps[..i]) {
                let mut did = false;
                let (below, rest) = t.steps.split_at_mut(i);
                if let Step::Aggregate(a) = &mut rest[0] {
                    if a.is_global() {
                        let hint = StepHint::new(below);
                        let mut folded = Vec::with_capacity(a.aggs.len());
                        let mut ok = true;
                        for b in &a.aggs {
                            let Expr::Agg(agg) = &b.expr else {
                                ok = false;
                                break;
                            };
                            let e = match agg.op {
                                AggOp::Count if matches!(*agg.inner, Expr::Star) => lit(1i64),
                                AggOp::Sum | AggOp::Min | AggOp::Max | AggOp::Avg
                                    if !can_be_missing(&agg.inner, &hint) =>
                                {
                                    (*agg.inner).clone()
                                }
                                _ => {
                                    ok = false;
                                    break;
                                }
                            };
                            folded.push(Binding::named(e, b.result()));
                        }
                        if ok {
                            rest[0] = Step::Bind(BindStep::new(folded));
                            changed = true;
                            did = true;
                        }
                    }
                }
                if did {
                    i += 1;
                    continue;
                }
            }

            // MIN/MAX of a constant is the constant on every (non-empty)
            // group
            let constant = |b: &Binding| match &b.expr {
                Expr::Agg(agg) if matches!(agg.op, AggOp::Min | AggOp::Max) => {
                    match &*agg.inner {
                        Expr::Lit(l) if !l.is_absent() => Some((*agg.inner).clone()),
                        _ => None,
                    }
                }
                _ => None,
            };
            let mut plan = None;
            if let Step::Aggregate(a) = &t.steps[i] {
                if !a.is_global() && a.aggs.iter().any(|b| constant(b).is_some()) {
                    let mut consts = Vec::new();
                    let mut kept = Vec::new();
                    for b in &a.aggs {
                        match constant(b) {
                            Some(c) => consts.push(Binding::named(c, b.result())),
                            None => kept.push(b.clone()),
                        }
                    }
                    let mut post: Vec<Binding> = a
                        .group_by
                        .iter()
                        .chain(&kept)
                        .map(|b| {
                            let name = b.result();
                            Binding::named(Expr::path(name.clone()), name)
                        })
                        .collect();
                    post.extend(consts);
                    plan = Some((kept, post));
                }
            }
            if let Some((kept, post)) = plan {
                if let Step::Aggregate(a) = &mut t.steps[i] {
                    a.aggs = kept;
                }
                t.steps.insert(i + 1, Step::Bind(BindStep::new(post)));
                changed = true;
                i += 2;
                continue;
            }
            i += 1;
        }
        Ok(changed)
    }
}

/// Whether the chain is guaranteed to produce exactly one row: a global
/// aggregate with only row-preserving steps above it.
fn exactly_one_row(below: &[Step]) -> bool {
    for step in below.iter().rev() {
        match step {
            Step::Bind(_) | Step::BindStar | Step::Order(_) | Step::PseudoTable => {}
            Step::Aggregate(a) => return a.is_global(),
            _ => return false,
        }
    }
    false
}

/// Push HAVING-derived selectivity below the aggregate when it only
/// references grouping keys.
pub(super) struct AggFilter;

impl Pass for AggFilter {
    fn name(&self) -> &'static str {
        "aggfilter"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let mut changed = false;
        loop {
            let mut rewrite = None;
            for i in 0..t.steps.len().saturating_sub(1) {
                let (Step::Aggregate(a), Step::Filter(f)) = (&t.steps[i], &t.steps[i + 1])
                else {
                    continue;
                };
                let mut pushed = Vec::new();
                let mut kept = Vec::new();
                for part in conjuncts(&f.predicate) {
                    match substitute(part, &a.group_by) {
                        Some(below) => pushed.push(below),
                        None => kept.push(part.clone()),
                    }
                }
                if !pushed.is_empty() {
                    rewrite = Some((i, conjoin(pushed), conjoin(kept)));
                    break;
                }
            }
            let Some((i, pushed, kept)) = rewrite else {
                break;
            };
            match kept {
                Some(pred) => {
                    if let Step::Filter(f) = &mut t.steps[i + 1] {
                        f.predicate = pred;
                    }
                }
                None => {
                    t.steps.remove(i + 1);
                }
            }
            if let Some(pred) = pushed {
                t.steps.insert(i, Step::Filter(FilterStep::new(pred)));
            }
            changed = true;
        }
        Ok(changed)
    }
}

/// Drop DISTINCT when the input schema already guarantees uniqueness.
pub(super) struct DistinctElim;

impl Pass for DistinctElim {
    fn name(&self) -> &'static str {
        "distinctelim"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let mut changed = false;
        loop {
            let mut remove = None;
            for i in 0..t.steps.len() {
                let Step::Distinct(d) = &t.steps[i] else {
                    continue;
                };
                if t.class_below(i) <= SizeClass::One {
                    remove = Some(i);
                    break;
                }
                if i > 0 {
                    if let Step::Aggregate(a) = &t.steps[i - 1] {
                        if !a.is_global() && covers_group_keys(d.exprs.as_slice(), a) {
                            remove = Some(i);
                            break;
                        }
                    }
                    if let Step::Distinct(prev) = &t.steps[i - 1] {
                        if prev.exprs == d.exprs {
                            remove = Some(i);
                            break;
                        }
                    }
                }
            }
            let Some(i) = remove else {
                break;
            };
            t.steps.remove(i);
            changed = true;
        }
        Ok(changed)
    }
}

/// Whether the distinct-on set covers all grouping keys of the aggregate
/// feeding it (rows are then already unique). An empty set is distinct-row
/// and always covers.
fn covers_group_keys(exprs: &[Expr], a: &crate::steps::AggregateStep) -> bool {
    if exprs.is_empty() {
        return true;
    }
    a.group_by.iter().all(|g| {
        exprs
            .iter()
            .any(|e| matches!(e, Expr::Path(p) if p.rest.is_empty() && p.first == g.result()))
    })
}

/// `COUNT(DISTINCT x)` whose input is already distinct on `x` becomes
/// `COUNT(x)`.
pub(super) struct CountDistinctToCount;

impl Pass for CountDistinctToCount {
    fn name(&self) -> &'static str {
        "countdistinct2count"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let mut changed = false;
        for i in 0..t.steps.len() {
            if !matches!(t.steps[i], Step::Aggregate(_)) {
                continue;
            }
            let mut targets = Vec::new();
            if let Step::Aggregate(a) = &t.steps[i] {
                for (j, b) in a.aggs.iter().enumerate() {
                    if let Expr::Agg(agg) = &b.expr {
                        if agg.op == AggOp::CountDistinct {
                            targets.push((j, (*agg.inner).clone()));
                        }
                    }
                }
            }
            for (j, inner) in targets {
                if !input_distinct_on(&t.steps[..i], &inner) {
                    continue;
                }
                if let Step::Aggregate(a) = &mut t.steps[i] {
                    if let Expr::Agg(agg) = &mut a.aggs[j].expr {
                        agg.op = AggOp::Count;
                        changed = true;
                    }
                }
            }
        }
        Ok(changed)
    }
}

/// Whether the chain below ends in a Distinct guaranteeing `target` is
/// unique, looking through filters and one level of projection renaming.
fn input_distinct_on(below: &[Step], target: &Expr) -> bool {
    let mut target = target.clone();
    for step in below.iter().rev() {
        match step {
            Step::Filter(_) => {}
            Step::Bind(b) => {
                let Some(mapped) = substitute(&target, &b.bindings) else {
                    return false;
                };
                target = mapped;
            }
            Step::Distinct(d) => {
                return d.exprs.iter().any(|e| equivalent(e, &target));
            }
            _ => return false,
        }
    }
    false
}
