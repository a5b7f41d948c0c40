//! Equi-join elimination.
//!
//! A cross-product iteration over a *table* cannot be executed directly;
//! when an equality predicate links the iterated rows to the outer row,
//! the table is hoisted into a hash replacement keyed by the join column
//! and the iteration re-targeted at the per-key match list. Iterating a
//! sub-query is rejected outright.

use std::collections::HashSet;

use tessera_expr::{
    conjoin, conjuncts, lit, walk_fn, Accessor, Binding, BuiltinFunc, CmpOp, CompileError,
    CompileResult, Expr,
};

use crate::steps::{BindStep, IterateStep, ScanStep, Step};
use crate::trace::Trace;

use super::Pass;

pub(super) struct JoinElim;

impl Pass for JoinElim {
    fn name(&self) -> &'static str {
        "joinelim"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let mut changed = false;
        loop {
            let mut conversion = None;
            for i in 0..t.steps.len() {
                let Step::Iterate(it) = &t.steps[i] else {
                    continue;
                };
                match &it.binding.expr {
                    Expr::Select(_) => {
                        return Err(CompileError::at(
                            &it.binding.expr,
                            "iterating a sub-query is not supported",
                        ));
                    }
                    Expr::Path(p) => {
                        // a path rooted in an earlier binding is a
                        // row-local unnest, which the executor handles
                        if names_below(&t.steps[..i]).contains(&p.first) {
                            continue;
                        }
                    }
                    _ => continue,
                }
                let rname = it.binding.result();
                if rname.is_empty() {
                    continue;
                }
                let Some(Step::Filter(f)) = t.steps.get(i + 1) else {
                    continue;
                };
                let Some((key, lhs, remaining)) = split_equi(&f.predicate, &rname) else {
                    continue;
                };
                conversion = Some((i, rname, key, lhs, remaining));
                break;
            }
            let Some((i, rname, key, lhs, remaining)) = conversion else {
                break;
            };

            // the replacement produces (row struct, key) pairs from the
            // joined table; the lookup yields the match list per key
            let Step::Iterate(it) = &t.steps[i] else {
                break;
            };
            let mut rep = Trace::new(t.max_trace_id() + 1, Some(t.id));
            rep.push_scan(
                Binding::named(it.binding.expr.clone(), rname.clone()),
                None,
            );
            rep.push_bind(vec![
                Binding::named(
                    Expr::call(BuiltinFunc::MakeStruct, vec![Expr::Star]),
                    "$__val",
                ),
                Binding::named(key, "$__key"),
            ]);
            let index = t.replacements.len() as i64;
            t.replacements.push(rep);

            let lookup = Expr::call(
                BuiltinFunc::HashReplacement,
                vec![lit(index), lit("list"), lit("$__key"), lhs],
            );
            t.steps[i] = Step::Iterate(IterateStep {
                binding: Binding::named(lookup, rname),
            });
            match remaining {
                Some(pred) => {
                    if let Step::Filter(f) = &mut t.steps[i + 1] {
                        f.predicate = pred;
                    }
                }
                None => {
                    t.steps.remove(i + 1);
                }
            }
            changed = true;
        }
        Ok(changed)
    }
}

/// Binding names introduced below a step by scans, iterations, and
/// unpivots.
fn names_below(steps: &[Step]) -> HashSet<String> {
    let mut names = HashSet::new();
    for s in steps {
        match s {
            Step::Scan(ScanStep { table, .. }) => {
                names.insert(table.result());
            }
            Step::Iterate(it) => {
                names.insert(it.binding.result());
            }
            Step::Unpivot(u) => {
                names.extend(u.as_label.iter().cloned());
                names.extend(u.at_label.iter().cloned());
            }
            _ => {}
        }
    }
    names
}

/// Split `pred` into an equality conjunct `lhs = rname.k` plus the rest.
/// Returns the key expression re-rooted inside the table's rows, the
/// outer side, and the remaining predicate.
fn split_equi(pred: &Expr, rname: &str) -> Option<(Expr, Expr, Option<Expr>)> {
    let parts = conjuncts(pred);
    for (idx, part) in parts.iter().enumerate() {
        let Expr::Compare {
            op: CmpOp::Eq,
            left,
            right,
        } = part
        else {
            continue;
        };
        let candidate = if let Some(key) = key_under(right, rname) {
            (!references(left, rname)).then(|| (key, (**left).clone()))
        } else if let Some(key) = key_under(left, rname) {
            (!references(right, rname)).then(|| (key, (**right).clone()))
        } else {
            None
        };
        let Some((key, lhs)) = candidate else { continue };
        let rest: Vec<Expr> = parts
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != idx)
            .map(|(_, p)| (*p).clone())
            .collect();
        return Some((key, lhs, conjoin(rest)));
    }
    None
}

/// `rname.f...` re-rooted as `f...` inside the table's own rows.
fn key_under(e: &Expr, rname: &str) -> Option<Expr> {
    let Expr::Path(p) = e else { return None };
    if p.first != rname {
        return None;
    }
    match p.rest.split_first() {
        Some((Accessor::Field(f), rest)) => Some(Expr::path_with(f.clone(), rest.to_vec())),
        _ => None,
    }
}

fn references(e: &Expr, rname: &str) -> bool {
    let mut found = false;
    walk_fn(e, &mut |n| {
        if let Expr::Path(p) = n {
            if p.first == rname {
                found = true;
            }
            return false;
        }
        true
    });
    found
}
