//! Invariant verification and partition hints.

use std::collections::HashSet;

use tessera_expr::{walk_fn, BuiltinFunc, CompileError, CompileResult, Expr};

use crate::steps::Step;
use crate::trace::{SizeClass, Trace};

use super::Pass;

/// Verify the invariants the executor relies on. A failure here is a
/// compiler bug, never a user error.
pub fn postcheck(t: &Trace) -> CompileResult<()> {
    if !t.star_output {
        let mut seen = HashSet::new();
        for b in t.final_bindings() {
            if !b.explicit() || b.result().is_empty() {
                return Err(CompileError::internal("unnamed final binding"));
            }
            if !seen.insert(b.result()) {
                return Err(CompileError::internal(format!(
                    "duplicate output name '{}'",
                    b.result()
                )));
            }
        }
    }
    if t.steps.iter().any(|s| matches!(s, Step::PseudoTable)) {
        return Err(CompileError::internal("pseudo-table survived optimization"));
    }
    let mut err = None;
    for step in &t.steps {
        step.visit_exprs(&mut |e, _| {
            if err.is_none() {
                err = check_replacement_refs(e, t);
            }
        });
    }
    if let Some(e) = err {
        return Err(e);
    }
    for r in &t.replacements {
        if r.parent != Some(t.id) {
            return Err(CompileError::internal("replacement parent mismatch"));
        }
        postcheck(r)?;
    }
    Ok(())
}

fn check_replacement_refs(e: &Expr, t: &Trace) -> Option<CompileError> {
    let mut err = None;
    walk_fn(e, &mut |n| {
        if err.is_some() {
            return false;
        }
        let Expr::Call(c) = n else { return true };
        if !c.func.is_replacement() {
            return true;
        }
        let Some(idx) = c.replacement_index() else {
            err = Some(CompileError::internal(format!(
                "malformed replacement reference {c}"
            )));
            return false;
        };
        let Some(rep) = t.replacements.get(idx) else {
            err = Some(CompileError::internal(format!(
                "replacement index {idx} out of range"
            )));
            return false;
        };
        let class = rep.class();
        let ok = match c.func {
            BuiltinFunc::ScalarReplacement | BuiltinFunc::StructReplacement => {
                class == SizeClass::One
            }
            BuiltinFunc::ListReplacement => {
                matches!(class, SizeClass::ExactSmall | SizeClass::ColumnCardinality)
            }
            // membership tests only need the build side bounded
            BuiltinFunc::InReplacement => class != SizeClass::Unbounded,
            _ => true,
        };
        if !ok {
            err = Some(CompileError::internal(format!(
                "replacement {idx} has class {class:?}, not usable by {}",
                c.func
            )));
        }
        true
    });
    err
}

pub(super) struct PostCheck;

impl Pass for PostCheck {
    fn name(&self) -> &'static str {
        "postcheck"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        postcheck(t)?;
        Ok(false)
    }
}

/// Record per-trace partitioning hints: grouping keys that are direct
/// fields of the leaf scan, usable by the executor to split the input.
pub(super) struct Partition;

impl Pass for Partition {
    fn name(&self) -> &'static str {
        "partition"
    }

    fn apply(&self, t: &mut Trace) -> CompileResult<bool> {
        let keys = partition_keys(t);
        let changed = keys != t.partition_keys;
        t.partition_keys = keys;
        Ok(changed)
    }
}

fn partition_keys(t: &Trace) -> Vec<String> {
    if !matches!(t.steps.first(), Some(Step::Scan(_))) {
        return Vec::new();
    }
    for step in &t.steps[1..] {
        match step {
            Step::Filter(_) => {}
            Step::Aggregate(a) => {
                let mut keys = Vec::new();
                for g in &a.group_by {
                    if let Expr::Path(p) = &g.expr {
                        keys.push(p.dotted());
                    }
                }
                return keys;
            }
            // any other step between the scan and the aggregate breaks
            // per-partition independence
            _ => return Vec::new(),
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_expr::{lit, path, Binding};

    #[test]
    fn test_postcheck_rejects_pseudo_table() {
        let mut t = Trace::new(0, None);
        t.push_scan(Binding::named(path("t"), "t"), None);
        t.push_pseudo_table();
        t.push_bind(vec![Binding::named(path("a"), "a")]);
        assert!(postcheck(&t).is_err());
    }

    #[test]
    fn test_postcheck_rejects_dangling_replacement() {
        let mut t = Trace::new(0, None);
        t.push_scan(Binding::named(path("t"), "t"), None);
        t.push_filter(Expr::call(
            BuiltinFunc::InReplacement,
            vec![path("a"), lit(0i64)],
        ));
        t.push_bind(vec![Binding::named(path("a"), "a")]);
        assert!(postcheck(&t).is_err());
    }

    #[test]
    fn test_partition_keys() {
        let mut t = Trace::new(0, None);
        t.push_scan(Binding::named(path("t"), "t"), None);
        t.push_aggregate(
            vec![Binding::named(
                Expr::Agg(tessera_expr::Aggregate::count_star()),
                "n",
            )],
            vec![Binding::named(path("k"), "k")],
        );
        assert_eq!(partition_keys(&t), vec!["k"]);
    }
}
