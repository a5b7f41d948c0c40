//! Sub-query hoisting.
//!
//! Every SELECT embedded in a step expression is built into its own trace
//! and replaced by a call that references it by index: scalar, struct, or
//! list replacements for bounded sub-queries, hash replacements for
//! correlated ones, and `IN_REPLACEMENT` semi-joins where an
//! `IS NOT MISSING` test can be proven total. Unbounded sub-queries are
//! rejected with a hint to add `LIMIT`.

use std::collections::HashSet;

use tessera_expr::{
    conjuncts, lit, type_of, walk_fn, Binding, BuiltinFunc, Call, CmpOp, CompileError,
    CompileResult, Expr, IsKey, Literal, SelectStmt, TypeSet,
};

use crate::build::{build_select, BuildCtx, OuterScope};
use crate::hint::StepHint;
use crate::steps::{ExprRole, Step};
use crate::trace::{SizeClass, Trace};

/// Hoist every sub-query in the trace's step expressions into
/// `replacements`, rewriting the call sites.
pub(crate) fn hoist(
    ctx: &mut BuildCtx<'_>,
    t: &mut Trace,
    outer: Option<&OuterScope<'_>>,
) -> CompileResult<()> {
    let scope = OuterScope {
        id: t.id,
        names: t.scope.clone(),
        parent: outer,
    };
    let base = t.replacements.len();
    let mut steps = std::mem::take(&mut t.steps);
    let mut err: Option<CompileError> = None;
    let mut pending;
    {
        let mut h = Hoister {
            ctx,
            reps: &mut t.replacements,
            pending: Vec::new(),
            base,
            scope: &scope,
        };
        for step in &mut steps {
            step.rewrite_exprs(&mut |e, role| {
                if err.is_some() || role == ExprRole::Table {
                    return e;
                }
                match h.expr(e, false) {
                    Ok(v) => v,
                    Err(e2) => {
                        err = Some(e2);
                        Expr::Star
                    }
                }
            });
            if err.is_some() {
                break;
            }
        }
        pending = h.pending;
    }
    t.steps = steps;
    if let Some(e) = err {
        return Err(e);
    }
    t.replacements.append(&mut pending);
    Ok(())
}

struct Hoister<'a, 'b, 'e> {
    ctx: &'a mut BuildCtx<'e>,
    reps: &'a mut Vec<Trace>,
    pending: Vec<Trace>,
    base: usize,
    scope: &'a OuterScope<'b>,
}

impl Hoister<'_, '_, '_> {
    fn next_index(&self) -> i64 {
        (self.base + self.pending.len()) as i64
    }

    fn lookup_mut(&mut self, idx: usize) -> Option<&mut Trace> {
        if idx < self.base {
            self.reps.get_mut(idx)
        } else {
            self.pending.get_mut(idx - self.base)
        }
    }

    /// Rewrite one expression. `scalar` marks positions whose consumer
    /// requires a single value (comparison and arithmetic operands,
    /// ordinary function arguments).
    fn expr(&mut self, e: Expr, scalar: bool) -> CompileResult<Expr> {
        match e {
            Expr::Select(s) => {
                if scalar {
                    self.scalar_sub(*s)
                } else {
                    self.generic_sub(*s)
                }
            }
            Expr::Compare { op, left, right } => Ok(Expr::Compare {
                op,
                left: Box::new(self.expr(*left, true)?),
                right: Box::new(self.expr(*right, true)?),
            }),
            Expr::Arith { op, left, right } => Ok(Expr::Arith {
                op,
                left: Box::new(self.expr(*left, true)?),
                right: Box::new(self.expr(*right, true)?),
            }),
            Expr::Logical { op, left, right } => Ok(Expr::Logical {
                op,
                left: Box::new(self.expr(*left, false)?),
                right: Box::new(self.expr(*right, false)?),
            }),
            Expr::Not(inner) => Ok(Expr::Not(Box::new(self.expr(*inner, false)?))),
            Expr::Is { expr, key } => {
                let inner = self.expr(*expr, false)?;
                self.rewrite_is(inner, key)
            }
            Expr::Call(c) if c.func == BuiltinFunc::InSubquery => self.in_subquery(c),
            Expr::Call(c) if c.func.is_replacement() => Ok(Expr::Call(c)),
            Expr::Call(mut c) => {
                c.args = c
                    .args
                    .into_iter()
                    .map(|a| self.expr(a, true))
                    .collect::<CompileResult<Vec<_>>>()?;
                Ok(Expr::Call(c))
            }
            Expr::Agg(mut a) => {
                a.inner = Box::new(self.expr(*a.inner, true)?);
                Ok(Expr::Agg(a))
            }
            other => Ok(other),
        }
    }

    /// `HASH_REPLACEMENT(id, kind, label, var) IS [NOT] MISSING` where the
    /// replacement's value column can never be MISSING is a semi-join:
    /// `IN_REPLACEMENT(var, id)`, with the replacement stripped to its key
    /// column.
    fn rewrite_is(&mut self, inner: Expr, key: IsKey) -> CompileResult<Expr> {
        if matches!(key, IsKey::Missing | IsKey::NotMissing) {
            if let Expr::Call(c) = &inner {
                if c.func == BuiltinFunc::HashReplacement && c.args.len() == 4 {
                    if let (Some(idx), Expr::Lit(Literal::String(label))) =
                        (c.replacement_index(), &c.args[2])
                    {
                        let label = label.clone();
                        let corr = c.args[3].clone();
                        if let Some(rep) = self.lookup_mut(idx) {
                            if replacement_never_missing(rep, &label) && strip_final(rep, &label)
                            {
                                let mut ret = Expr::call(
                                    BuiltinFunc::InReplacement,
                                    vec![corr, lit(idx as i64)],
                                );
                                if key == IsKey::Missing {
                                    ret = ret.not();
                                }
                                return Ok(ret);
                            }
                        }
                    }
                }
            }
        }
        Ok(Expr::Is {
            expr: Box::new(inner),
            key,
        })
    }

    fn generic_sub(&mut self, s: SelectStmt) -> CompileResult<Expr> {
        let node = Expr::Select(Box::new(s.clone()));
        let mut sub = build_select(self.ctx, Some(self.scope), s)?;
        let scalar = sub.final_bindings().len() == 1 && !sub.star_output;
        let class = sub.class();
        if class == SizeClass::Zero {
            return Ok(Expr::Lit(Literal::Missing));
        }
        let corr = decorrelate(&mut sub, self.scope)?;
        let index = self.next_index();
        match class {
            SizeClass::One => {
                self.pending.push(sub);
                Ok(match corr {
                    Some((label, corrv)) => {
                        let kind = if scalar { "scalar" } else { "struct" };
                        Expr::call(
                            BuiltinFunc::HashReplacement,
                            vec![lit(index), lit(kind), lit(label), corrv],
                        )
                    }
                    None if scalar => {
                        Expr::call(BuiltinFunc::ScalarReplacement, vec![lit(index)])
                    }
                    None => Expr::call(BuiltinFunc::StructReplacement, vec![lit(index)]),
                })
            }
            SizeClass::ExactSmall | SizeClass::ColumnCardinality => {
                self.pending.push(sub);
                Ok(match corr {
                    Some((label, corrv)) => Expr::call(
                        BuiltinFunc::HashReplacement,
                        vec![lit(index), lit("list"), lit(label), corrv],
                    ),
                    None => Expr::call(BuiltinFunc::ListReplacement, vec![lit(index)]),
                })
            }
            _ => Err(CompileError::at(
                &node,
                "cardinality of sub-query is too large; use LIMIT",
            )),
        }
    }

    /// A sub-query used as a scalar operand must produce at most one row
    /// of one column.
    fn scalar_sub(&mut self, s: SelectStmt) -> CompileResult<Expr> {
        let node = Expr::Select(Box::new(s.clone()));
        let mut sub = build_select(self.ctx, Some(self.scope), s)?;
        let cols = if sub.star_output {
            0
        } else {
            sub.final_bindings().len()
        };
        if cols != 1 {
            return Err(CompileError::at(
                &node,
                format!("cannot coerce sub-query with {cols} columns into a scalar"),
            ));
        }
        match sub.class() {
            SizeClass::Zero => Ok(Expr::Lit(Literal::Null)),
            SizeClass::One => {
                let corr = decorrelate(&mut sub, self.scope)?;
                let index = self.next_index();
                self.pending.push(sub);
                Ok(match corr {
                    Some((label, corrv)) => Expr::call(
                        BuiltinFunc::HashReplacement,
                        vec![lit(index), lit("scalar"), lit(label), corrv],
                    ),
                    None => Expr::call(BuiltinFunc::ScalarReplacement, vec![lit(index)]),
                })
            }
            _ => Err(CompileError::at(
                &node,
                "scalar sub-query has unbounded results; use LIMIT 1",
            )),
        }
    }

    fn in_subquery(&mut self, c: Call) -> CompileResult<Expr> {
        let mut it = c.args.into_iter();
        let (Some(lhs_raw), Some(sub_raw)) = (it.next(), it.next()) else {
            return Err(CompileError::internal("IN_SUBQUERY arity"));
        };
        let lhs = self.expr(lhs_raw, true)?;
        let Expr::Select(s) = sub_raw else {
            return Err(CompileError::at(&sub_raw, "IN expects a sub-query"));
        };
        let node = Expr::Select(s.clone());
        let sub = build_select(self.ctx, Some(self.scope), *s)?;
        let cols = if sub.star_output {
            0
        } else {
            sub.final_bindings().len()
        };
        if cols != 1 {
            return Err(CompileError::at(
                &node,
                format!("IN sub-query should have 1 column; have {cols}"),
            ));
        }
        if !collect_correlated(&sub, self.scope).is_empty() {
            return Err(CompileError::at(&node, "correlated IN sub-query is not supported"));
        }
        // membership is insensitive to duplicates, so an unbounded
        // sub-query can be deduplicated into a hashable one
        let mut sub = sub;
        if sub.class() == SizeClass::Unbounded {
            sub.push_distinct(Vec::new());
        }
        let index = self.next_index();
        match sub.class() {
            SizeClass::Zero => Ok(lit(false)),
            SizeClass::One => {
                self.pending.push(sub);
                Ok(Expr::compare(
                    CmpOp::Eq,
                    lhs,
                    Expr::call(BuiltinFunc::ScalarReplacement, vec![lit(index)]),
                ))
            }
            SizeClass::ExactSmall | SizeClass::ColumnCardinality => {
                self.pending.push(sub);
                Ok(Expr::call(
                    BuiltinFunc::InReplacement,
                    vec![lhs, lit(index)],
                ))
            }
            _ => Err(CompileError::at(
                &node,
                "sub-query cardinality too large; use LIMIT",
            )),
        }
    }
}

/// Free variables of a built trace: path heads bound by an enclosing scope
/// but not by the trace itself.
pub(crate) fn collect_correlated(sub: &Trace, scope: &OuterScope<'_>) -> HashSet<String> {
    let mut out = HashSet::new();
    for step in &sub.steps {
        step.visit_exprs(&mut |e, role| {
            if role == ExprRole::Table {
                return;
            }
            walk_fn(e, &mut |n| {
                if let Expr::Path(p) = n {
                    if !sub.scope.iter().any(|s| s == &p.first) && scope.resolves(&p.first) {
                        out.insert(p.first.clone());
                    }
                    return false;
                }
                true
            });
        });
    }
    out
}

/// Turn a correlated sub-trace into a keyed one: find the single equality
/// conjunct linking an outer expression to an inner one, remove it, and
/// expose the inner side as `$__key`. Returns the key label and the outer
/// expression.
fn decorrelate(
    sub: &mut Trace,
    scope: &OuterScope<'_>,
) -> CompileResult<Option<(String, Expr)>> {
    let corr = collect_correlated(sub, scope);
    if corr.is_empty() {
        return Ok(None);
    }
    let mut found: Option<(Expr, Expr)> = None;
    for step in &sub.steps {
        let Step::Filter(f) = step else { continue };
        for part in conjuncts(&f.predicate) {
            let Expr::Compare {
                op: CmpOp::Eq,
                left,
                right,
            } = part
            else {
                continue;
            };
            let pair = if is_outer_side(left, &corr) && is_inner_side(right, &corr) {
                Some(((**left).clone(), (**right).clone()))
            } else if is_outer_side(right, &corr) && is_inner_side(left, &corr) {
                Some(((**right).clone(), (**left).clone()))
            } else {
                None
            };
            if let Some(p) = pair {
                if found.is_some() {
                    return Err(CompileError::msg(
                        "multiple correlated predicates are not supported",
                    ));
                }
                found = Some(p);
            }
        }
    }
    let Some((outer_expr, inner_expr)) = found else {
        let name = corr.iter().next().cloned().unwrap_or_default();
        return Err(CompileError::msg(format!(
            "correlated sub-query is not supported (free variable '{name}')"
        )));
    };
    remove_conjunct(sub, &outer_expr, &inner_expr);
    if !collect_correlated(sub, scope).is_empty() {
        return Err(CompileError::msg(
            "correlated sub-query is not supported outside an equality predicate",
        ));
    }
    attach_key(sub, inner_expr)?;
    Ok(Some(("$__key".to_string(), outer_expr)))
}

fn remove_conjunct(sub: &mut Trace, outer_expr: &Expr, inner_expr: &Expr) {
    let t1 = Expr::compare(CmpOp::Eq, outer_expr.clone(), inner_expr.clone());
    let t2 = Expr::compare(CmpOp::Eq, inner_expr.clone(), outer_expr.clone());
    let mut drop_step = None;
    for (i, step) in sub.steps.iter_mut().enumerate() {
        let Step::Filter(f) = step else { continue };
        let parts: Vec<Expr> = conjuncts(&f.predicate)
            .into_iter()
            .filter(|p| **p != t1 && **p != t2)
            .cloned()
            .collect();
        if parts.len() == conjuncts(&f.predicate).len() {
            continue;
        }
        match tessera_expr::conjoin(parts) {
            Some(pred) => f.predicate = pred,
            None => drop_step = Some(i),
        }
        break;
    }
    if let Some(i) = drop_step {
        sub.steps.remove(i);
    }
}

fn attach_key(sub: &mut Trace, inner_expr: Expr) -> CompileResult<()> {
    if let Some(agg_idx) = sub
        .steps
        .iter()
        .position(|s| matches!(s, Step::Aggregate(_)))
    {
        if let Step::Aggregate(a) = &mut sub.steps[agg_idx] {
            a.group_by.push(Binding::named(inner_expr, "$__key"));
        }
        for step in sub.steps[agg_idx + 1..].iter_mut() {
            if let Step::Bind(b) = step {
                b.bindings
                    .push(Binding::named(Expr::path("$__key"), "$__key"));
            }
        }
    } else {
        let bind = sub
            .steps
            .iter_mut()
            .rev()
            .find(|s| matches!(s, Step::Bind(_)));
        match bind {
            Some(Step::Bind(b)) => {
                b.bindings.push(Binding::named(inner_expr, "$__key"));
            }
            _ => return Err(CompileError::msg("cannot decorrelate sub-query")),
        }
    }
    sub.final_bindings_mut()
        .push(Binding::named(Expr::path("$__key"), "$__key"));
    Ok(())
}

fn side_heads(e: &Expr) -> (HashSet<String>, bool) {
    let mut heads = HashSet::new();
    let mut has_path = false;
    walk_fn(e, &mut |n| {
        if let Expr::Path(p) = n {
            has_path = true;
            heads.insert(p.first.clone());
            return false;
        }
        true
    });
    (heads, has_path)
}

fn is_outer_side(e: &Expr, corr: &HashSet<String>) -> bool {
    let (heads, has_path) = side_heads(e);
    has_path && heads.iter().all(|h| corr.contains(h))
}

fn is_inner_side(e: &Expr, corr: &HashSet<String>) -> bool {
    let (heads, _) = side_heads(e);
    heads.iter().all(|h| !corr.contains(h))
}

/// Whether the non-key output of a hash replacement can never be MISSING.
fn replacement_never_missing(rep: &Trace, label: &str) -> bool {
    let fb = rep.final_bindings();
    if fb.len() > 2 {
        // the lookup yields a whole struct, which always exists
        return true;
    }
    let Some(other) = fb.iter().find(|b| b.result() != label) else {
        return false;
    };
    let hint = StepHint::new(&rep.steps);
    let ts = type_of(&Expr::path(other.result()), &hint);
    !ts.contains(TypeSet::MISSING)
}

/// Strip the replacement's output to the single key column.
fn strip_final(rep: &mut Trace, label: &str) -> bool {
    let Some(bind_idx) = rep
        .steps
        .iter()
        .rposition(|s| matches!(s, Step::Bind(_)))
    else {
        return false;
    };
    // only row-count steps may sit above the projection being stripped
    if !rep.steps[bind_idx + 1..]
        .iter()
        .all(|s| matches!(s, Step::LimitOffset(_)))
    {
        return false;
    }
    let Step::Bind(b) = &mut rep.steps[bind_idx] else {
        return false;
    };
    let Some(keep) = b.bindings.iter().position(|x| x.result() == label) else {
        return false;
    };
    let kept = b.bindings[keep].clone();
    b.bindings = vec![kept.clone()];
    rep.set_final(vec![kept], false);
    true
}
