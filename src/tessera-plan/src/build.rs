//! The trace builder: lowers a `Query` AST into a `Trace`.
//!
//! Clauses are walked in binding order (FROM, WHERE, GROUP BY / SELECT /
//! HAVING, ORDER BY, LIMIT), then sub-queries are hoisted into replacement
//! traces, and the optimizer pipeline runs on the result. CTE references
//! are substituted up front with codec deep-copies of their bodies.

use std::collections::HashSet;

use tessera_expr::{
    check, copy_select, equivalent, has_aggregate, simplify, walk::map_children, walk_fn,
    Accessor, Aggregate, Binding, CompileError, CompileResult, Cte, Expr, FromClause, JoinKind, NoHint,
    OrderKey, Query, SelectStmt, Unpivot,
};

use crate::env::Env;
use crate::hoist::hoist;
use crate::optimize::{optimize, postcheck};
use crate::timerange::prune_time_filters;
use crate::trace::{Trace, TraceId};
use crate::windows::{agg_distinct_promote, hoist_windows};

/// Shared state for one compilation.
pub(crate) struct BuildCtx<'e> {
    pub env: &'e dyn Env,
    next_id: TraceId,
}

impl<'e> BuildCtx<'e> {
    pub fn new(env: &'e dyn Env) -> Self {
        Self { env, next_id: 0 }
    }

    pub fn alloc_id(&mut self) -> TraceId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// The lexical scope chain used to resolve free variables while building
/// sub-traces.
pub(crate) struct OuterScope<'a> {
    pub id: TraceId,
    pub names: Vec<String>,
    pub parent: Option<&'a OuterScope<'a>>,
}

impl OuterScope<'_> {
    /// Whether `name` is bound anywhere in the chain.
    pub fn resolves(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name) || self.parent.is_some_and(|p| p.resolves(name))
    }
}

/// Generate a compiler temporary name. `class` namespaces the generator:
/// group keys, aggregate outputs, window temporaries, and auxiliary
/// projections draw from distinct classes so they never collide.
pub(crate) fn gensym(class: u32, i: usize) -> String {
    format!("$_{class}_{i}")
}

/// Lower a query into an optimized trace.
///
/// The optional environment provides schema hints and time-range indices
/// used for type-directed simplification and filter pruning.
pub fn build(q: &Query, env: &dyn Env) -> CompileResult<Trace> {
    let mut ctx = BuildCtx::new(env);
    let mut body = q.body.clone();
    if !q.with.is_empty() {
        body = replace_tables(body, &q.with)?;
    }
    let sel = match body {
        Expr::Select(s) => *s,
        other => {
            return Err(CompileError::at(
                &other,
                "cannot compile query body; only SELECT is supported",
            ))
        }
    };
    let mut t = build_select(&mut ctx, None, sel)?;
    if let Some(into) = &q.into {
        let target = into_target(into)?;
        t.push_output(into.clone(), target);
    }
    postcheck(&t)?;
    Ok(t)
}

fn into_target(e: &Expr) -> CompileResult<String> {
    let Expr::Path(p) = e else {
        return Err(CompileError::at(e, format!("unsupported INTO: {e}")));
    };
    match p.rest.as_slice() {
        [Accessor::Field(table)] => Ok(format!("db/{}/{}", p.first, table)),
        [] => Err(CompileError::at(e, format!("INTO missing database: {e}"))),
        _ => Err(CompileError::at(e, format!("unsupported INTO: {e}"))),
    }
}

/// Build a complete trace for one SELECT, then run the optimizer pipeline
/// over it.
pub(crate) fn build_select(
    ctx: &mut BuildCtx<'_>,
    outer: Option<&OuterScope<'_>>,
    s: SelectStmt,
) -> CompileResult<Trace> {
    let mut t = Trace::new(ctx.alloc_id(), outer.map(|o| o.id));
    walk_select(ctx, &mut t, s, outer)?;
    optimize(&mut t)?;
    Ok(t)
}

pub(crate) fn walk_select(
    ctx: &mut BuildCtx<'_>,
    t: &mut Trace,
    s: SelectStmt,
    outer: Option<&OuterScope<'_>>,
) -> CompileResult<()> {
    let mut s = match simplify(Expr::Select(Box::new(s)), &NoHint) {
        Expr::Select(s) => *s,
        other => return Err(CompileError::at(&other, "SELECT simplified to a non-SELECT")),
    };
    check(&s)?;

    pick_outputs(&mut s);
    normalize_order_by(&mut s);
    flatten_bind(&mut s)?;
    agg_distinct_promote(&mut s);
    hoist_windows(ctx, t, &mut s, outer)?;

    walk_from(ctx, t, s.from.take(), outer)?;

    if let Some(w) = s.where_clause.take() {
        t.push_filter(w);
    }

    if s.distinct_on.is_some() {
        drop_constants_from_distinct_on(&mut s);
    }

    let order = std::mem::take(&mut s.order_by);
    let group_by = std::mem::take(&mut s.group_by);
    let having = s.having.take();
    let has_aggregates = any_has_aggregate(&s.columns)
        || order.iter().any(|k| has_aggregate(&k.expr))
        || having.as_ref().is_some_and(has_aggregate);

    if s.has_distinct() && !group_by.is_empty() && having.is_none() {
        if s.distinct {
            // SELECT DISTINCT exprs ... GROUP BY exprs
            //   => SELECT exprs ... GROUP BY exprs
            if !exprs_equal_group_by(
                &s.columns.iter().map(|c| c.expr.clone()).collect::<Vec<_>>(),
                &group_by,
            ) {
                return Err(CompileError::msg(
                    "set of DISTINCT expressions has to be equal to GROUP BY expressions",
                ));
            }
            split_aggregate(t, order, &s.columns, group_by, None, &[])?;
        } else {
            let mut on = s.distinct_on.take().unwrap_or_default();
            pull_group_bindings(&mut on, &group_by);
            if exprs_equal_group_by(&on, &group_by) {
                // DISTINCT ON over exactly the grouping keys is implied
                split_aggregate(t, order, &s.columns, group_by, None, &[])?;
            } else {
                let missing: Vec<Expr> = on
                    .iter()
                    .filter(|e| !s.columns.iter().any(|c| equivalent(e, &c.expr)))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    let split = split_aggregate(t, order, &s.columns, group_by, None, &[])?;
                    let rewritten = on.into_iter().map(|e| split.rewrite(e)).collect();
                    t.push_distinct(rewritten);
                } else {
                    // expose the DISTINCT ON expressions missing from the
                    // selection, dedup, then re-bind the requested columns
                    let aux: Vec<Binding> = missing
                        .iter()
                        .enumerate()
                        .map(|(i, e)| Binding::named(e.clone(), gensym(4, i)))
                        .collect();
                    let split = split_aggregate(t, order, &s.columns, group_by, None, &aux)?;
                    let rewritten: Vec<Expr> = on
                        .iter()
                        .map(|e| {
                            if let Some(c) =
                                s.columns.iter().find(|c| equivalent(e, &c.expr))
                            {
                                Expr::path(c.result())
                            } else if let Some(a) =
                                aux.iter().find(|a| equivalent(e, &a.expr))
                            {
                                Expr::path(a.result())
                            } else {
                                split.rewrite(e.clone())
                            }
                        })
                        .collect();
                    t.push_distinct(rewritten);
                    let names: Vec<String> =
                        s.columns.iter().map(Binding::result).collect();
                    t.push_bind(identity_bindings(&names));
                }
            }
        }
    } else if having.is_some() || !group_by.is_empty() || has_aggregates {
        if s.distinct && !group_by.is_empty() {
            return Err(CompileError::msg(
                "mixed hash aggregate and DISTINCT not supported",
            ));
            // DISTINCT without GROUP BY over aggregates was already
            // cleared by agg_distinct_promote: one output row anyway
        }
        split_aggregate(t, order, &s.columns, group_by, having, &[])?;
    } else {
        let selectall = is_select_all(&s);
        if selectall && !s.has_distinct() {
            t.push_bind_star();
            if !order.is_empty() {
                t.push_order(order);
            }
        } else {
            let mut bindcols = true;
            if s.distinct {
                t.push_distinct(s.columns.iter().map(|c| c.expr.clone()).collect());
            } else if let Some(on) = s.distinct_on.take() {
                t.push_distinct(on);
                if selectall {
                    // do not re-bind '*' after DISTINCT ON (...) *
                    t.push_bind_star();
                    bindcols = false;
                }
            }
            if bindcols {
                push_projection_with_order(t, s.columns.clone(), order);
            } else if !order.is_empty() {
                t.push_order(order);
            }
        }
    }

    if let Some(limit) = s.limit {
        t.push_limit(limit, s.offset.unwrap_or(0));
    }

    prune_time_filters(ctx, t);
    hoist(ctx, t, outer)
}

fn walk_from(
    ctx: &mut BuildCtx<'_>,
    t: &mut Trace,
    from: Option<FromClause>,
    outer: Option<&OuterScope<'_>>,
) -> CompileResult<()> {
    match from {
        None => {
            t.push_dummy();
            Ok(())
        }
        Some(FromClause::Table(b)) => walk_from_table(ctx, t, b, outer),
        Some(FromClause::Join { kind, left, right }) => {
            if kind != JoinKind::Cross {
                return Err(CompileError::at(
                    &right.expr,
                    format!("join {kind} not yet supported"),
                ));
            }
            walk_from(ctx, t, Some(*left), outer)?;
            t.push_iterate(right);
            Ok(())
        }
    }
}

fn walk_from_table(
    ctx: &mut BuildCtx<'_>,
    t: &mut Trace,
    b: Binding,
    outer: Option<&OuterScope<'_>>,
) -> CompileResult<()> {
    let alias = b.explicit().then(|| b.result());
    match b.expr {
        Expr::Select(s) => {
            walk_select(ctx, t, *s, outer)?;
            t.push_pseudo_table();
            Ok(())
        }
        Expr::Unpivot(u) => build_unpivot(ctx, t, *u, outer),
        other => {
            let hint = ctx.env.schema(&other);
            let mut table = Binding::new(other);
            if let Some(name) = alias {
                table.set_name(name);
            }
            t.push_scan(table, hint);
            Ok(())
        }
    }
}

fn build_unpivot(
    ctx: &mut BuildCtx<'_>,
    t: &mut Trace,
    u: Unpivot,
    outer: Option<&OuterScope<'_>>,
) -> CompileResult<()> {
    if u.as_label.is_none() && u.at_label.is_none() {
        return Err(CompileError::msg(
            "the AS and AT UNPIVOT labels must not both be empty",
        ));
    }
    if u.as_label.is_some() && u.as_label == u.at_label {
        return Err(CompileError::msg(format!(
            "the AS and AT UNPIVOT labels must not be the same '{}'",
            u.as_label.as_deref().unwrap_or_default()
        )));
    }
    match u.tuple_ref {
        Expr::Path(_) => {
            let hint = ctx.env.schema(&u.tuple_ref);
            t.push_scan(Binding::new(u.tuple_ref), hint);
        }
        Expr::Select(s) => {
            walk_select(ctx, t, *s, outer)?;
            t.push_pseudo_table();
        }
        ref other => {
            return Err(CompileError::at(
                other,
                format!("UNPIVOT expects a table reference, got {other}"),
            ))
        }
    }
    t.push_unpivot(u.as_label, u.at_label);
    Ok(())
}

// ---------------------------------------------------------------------------
// CTE substitution

fn replace_tables(body: Expr, with: &[Cte]) -> CompileResult<Expr> {
    let mut with = with.to_vec();
    // resolve references between the CTEs themselves, in binding order
    for i in 1..with.len() {
        let (earlier, rest) = with.split_at_mut(i);
        rest[0].body = replace_in_select(rest[0].body.clone(), earlier)?;
    }
    replace_in_expr(body, &with)
}

fn replace_in_expr(e: Expr, with: &[Cte]) -> CompileResult<Expr> {
    match e {
        Expr::Select(s) => Ok(Expr::Select(Box::new(replace_in_select(*s, with)?))),
        other => try_map_children(other, &mut |c| replace_in_expr(c, with)),
    }
}

fn replace_in_select(mut s: SelectStmt, with: &[Cte]) -> CompileResult<SelectStmt> {
    if let Some(from) = s.from.take() {
        s.from = Some(replace_in_from(from, with)?);
    }
    for c in &mut s.columns {
        let e = std::mem::replace(&mut c.expr, Expr::Star);
        c.expr = replace_in_expr(e, with)?;
    }
    if let Some(on) = s.distinct_on.take() {
        s.distinct_on = Some(
            on.into_iter()
                .map(|e| replace_in_expr(e, with))
                .collect::<CompileResult<Vec<_>>>()?,
        );
    }
    if let Some(w) = s.where_clause.take() {
        s.where_clause = Some(replace_in_expr(w, with)?);
    }
    for g in &mut s.group_by {
        let e = std::mem::replace(&mut g.expr, Expr::Star);
        g.expr = replace_in_expr(e, with)?;
    }
    if let Some(h) = s.having.take() {
        s.having = Some(replace_in_expr(h, with)?);
    }
    for k in &mut s.order_by {
        let e = std::mem::replace(&mut k.expr, Expr::Star);
        k.expr = replace_in_expr(e, with)?;
    }
    Ok(s)
}

fn replace_in_from(from: FromClause, with: &[Cte]) -> CompileResult<FromClause> {
    match from {
        FromClause::Table(b) => Ok(FromClause::Table(replace_table_binding(b, with)?)),
        FromClause::Join { kind, left, right } => Ok(FromClause::Join {
            kind,
            left: Box::new(replace_in_from(*left, with)?),
            right: replace_table_binding(right, with)?,
        }),
    }
}

fn replace_table_binding(mut b: Binding, with: &[Cte]) -> CompileResult<Binding> {
    let alias = b.result();
    let e = std::mem::replace(&mut b.expr, Expr::Star);
    b.expr = replace_table_expr(e, &alias, with)?;
    Ok(b)
}

fn replace_table_expr(e: Expr, alias: &str, with: &[Cte]) -> CompileResult<Expr> {
    match e {
        Expr::Path(p) if p.rest.is_empty() => match clone_cte(&p.first, alias, with)? {
            Some(body) => Ok(Expr::Select(Box::new(body))),
            None => Ok(Expr::Path(p)),
        },
        Expr::Unpivot(mut u) => {
            let inner = std::mem::replace(&mut u.tuple_ref, Expr::Star);
            u.tuple_ref = replace_table_expr(inner, alias, with)?;
            Ok(Expr::Unpivot(u))
        }
        Expr::Appended(parts) => Ok(Expr::Appended(
            parts
                .into_iter()
                .map(|p| replace_table_expr(p, alias, with))
                .collect::<CompileResult<Vec<_>>>()?,
        )),
        Expr::Select(s) => Ok(Expr::Select(Box::new(replace_in_select(*s, with)?))),
        other => Ok(other),
    }
}

/// Find a CTE by name, walking bindings in reverse declaration order, and
/// return a deep copy of its body. A table alias that collides with a CTE
/// name still in scope is a shadow conflict.
fn clone_cte(name: &str, alias: &str, with: &[Cte]) -> CompileResult<Option<SelectStmt>> {
    for cte in with.iter().rev() {
        if name == cte.name {
            return Ok(Some(copy_select(&cte.body)?));
        }
        if !alias.is_empty() && alias == cte.name {
            return Err(CompileError::msg(format!(
                "table binding '{alias}' shadows CTE binding '{}'",
                cte.name
            )));
        }
    }
    Ok(None)
}

fn try_map_children(
    e: Expr,
    f: &mut impl FnMut(Expr) -> CompileResult<Expr>,
) -> CompileResult<Expr> {
    let mut err = None;
    let out = map_children(e, &mut |c| {
        if err.is_some() {
            return c;
        }
        match f(c) {
            Ok(v) => v,
            Err(e2) => {
                err = Some(e2);
                Expr::Star
            }
        }
    });
    match err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

// ---------------------------------------------------------------------------
// SELECT pre-passes

/// Assign automatic result names where absent, so every column can be
/// projected. Implicit duplicates get `_<i>` suffixes until unique.
fn pick_outputs(s: &mut SelectStmt) {
    let mut used: HashSet<String> = HashSet::new();
    for (i, c) in s.columns.iter_mut().enumerate() {
        if c.explicit() {
            used.insert(c.result());
            continue;
        }
        let mut res = c.result();
        while res.is_empty() || used.contains(&res) {
            res.push_str(&format!("_{}", i + 1));
        }
        used.insert(res.clone());
        c.set_name(res);
    }
}

/// Replace ORDER BY expressions that are syntactically equivalent to a
/// top-level SELECT expression with a reference to that column's result
/// name (PartiQL requires exact syntactic identity here).
fn normalize_order_by(s: &mut SelectStmt) {
    for k in &mut s.order_by {
        for c in &s.columns {
            if equivalent(&k.expr, &c.expr) {
                k.expr = Expr::path(c.result());
                break;
            }
        }
    }
}

/// Expand `t.*` against the sole FROM binding.
fn flatten_bind(s: &mut SelectStmt) -> CompileResult<()> {
    let ncols = s.columns.len();
    let from_alias = match &s.from {
        Some(FromClause::Table(b)) => Some(b.result()),
        _ => None,
    };
    for c in &mut s.columns {
        if let Expr::QualifiedStar(q) = &c.expr {
            if ncols > 1 {
                return Err(CompileError::at(
                    &c.expr,
                    format!("cannot expand {q}.* among other columns"),
                ));
            }
            if from_alias.as_deref() == Some(q.as_str()) {
                c.expr = Expr::Star;
            } else {
                return Err(CompileError::at(
                    &c.expr,
                    format!("no binding {q} to expand"),
                ));
            }
        }
    }
    Ok(())
}

/// `DISTINCT ON` with constant expressions: constants never distinguish
/// rows, and an all-constant key set keeps exactly one row.
fn drop_constants_from_distinct_on(s: &mut SelectStmt) {
    let Some(on) = &mut s.distinct_on else {
        return;
    };
    let nonconst: Vec<Expr> = on.iter().filter(|e| !e.is_literal()).cloned().collect();
    if nonconst.len() == on.len() {
        return;
    }
    if nonconst.is_empty() {
        s.distinct_on = None;
        s.limit = Some(1);
    } else {
        *on = nonconst;
    }
}

/// Pull grouping expressions into the DISTINCT ON list so that a DISTINCT
/// ON subset of the grouping keys compares equal to them.
fn pull_group_bindings(on: &mut Vec<Expr>, group_by: &[Binding]) {
    for g in group_by {
        if !on.iter().any(|e| equivalent(e, &g.expr)) {
            on.push(g.expr.clone());
        }
    }
}

fn exprs_equal_group_by(exprs: &[Expr], group_by: &[Binding]) -> bool {
    exprs.len() == group_by.len()
        && exprs
            .iter()
            .all(|e| group_by.iter().any(|g| equivalent(e, &g.expr)))
}

fn any_has_aggregate(columns: &[Binding]) -> bool {
    columns.iter().any(|c| has_aggregate(&c.expr))
}

fn is_select_all(s: &SelectStmt) -> bool {
    s.columns.len() == 1 && matches!(s.columns[0].expr, Expr::Star)
}

pub(crate) fn identity_bindings(names: &[String]) -> Vec<Binding> {
    names
        .iter()
        .map(|n| Binding::named(Expr::path(n.clone()), n.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Aggregate splitting

/// The two-phase decomposition of an aggregating SELECT: the unique
/// aggregate expressions and named grouping keys that form the
/// `Aggregate` step, plus the rewrite that maps original clause
/// expressions onto the step's outputs.
pub(crate) struct AggSplit {
    aggs: Vec<(Aggregate, String)>,
    groups: Vec<Binding>,
}

impl AggSplit {
    fn collect(
        columns: &[Binding],
        mut group_by: Vec<Binding>,
        having: Option<&Expr>,
        order: &[OrderKey],
        extra: &[Binding],
    ) -> Self {
        let mut uniq: Vec<Aggregate> = Vec::new();
        {
            let mut collect_from = |e: &Expr| {
                walk_fn(e, &mut |n| {
                    if matches!(n, Expr::Select(_)) {
                        return false;
                    }
                    if let Expr::Agg(a) = n {
                        if !uniq.iter().any(|x| x == a) {
                            uniq.push(a.clone());
                        }
                        return false;
                    }
                    true
                });
            };
            for c in columns {
                collect_from(&c.expr);
            }
            if let Some(h) = having {
                collect_from(h);
            }
            for k in order {
                collect_from(&k.expr);
            }
            for b in extra {
                collect_from(&b.expr);
            }
        }
        let aggs = uniq
            .into_iter()
            .enumerate()
            .map(|(i, a)| {
                let name = columns
                    .iter()
                    .find(|c| matches!(&c.expr, Expr::Agg(x) if x == &a))
                    .map(Binding::result)
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| gensym(2, i));
                (a, name)
            })
            .collect();
        for (i, g) in group_by.iter_mut().enumerate() {
            if !g.explicit() {
                let derived = g.result();
                if derived.is_empty() {
                    g.set_name(gensym(1, i));
                } else {
                    g.set_name(derived);
                }
            }
        }
        Self {
            aggs,
            groups: group_by,
        }
    }

    /// Rewrite a clause expression in terms of the aggregate step's
    /// outputs. Applied top-down so grouping keys nested inside aggregate
    /// arguments are left alone; nested SELECTs are not entered.
    pub(crate) fn rewrite(&self, e: Expr) -> Expr {
        if let Expr::Agg(a) = &e {
            if let Some((_, name)) = self.aggs.iter().find(|(x, _)| x == a) {
                return Expr::path(name.clone());
            }
        }
        for g in &self.groups {
            if equivalent(&e, &g.expr) {
                return Expr::path(g.result());
            }
        }
        if matches!(e, Expr::Select(_)) {
            return e;
        }
        map_children(e, &mut |c| self.rewrite(c))
    }

    fn agg_bindings(&self) -> Vec<Binding> {
        self.aggs
            .iter()
            .map(|(a, n)| Binding::named(Expr::Agg(a.clone()), n.clone()))
            .collect()
    }
}

/// Emit the aggregate step plus its surrounding projection, HAVING filter,
/// and ordering for one SELECT.
fn split_aggregate(
    t: &mut Trace,
    order: Vec<OrderKey>,
    columns: &[Binding],
    group_by: Vec<Binding>,
    having: Option<Expr>,
    aux: &[Binding],
) -> CompileResult<AggSplit> {
    let split = AggSplit::collect(columns, group_by, having.as_ref(), &order, aux);
    let mut post: Vec<Binding> = columns
        .iter()
        .map(|c| Binding::named(split.rewrite(c.expr.clone()), c.result()))
        .collect();
    post.extend(
        aux.iter()
            .map(|b| Binding::named(split.rewrite(b.expr.clone()), b.result())),
    );
    t.push_aggregate(split.agg_bindings(), split.groups.clone());
    if let Some(h) = having {
        t.push_filter(split.rewrite(h));
    }
    let keys: Vec<OrderKey> = order
        .into_iter()
        .map(|mut k| {
            k.expr = split.rewrite(k.expr);
            k
        })
        .collect();
    push_projection_with_order(t, post, keys);
    Ok(split)
}

/// Push a projection followed by an ordering. Order keys that reference
/// names outside the projection are carried through auxiliary bindings and
/// the requested columns re-bound afterwards.
fn push_projection_with_order(t: &mut Trace, columns: Vec<Binding>, mut keys: Vec<OrderKey>) {
    if keys.is_empty() {
        t.push_bind(columns);
        return;
    }
    let out: HashSet<String> = columns.iter().map(Binding::result).collect();
    let mut aux = Vec::new();
    for (i, k) in keys.iter_mut().enumerate() {
        if !heads_resolve(&k.expr, &out) {
            let name = gensym(4, i);
            aux.push(Binding::named(k.expr.clone(), name.clone()));
            k.expr = Expr::path(name);
        }
    }
    if aux.is_empty() {
        t.push_bind(columns);
        t.push_order(keys);
    } else {
        let names: Vec<String> = columns.iter().map(Binding::result).collect();
        let mut all = columns;
        all.extend(aux);
        t.push_bind(all);
        t.push_order(keys);
        t.push_bind(identity_bindings(&names));
    }
}

/// Whether every path head of `e` (outside nested SELECTs) is one of the
/// given output names.
fn heads_resolve(e: &Expr, out: &HashSet<String>) -> bool {
    let mut ok = true;
    walk_fn(e, &mut |n| {
        if !ok || matches!(n, Expr::Select(_)) {
            return false;
        }
        if let Expr::Path(p) = n {
            if !out.contains(&p.first) {
                ok = false;
            }
            return false;
        }
        true
    });
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_expr::{lit, path};

    #[test]
    fn test_pick_outputs_unique() {
        let mut s = SelectStmt {
            columns: vec![
                Binding::new(path("a")),
                Binding::new(path("a")),
                Binding::new(lit(1i64)),
            ],
            ..SelectStmt::default()
        };
        pick_outputs(&mut s);
        assert_eq!(s.columns[0].result(), "a");
        assert_eq!(s.columns[1].result(), "a_2");
        assert_eq!(s.columns[2].result(), "_3");
    }

    #[test]
    fn test_normalize_order_by() {
        let mut s = SelectStmt {
            columns: vec![Binding::named(
                Expr::arith(tessera_expr::ArithOp::Add, path("a"), lit(1i64)),
                "a1",
            )],
            order_by: vec![OrderKey::asc(Expr::arith(
                tessera_expr::ArithOp::Add,
                path("a"),
                lit(1i64),
            ))],
            ..SelectStmt::default()
        };
        normalize_order_by(&mut s);
        assert_eq!(s.order_by[0].expr, path("a1"));
    }

    #[test]
    fn test_drop_constants_from_distinct_on() {
        let mut s = SelectStmt {
            distinct_on: Some(vec![path("a"), lit(1i64)]),
            ..SelectStmt::default()
        };
        drop_constants_from_distinct_on(&mut s);
        assert_eq!(s.distinct_on, Some(vec![path("a")]));

        let mut s = SelectStmt {
            distinct_on: Some(vec![lit(1i64), lit("x")]),
            ..SelectStmt::default()
        };
        drop_constants_from_distinct_on(&mut s);
        assert_eq!(s.distinct_on, None);
        assert_eq!(s.limit, Some(1));
    }

    #[test]
    fn test_into_target() {
        let into = Expr::field("mydb", "mytable");
        assert_eq!(into_target(&into).unwrap(), "db/mydb/mytable");

        assert!(into_target(&path("justdb")).is_err());
        assert!(into_target(&lit(1i64)).is_err());
    }
}
