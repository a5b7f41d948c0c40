//! Window-aggregate hoisting.
//!
//! `agg OVER (PARTITION BY k)` cannot be executed inline; it is rewritten
//! into a hash lookup against an auxiliary sub-trace that computes the
//! aggregate grouped by the partition key, exposing `($__val, $__key)`.
//! `COUNT(DISTINCT x)` combined with other aggregates over a single
//! grouping key is promoted into the same windowed form.

use tessera_expr::{
    copy, copy_select, equivalent, lit, walk::map_children, walk_fn, AggOp, Binding, BuiltinFunc,
    CompileError, CompileResult, Expr, FromClause, Literal, SelectStmt,
};

use crate::build::{build_select, gensym, BuildCtx, OuterScope};
use crate::trace::Trace;

/// `SELECT DISTINCT` over a global aggregation produces one row, so the
/// DISTINCT is dropped. A lone `COUNT(DISTINCT x)` global aggregate is
/// deduplicated through a `DISTINCT ON` sub-select instead, which the
/// optimizer later collapses to a plain `COUNT`.
pub(crate) fn agg_distinct_promote(s: &mut SelectStmt) {
    let has_agg = s
        .columns
        .iter()
        .any(|c| tessera_expr::has_aggregate(&c.expr))
        || s.having
            .as_ref()
            .is_some_and(|h| tessera_expr::has_aggregate(h));
    if s.distinct && s.group_by.is_empty() && has_agg {
        s.distinct = false;
    }
    if !s.group_by.is_empty() || s.has_distinct() || s.from.is_none() {
        return;
    }
    let aggs = unique_aggregates(s);
    let [(op, inner)] = aggs.as_slice() else {
        return;
    };
    if *op != AggOp::CountDistinct {
        return;
    }
    let inner = inner.clone();
    // SELECT COUNT(DISTINCT x) FROM t WHERE w
    //   => SELECT COUNT(x') FROM (SELECT DISTINCT ON (x) x AS x' FROM t WHERE w)
    let sub = SelectStmt {
        columns: vec![Binding::named(inner.clone(), "$__distinct")],
        distinct_on: Some(vec![inner.clone()]),
        from: s.from.take(),
        where_clause: s.where_clause.take(),
        ..SelectStmt::default()
    };
    s.from = Some(FromClause::Table(Binding::new(Expr::Select(Box::new(sub)))));
    let rewrite_counts = |e: Expr| -> Expr {
        fn go(e: Expr, target: &Expr) -> Expr {
            if let Expr::Agg(a) = &e {
                if a.op == AggOp::CountDistinct && a.over.is_none() && equivalent(&a.inner, target)
                {
                    let mut a = a.clone();
                    a.inner = Box::new(Expr::path("$__distinct"));
                    return Expr::Agg(a);
                }
            }
            if matches!(e, Expr::Select(_)) {
                return e;
            }
            map_children(e, &mut |c| go(c, target))
        }
        go(e, &inner)
    };
    for c in &mut s.columns {
        let e = std::mem::replace(&mut c.expr, Expr::Star);
        c.expr = rewrite_counts(e);
    }
    if let Some(h) = s.having.take() {
        s.having = Some(rewrite_counts(h));
    }
    for k in &mut s.order_by {
        let e = std::mem::replace(&mut k.expr, Expr::Star);
        k.expr = rewrite_counts(e);
    }
}

fn unique_aggregates(s: &SelectStmt) -> Vec<(AggOp, Expr)> {
    let mut uniq: Vec<tessera_expr::Aggregate> = Vec::new();
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
    for c in &s.columns {
        collect_from(&c.expr);
    }
    if let Some(h) = &s.having {
        collect_from(h);
    }
    for k in &s.order_by {
        collect_from(&k.expr);
    }
    uniq.into_iter()
        .map(|a| (a.op, (*a.inner).clone()))
        .collect()
}

fn has_only_one_aggregate(s: &SelectStmt) -> bool {
    unique_aggregates(s).len() == 1
}

/// Rewrite every windowed aggregate in the column list into a
/// `HASH_REPLACEMENT` lookup against a freshly built auxiliary trace.
pub(crate) fn hoist_windows(
    ctx: &mut BuildCtx<'_>,
    t: &mut Trace,
    s: &mut SelectStmt,
    outer: Option<&OuterScope<'_>>,
) -> CompileResult<()> {
    let snapshot = s.clone();
    let mut columns = std::mem::take(&mut s.columns);
    for c in &mut columns {
        let e = std::mem::replace(&mut c.expr, Expr::Star);
        c.expr = rewrite_windows(ctx, t, &snapshot, e, outer)?;
    }
    s.columns = columns;
    Ok(())
}

fn rewrite_windows(
    ctx: &mut BuildCtx<'_>,
    t: &mut Trace,
    snapshot: &SelectStmt,
    e: Expr,
    outer: Option<&OuterScope<'_>>,
) -> CompileResult<Expr> {
    match e {
        Expr::Agg(mut agg) => {
            // COUNT(DISTINCT x) alongside other aggregates behaves like a
            // window partitioned by the (single) grouping key
            if agg.op == AggOp::CountDistinct
                && agg.over.is_none()
                && snapshot.group_by.len() == 1
                && !has_only_one_aggregate(snapshot)
            {
                agg = agg.over(
                    snapshot
                        .group_by
                        .iter()
                        .map(|g| g.expr.clone())
                        .collect(),
                );
            }
            match agg.over.take() {
                Some(window) => hoist_one_window(ctx, t, snapshot, agg, window, outer),
                None => Ok(Expr::Agg(agg)),
            }
        }
        Expr::Select(_) => Ok(e),
        other => {
            let mut err = None;
            let out = map_children(other, &mut |c| {
                if err.is_some() {
                    return c;
                }
                match rewrite_windows(ctx, t, snapshot, c, outer) {
                    Ok(v) => v,
                    Err(e2) => {
                        err = Some(e2);
                        Expr::Star
                    }
                }
            });
            match err {
                Some(e2) => Err(e2),
                None => Ok(out),
            }
        }
    }
}

fn hoist_one_window(
    ctx: &mut BuildCtx<'_>,
    t: &mut Trace,
    snapshot: &SelectStmt,
    mut agg: tessera_expr::Aggregate,
    window: tessera_expr::Window,
    outer: Option<&OuterScope<'_>>,
) -> CompileResult<Expr> {
    let mut partition = match window.partition_by.as_slice() {
        [single] => single.clone(),
        _ => {
            return Err(CompileError::at(
                &Expr::Agg(agg),
                "only 1 PARTITION BY column supported (for now)",
            ))
        }
    };
    let key = copy(&partition)?;

    // everything that happens before SELECT participates in the window
    let mut aux = copy_select(&SelectStmt {
        from: snapshot.from.clone(),
        where_clause: snapshot.where_clause.clone(),
        group_by: snapshot.group_by.clone(),
        having: snapshot.having.clone(),
        ..SelectStmt::default()
    })?;

    if agg.op == AggOp::CountDistinct {
        aux.group_by
            .push(Binding::named((*agg.inner).clone(), "$__distinct"));
        agg.op = AggOp::Count;
        agg.inner = Box::new(Expr::Star);
    }

    // an existing GROUP BY means the partition key references one of its
    // bindings; the second grouping over it is just a DISTINCT
    if !aux.group_by.is_empty() {
        let mut group = std::mem::take(&mut aux.group_by);
        for (i, g) in group.iter_mut().enumerate() {
            if equivalent(&g.expr, &partition) {
                if !g.explicit() {
                    let derived = g.result();
                    if derived.is_empty() {
                        g.set_name(gensym(3, i));
                    } else {
                        g.set_name(derived);
                    }
                }
                partition = Expr::path(g.result());
            }
        }
        let mut inner = std::mem::take(&mut aux);
        inner.columns = group;
        inner.distinct = true;
        aux.from = Some(FromClause::Table(Binding::new(Expr::Select(Box::new(inner)))));
    }

    aux.group_by = vec![Binding::named(partition, "$__key")];
    aux.columns = vec![
        Binding::named(Expr::Agg(agg.clone()), "$__val"),
        Binding::named(Expr::path("$__key"), "$__key"),
    ];

    let default = if agg.op == AggOp::Count {
        lit(0i64)
    } else {
        Expr::Lit(Literal::Null)
    };
    let index = t.replacements.len() as i64;
    let scope = OuterScope {
        id: t.id,
        names: Vec::new(),
        parent: outer,
    };
    let sub = build_select(ctx, Some(&scope), aux)?;
    t.replacements.push(sub);
    Ok(Expr::call(
        BuiltinFunc::HashReplacement,
        vec![lit(index), lit("scalar"), lit("$__key"), key, default],
    ))
}
