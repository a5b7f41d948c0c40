//! Canonical rendering of a trace back into a query AST.
//!
//! The renderer inverts the clause walk for traces without replacements,
//! nesting sub-selects whenever a step sequence cannot be expressed in one
//! SELECT's clause order. Together with [`crate::build`] it provides the
//! round-trip property `build(to_query(trace)) == trace` used by the test
//! suite; traces with hoisted replacements are not renderable.

use tessera_expr::{Binding, Expr, FromClause, JoinKind, Query, SelectStmt, Unpivot};

use crate::steps::Step;
use crate::trace::Trace;

/// Render a replacement-free trace as a canonical query AST.
pub fn to_query(t: &Trace) -> Option<Query> {
    if !t.replacements.is_empty() {
        return None;
    }
    let mut draft = SelectStmt::default();
    let mut from_only = true;
    let mut agg_done = false;
    let mut into = None;

    for step in &t.steps {
        match step {
            Step::Scan(s) => {
                if draft.from.is_some() || !from_only {
                    return None;
                }
                draft.from = Some(FromClause::Table(s.table.clone()));
            }
            Step::DummyOutput => {
                if draft.from.is_some() || !from_only {
                    return None;
                }
            }
            Step::Iterate(it) => {
                if !from_only {
                    draft = wrap(draft);
                }
                let left = draft.from.take()?;
                draft.from = Some(FromClause::Join {
                    kind: JoinKind::Cross,
                    left: Box::new(left),
                    right: it.binding.clone(),
                });
                from_only = true;
            }
            Step::Unpivot(u) => {
                if !from_only || draft.where_clause.is_some() {
                    draft = wrap(draft);
                }
                let tuple_ref = match draft.from.take() {
                    Some(FromClause::Table(b)) => b.expr,
                    _ => return None,
                };
                draft.from = Some(FromClause::Table(Binding::new(Expr::Unpivot(Box::new(
                    Unpivot {
                        tuple_ref,
                        as_label: u.as_label.clone(),
                        at_label: u.at_label.clone(),
                    },
                )))));
                from_only = true;
            }
            Step::Filter(f) => {
                if agg_done && draft.columns.is_empty() {
                    // a filter above the aggregate is HAVING
                    draft.having = Some(match draft.having.take() {
                        Some(h) => h.and(f.predicate.clone()),
                        None => f.predicate.clone(),
                    });
                } else {
                    if !draft.columns.is_empty() || draft.limit.is_some() {
                        draft = wrap(draft);
                        from_only = false;
                        agg_done = false;
                    }
                    draft.where_clause = Some(match draft.where_clause.take() {
                        Some(w) => w.and(f.predicate.clone()),
                        None => f.predicate.clone(),
                    });
                    from_only = false;
                }
            }
            Step::Aggregate(a) => {
                if agg_done || !draft.columns.is_empty() || draft.distinct_on.is_some() {
                    draft = wrap(draft);
                    agg_done = false;
                }
                draft.group_by = a.group_by.clone();
                let mut cols = a.group_by.clone();
                cols.extend(a.aggs.iter().cloned());
                draft.columns = cols;
                agg_done = true;
                from_only = false;
            }
            Step::Bind(b) => {
                if draft.limit.is_some() || !draft.order_by.is_empty() {
                    draft = wrap(draft);
                    agg_done = false;
                }
                if draft.columns.is_empty() {
                    draft.columns = b.bindings.clone();
                } else {
                    // recompose through the current output namespace
                    let mut mapped = Vec::with_capacity(b.bindings.len());
                    for binding in &b.bindings {
                        let e = crate::optimize::substitute(&binding.expr, &draft.columns)?;
                        mapped.push(Binding::named(e, binding.result()));
                    }
                    draft.columns = mapped;
                }
                if let Some(on) = &draft.distinct_on {
                    let matches_cols = on.len() == draft.columns.len()
                        && draft
                            .columns
                            .iter()
                            .all(|c| on.iter().any(|e| *e == c.expr));
                    if matches_cols {
                        draft.distinct = true;
                        draft.distinct_on = None;
                    }
                }
                from_only = false;
            }
            Step::BindStar => {
                if !draft.columns.is_empty() {
                    return None;
                }
                draft.columns = vec![Binding::new(Expr::Star)];
                from_only = false;
            }
            Step::Distinct(d) => {
                if draft.has_distinct() || draft.limit.is_some() || !draft.order_by.is_empty() {
                    draft = wrap(draft);
                    agg_done = false;
                }
                if draft.columns.is_empty() {
                    if d.exprs.is_empty() {
                        return None;
                    }
                    draft.distinct_on = Some(d.exprs.clone());
                } else if d.exprs.is_empty() {
                    draft.distinct = true;
                } else {
                    draft.distinct_on = Some(d.exprs.clone());
                }
                from_only = false;
            }
            Step::Order(o) => {
                if !draft.order_by.is_empty() || draft.limit.is_some() {
                    draft = wrap(draft);
                    agg_done = false;
                }
                draft.order_by = o.keys.clone();
                from_only = false;
            }
            Step::LimitOffset(l) => {
                if draft.limit.is_some() {
                    draft = wrap(draft);
                    agg_done = false;
                }
                draft.limit = Some(l.limit);
                if l.offset > 0 {
                    draft.offset = Some(l.offset);
                }
                from_only = false;
            }
            Step::Output(o) => into = Some(o.path.clone()),
            Step::PseudoTable => {}
        }
    }
    if draft.columns.is_empty() {
        draft.columns = vec![Binding::new(Expr::Star)];
    }
    Some(Query {
        with: Vec::new(),
        body: Expr::Select(Box::new(draft)),
        into,
    })
}

/// Push the current draft down into a FROM sub-select.
fn wrap(mut draft: SelectStmt) -> SelectStmt {
    if draft.columns.is_empty() {
        draft.columns = vec![Binding::new(Expr::Star)];
    }
    SelectStmt {
        from: Some(FromClause::Table(Binding::new(Expr::Select(Box::new(draft))))),
        ..SelectStmt::default()
    }
}
