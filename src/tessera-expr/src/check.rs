//! Semantic validation of SELECT statements.
//!
//! `check` runs before lowering and rejects statements the trace builder
//! cannot give a meaning to: bad builtin arity, nested aggregates,
//! misplaced `*`, window functions outside the column list, and uses of the
//! reserved replacement functions.

use crate::error::{CompileError, CompileResult};
use crate::expr::{Expr, FromClause, SelectStmt};
use crate::walk::{any_shallow, walk_fn};

/// Validate a SELECT statement, recursing into nested SELECTs.
pub fn check(s: &SelectStmt) -> CompileResult<()> {
    if s.columns.is_empty() {
        return Err(CompileError::msg("SELECT requires at least one column"));
    }
    if s.distinct && s.distinct_on.is_some() {
        return Err(CompileError::msg(
            "DISTINCT and DISTINCT ON cannot be combined",
        ));
    }
    let stars = s
        .columns
        .iter()
        .filter(|c| matches!(c.expr, Expr::Star))
        .count();
    if stars > 0 && s.columns.len() > 1 {
        return Err(CompileError::msg("cannot mix * with other columns"));
    }

    for c in &s.columns {
        check_expr(&c.expr)?;
    }
    if let Some(on) = &s.distinct_on {
        for e in on {
            check_expr(e)?;
            check_no_window(e)?;
        }
    }
    if let Some(w) = &s.where_clause {
        check_expr(w)?;
        check_no_window(w)?;
    }
    for g in &s.group_by {
        if matches!(g.expr, Expr::Star) {
            return Err(CompileError::at(&g.expr, "cannot GROUP BY *"));
        }
        check_expr(&g.expr)?;
        check_no_window(&g.expr)?;
    }
    if let Some(h) = &s.having {
        check_expr(h)?;
        check_no_window(h)?;
    }
    for k in &s.order_by {
        check_expr(&k.expr)?;
        check_no_window(&k.expr)?;
    }
    if s.having.is_some() && s.group_by.is_empty() && !has_any_aggregate(s) {
        return Err(CompileError::msg(
            "HAVING requires GROUP BY or an aggregate",
        ));
    }
    if let Some(from) = &s.from {
        check_from(from)?;
    }
    Ok(())
}

fn check_from(from: &FromClause) -> CompileResult<()> {
    match from {
        FromClause::Table(b) => check_table_expr(&b.expr),
        FromClause::Join { left, right, .. } => {
            check_from(left)?;
            check_table_expr(&right.expr)
        }
    }
}

fn check_table_expr(e: &Expr) -> CompileResult<()> {
    match e {
        Expr::Path(_) | Expr::Appended(_) => Ok(()),
        Expr::Select(s) => check(s),
        Expr::Unpivot(u) => check_table_expr(&u.tuple_ref),
        other => Err(CompileError::at(
            other,
            format!("unsupported table expression {other}"),
        )),
    }
}

fn check_expr(e: &Expr) -> CompileResult<()> {
    let mut err = None;
    walk_fn(e, &mut |n| {
        if err.is_some() {
            return false;
        }
        match n {
            Expr::Call(c) => {
                if c.func.is_replacement() {
                    err = Some(CompileError::at(
                        n,
                        format!("{} is reserved", c.func),
                    ));
                    return false;
                }
                let (min, max) = c.func.arity();
                if c.args.len() < min || c.args.len() > max {
                    err = Some(CompileError::at(
                        n,
                        format!("wrong number of arguments to {}", c.func),
                    ));
                    return false;
                }
            }
            Expr::Agg(a) => {
                if crate::walk::has_aggregate(&a.inner) {
                    err = Some(CompileError::at(n, "nested aggregate expressions"));
                    return false;
                }
            }
            _ => {}
        }
        true
    });
    match err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn check_no_window(e: &Expr) -> CompileResult<()> {
    let mut bad = None;
    walk_fn(e, &mut |n| {
        if bad.is_some() || matches!(n, Expr::Select(_)) {
            return false;
        }
        if let Expr::Agg(a) = n {
            if a.over.is_some() {
                bad = Some(n.clone());
                return false;
            }
        }
        true
    });
    match bad {
        Some(n) => Err(CompileError::at(
            &n,
            "window functions are only allowed in the column list",
        )),
        None => Ok(()),
    }
}

fn has_any_aggregate(s: &SelectStmt) -> bool {
    s.columns.iter().any(|c| any_shallow(&c.expr, &mut |n| matches!(n, Expr::Agg(_))))
        || s.having
            .as_ref()
            .is_some_and(|h| any_shallow(h, &mut |n| matches!(n, Expr::Agg(_))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{lit, path, AggOp, Aggregate, Binding, BuiltinFunc};

    fn select(columns: Vec<Binding>) -> SelectStmt {
        SelectStmt {
            columns,
            from: Some(FromClause::Table(Binding::new(path("t")))),
            ..SelectStmt::default()
        }
    }

    #[test]
    fn test_simple_ok() {
        let s = select(vec![Binding::new(path("a"))]);
        assert!(check(&s).is_ok());
    }

    #[test]
    fn test_mixed_star_rejected() {
        let s = select(vec![Binding::new(Expr::Star), Binding::new(path("a"))]);
        assert!(check(&s).is_err());
    }

    #[test]
    fn test_bad_arity() {
        let s = select(vec![Binding::new(Expr::call(
            BuiltinFunc::Upper,
            vec![path("a"), path("b")],
        ))]);
        assert!(check(&s).is_err());
    }

    #[test]
    fn test_reserved_function() {
        let s = select(vec![Binding::new(Expr::call(
            BuiltinFunc::ScalarReplacement,
            vec![lit(0i64)],
        ))]);
        assert!(check(&s).is_err());
    }

    #[test]
    fn test_nested_aggregate_rejected() {
        let inner = Expr::Agg(Aggregate::new(AggOp::Sum, path("v")));
        let s = select(vec![Binding::new(Expr::Agg(Aggregate::new(
            AggOp::Max,
            inner,
        )))]);
        assert!(check(&s).is_err());
    }

    #[test]
    fn test_window_in_where_rejected() {
        let mut s = select(vec![Binding::new(path("a"))]);
        s.where_clause = Some(Expr::Agg(
            Aggregate::new(AggOp::Sum, path("v")).over(vec![path("k")]),
        ));
        assert!(check(&s).is_err());
    }

    #[test]
    fn test_having_needs_aggregation() {
        let mut s = select(vec![Binding::new(path("a"))]);
        s.having = Some(Expr::compare(crate::expr::CmpOp::Gt, path("a"), lit(1i64)));
        assert!(check(&s).is_err());

        s.group_by = vec![Binding::new(path("a"))];
        assert!(check(&s).is_ok());
    }
}
