//! Structural walk and rewrite over expressions.
//!
//! The walker visits every sub-node of an expression, including the clauses
//! of nested SELECTs; visitors signal early abort (and control descent) by
//! returning `false`, and rewriters gate descent with [`Rewriter::descend`].
//! Rewrites are applied post-order: children are rewritten first and the
//! walker re-parents them before the node itself is offered for rewriting.

use crate::expr::{Expr, FromClause, SelectStmt};

/// A visitor over expression nodes.
pub trait Visitor {
    /// Visit a node. Return `false` to skip the node's children.
    fn visit(&mut self, e: &Expr) -> bool;
}

/// Walk `e` pre-order, visiting every node until the visitor aborts descent.
pub fn walk<V: Visitor>(e: &Expr, v: &mut V) {
    if !v.visit(e) {
        return;
    }
    each_child(e, &mut |c| walk(c, v));
}

/// Walk with a closure; `false` skips the node's children.
pub fn walk_fn(e: &Expr, f: &mut impl FnMut(&Expr) -> bool) {
    struct FnVisitor<'a, F>(&'a mut F);
    impl<F: FnMut(&Expr) -> bool> Visitor for FnVisitor<'_, F> {
        fn visit(&mut self, e: &Expr) -> bool {
            (self.0)(e)
        }
    }
    walk(e, &mut FnVisitor(f));
}

/// A node rewriter.
pub trait Rewriter {
    /// Rewrite one node whose children have already been rewritten.
    fn rewrite(&mut self, e: Expr) -> Expr;

    /// Whether to rewrite the children of `e`. The node itself is always
    /// offered to [`Rewriter::rewrite`].
    fn descend(&self, _e: &Expr) -> bool {
        true
    }
}

/// Rewrite `e` post-order.
pub fn rewrite<R: Rewriter>(e: Expr, r: &mut R) -> Expr {
    let e = if r.descend(&e) {
        map_children(e, &mut |c| rewrite(c, r))
    } else {
        e
    };
    r.rewrite(e)
}

/// Rewrite with a closure applied post-order to every node.
pub fn rewrite_fn(e: Expr, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
    struct FnRewriter<'a, F>(&'a mut F);
    impl<F: FnMut(Expr) -> Expr> Rewriter for FnRewriter<'_, F> {
        fn rewrite(&mut self, e: Expr) -> Expr {
            (self.0)(e)
        }
    }
    rewrite(e, &mut FnRewriter(f))
}

/// Apply `f` to each direct child expression of `e`.
///
/// For SELECT nodes the children are every clause expression: columns,
/// DISTINCT ON, FROM table expressions, WHERE, GROUP BY, HAVING, and
/// ORDER BY keys.
pub fn each_child(e: &Expr, f: &mut impl FnMut(&Expr)) {
    match e {
        Expr::Path(_) | Expr::Lit(_) | Expr::Star | Expr::QualifiedStar(_) => {}
        Expr::Arith { left, right, .. }
        | Expr::Compare { left, right, .. }
        | Expr::Logical { left, right, .. } => {
            f(left);
            f(right);
        }
        Expr::Not(inner) => f(inner),
        Expr::Is { expr, .. } => f(expr),
        Expr::Call(c) => {
            for a in &c.args {
                f(a);
            }
        }
        Expr::Agg(a) => {
            f(&a.inner);
            if let Some(w) = &a.over {
                for k in &w.partition_by {
                    f(k);
                }
            }
        }
        Expr::Select(s) => each_select_child(s, f),
        Expr::Unpivot(u) => f(&u.tuple_ref),
        Expr::Appended(parts) => {
            for p in parts {
                f(p);
            }
        }
    }
}

fn each_select_child(s: &SelectStmt, f: &mut impl FnMut(&Expr)) {
    for c in &s.columns {
        f(&c.expr);
    }
    if let Some(on) = &s.distinct_on {
        for e in on {
            f(e);
        }
    }
    if let Some(from) = &s.from {
        each_from_child(from, f);
    }
    if let Some(w) = &s.where_clause {
        f(w);
    }
    for g in &s.group_by {
        f(&g.expr);
    }
    if let Some(h) = &s.having {
        f(h);
    }
    for k in &s.order_by {
        f(&k.expr);
    }
}

fn each_from_child(from: &FromClause, f: &mut impl FnMut(&Expr)) {
    match from {
        FromClause::Table(b) => f(&b.expr),
        FromClause::Join { left, right, .. } => {
            each_from_child(left, f);
            f(&right.expr);
        }
    }
}

/// Rebuild `e` with each direct child replaced by `f(child)`.
pub fn map_children(e: Expr, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
    match e {
        Expr::Path(_) | Expr::Lit(_) | Expr::Star | Expr::QualifiedStar(_) => e,
        Expr::Arith { op, left, right } => Expr::Arith {
            op,
            left: Box::new(f(*left)),
            right: Box::new(f(*right)),
        },
        Expr::Compare { op, left, right } => Expr::Compare {
            op,
            left: Box::new(f(*left)),
            right: Box::new(f(*right)),
        },
        Expr::Logical { op, left, right } => Expr::Logical {
            op,
            left: Box::new(f(*left)),
            right: Box::new(f(*right)),
        },
        Expr::Not(inner) => Expr::Not(Box::new(f(*inner))),
        Expr::Is { expr, key } => Expr::Is {
            expr: Box::new(f(*expr)),
            key,
        },
        Expr::Call(mut c) => {
            c.args = c.args.into_iter().map(&mut *f).collect();
            Expr::Call(c)
        }
        Expr::Agg(mut a) => {
            a.inner = Box::new(f(*a.inner));
            if let Some(w) = &mut a.over {
                w.partition_by = std::mem::take(&mut w.partition_by)
                    .into_iter()
                    .map(&mut *f)
                    .collect();
            }
            Expr::Agg(a)
        }
        Expr::Select(mut s) => {
            map_select_children(&mut s, f);
            Expr::Select(s)
        }
        Expr::Unpivot(mut u) => {
            u.tuple_ref = f(std::mem::replace(&mut u.tuple_ref, Expr::Star));
            Expr::Unpivot(u)
        }
        Expr::Appended(parts) => Expr::Appended(parts.into_iter().map(&mut *f).collect()),
    }
}

fn map_select_children(s: &mut SelectStmt, f: &mut impl FnMut(Expr) -> Expr) {
    for c in &mut s.columns {
        c.expr = f(std::mem::replace(&mut c.expr, Expr::Star));
    }
    if let Some(on) = &mut s.distinct_on {
        *on = std::mem::take(on).into_iter().map(&mut *f).collect();
    }
    if let Some(from) = &mut s.from {
        map_from_children(from, f);
    }
    if let Some(w) = s.where_clause.take() {
        s.where_clause = Some(f(w));
    }
    for g in &mut s.group_by {
        g.expr = f(std::mem::replace(&mut g.expr, Expr::Star));
    }
    if let Some(h) = s.having.take() {
        s.having = Some(f(h));
    }
    for k in &mut s.order_by {
        k.expr = f(std::mem::replace(&mut k.expr, Expr::Star));
    }
}

fn map_from_children(from: &mut FromClause, f: &mut impl FnMut(Expr) -> Expr) {
    match from {
        FromClause::Table(b) => b.expr = f(std::mem::replace(&mut b.expr, Expr::Star)),
        FromClause::Join { left, right, .. } => {
            map_from_children(left, f);
            right.expr = f(std::mem::replace(&mut right.expr, Expr::Star));
        }
    }
}

/// Whether any node of `e` satisfies `pred`, without descending into
/// nested SELECTs.
pub fn any_shallow(e: &Expr, pred: &mut impl FnMut(&Expr) -> bool) -> bool {
    let mut found = false;
    walk_fn(e, &mut |n| {
        if found {
            return false;
        }
        if matches!(n, Expr::Select(_)) {
            return false;
        }
        if pred(n) {
            found = true;
            return false;
        }
        true
    });
    found
}

/// Whether `e` contains an aggregate outside of nested SELECTs.
pub fn has_aggregate(e: &Expr) -> bool {
    any_shallow(e, &mut |n| matches!(n, Expr::Agg(_)))
}
