//! Expression simplification.
//!
//! Folds constants, collapses identities, and resolves `IS` predicates
//! against type information from a [`TypeHint`]. Every rule is
//! size-non-increasing on the syntactic-weight metric, so the driver
//! converges in at most `depth(e)` passes.
//!
//! MISSING and NULL follow PartiQL semantics: arithmetic and comparisons
//! propagate them, `IS` predicates are total, and `MISSING IS NULL` is
//! TRUE.

use crate::expr::{ArithOp, BuiltinFunc, CmpOp, Expr, IsKey, Literal, LogicOp};
use crate::types::{is_key_constant, type_of, TypeHint, TypeSet};
use crate::walk::{rewrite, Rewriter};

/// Simplify an expression to a fixed point, descending into nested SELECTs.
pub fn simplify(e: Expr, hint: &dyn TypeHint) -> Expr {
    simplify_with(e, hint, true)
}

/// Simplify without descending into nested SELECTs. Used when the caller
/// owns different type scopes for sub-queries.
pub fn simplify_shallow(e: Expr, hint: &dyn TypeHint) -> Expr {
    simplify_with(e, hint, false)
}

fn simplify_with(e: Expr, hint: &dyn TypeHint, deep: bool) -> Expr {
    let bound = e.depth() + 1;
    let mut cur = e;
    for _ in 0..bound {
        let next = rewrite(
            cur.clone(),
            &mut SimplifyRewriter { hint, deep },
        );
        if next == cur {
            break;
        }
        cur = next;
    }
    cur
}

struct SimplifyRewriter<'a> {
    hint: &'a dyn TypeHint,
    deep: bool,
}

impl Rewriter for SimplifyRewriter<'_> {
    fn descend(&self, e: &Expr) -> bool {
        self.deep || !matches!(e, Expr::Select(_))
    }

    fn rewrite(&mut self, e: Expr) -> Expr {
        simplify_node(e, self.hint)
    }
}

fn simplify_node(e: Expr, hint: &dyn TypeHint) -> Expr {
    match e {
        Expr::Arith { op, left, right } => simplify_arith(op, *left, *right, hint),
        Expr::Compare { op, left, right } => simplify_compare(op, *left, *right),
        Expr::Logical { op, left, right } => simplify_logical(op, *left, *right),
        Expr::Not(inner) => simplify_not(*inner),
        Expr::Is { expr, key } => simplify_is(*expr, key, hint),
        Expr::Call(c) => simplify_call(c),
        other => other,
    }
}

fn simplify_arith(op: ArithOp, left: Expr, right: Expr, hint: &dyn TypeHint) -> Expr {
    // absent operands propagate, MISSING strongest
    if let Some(absent) = absent_of(&left, &right) {
        return Expr::Lit(absent);
    }
    if let (Expr::Lit(l), Expr::Lit(r)) = (&left, &right) {
        if let Some(folded) = fold_arith(op, l, r) {
            return Expr::Lit(folded);
        }
    }
    // neutral elements, only when the operand is known numeric
    let numeric = |e: &Expr| type_of(e, hint).without(TypeSet::NUMERIC).is_empty();
    match (op, &left, &right) {
        (ArithOp::Add, e, Expr::Lit(Literal::Int(0)))
        | (ArithOp::Sub, e, Expr::Lit(Literal::Int(0)))
        | (ArithOp::Mul, e, Expr::Lit(Literal::Int(1)))
        | (ArithOp::Div, e, Expr::Lit(Literal::Int(1)))
            if numeric(e) =>
        {
            return left;
        }
        (ArithOp::Add, Expr::Lit(Literal::Int(0)), e)
        | (ArithOp::Mul, Expr::Lit(Literal::Int(1)), e)
            if numeric(e) =>
        {
            return right;
        }
        _ => {}
    }
    Expr::arith(op, left, right)
}

fn fold_arith(op: ArithOp, l: &Literal, r: &Literal) -> Option<Literal> {
    use Literal::{Float, Int};
    match (l, r) {
        (Int(a), Int(b)) => match op {
            ArithOp::Add => a.checked_add(*b).map(Int),
            ArithOp::Sub => a.checked_sub(*b).map(Int),
            ArithOp::Mul => a.checked_mul(*b).map(Int),
            ArithOp::Div => a.checked_div(*b).map(Int),
            ArithOp::Mod => a.checked_rem(*b).map(Int),
        },
        (Int(_), Float(_)) | (Float(_), Int(_)) | (Float(_), Float(_)) => {
            let a = as_f64(l)?;
            let b = as_f64(r)?;
            let v = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => {
                    if b == 0.0 {
                        return None;
                    }
                    a / b
                }
                ArithOp::Mod => {
                    if b == 0.0 {
                        return None;
                    }
                    a % b
                }
            };
            Some(Float(v))
        }
        _ => None,
    }
}

fn as_f64(l: &Literal) -> Option<f64> {
    match l {
        Literal::Int(i) => Some(*i as f64),
        Literal::Float(f) => Some(*f),
        _ => None,
    }
}

fn simplify_compare(op: CmpOp, left: Expr, right: Expr) -> Expr {
    if let Some(absent) = absent_of(&left, &right) {
        return Expr::Lit(absent);
    }
    if let (Expr::Lit(l), Expr::Lit(r)) = (&left, &right) {
        if let Some(b) = fold_compare(op, l, r) {
            return Expr::Lit(Literal::Bool(b));
        }
    }
    Expr::compare(op, left, right)
}

fn fold_compare(op: CmpOp, l: &Literal, r: &Literal) -> Option<bool> {
    use std::cmp::Ordering;
    let ord = match (l, r) {
        (Literal::Int(a), Literal::Int(b)) => a.cmp(b),
        (Literal::String(a), Literal::String(b)) => a.cmp(b),
        (Literal::Bool(a), Literal::Bool(b)) => a.cmp(b),
        (Literal::Timestamp(a), Literal::Timestamp(b)) => a.cmp(b),
        _ => {
            let a = as_f64(l)?;
            let b = as_f64(r)?;
            a.partial_cmp(&b)?
        }
    };
    Some(match op {
        CmpOp::Eq => ord == Ordering::Equal,
        CmpOp::Ne => ord != Ordering::Equal,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Le => ord != Ordering::Greater,
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Ge => ord != Ordering::Less,
    })
}

fn simplify_logical(op: LogicOp, left: Expr, right: Expr) -> Expr {
    let lit_bool = |e: &Expr| match e {
        Expr::Lit(Literal::Bool(b)) => Some(*b),
        _ => None,
    };
    match op {
        LogicOp::And => {
            if lit_bool(&left) == Some(false) || lit_bool(&right) == Some(false) {
                return Expr::Lit(Literal::Bool(false));
            }
            if lit_bool(&left) == Some(true) {
                return right;
            }
            if lit_bool(&right) == Some(true) {
                return left;
            }
        }
        LogicOp::Or => {
            if lit_bool(&left) == Some(true) || lit_bool(&right) == Some(true) {
                return Expr::Lit(Literal::Bool(true));
            }
            if lit_bool(&left) == Some(false) {
                return right;
            }
            if lit_bool(&right) == Some(false) {
                return left;
            }
        }
    }
    if matches!(&left, Expr::Lit(l) if l.is_absent()) && matches!(&right, Expr::Lit(l) if l.is_absent())
    {
        return Expr::Lit(Literal::Null);
    }
    Expr::Logical {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn simplify_not(inner: Expr) -> Expr {
    match inner {
        Expr::Lit(Literal::Bool(b)) => Expr::Lit(Literal::Bool(!b)),
        Expr::Lit(l) if l.is_absent() => Expr::Lit(l),
        Expr::Not(e) => *e,
        // NOT (a = b) == a <> b under three-valued logic
        Expr::Compare { op, left, right } => {
            let negated = match op {
                CmpOp::Eq => CmpOp::Ne,
                CmpOp::Ne => CmpOp::Eq,
                CmpOp::Lt => CmpOp::Ge,
                CmpOp::Le => CmpOp::Gt,
                CmpOp::Gt => CmpOp::Le,
                CmpOp::Ge => CmpOp::Lt,
            };
            Expr::Compare {
                op: negated,
                left,
                right,
            }
        }
        Expr::Is { expr, key } => Expr::Is {
            expr,
            key: key.negate(),
        },
        other => Expr::Not(Box::new(other)),
    }
}

fn simplify_is(expr: Expr, key: IsKey, hint: &dyn TypeHint) -> Expr {
    if let Expr::Lit(l) = &expr {
        let truth = match key {
            IsKey::Null => l.is_absent(),
            IsKey::NotNull => !l.is_absent(),
            IsKey::Missing => matches!(l, Literal::Missing),
            IsKey::NotMissing => !matches!(l, Literal::Missing),
            IsKey::True => matches!(l, Literal::Bool(true)),
            IsKey::NotTrue => !matches!(l, Literal::Bool(true)),
            IsKey::False => matches!(l, Literal::Bool(false)),
            IsKey::NotFalse => !matches!(l, Literal::Bool(false)),
        };
        return Expr::Lit(Literal::Bool(truth));
    }
    if let Some(b) = is_key_constant(key, type_of(&expr, hint)) {
        return Expr::Lit(Literal::Bool(b));
    }
    Expr::Is {
        expr: Box::new(expr),
        key,
    }
}

fn simplify_call(mut c: crate::expr::Call) -> Expr {
    match c.func {
        BuiltinFunc::Least | BuiltinFunc::Greatest if c.args.len() == 1 => {
            if let Some(only) = c.args.pop() {
                return only;
            }
        }
        BuiltinFunc::Upper | BuiltinFunc::Lower => {
            if let Some(Expr::Lit(Literal::String(s))) = c.args.first() {
                let folded = if c.func == BuiltinFunc::Upper {
                    s.to_uppercase()
                } else {
                    s.to_lowercase()
                };
                return Expr::Lit(Literal::String(folded));
            }
        }
        BuiltinFunc::Trim => {
            if let Some(Expr::Lit(Literal::String(s))) = c.args.first() {
                return Expr::Lit(Literal::String(s.trim().to_string()));
            }
        }
        BuiltinFunc::Abs => match c.args.first() {
            Some(Expr::Lit(Literal::Int(i))) => {
                if let Some(v) = i.checked_abs() {
                    return Expr::Lit(Literal::Int(v));
                }
            }
            Some(Expr::Lit(Literal::Float(f))) => {
                return Expr::Lit(Literal::Float(f.abs()));
            }
            _ => {}
        },
        BuiltinFunc::Round => match c.args.first() {
            Some(Expr::Lit(Literal::Int(i))) => return Expr::Lit(Literal::Int(*i)),
            Some(Expr::Lit(Literal::Float(f))) => {
                return Expr::Lit(Literal::Float(f.round()));
            }
            _ => {}
        },
        _ => {}
    }
    Expr::Call(c)
}

/// MISSING is stronger than NULL when both occur.
fn absent_of(left: &Expr, right: &Expr) -> Option<Literal> {
    let absent = |e: &Expr| match e {
        Expr::Lit(l) if l.is_absent() => Some(l.clone()),
        _ => None,
    };
    match (absent(left), absent(right)) {
        (Some(Literal::Missing), _) | (_, Some(Literal::Missing)) => Some(Literal::Missing),
        (Some(l), _) | (_, Some(l)) => Some(l),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{lit, path};
    use crate::types::NoHint;

    fn simp(e: Expr) -> Expr {
        simplify(e, &NoHint)
    }

    #[test]
    fn test_fold_arithmetic() {
        let e = Expr::arith(ArithOp::Add, lit(2i64), lit(3i64));
        assert_eq!(simp(e), lit(5i64));

        let e = Expr::arith(ArithOp::Mul, lit(2i64), lit(2.5f64));
        assert_eq!(simp(e), lit(5.0f64));
    }

    #[test]
    fn test_fold_comparison() {
        let e = Expr::compare(CmpOp::Lt, lit(1i64), lit(2i64));
        assert_eq!(simp(e), lit(true));

        let e = Expr::compare(CmpOp::Eq, lit("a"), lit("b"));
        assert_eq!(simp(e), lit(false));
    }

    #[test]
    fn test_missing_propagation() {
        let e = Expr::arith(ArithOp::Add, path("x"), Expr::Lit(Literal::Missing));
        assert_eq!(simp(e), Expr::Lit(Literal::Missing));

        let e = Expr::compare(CmpOp::Eq, path("x"), Expr::Lit(Literal::Null));
        assert_eq!(simp(e), Expr::Lit(Literal::Null));
    }

    #[test]
    fn test_boolean_identities() {
        let e = path("x").and(lit(true));
        assert_eq!(simp(e), path("x"));

        let e = path("x").and(lit(false));
        assert_eq!(simp(e), lit(false));

        let e = lit(false).or(path("x"));
        assert_eq!(simp(e), path("x"));
    }

    #[test]
    fn test_not_normalization() {
        let e = path("x").not().not();
        assert_eq!(simp(e), path("x"));

        let e = Expr::compare(CmpOp::Eq, path("a"), lit(1i64)).not();
        assert_eq!(simp(e), Expr::compare(CmpOp::Ne, path("a"), lit(1i64)));

        let e = path("a").is(IsKey::Missing).not();
        assert_eq!(simp(e), path("a").is(IsKey::NotMissing));
    }

    #[test]
    fn test_is_on_literals() {
        assert_eq!(simp(Expr::Lit(Literal::Missing).is(IsKey::Null)), lit(true));
        assert_eq!(simp(Expr::Lit(Literal::Null).is(IsKey::Missing)), lit(false));
        assert_eq!(simp(lit(3i64).is(IsKey::NotMissing)), lit(true));
        assert_eq!(simp(Expr::Lit(Literal::Null).is(IsKey::True)), lit(false));
    }

    #[test]
    fn test_identity_requires_numeric_type() {
        // `x + 0` cannot fold without knowing x is numeric
        let e = Expr::arith(ArithOp::Add, path("x"), lit(0i64));
        assert_eq!(simp(e.clone()), e);

        struct IntHint;
        impl TypeHint for IntHint {
            fn type_of(&self, e: &Expr) -> Option<TypeSet> {
                matches!(e, Expr::Path(_)).then_some(TypeSet::INT)
            }
        }
        let e = Expr::arith(ArithOp::Add, path("x"), lit(0i64));
        assert_eq!(simplify(e, &IntHint), path("x"));
    }

    #[test]
    fn test_idempotent() {
        let exprs = vec![
            Expr::arith(ArithOp::Add, lit(1i64), path("x")),
            path("x").and(lit(true)).or(lit(false)),
            Expr::compare(CmpOp::Gt, Expr::arith(ArithOp::Add, lit(1i64), lit(1i64)), path("y")),
            lit(2i64).is(IsKey::Null),
        ];
        for e in exprs {
            let once = simplify(e, &NoHint);
            let twice = simplify(once.clone(), &NoHint);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_fold_calls() {
        let e = Expr::call(BuiltinFunc::Upper, vec![lit("abc")]);
        assert_eq!(simp(e), lit("ABC"));

        let e = Expr::call(BuiltinFunc::Abs, vec![lit(-4i64)]);
        assert_eq!(simp(e), lit(4i64));
    }
}
