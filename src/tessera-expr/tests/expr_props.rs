//! Property tests for the expression kernel.

use proptest::prelude::*;

use tessera_expr::{
    copy, equivalent, simplify, ArithOp, CmpOp, Expr, IsKey, Literal, NoHint,
};

fn arb_literal() -> impl Strategy<Value = Literal> {
    prop_oneof![
        Just(Literal::Null),
        Just(Literal::Missing),
        any::<bool>().prop_map(Literal::Bool),
        (-1000i64..1000).prop_map(Literal::Int),
        (-1000i64..1000).prop_map(|i| Literal::Float(i as f64 / 8.0)),
        "[a-z]{0,6}".prop_map(Literal::String),
    ]
}

fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        arb_literal().prop_map(Expr::Lit),
        "[a-z]{1,4}".prop_map(Expr::path),
    ];
    leaf.prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::arith(ArithOp::Add, l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::arith(ArithOp::Mul, l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::compare(CmpOp::Eq, l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::compare(CmpOp::Lt, l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l.and(r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l.or(r)),
            inner.clone().prop_map(Expr::not),
            inner.clone().prop_map(|e| e.is(IsKey::Missing)),
            inner.prop_map(|e| e.is(IsKey::NotNull)),
        ]
    })
}

proptest! {
    #[test]
    fn simplify_is_idempotent(e in arb_expr()) {
        let once = simplify(e, &NoHint);
        let twice = simplify(once.clone(), &NoHint);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn simplify_never_grows(e in arb_expr()) {
        let before = e.weight();
        let after = simplify(e, &NoHint).weight();
        prop_assert!(after <= before);
    }

    #[test]
    fn copy_preserves_equivalence(e in arb_expr()) {
        let c = copy(&e).unwrap();
        prop_assert!(equivalent(&e, &c));
        prop_assert_eq!(e, c);
    }
}
