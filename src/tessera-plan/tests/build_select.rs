//! End-to-end lowering scenarios.

use tessera_expr::{
    lit, path, AggOp, Aggregate, Binding, BuiltinFunc, CmpOp, Cte, Expr, FromClause, JoinKind, Literal,
    Query, SelectStmt, Unpivot,
};
use tessera_plan::{build, NoEnv, SizeClass, Step, Trace};

fn table(name: &str) -> FromClause {
    FromClause::Table(Binding::new(path(name)))
}

fn q(s: SelectStmt) -> Query {
    Query::from_select(s)
}

fn step_names(t: &Trace) -> Vec<&'static str> {
    t.steps.iter().map(Step::name).collect()
}

#[test]
fn scan_filter_bind() {
    // SELECT a FROM t WHERE a > 1
    let query = q(SelectStmt {
        columns: vec![Binding::new(path("a"))],
        from: Some(table("t")),
        where_clause: Some(Expr::compare(CmpOp::Gt, path("a"), lit(1i64))),
        ..SelectStmt::default()
    });
    let t = build(&query, &NoEnv).unwrap();
    assert_eq!(step_names(&t), vec!["Scan", "Filter", "Bind"]);
    assert!(t.replacements.is_empty());
    assert_eq!(t.output_names(), vec!["a"]);
    if let Step::Filter(f) = &t.steps[1] {
        assert_eq!(f.predicate, Expr::compare(CmpOp::Gt, path("a"), lit(1i64)));
    } else {
        panic!("expected Filter");
    }
}

#[test]
fn distinct_group_by_erased() {
    // SELECT DISTINCT a, b FROM t GROUP BY a, b
    let query = q(SelectStmt {
        columns: vec![Binding::new(path("a")), Binding::new(path("b"))],
        distinct: true,
        from: Some(table("t")),
        group_by: vec![Binding::new(path("a")), Binding::new(path("b"))],
        ..SelectStmt::default()
    });
    let t = build(&query, &NoEnv).unwrap();
    assert_eq!(step_names(&t), vec!["Scan", "Aggregate"]);
    if let Step::Aggregate(a) = &t.steps[1] {
        assert!(a.aggs.is_empty());
        assert_eq!(
            a.group_by.iter().map(Binding::result).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    } else {
        panic!("expected Aggregate");
    }
}

#[test]
fn in_subquery_becomes_in_replacement() {
    // SELECT a FROM t WHERE a IN (SELECT x FROM u)
    let sub = SelectStmt {
        columns: vec![Binding::new(path("x"))],
        from: Some(table("u")),
        ..SelectStmt::default()
    };
    let query = q(SelectStmt {
        columns: vec![Binding::new(path("a"))],
        from: Some(table("t")),
        where_clause: Some(Expr::call(
            BuiltinFunc::InSubquery,
            vec![path("a"), Expr::Select(Box::new(sub))],
        )),
        ..SelectStmt::default()
    });
    let t = build(&query, &NoEnv).unwrap();
    assert_eq!(step_names(&t), vec!["Scan", "Filter", "Bind"]);
    assert_eq!(t.replacements.len(), 1);
    if let Step::Filter(f) = &t.steps[1] {
        assert_eq!(
            f.predicate,
            Expr::call(BuiltinFunc::InReplacement, vec![path("a"), lit(0i64)])
        );
    } else {
        panic!("expected Filter");
    }
    let rep = &t.replacements[0];
    assert_eq!(&step_names(rep)[..2], &["Scan", "Bind"]);
    assert_eq!(rep.output_names(), vec!["x"]);
    assert!(rep.class() <= SizeClass::ColumnCardinality);
}

#[test]
fn scalar_subquery_hoisted() {
    // SELECT a, (SELECT MAX(x) FROM u) AS m FROM t
    let sub = SelectStmt {
        columns: vec![Binding::new(Expr::Agg(Aggregate::new(AggOp::Max, path("x"))))],
        from: Some(table("u")),
        ..SelectStmt::default()
    };
    let query = q(SelectStmt {
        columns: vec![
            Binding::new(path("a")),
            Binding::named(Expr::Select(Box::new(sub)), "m"),
        ],
        from: Some(table("t")),
        ..SelectStmt::default()
    });
    let t = build(&query, &NoEnv).unwrap();
    assert_eq!(step_names(&t), vec!["Scan", "Bind"]);
    if let Step::Bind(b) = &t.steps[1] {
        assert_eq!(
            b.bindings[1].expr,
            Expr::call(BuiltinFunc::ScalarReplacement, vec![lit(0i64)])
        );
    } else {
        panic!("expected Bind");
    }
    assert_eq!(t.replacements.len(), 1);
    assert_eq!(t.replacements[0].class(), SizeClass::One);
}

#[test]
fn window_aggregate_hoisted() {
    // SELECT k, SUM(v) OVER (PARTITION BY k) FROM t
    let windowed = Expr::Agg(Aggregate::new(AggOp::Sum, path("v")).over(vec![path("k")]));
    let query = q(SelectStmt {
        columns: vec![Binding::new(path("k")), Binding::new(windowed)],
        from: Some(table("t")),
        ..SelectStmt::default()
    });
    let t = build(&query, &NoEnv).unwrap();
    assert_eq!(step_names(&t), vec!["Scan", "Bind"]);
    if let Step::Bind(b) = &t.steps[1] {
        assert_eq!(
            b.bindings[1].expr,
            Expr::call(
                BuiltinFunc::HashReplacement,
                vec![
                    lit(0i64),
                    lit("scalar"),
                    lit("$__key"),
                    path("k"),
                    Expr::Lit(Literal::Null),
                ]
            )
        );
    } else {
        panic!("expected Bind");
    }
    assert_eq!(t.replacements.len(), 1);
    let rep = &t.replacements[0];
    assert_eq!(step_names(rep), vec!["Scan", "Aggregate"]);
    if let Step::Aggregate(a) = &rep.steps[1] {
        assert_eq!(
            a.group_by.iter().map(Binding::result).collect::<Vec<_>>(),
            vec!["$__key"]
        );
        assert_eq!(
            a.aggs.iter().map(Binding::result).collect::<Vec<_>>(),
            vec!["$__val"]
        );
    } else {
        panic!("expected Aggregate");
    }
}

#[test]
fn cross_join_equi_filter() {
    // SELECT * FROM t CROSS JOIN u WHERE t.a = u.b LIMIT 10
    let query = q(SelectStmt {
        columns: vec![Binding::new(Expr::Star)],
        from: Some(FromClause::Join {
            kind: JoinKind::Cross,
            left: Box::new(table("t")),
            right: Binding::new(path("u")),
        }),
        where_clause: Some(Expr::compare(
            CmpOp::Eq,
            Expr::field("t", "a"),
            Expr::field("u", "b"),
        )),
        limit: Some(10),
        ..SelectStmt::default()
    });
    let t = build(&query, &NoEnv).unwrap();
    // joinelim converts the table iteration into a hash-lookup iteration
    assert_eq!(
        step_names(&t),
        vec!["Scan", "Iterate", "LimitOffset", "BindStar"]
    );
    if let Step::Iterate(it) = &t.steps[1] {
        assert_eq!(it.binding.result(), "u");
        assert_eq!(
            it.binding.expr,
            Expr::call(
                BuiltinFunc::HashReplacement,
                vec![
                    lit(0i64),
                    lit("list"),
                    lit("$__key"),
                    Expr::field("t", "a"),
                ]
            )
        );
    } else {
        panic!("expected Iterate");
    }
    assert_eq!(t.replacements.len(), 1);
    let rep = &t.replacements[0];
    assert_eq!(step_names(rep), vec!["Scan", "Bind"]);
    assert_eq!(rep.output_names(), vec!["$__val", "$__key"]);
}

#[test]
fn unbounded_subquery_rejected() {
    // SELECT a FROM t WHERE (SELECT x FROM u)
    let sub = SelectStmt {
        columns: vec![Binding::new(path("x"))],
        from: Some(table("u")),
        ..SelectStmt::default()
    };
    let query = q(SelectStmt {
        columns: vec![Binding::new(path("a"))],
        from: Some(table("t")),
        where_clause: Some(Expr::Select(Box::new(sub))),
        ..SelectStmt::default()
    });
    let err = build(&query, &NoEnv).unwrap_err();
    assert!(err.msg.contains("use LIMIT"), "unexpected error: {}", err.msg);
}

#[test]
fn correlated_scalar_subquery() {
    // SELECT a, (SELECT MAX(x) FROM u WHERE u.k = t.a) AS m FROM t
    let sub = SelectStmt {
        columns: vec![Binding::new(Expr::Agg(Aggregate::new(AggOp::Max, path("x"))))],
        from: Some(table("u")),
        where_clause: Some(Expr::compare(
            CmpOp::Eq,
            Expr::field("u", "k"),
            Expr::field("t", "a"),
        )),
        ..SelectStmt::default()
    };
    let query = q(SelectStmt {
        columns: vec![
            Binding::new(path("a")),
            Binding::named(Expr::Select(Box::new(sub)), "m"),
        ],
        from: Some(table("t")),
        ..SelectStmt::default()
    });
    let t = build(&query, &NoEnv).unwrap();
    assert_eq!(step_names(&t), vec!["Scan", "Bind"]);
    if let Step::Bind(b) = &t.steps[1] {
        let Expr::Call(c) = &b.bindings[1].expr else {
            panic!("expected a replacement call");
        };
        assert_eq!(c.func, BuiltinFunc::HashReplacement);
        assert_eq!(c.args[1], lit("scalar"));
        assert_eq!(c.args[2], lit("$__key"));
        assert_eq!(c.args[3], Expr::field("t", "a"));
    } else {
        panic!("expected Bind");
    }
    let rep = &t.replacements[0];
    assert_eq!(step_names(rep), vec!["Scan", "Aggregate"]);
    if let Step::Aggregate(a) = &rep.steps[1] {
        // the correlation key joined the grouping
        assert!(a.group_by.iter().any(|g| g.result() == "$__key"));
    }
    assert_eq!(rep.parent, Some(t.id));
}

#[test]
fn empty_from_is_dummy_output() {
    // SELECT 1 AS one
    let query = q(SelectStmt {
        columns: vec![Binding::named(lit(1i64), "one")],
        ..SelectStmt::default()
    });
    let t = build(&query, &NoEnv).unwrap();
    assert_eq!(step_names(&t), vec!["DummyOutput", "Bind"]);
    assert_eq!(t.class(), SizeClass::Zero);
}

#[test]
fn all_constant_distinct_on_is_limit_one() {
    // SELECT DISTINCT ON (3) * FROM t
    let query = q(SelectStmt {
        columns: vec![Binding::new(Expr::Star)],
        distinct_on: Some(vec![lit(3i64)]),
        from: Some(table("t")),
        ..SelectStmt::default()
    });
    let t = build(&query, &NoEnv).unwrap();
    assert_eq!(step_names(&t), vec!["Scan", "LimitOffset", "BindStar"]);
    if let Step::LimitOffset(l) = &t.steps[1] {
        assert_eq!(l.limit, 1);
    }
    assert_eq!(t.class(), SizeClass::One);
}

#[test]
fn cte_substitution() {
    // WITH c AS (SELECT x FROM u) SELECT x FROM c
    let query = Query {
        with: vec![Cte {
            name: "c".to_string(),
            body: SelectStmt {
                columns: vec![Binding::new(path("x"))],
                from: Some(table("u")),
                ..SelectStmt::default()
            },
        }],
        body: Expr::Select(Box::new(SelectStmt {
            columns: vec![Binding::new(path("x"))],
            from: Some(FromClause::Table(Binding::new(path("c")))),
            ..SelectStmt::default()
        })),
        into: None,
    };
    let t = build(&query, &NoEnv).unwrap();
    assert_eq!(step_names(&t), vec!["Scan", "Bind"]);
    if let Step::Scan(s) = &t.steps[0] {
        assert_eq!(s.table.expr, path("u"));
    }
}

#[test]
fn cte_shadow_conflict() {
    // WITH c AS (SELECT x FROM u) SELECT * FROM t AS c
    let query = Query {
        with: vec![Cte {
            name: "c".to_string(),
            body: SelectStmt {
                columns: vec![Binding::new(path("x"))],
                from: Some(table("u")),
                ..SelectStmt::default()
            },
        }],
        body: Expr::Select(Box::new(SelectStmt {
            columns: vec![Binding::new(Expr::Star)],
            from: Some(FromClause::Table(Binding::named(path("t"), "c"))),
            ..SelectStmt::default()
        })),
        into: None,
    };
    let err = build(&query, &NoEnv).unwrap_err();
    assert!(err.msg.contains("shadows"), "unexpected error: {}", err.msg);
}

#[test]
fn non_cross_join_rejected() {
    let query = q(SelectStmt {
        columns: vec![Binding::new(Expr::Star)],
        from: Some(FromClause::Join {
            kind: JoinKind::Inner,
            left: Box::new(table("t")),
            right: Binding::new(path("u")),
        }),
        ..SelectStmt::default()
    });
    let err = build(&query, &NoEnv).unwrap_err();
    assert!(err.msg.contains("not yet supported"));
}

#[test]
fn unpivot_lowering_and_validation() {
    // SELECT * FROM UNPIVOT t AS v AT k
    let unpivot = |as_label: Option<&str>, at_label: Option<&str>| {
        q(SelectStmt {
            columns: vec![Binding::new(Expr::Star)],
            from: Some(FromClause::Table(Binding::new(Expr::Unpivot(Box::new(Unpivot {
                tuple_ref: path("t"),
                as_label: as_label.map(String::from),
                at_label: at_label.map(String::from),
            }))))),
            ..SelectStmt::default()
        })
    };
    let t = build(&unpivot(Some("v"), Some("k")), &NoEnv).unwrap();
    assert_eq!(step_names(&t), vec!["Scan", "Unpivot", "BindStar"]);

    assert!(build(&unpivot(None, None), &NoEnv).is_err());
    assert!(build(&unpivot(Some("v"), Some("v")), &NoEnv).is_err());
}

#[test]
fn multi_key_partition_by_rejected() {
    let windowed = Expr::Agg(
        Aggregate::new(AggOp::Sum, path("v")).over(vec![path("a"), path("b")]),
    );
    let query = q(SelectStmt {
        columns: vec![Binding::new(windowed)],
        from: Some(table("t")),
        ..SelectStmt::default()
    });
    let err = build(&query, &NoEnv).unwrap_err();
    assert!(err.msg.contains("PARTITION BY"));
}

#[test]
fn in_subquery_column_count() {
    let sub = SelectStmt {
        columns: vec![Binding::new(path("x")), Binding::new(path("y"))],
        from: Some(table("u")),
        ..SelectStmt::default()
    };
    let query = q(SelectStmt {
        columns: vec![Binding::new(path("a"))],
        from: Some(table("t")),
        where_clause: Some(Expr::call(
            BuiltinFunc::InSubquery,
            vec![path("a"), Expr::Select(Box::new(sub))],
        )),
        ..SelectStmt::default()
    });
    let err = build(&query, &NoEnv).unwrap_err();
    assert!(err.msg.contains("1 column"), "unexpected error: {}", err.msg);
}

#[test]
fn distinct_group_by_mismatch() {
    // SELECT DISTINCT a FROM t GROUP BY a, b
    let query = q(SelectStmt {
        columns: vec![Binding::new(path("a"))],
        distinct: true,
        from: Some(table("t")),
        group_by: vec![Binding::new(path("a")), Binding::new(path("b"))],
        ..SelectStmt::default()
    });
    let err = build(&query, &NoEnv).unwrap_err();
    assert!(err.msg.contains("GROUP BY"));
}

#[test]
fn mixed_distinct_and_having_rejected() {
    // SELECT DISTINCT a FROM t GROUP BY a HAVING COUNT(*) > 1
    let query = q(SelectStmt {
        columns: vec![Binding::new(path("a"))],
        distinct: true,
        from: Some(table("t")),
        group_by: vec![Binding::new(path("a"))],
        having: Some(Expr::compare(
            CmpOp::Gt,
            Expr::Agg(Aggregate::count_star()),
            lit(1i64),
        )),
        ..SelectStmt::default()
    });
    let err = build(&query, &NoEnv).unwrap_err();
    assert!(err.msg.contains("DISTINCT"));
}

#[test]
fn into_appends_output() {
    let mut query = q(SelectStmt {
        columns: vec![Binding::new(path("a"))],
        from: Some(table("t")),
        ..SelectStmt::default()
    });
    query.into = Some(Expr::field("db1", "tbl"));
    let t = build(&query, &NoEnv).unwrap();
    assert_eq!(step_names(&t), vec!["Scan", "Bind", "Output"]);
    if let Step::Output(o) = t.steps.last().unwrap() {
        assert_eq!(o.target, "db/db1/tbl");
    }

    query.into = Some(path("just_a_db"));
    assert!(build(&query, &NoEnv).is_err());
}

#[test]
fn count_distinct_promotion() {
    // SELECT COUNT(DISTINCT x) AS n FROM t
    let query = q(SelectStmt {
        columns: vec![Binding::named(
            Expr::Agg(Aggregate::new(AggOp::CountDistinct, path("x"))),
            "n",
        )],
        from: Some(table("t")),
        ..SelectStmt::default()
    });
    let t = build(&query, &NoEnv).unwrap();
    // deduplicated through DISTINCT ON, then reduced to a plain COUNT
    assert!(t
        .steps
        .iter()
        .any(|s| matches!(s, Step::Distinct(_))));
    let agg = t.steps.iter().find_map(|s| match s {
        Step::Aggregate(a) => Some(a),
        _ => None,
    });
    let agg = agg.expect("expected an aggregate step");
    if let Expr::Agg(a) = &agg.aggs[0].expr {
        assert_eq!(a.op, AggOp::Count);
    } else {
        panic!("expected aggregate binding");
    }
    assert_eq!(t.output_names(), vec!["n"]);
}

#[test]
fn group_by_with_having_and_order() {
    // SELECT k, SUM(v) AS s FROM t GROUP BY k HAVING SUM(v) > 10 ORDER BY s DESC
    let sum = Expr::Agg(Aggregate::new(AggOp::Sum, path("v")));
    let query = q(SelectStmt {
        columns: vec![Binding::new(path("k")), Binding::named(sum.clone(), "s")],
        from: Some(table("t")),
        group_by: vec![Binding::new(path("k"))],
        having: Some(Expr::compare(CmpOp::Gt, sum, lit(10i64))),
        order_by: vec![tessera_expr::OrderKey::desc(path("s"))],
        ..SelectStmt::default()
    });
    let t = build(&query, &NoEnv).unwrap();
    assert_eq!(
        step_names(&t),
        vec!["Scan", "Aggregate", "Filter", "Bind", "Order"]
    );
    if let Step::Filter(f) = &t.steps[2] {
        assert_eq!(f.predicate, Expr::compare(CmpOp::Gt, path("s"), lit(10i64)));
    }
    assert_eq!(t.output_names(), vec!["k", "s"]);
}

#[test]
fn nested_from_select_flattens() {
    // SELECT y FROM (SELECT a AS y FROM t WHERE a > 1)
    let inner = SelectStmt {
        columns: vec![Binding::named(path("a"), "y")],
        from: Some(table("t")),
        where_clause: Some(Expr::compare(CmpOp::Gt, path("a"), lit(1i64))),
        ..SelectStmt::default()
    };
    let query = q(SelectStmt {
        columns: vec![Binding::new(path("y"))],
        from: Some(FromClause::Table(Binding::new(Expr::Select(Box::new(inner))))),
        ..SelectStmt::default()
    });
    let t = build(&query, &NoEnv).unwrap();
    // the inner projection merges into the outer one
    assert_eq!(step_names(&t), vec!["Scan", "Filter", "Bind"]);
    if let Step::Bind(b) = &t.steps[2] {
        assert_eq!(b.bindings.len(), 1);
        assert_eq!(b.bindings[0].expr, path("a"));
        assert_eq!(b.bindings[0].result(), "y");
    } else {
        panic!("expected Bind");
    }
}

#[test]
fn distinct_on_subset_of_group_by_erased() {
    // SELECT a FROM t GROUP BY a, b DISTINCT ON (b)
    let query = q(SelectStmt {
        columns: vec![Binding::new(path("a"))],
        distinct_on: Some(vec![path("b")]),
        from: Some(table("t")),
        group_by: vec![Binding::new(path("a")), Binding::new(path("b"))],
        ..SelectStmt::default()
    });
    let t = build(&query, &NoEnv).unwrap();
    assert!(
        !t.steps.iter().any(|s| matches!(s, Step::Distinct(_))),
        "DISTINCT ON within the grouping keys should be erased: {t}"
    );
    assert_eq!(t.output_names(), vec!["a"]);
}

#[test]
fn global_count() {
    // SELECT COUNT(*) AS n FROM t
    let query = q(SelectStmt {
        columns: vec![Binding::named(Expr::Agg(Aggregate::count_star()), "n")],
        from: Some(table("t")),
        ..SelectStmt::default()
    });
    let t = build(&query, &NoEnv).unwrap();
    assert_eq!(step_names(&t), vec!["Scan", "Aggregate"]);
    assert_eq!(t.class(), SizeClass::One);
    assert_eq!(t.output_names(), vec!["n"]);
}

#[test]
fn union_body_rejected() {
    let query = Query {
        with: Vec::new(),
        body: Expr::Appended(vec![path("a"), path("b")]),
        into: None,
    };
    let err = build(&query, &NoEnv).unwrap_err();
    assert!(err.msg.contains("only SELECT"));
}
