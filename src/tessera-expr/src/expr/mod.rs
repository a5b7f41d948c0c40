//! Expression node model.
//!
//! `Expr` is the closed AST over which the whole compiler operates:
//! predicates, projections, groupings, table positions, and the replacement
//! calls that reference hoisted sub-traces. Every variant supports
//! structural equality, codec round-trip copy, and the walk/rewrite
//! protocol in [`crate::walk`].

mod agg;
mod binary;
mod func;
mod select;

pub use agg::{AggOp, Aggregate, Window};
pub use binary::{ArithOp, CmpOp, IsKey, LogicOp};
pub use func::{BuiltinFunc, Call};
pub use select::{Binding, Cte, FromClause, JoinKind, OrderKey, Query, SelectStmt, Unpivot};

use serde::{Deserialize, Serialize};

/// A path accessor: a field dereference or list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Accessor {
    /// `.field`
    Field(String),
    /// `[index]`
    Index(i64),
}

/// A path reference: a head identifier plus a chain of accessors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    /// The first identifier.
    pub first: String,
    /// The accessor chain.
    pub rest: Vec<Accessor>,
}

impl Path {
    /// Create a bare identifier path.
    pub fn new(first: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            rest: Vec::new(),
        }
    }

    /// Render the path with dots and brackets.
    pub fn dotted(&self) -> String {
        let mut out = self.first.clone();
        for a in &self.rest {
            match a {
                Accessor::Field(f) => {
                    out.push('.');
                    out.push_str(f);
                }
                Accessor::Index(i) => {
                    out.push('[');
                    out.push_str(&i.to_string());
                    out.push(']');
                }
            }
        }
        out
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dotted())
    }
}

/// A literal constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// SQL NULL.
    Null,
    /// PartiQL MISSING: the distinguished value for absent fields.
    Missing,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Timestamp in microseconds since the Unix epoch.
    Timestamp(i64),
}

impl Literal {
    /// Whether this literal is NULL or MISSING.
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Null | Self::Missing)
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Missing => write!(f, "MISSING"),
            Self::Bool(true) => write!(f, "TRUE"),
            Self::Bool(false) => write!(f, "FALSE"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "'{s}'"),
            Self::Timestamp(us) => write!(f, "TIMESTAMP({us})"),
        }
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Path reference.
    Path(Path),
    /// Literal constant.
    Lit(Literal),
    /// Arithmetic operation.
    Arith {
        /// Operator.
        op: ArithOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Comparison.
    Compare {
        /// Operator.
        op: CmpOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Logical connective.
    Logical {
        /// Operator.
        op: LogicOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Logical negation.
    Not(Box<Expr>),
    /// `IS` predicate.
    Is {
        /// Tested expression.
        expr: Box<Expr>,
        /// Predicate kind.
        key: IsKey,
    },
    /// Built-in function call.
    Call(Call),
    /// Aggregate expression.
    Agg(Aggregate),
    /// Nested SELECT in expression or table position.
    Select(Box<SelectStmt>),
    /// UNPIVOT in table position.
    Unpivot(Box<Unpivot>),
    /// UNION ALL of table expressions (CTE position only).
    Appended(Vec<Expr>),
    /// `*`: every input field.
    Star,
    /// `q.*`: every field of one binding; eliminated before lowering.
    QualifiedStar(String),
}

impl Expr {
    /// Create a bare path reference.
    pub fn path(first: impl Into<String>) -> Self {
        Self::Path(Path::new(first))
    }

    /// Create a path with an accessor chain.
    pub fn path_with(first: impl Into<String>, rest: Vec<Accessor>) -> Self {
        Self::Path(Path {
            first: first.into(),
            rest,
        })
    }

    /// Create a field access path `first.field`.
    pub fn field(first: impl Into<String>, field: impl Into<String>) -> Self {
        Self::path_with(first, vec![Accessor::Field(field.into())])
    }

    /// Create a comparison.
    pub fn compare(op: CmpOp, left: Expr, right: Expr) -> Self {
        Self::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Create an arithmetic expression.
    pub fn arith(op: ArithOp, left: Expr, right: Expr) -> Self {
        Self::Arith {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Create a conjunction.
    pub fn and(self, other: Expr) -> Self {
        Self::Logical {
            op: LogicOp::And,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// Create a disjunction.
    pub fn or(self, other: Expr) -> Self {
        Self::Logical {
            op: LogicOp::Or,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// Create a negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Create an `IS` predicate.
    pub fn is(self, key: IsKey) -> Self {
        Self::Is {
            expr: Box::new(self),
            key,
        }
    }

    /// Create a function call.
    pub fn call(func: BuiltinFunc, args: Vec<Expr>) -> Self {
        Self::Call(Call::new(func, args))
    }

    /// Whether this expression is a constant literal.
    pub const fn is_literal(&self) -> bool {
        matches!(self, Self::Lit(_))
    }

    /// View as a literal, if it is one.
    pub const fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Lit(l) => Some(l),
            _ => None,
        }
    }

    /// View as a path, if it is one.
    pub const fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(p) => Some(p),
            _ => None,
        }
    }

    /// Syntactic weight: the node count. Simplifier rules are
    /// size-non-increasing under this metric, which bounds convergence.
    pub fn weight(&self) -> usize {
        let mut n = 0usize;
        crate::walk::walk_fn(self, &mut |_| {
            n += 1;
            true
        });
        n
    }

    /// Expression depth; bounds the simplifier's fixed-point iteration.
    pub fn depth(&self) -> usize {
        fn depth_of(e: &Expr) -> usize {
            let mut max = 0usize;
            crate::walk::each_child(e, &mut |c| {
                max = max.max(depth_of(c));
            });
            max + 1
        }
        depth_of(self)
    }
}

/// Split a predicate into its top-level conjuncts.
pub fn conjuncts(e: &Expr) -> Vec<&Expr> {
    let mut out = Vec::new();
    fn split<'a>(e: &'a Expr, out: &mut Vec<&'a Expr>) {
        match e {
            Expr::Logical {
                op: LogicOp::And,
                left,
                right,
            } => {
                split(left, out);
                split(right, out);
            }
            other => out.push(other),
        }
    }
    split(e, &mut out);
    out
}

/// AND together a list of conjuncts; `None` when the list is empty.
pub fn conjoin(mut parts: Vec<Expr>) -> Option<Expr> {
    let first = if parts.is_empty() {
        return None;
    } else {
        parts.remove(0)
    };
    Some(parts.into_iter().fold(first, Expr::and))
}

/// Create a bare path expression.
pub fn path(name: impl Into<String>) -> Expr {
    Expr::path(name)
}

/// Create a literal expression.
pub fn lit<L: Into<Literal>>(value: L) -> Expr {
    Expr::Lit(value.into())
}

/// Syntactic equivalence, sufficient for matching ORDER BY terms against
/// SELECT outputs. Numeric literals compare by value across Int/Float;
/// everything else is structural.
pub fn equivalent(a: &Expr, b: &Expr) -> bool {
    match (a, b) {
        (Expr::Lit(Literal::Int(i)), Expr::Lit(Literal::Float(f)))
        | (Expr::Lit(Literal::Float(f)), Expr::Lit(Literal::Int(i))) => *f == *i as f64,
        (Expr::Lit(la), Expr::Lit(lb)) => la == lb,
        (Expr::Path(pa), Expr::Path(pb)) => pa == pb,
        (
            Expr::Arith {
                op: oa,
                left: la,
                right: ra,
            },
            Expr::Arith {
                op: ob,
                left: lb,
                right: rb,
            },
        ) => oa == ob && equivalent(la, lb) && equivalent(ra, rb),
        (
            Expr::Compare {
                op: oa,
                left: la,
                right: ra,
            },
            Expr::Compare {
                op: ob,
                left: lb,
                right: rb,
            },
        ) => oa == ob && equivalent(la, lb) && equivalent(ra, rb),
        (
            Expr::Logical {
                op: oa,
                left: la,
                right: ra,
            },
            Expr::Logical {
                op: ob,
                left: lb,
                right: rb,
            },
        ) => oa == ob && equivalent(la, lb) && equivalent(ra, rb),
        (Expr::Not(ia), Expr::Not(ib)) => equivalent(ia, ib),
        (Expr::Is { expr: ea, key: ka }, Expr::Is { expr: eb, key: kb }) => {
            ka == kb && equivalent(ea, eb)
        }
        (Expr::Call(ca), Expr::Call(cb)) => {
            ca.func == cb.func
                && ca.args.len() == cb.args.len()
                && ca.args.iter().zip(&cb.args).all(|(x, y)| equivalent(x, y))
        }
        (Expr::Agg(aa), Expr::Agg(ab)) => {
            aa.op == ab.op && aa.over == ab.over && equivalent(&aa.inner, &ab.inner)
        }
        _ => a == b,
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{p}"),
            Self::Lit(l) => write!(f, "{l}"),
            Self::Arith { op, left, right } => write!(f, "({left} {op} {right})"),
            Self::Compare { op, left, right } => write!(f, "{left} {op} {right}"),
            Self::Logical { op, left, right } => write!(f, "{left} {op} {right}"),
            Self::Not(e) => write!(f, "NOT {e}"),
            Self::Is { expr, key } => write!(f, "{expr} {key}"),
            Self::Call(c) => write!(f, "{c}"),
            Self::Agg(a) => write!(f, "{a}"),
            Self::Select(s) => write!(f, "({s})"),
            Self::Unpivot(u) => write!(f, "{u}"),
            Self::Appended(parts) => {
                let rendered = parts
                    .iter()
                    .map(std::string::ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" UNION ALL ");
                write!(f, "({rendered})")
            }
            Self::Star => write!(f, "*"),
            Self::QualifiedStar(q) => write!(f, "{q}.*"),
        }
    }
}
