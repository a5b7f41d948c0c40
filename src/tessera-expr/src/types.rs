//! Type inference over expressions.
//!
//! Types are tracked as bitmasks of the possible runtime kinds; the mask
//! includes [`TypeSet::MISSING`] exactly when the expression can produce
//! MISSING. Callers supply a [`TypeHint`] for path references (a scan's
//! schema, or a step's output bindings); with no hint, paths type as
//! anything.

use serde::{Deserialize, Serialize};

use crate::expr::{AggOp, BuiltinFunc, Expr, IsKey, Literal};

/// A set of possible runtime types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeSet(u16);

impl TypeSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);
    /// NULL.
    pub const NULL: Self = Self(1 << 0);
    /// MISSING.
    pub const MISSING: Self = Self(1 << 1);
    /// Boolean.
    pub const BOOL: Self = Self(1 << 2);
    /// Integer.
    pub const INT: Self = Self(1 << 3);
    /// Float.
    pub const FLOAT: Self = Self(1 << 4);
    /// String.
    pub const STRING: Self = Self(1 << 5);
    /// Timestamp.
    pub const TIMESTAMP: Self = Self(1 << 6);
    /// List.
    pub const LIST: Self = Self(1 << 7);
    /// Struct.
    pub const STRUCT: Self = Self(1 << 8);

    /// Int or float.
    pub const NUMERIC: Self = Self(Self::INT.0 | Self::FLOAT.0);
    /// Every type.
    pub const ANY: Self = Self(
        Self::NULL.0
            | Self::MISSING.0
            | Self::BOOL.0
            | Self::INT.0
            | Self::FLOAT.0
            | Self::STRING.0
            | Self::TIMESTAMP.0
            | Self::LIST.0
            | Self::STRUCT.0,
    );

    /// Set union.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Set intersection.
    #[must_use]
    pub const fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Set difference.
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Whether every member of `other` is in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the sets share a member.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether the set is empty.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for TypeSet {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// A source of type information for sub-expressions, usually path
/// references. Returning `None` means "unknown".
pub trait TypeHint {
    /// The possible types of `e`, if known.
    fn type_of(&self, e: &Expr) -> Option<TypeSet>;
}

/// The hint that knows nothing.
pub struct NoHint;

impl TypeHint for NoHint {
    fn type_of(&self, _e: &Expr) -> Option<TypeSet> {
        None
    }
}

/// The possible types of a literal.
pub const fn literal_type(l: &Literal) -> TypeSet {
    match l {
        Literal::Null => TypeSet::NULL,
        Literal::Missing => TypeSet::MISSING,
        Literal::Bool(_) => TypeSet::BOOL,
        Literal::Int(_) => TypeSet::INT,
        Literal::Float(_) => TypeSet::FLOAT,
        Literal::String(_) => TypeSet::STRING,
        Literal::Timestamp(_) => TypeSet::TIMESTAMP,
    }
}

/// Compute the possible types of `e` under `hint`.
pub fn type_of(e: &Expr, hint: &dyn TypeHint) -> TypeSet {
    if let Some(ts) = hint.type_of(e) {
        return ts;
    }
    match e {
        Expr::Lit(l) => literal_type(l),
        Expr::Path(_) => TypeSet::ANY,
        Expr::Arith { left, right, .. } => {
            let absent = absent_of(left, right, hint);
            TypeSet::NUMERIC.union(absent)
        }
        Expr::Compare { left, right, .. } => {
            let absent = absent_of(left, right, hint);
            TypeSet::BOOL.union(absent)
        }
        Expr::Logical { left, right, .. } => {
            let absent = absent_of(left, right, hint);
            TypeSet::BOOL.union(absent)
        }
        Expr::Not(inner) => {
            let it = type_of(inner, hint);
            TypeSet::BOOL.union(it.intersect(TypeSet::NULL.union(TypeSet::MISSING)))
        }
        // IS predicates are total: they never yield NULL or MISSING.
        Expr::Is { .. } => TypeSet::BOOL,
        Expr::Agg(a) => match a.op {
            AggOp::Count | AggOp::CountDistinct => TypeSet::INT,
            AggOp::Sum | AggOp::Avg => TypeSet::NUMERIC.union(TypeSet::NULL),
            AggOp::Min | AggOp::Max => {
                let it = type_of(&a.inner, hint).without(TypeSet::MISSING);
                it.union(TypeSet::NULL)
            }
        },
        Expr::Call(c) => match c.func {
            BuiltinFunc::Upper | BuiltinFunc::Lower | BuiltinFunc::Trim => {
                TypeSet::STRING.union(args_absent(&c.args, hint))
            }
            BuiltinFunc::Abs | BuiltinFunc::Round => {
                TypeSet::NUMERIC.union(args_absent(&c.args, hint))
            }
            BuiltinFunc::Least | BuiltinFunc::Greatest => c
                .args
                .iter()
                .fold(TypeSet::EMPTY, |acc, a| acc.union(type_of(a, hint))),
            BuiltinFunc::MakeStruct => TypeSet::STRUCT,
            BuiltinFunc::InSubquery | BuiltinFunc::InReplacement => TypeSet::BOOL,
            BuiltinFunc::ScalarReplacement => TypeSet::ANY,
            BuiltinFunc::ListReplacement => TypeSet::LIST,
            BuiltinFunc::StructReplacement => TypeSet::STRUCT,
            // a hash lookup misses when the key has no match, unless a
            // default argument is present
            BuiltinFunc::HashReplacement => {
                if c.args.len() >= 5 {
                    TypeSet::ANY.without(TypeSet::MISSING)
                } else {
                    TypeSet::ANY
                }
            }
        },
        Expr::Select(_) => TypeSet::ANY,
        Expr::Unpivot(_) | Expr::Appended(_) => TypeSet::ANY,
        Expr::Star | Expr::QualifiedStar(_) => TypeSet::STRUCT,
    }
}

/// NULL/MISSING propagation mask for a binary operation.
fn absent_of(left: &Expr, right: &Expr, hint: &dyn TypeHint) -> TypeSet {
    let l = type_of(left, hint);
    let r = type_of(right, hint);
    l.union(r).intersect(TypeSet::NULL.union(TypeSet::MISSING))
}

fn args_absent(args: &[Expr], hint: &dyn TypeHint) -> TypeSet {
    args.iter().fold(TypeSet::EMPTY, |acc, a| {
        acc.union(type_of(a, hint).intersect(TypeSet::NULL.union(TypeSet::MISSING)))
    })
}

/// Whether `e` can evaluate to MISSING under `hint`.
pub fn can_be_missing(e: &Expr, hint: &dyn TypeHint) -> bool {
    type_of(e, hint).contains(TypeSet::MISSING)
}

/// Whether `key` is statically decidable for an expression typed `ts`,
/// and if so, the constant answer.
pub fn is_key_constant(key: IsKey, ts: TypeSet) -> Option<bool> {
    let absent = TypeSet::NULL.union(TypeSet::MISSING);
    match key {
        IsKey::Missing => {
            if !ts.intersects(TypeSet::MISSING) {
                Some(false)
            } else if ts == TypeSet::MISSING {
                Some(true)
            } else {
                None
            }
        }
        IsKey::NotMissing => is_key_constant(IsKey::Missing, ts).map(|b| !b),
        IsKey::Null => {
            if !ts.intersects(absent) {
                Some(false)
            } else if absent.contains(ts) {
                Some(true)
            } else {
                None
            }
        }
        IsKey::NotNull => is_key_constant(IsKey::Null, ts).map(|b| !b),
        _ => None,
    }
}
