//! Built-in function calls.
//!
//! The replacement family (`SCALAR_REPLACEMENT`, `LIST_REPLACEMENT`,
//! `STRUCT_REPLACEMENT`, `HASH_REPLACEMENT`, `IN_REPLACEMENT`) is reserved
//! for the trace builder: the functions reference hoisted sub-traces by
//! integer index and never appear in user queries.

use serde::{Deserialize, Serialize};

use super::Expr;

/// Built-in scalar functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinFunc {
    /// `UPPER(s)`.
    Upper,
    /// `LOWER(s)`.
    Lower,
    /// `TRIM(s)`.
    Trim,
    /// `ABS(x)`.
    Abs,
    /// `ROUND(x)`.
    Round,
    /// `LEAST(a, b, ...)`.
    Least,
    /// `GREATEST(a, b, ...)`.
    Greatest,
    /// `MAKE_STRUCT(...)`: construct a structure; `MAKE_STRUCT(*)` is the
    /// whole input row.
    MakeStruct,
    /// `x IN (SELECT ...)` as parsed; rewritten away during hoisting.
    InSubquery,
    /// Scalar value of replacement `i` (exactly one row, one column).
    ScalarReplacement,
    /// List of values of replacement `i`.
    ListReplacement,
    /// Struct value of replacement `i` (exactly one row).
    StructReplacement,
    /// Keyed lookup into replacement `i`:
    /// `HASH_REPLACEMENT(i, kind, label, key[, default])`.
    HashReplacement,
    /// Membership test against replacement `i`: `IN_REPLACEMENT(x, i)`.
    InReplacement,
}

impl BuiltinFunc {
    /// Get the function name as rendered in query text.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Upper => "UPPER",
            Self::Lower => "LOWER",
            Self::Trim => "TRIM",
            Self::Abs => "ABS",
            Self::Round => "ROUND",
            Self::Least => "LEAST",
            Self::Greatest => "GREATEST",
            Self::MakeStruct => "MAKE_STRUCT",
            Self::InSubquery => "IN_SUBQUERY",
            Self::ScalarReplacement => "SCALAR_REPLACEMENT",
            Self::ListReplacement => "LIST_REPLACEMENT",
            Self::StructReplacement => "STRUCT_REPLACEMENT",
            Self::HashReplacement => "HASH_REPLACEMENT",
            Self::InReplacement => "IN_REPLACEMENT",
        }
    }

    /// Accepted argument counts as an inclusive `(min, max)` range.
    pub const fn arity(&self) -> (usize, usize) {
        match self {
            Self::Upper | Self::Lower | Self::Trim | Self::Abs | Self::Round => (1, 1),
            Self::Least | Self::Greatest => (2, usize::MAX),
            Self::MakeStruct => (1, usize::MAX),
            Self::InSubquery | Self::InReplacement => (2, 2),
            Self::ScalarReplacement | Self::ListReplacement | Self::StructReplacement => (1, 1),
            Self::HashReplacement => (4, 5),
        }
    }

    /// Check whether this function references a hoisted replacement.
    pub const fn is_replacement(&self) -> bool {
        matches!(
            self,
            Self::ScalarReplacement
                | Self::ListReplacement
                | Self::StructReplacement
                | Self::HashReplacement
                | Self::InReplacement
        )
    }
}

impl std::fmt::Display for BuiltinFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A built-in function call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// The function.
    pub func: BuiltinFunc,
    /// Argument expressions.
    pub args: Vec<Expr>,
}

impl Call {
    /// Create a new call.
    pub fn new(func: BuiltinFunc, args: Vec<Expr>) -> Self {
        Self { func, args }
    }

    /// The replacement index this call references, if any.
    ///
    /// For `IN_REPLACEMENT` the index is the second argument; for the other
    /// replacement functions it is the first.
    pub fn replacement_index(&self) -> Option<usize> {
        let arg = match self.func {
            BuiltinFunc::ScalarReplacement
            | BuiltinFunc::ListReplacement
            | BuiltinFunc::StructReplacement
            | BuiltinFunc::HashReplacement => self.args.first(),
            BuiltinFunc::InReplacement => self.args.get(1),
            _ => None,
        }?;
        match arg {
            Expr::Lit(super::Literal::Int(i)) if *i >= 0 => Some(*i as usize),
            _ => None,
        }
    }

    /// Replace the replacement index this call references.
    pub fn set_replacement_index(&mut self, index: usize) {
        let arg = match self.func {
            BuiltinFunc::ScalarReplacement
            | BuiltinFunc::ListReplacement
            | BuiltinFunc::StructReplacement
            | BuiltinFunc::HashReplacement => self.args.get_mut(0),
            BuiltinFunc::InReplacement => self.args.get_mut(1),
            _ => None,
        };
        if let Some(arg) = arg {
            *arg = Expr::Lit(super::Literal::Int(index as i64));
        }
    }
}

impl std::fmt::Display for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let args = self
            .args
            .iter()
            .map(std::string::ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}({})", self.func, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lit;

    #[test]
    fn test_arity() {
        assert_eq!(BuiltinFunc::Upper.arity(), (1, 1));
        assert_eq!(BuiltinFunc::HashReplacement.arity(), (4, 5));
    }

    #[test]
    fn test_replacement_index() {
        let call = Call::new(BuiltinFunc::ScalarReplacement, vec![lit(3i64)]);
        assert_eq!(call.replacement_index(), Some(3));

        let call = Call::new(
            BuiltinFunc::InReplacement,
            vec![Expr::path("a"), lit(7i64)],
        );
        assert_eq!(call.replacement_index(), Some(7));

        let call = Call::new(BuiltinFunc::Upper, vec![Expr::path("s")]);
        assert_eq!(call.replacement_index(), None);
    }

    #[test]
    fn test_set_replacement_index() {
        let mut call = Call::new(BuiltinFunc::ListReplacement, vec![lit(0i64)]);
        call.set_replacement_index(5);
        assert_eq!(call.replacement_index(), Some(5));
    }
}
