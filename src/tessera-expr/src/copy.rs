//! Deep copy via codec round-trip.
//!
//! Copies go through the same binary codec used for persistence, which
//! guarantees bit-identical semantics without per-variant copy logic.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CompileError, CompileResult};
use crate::expr::{Expr, SelectStmt};

fn round_trip<T: Serialize + DeserializeOwned>(value: &T) -> CompileResult<T> {
    let bytes = bincode::serialize(value).map_err(CompileError::codec)?;
    bincode::deserialize(&bytes).map_err(CompileError::codec)
}

/// Deep-copy an expression. `equivalent(e, copy(e)?)` always holds.
pub fn copy(e: &Expr) -> CompileResult<Expr> {
    round_trip(e)
}

/// Deep-copy a SELECT statement.
pub fn copy_select(s: &SelectStmt) -> CompileResult<SelectStmt> {
    round_trip(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{equivalent, lit, path, Binding, CmpOp, FromClause};

    #[test]
    fn test_copy_preserves_equivalence() {
        let e = Expr::compare(CmpOp::Eq, path("a"), lit(1i64)).and(path("b").not());
        let c = copy(&e).unwrap();
        assert_eq!(e, c);
        assert!(equivalent(&e, &c));
    }

    #[test]
    fn test_copy_select() {
        let s = SelectStmt {
            columns: vec![Binding::named(path("a"), "a")],
            from: Some(FromClause::Table(Binding::new(path("t")))),
            ..SelectStmt::default()
        };
        let c = copy_select(&s).unwrap();
        assert_eq!(s, c);
    }
}
