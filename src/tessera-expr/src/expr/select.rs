//! SELECT statements, bindings, and query roots.

use serde::{Deserialize, Serialize};

use super::{Accessor, Expr};

/// A named expression in a projection, grouping, or FROM clause.
///
/// The name is `None` until one is assigned, either because the user wrote
/// `AS name` or because the compiler picked an output name; `explicit()`
/// reports whether a name has been assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// The bound expression.
    pub expr: Expr,
    name: Option<String>,
}

impl Binding {
    /// Create an unnamed binding.
    pub fn new(expr: Expr) -> Self {
        Self { expr, name: None }
    }

    /// Create a named binding (`expr AS name`).
    pub fn named(expr: Expr, name: impl Into<String>) -> Self {
        Self {
            expr,
            name: Some(name.into()),
        }
    }

    /// The result name: the assigned name if present, otherwise a name
    /// derived from the expression (the trailing path component), otherwise
    /// the empty string.
    pub fn result(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match &self.expr {
            Expr::Path(p) => match p.rest.last() {
                Some(Accessor::Field(f)) => f.clone(),
                Some(Accessor::Index(_)) => String::new(),
                None => p.first.clone(),
            },
            _ => String::new(),
        }
    }

    /// Whether a result name has been assigned.
    pub fn explicit(&self) -> bool {
        self.name.is_some()
    }

    /// Assign the result name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} AS {}", self.expr, name),
            None => write!(f, "{}", self.expr),
        }
    }
}

/// A single ORDER BY term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderKey {
    /// Expression to order by.
    pub expr: Expr,
    /// Descending order if true.
    pub desc: bool,
    /// NULLs sort before non-NULLs if true.
    pub nulls_first: bool,
}

impl OrderKey {
    /// Create an ascending key.
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            desc: false,
            nulls_first: false,
        }
    }

    /// Create a descending key.
    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            desc: true,
            nulls_first: true,
        }
    }
}

impl std::fmt::Display for OrderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expr)?;
        if self.desc {
            write!(f, " DESC")?;
        }
        Ok(())
    }
}

/// Join kinds. Only `CROSS JOIN` is lowered; the others are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    /// `CROSS JOIN` / comma join.
    Cross,
    /// `INNER JOIN` (unsupported).
    Inner,
    /// `LEFT JOIN` (unsupported).
    Left,
}

impl std::fmt::Display for JoinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cross => write!(f, "CROSS JOIN"),
            Self::Inner => write!(f, "JOIN"),
            Self::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// The FROM clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FromClause {
    /// A single table expression.
    Table(Binding),
    /// A join of a FROM clause with one more table.
    Join {
        /// Join kind.
        kind: JoinKind,
        /// Left input.
        left: Box<FromClause>,
        /// Right table.
        right: Binding,
    },
}

impl std::fmt::Display for FromClause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table(b) => write!(f, "{b}"),
            Self::Join { kind, left, right } => write!(f, "{left} {kind} {right}"),
        }
    }
}

/// `UNPIVOT expr AS value AT key`: row-per-field expansion of a structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unpivot {
    /// The structure-producing expression being expanded.
    pub tuple_ref: Expr,
    /// Binding for the field value (`AS`).
    pub as_label: Option<String>,
    /// Binding for the field name (`AT`).
    pub at_label: Option<String>,
}

impl std::fmt::Display for Unpivot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UNPIVOT {}", self.tuple_ref)?;
        if let Some(v) = &self.as_label {
            write!(f, " AS {v}")?;
        }
        if let Some(k) = &self.at_label {
            write!(f, " AT {k}")?;
        }
        Ok(())
    }
}

/// A full SELECT statement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectStmt {
    /// Output columns.
    pub columns: Vec<Binding>,
    /// `SELECT DISTINCT`.
    pub distinct: bool,
    /// `SELECT DISTINCT ON (exprs)`.
    pub distinct_on: Option<Vec<Expr>>,
    /// FROM clause; `None` compiles to a zero-row source.
    pub from: Option<FromClause>,
    /// WHERE predicate.
    pub where_clause: Option<Expr>,
    /// GROUP BY expressions.
    pub group_by: Vec<Binding>,
    /// HAVING predicate.
    pub having: Option<Expr>,
    /// ORDER BY keys.
    pub order_by: Vec<OrderKey>,
    /// LIMIT.
    pub limit: Option<u64>,
    /// OFFSET.
    pub offset: Option<u64>,
}

impl SelectStmt {
    /// Whether the statement has any form of DISTINCT.
    pub fn has_distinct(&self) -> bool {
        self.distinct || self.distinct_on.is_some()
    }
}

impl std::fmt::Display for SelectStmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SELECT ")?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        } else if let Some(on) = &self.distinct_on {
            let exprs = on
                .iter()
                .map(std::string::ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "DISTINCT ON ({exprs}) ")?;
        }
        let cols = self
            .columns
            .iter()
            .map(std::string::ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{cols}")?;
        if let Some(from) = &self.from {
            write!(f, " FROM {from}")?;
        }
        if let Some(w) = &self.where_clause {
            write!(f, " WHERE {w}")?;
        }
        if !self.group_by.is_empty() {
            let keys = self
                .group_by
                .iter()
                .map(std::string::ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " GROUP BY {keys}")?;
        }
        if let Some(h) = &self.having {
            write!(f, " HAVING {h}")?;
        }
        if !self.order_by.is_empty() {
            let keys = self
                .order_by
                .iter()
                .map(std::string::ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " ORDER BY {keys}")?;
        }
        if let Some(l) = self.limit {
            write!(f, " LIMIT {l}")?;
        }
        if let Some(o) = self.offset {
            write!(f, " OFFSET {o}")?;
        }
        Ok(())
    }
}

/// A common table expression binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cte {
    /// The bound table name.
    pub name: String,
    /// The CTE body.
    pub body: SelectStmt,
}

/// A complete query: optional WITH bindings, a body, and an optional
/// `INTO db.table` sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// WITH bindings in declaration order.
    pub with: Vec<Cte>,
    /// The query body; currently only SELECT lowers.
    pub body: Expr,
    /// INTO target path.
    pub into: Option<Expr>,
}

impl Query {
    /// Create a plain SELECT query.
    pub fn from_select(s: SelectStmt) -> Self {
        Self {
            with: Vec::new(),
            body: Expr::Select(Box::new(s)),
            into: None,
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.with.is_empty() {
            let ctes = self
                .with
                .iter()
                .map(|c| format!("{} AS ({})", c.name, c.body))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "WITH {ctes} ")?;
        }
        write!(f, "{}", self.body)?;
        if let Some(into) = &self.into {
            write!(f, " INTO {into}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{lit, path};
    use crate::CmpOp;

    #[test]
    fn test_binding_result() {
        let b = Binding::new(path("a"));
        assert_eq!(b.result(), "a");
        assert!(!b.explicit());

        let b = Binding::new(Expr::path_with("t", vec![Accessor::Field("x".into())]));
        assert_eq!(b.result(), "x");

        let b = Binding::named(lit(1i64), "one");
        assert_eq!(b.result(), "one");
        assert!(b.explicit());

        let b = Binding::new(lit(1i64));
        assert_eq!(b.result(), "");
    }

    #[test]
    fn test_select_display() {
        let s = SelectStmt {
            columns: vec![Binding::named(path("a"), "a")],
            from: Some(FromClause::Table(Binding::new(path("t")))),
            where_clause: Some(Expr::compare(CmpOp::Gt, path("a"), lit(1i64))),
            ..SelectStmt::default()
        };
        assert_eq!(s.to_string(), "SELECT a AS a FROM t WHERE a > 1");
    }
}
