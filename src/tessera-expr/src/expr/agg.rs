//! Aggregate expressions.

use serde::{Deserialize, Serialize};

use super::Expr;

/// Aggregate operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggOp {
    /// `COUNT(x)` or `COUNT(*)`.
    Count,
    /// `COUNT(DISTINCT x)`.
    CountDistinct,
    /// `SUM(x)`.
    Sum,
    /// `MIN(x)`.
    Min,
    /// `MAX(x)`.
    Max,
    /// `AVG(x)`.
    Avg,
}

impl AggOp {
    /// Get the function name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Count | Self::CountDistinct => "COUNT",
            Self::Sum => "SUM",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Avg => "AVG",
        }
    }
}

/// An `OVER (...)` window specification.
///
/// Only `PARTITION BY` is modeled; windowed aggregates are rewritten into
/// hash-lookup joins against auxiliary sub-traces before a trace is built,
/// so no window survives lowering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// Partition key expressions.
    pub partition_by: Vec<Expr>,
}

/// An aggregate expression, optionally windowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    /// The aggregate operation.
    pub op: AggOp,
    /// The aggregated expression; `Expr::Star` for `COUNT(*)`.
    pub inner: Box<Expr>,
    /// Optional window specification.
    pub over: Option<Window>,
}

impl Aggregate {
    /// Create a plain aggregate.
    pub fn new(op: AggOp, inner: Expr) -> Self {
        Self {
            op,
            inner: Box::new(inner),
            over: None,
        }
    }

    /// Create `COUNT(*)`.
    pub fn count_star() -> Self {
        Self::new(AggOp::Count, Expr::Star)
    }

    /// Attach a window specification.
    #[must_use]
    pub fn over(mut self, partition_by: Vec<Expr>) -> Self {
        self.over = Some(Window { partition_by });
        self
    }
}

impl std::fmt::Display for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.op == AggOp::CountDistinct {
            write!(f, "COUNT(DISTINCT {})", self.inner)?;
        } else {
            write!(f, "{}({})", self.op.name(), self.inner)?;
        }
        if let Some(w) = &self.over {
            let keys = w
                .partition_by
                .iter()
                .map(std::string::ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " OVER (PARTITION BY {keys})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::path;

    #[test]
    fn test_display() {
        let agg = Aggregate::new(AggOp::Sum, path("v"));
        assert_eq!(agg.to_string(), "SUM(v)");

        let agg = Aggregate::new(AggOp::CountDistinct, path("x"));
        assert_eq!(agg.to_string(), "COUNT(DISTINCT x)");

        let agg = Aggregate::count_star();
        assert_eq!(agg.to_string(), "COUNT(*)");

        let agg = Aggregate::new(AggOp::Sum, path("v")).over(vec![path("k")]);
        assert_eq!(agg.to_string(), "SUM(v) OVER (PARTITION BY k)");
    }
}
