//! Row restriction steps.

use serde::{Deserialize, Serialize};

use tessera_expr::Expr;

/// Retains rows where the predicate is TRUE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStep {
    /// The predicate.
    pub predicate: Expr,
}

impl FilterStep {
    /// Create a filter.
    pub fn new(predicate: Expr) -> Self {
        Self { predicate }
    }
}

impl std::fmt::Display for FilterStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Filter: {}", self.predicate)
    }
}

/// Distinct-on by a list of expressions; an empty list means
/// distinct-row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistinctStep {
    /// The distinct-on expressions.
    pub exprs: Vec<Expr>,
}

impl DistinctStep {
    /// Create a distinct step.
    pub fn new(exprs: Vec<Expr>) -> Self {
        Self { exprs }
    }
}

impl std::fmt::Display for DistinctStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.exprs.is_empty() {
            return write!(f, "Distinct");
        }
        let exprs = self
            .exprs
            .iter()
            .map(std::string::ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "Distinct: [{exprs}]")
    }
}
