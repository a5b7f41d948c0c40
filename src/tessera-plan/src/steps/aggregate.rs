//! Grouped aggregation step.

use serde::{Deserialize, Serialize};

use tessera_expr::Binding;

/// Grouped aggregation.
///
/// The output namespace is the group keys followed by the aggregate
/// results. An empty `group_by` is a global aggregate producing exactly one
/// row. HAVING lowers to a `Filter` step above this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStep {
    /// Aggregate outputs; every expression is an `Expr::Agg`.
    pub aggs: Vec<Binding>,
    /// Grouping keys.
    pub group_by: Vec<Binding>,
}

impl AggregateStep {
    /// Create an aggregation step.
    pub fn new(aggs: Vec<Binding>, group_by: Vec<Binding>) -> Self {
        Self { aggs, group_by }
    }

    /// Whether this is a global (ungrouped) aggregate.
    pub fn is_global(&self) -> bool {
        self.group_by.is_empty()
    }

    /// Output names: group keys then aggregates.
    pub fn output_names(&self) -> Vec<String> {
        self.group_by
            .iter()
            .chain(&self.aggs)
            .map(Binding::result)
            .collect()
    }
}

impl std::fmt::Display for AggregateStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Aggregate: ")?;
        if !self.group_by.is_empty() {
            let keys = self
                .group_by
                .iter()
                .map(std::string::ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "group=[{keys}] ")?;
        }
        let aggs = self
            .aggs
            .iter()
            .map(std::string::ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "aggs=[{aggs}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_expr::{path, AggOp, Aggregate, Expr};

    #[test]
    fn test_output_names() {
        let step = AggregateStep::new(
            vec![Binding::named(
                Expr::Agg(Aggregate::new(AggOp::Sum, path("v"))),
                "total",
            )],
            vec![Binding::named(path("k"), "k")],
        );
        assert_eq!(step.output_names(), vec!["k", "total"]);
        assert!(!step.is_global());
    }
}
