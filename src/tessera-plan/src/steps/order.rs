//! Ordering and row-count steps.

use serde::{Deserialize, Serialize};

use tessera_expr::OrderKey;

/// Sort by a list of keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStep {
    /// Sort keys in precedence order.
    pub keys: Vec<OrderKey>,
}

impl OrderStep {
    /// Create a sort step.
    pub fn new(keys: Vec<OrderKey>) -> Self {
        Self { keys }
    }
}

impl std::fmt::Display for OrderStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self
            .keys
            .iter()
            .map(std::string::ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "Order: [{keys}]")
    }
}

/// `LIMIT limit OFFSET offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitStep {
    /// Maximum number of rows produced.
    pub limit: u64,
    /// Rows skipped before producing output.
    pub offset: u64,
}

impl LimitStep {
    /// Compose two stacked limits into one.
    ///
    /// `self` runs first; `outer` consumes its output.
    pub fn compose(self, outer: LimitStep) -> LimitStep {
        let remaining = self.limit.saturating_sub(outer.offset);
        LimitStep {
            limit: remaining.min(outer.limit),
            offset: self.offset + outer.offset,
        }
    }
}

impl std::fmt::Display for LimitStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LimitOffset: limit={} offset={}", self.limit, self.offset)
    }
}

/// Row-per-field expansion of a structure into `(value, key)` rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpivotStep {
    /// Binding name for each field value (`AS`).
    pub as_label: Option<String>,
    /// Binding name for each field name (`AT`).
    pub at_label: Option<String>,
}

impl std::fmt::Display for UnpivotStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unpivot:")?;
        if let Some(v) = &self.as_label {
            write!(f, " AS {v}")?;
        }
        if let Some(k) = &self.at_label {
            write!(f, " AT {k}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_compose() {
        // rows 0..10, then skip 3 take 4 => rows 3..7 of the original
        let inner = LimitStep { limit: 10, offset: 0 };
        let outer = LimitStep { limit: 4, offset: 3 };
        assert_eq!(inner.compose(outer), LimitStep { limit: 4, offset: 3 });

        // inner produces 5 rows; skipping 3 leaves at most 2
        let inner = LimitStep { limit: 5, offset: 2 };
        let outer = LimitStep { limit: 10, offset: 3 };
        assert_eq!(inner.compose(outer), LimitStep { limit: 2, offset: 5 });
    }
}
