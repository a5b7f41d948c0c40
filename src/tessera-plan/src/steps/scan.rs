//! Source and sink steps: table scans, cross-product iteration, INTO.

use serde::{Deserialize, Serialize};

use tessera_expr::{Binding, Expr};

use crate::env::SchemaHint;

/// Leaf step sourcing a table expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanStep {
    /// The scanned table binding (expression plus result name).
    pub table: Binding,
    /// Schema hint supplied by the environment, if any.
    pub hint: Option<SchemaHint>,
}

impl ScanStep {
    /// Create a scan with no schema information.
    pub fn new(table: Binding) -> Self {
        Self { table, hint: None }
    }
}

impl std::fmt::Display for ScanStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Scan: {}", self.table)
    }
}

/// Cross-product iteration over a list-producing expression.
///
/// Each input row is joined with every element produced by the expression;
/// `CROSS JOIN` lowers to this step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterateStep {
    /// The iterated binding.
    pub binding: Binding,
}

impl std::fmt::Display for IterateStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Iterate: {}", self.binding)
    }
}

/// `INTO` sink step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputStep {
    /// The INTO path as written.
    pub path: Expr,
    /// The resolved output target (`db/<db>/<table>`).
    pub target: String,
}

impl std::fmt::Display for OutputStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Output: {}", self.target)
    }
}
