//! Projection steps.

use serde::{Deserialize, Serialize};

use tessera_expr::{Binding, Expr};

/// Projection producing a new set of named columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindStep {
    /// The projected bindings; the output namespace is exactly their
    /// result names.
    pub bindings: Vec<Binding>,
}

impl BindStep {
    /// Create a projection.
    pub fn new(bindings: Vec<Binding>) -> Self {
        Self { bindings }
    }

    /// Result names in output order.
    pub fn names(&self) -> Vec<String> {
        self.bindings.iter().map(Binding::result).collect()
    }

    /// Find a binding by result name.
    pub fn find(&self, name: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.result() == name)
    }

    /// Whether every binding is a bare path to its own result name.
    pub fn is_identity(&self) -> bool {
        self.bindings.iter().all(|b| match &b.expr {
            Expr::Path(p) => p.rest.is_empty() && p.first == b.result(),
            _ => false,
        })
    }
}

impl std::fmt::Display for BindStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cols = self
            .bindings
            .iter()
            .map(std::string::ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "Bind: [{cols}]")
    }
}
