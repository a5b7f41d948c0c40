//! The environment boundary.
//!
//! An [`Env`] supplies optional schema and index information for table
//! expressions. Both operations are synchronous and best-effort: `None`
//! means "not available", and index errors are demoted to "no index" by the
//! builder.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tessera_expr::{CompileResult, Expr, Path, TypeSet};

/// Type hints for the fields of a scanned table, keyed by dotted path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaHint {
    fields: BTreeMap<String, TypeSet>,
}

impl SchemaHint {
    /// Create an empty hint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field type.
    #[must_use]
    pub fn with_field(mut self, path: impl Into<String>, ts: TypeSet) -> Self {
        self.fields.insert(path.into(), ts);
        self
    }

    /// Look up the type of a path.
    pub fn lookup(&self, p: &Path) -> Option<TypeSet> {
        self.fields.get(&p.dotted()).copied()
    }
}

/// Additional context for plan optimization.
pub trait Env {
    /// Type hints associated with a table expression, if any.
    fn schema(&self, table: &Expr) -> Option<SchemaHint>;

    /// The index for a table expression. `Ok(None)` when no index exists;
    /// errors are treated by the builder as "no index available".
    fn index<'s>(&'s self, table: &Expr) -> CompileResult<Option<Box<dyn Index + 's>>>;
}

/// A table index exposing per-path time ranges.
pub trait Index {
    /// The inclusive time range of `path` across the table, if tracked.
    fn time_range(&self, path: &Expr) -> Option<(i64, i64)>;
}

/// The environment that knows nothing.
pub struct NoEnv;

impl Env for NoEnv {
    fn schema(&self, _table: &Expr) -> Option<SchemaHint> {
        None
    }

    fn index<'s>(&'s self, _table: &Expr) -> CompileResult<Option<Box<dyn Index + 's>>> {
        Ok(None)
    }
}
