//! Compile errors.

use std::io;

use thiserror::Error;

use crate::expr::Expr;

/// Result alias for compilation.
pub type CompileResult<T> = std::result::Result<T, CompileError>;

/// An error associated with compiling a particular expression.
///
/// The offending node, when known, is attached so that diagnostics can show
/// the expression the error is pinned to.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{msg}")]
pub struct CompileError {
    /// The offending expression, if known.
    pub node: Option<Expr>,
    /// Human-readable description.
    pub msg: String,
}

impl CompileError {
    /// Create an error pinned to an expression.
    pub fn at(node: &Expr, msg: impl Into<String>) -> Self {
        Self {
            node: Some(node.clone()),
            msg: msg.into(),
        }
    }

    /// Create an error with no associated expression.
    pub fn msg(msg: impl Into<String>) -> Self {
        Self {
            node: None,
            msg: msg.into(),
        }
    }

    /// Create an internal-invariant error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::msg(format!("internal error: {}", msg.into()))
    }

    /// Create an error wrapping a codec failure.
    pub fn codec(err: impl std::fmt::Display) -> Self {
        Self::msg(format!("codec error: {err}"))
    }

    /// Write a plaintext rendering of the error, including the associated
    /// expression when present.
    pub fn write_to(&self, dst: &mut dyn io::Write) -> io::Result<()> {
        match &self.node {
            Some(node) => writeln!(dst, "in expression:\n\t{}\n{}", node, self.msg),
            None => writeln!(dst, "{}", self.msg),
        }
    }
}
