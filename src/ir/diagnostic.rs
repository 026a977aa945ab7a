use std::fmt;

use super::node::{NodeId, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

/// Non-fatal issue found while parsing or resolving a state file.
///
/// `node` is the nearest enclosing tree node; parsing always continues past
/// the offending fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    pub range: Range,
    pub severity: Severity,
    pub message: String,
    pub node: NodeId,
}

impl ParseDiagnostic {
    pub fn error(node: NodeId, range: Range, message: impl Into<String>) -> Self {
        Self { range, severity: Severity::Error, message: message.into(), node }
    }

    pub fn warning(node: NodeId, range: Range, message: impl Into<String>) -> Self {
        Self { range, severity: Severity::Warning, message: message.into(), node }
    }
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{} at {}: {}", level, self.range, self.message)
    }
}
