//! Call reports, rendered as text or JSON.

use std::fmt;

use serde::Serialize;

/// How a single call went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallOutcome {
    /// A candidate was selected.
    Resolved { label: String },
    /// No candidate applied and the generic implementation ran.
    Generic { label: String },
    /// The operation is a plain member and was called without dispatch.
    Plain { label: String },
    /// The call raised an error.
    Failed { error: String },
}

impl CallOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallReport {
    /// The call as written, e.g. `T2.m(int)`.
    pub call: String,
    #[serde(flatten)]
    pub outcome: CallOutcome,
}

/// Everything a scenario run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Registration and merge diagnostics, rendered with type names.
    pub diagnostics: Vec<String>,
    pub calls: Vec<CallReport>,
}

impl Report {
    pub fn failures(&self) -> usize {
        self.calls.iter().filter(|call| call.outcome.is_failure()).count()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "warning: {}", indent(diagnostic))?;
        }
        for call in &self.calls {
            match &call.outcome {
                CallOutcome::Resolved { label } => writeln!(f, "{} -> {label}", call.call)?,
                CallOutcome::Generic { label } => writeln!(f, "{} -> generic {label}", call.call)?,
                CallOutcome::Plain { label } => writeln!(f, "{} -> plain {label}", call.call)?,
                CallOutcome::Failed { error } => writeln!(f, "{} -> error: {}", call.call, indent(error))?,
            }
        }
        Ok(())
    }
}

/// Indent continuation lines so multi-line messages stay grouped.
fn indent(text: &str) -> String {
    text.replace('\n', "\n    ")
}
