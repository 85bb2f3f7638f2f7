//! Dispatch errors and registration diagnostics.

use std::fmt;

use thiserror::Error;

use crate::graph::{TypeHierarchy, TypeKey};

use super::types::{render_types, Candidate, Signature};

/// Errors raised by dispatch and by misuse of a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No candidate accepts the argument types and there is no generic implementation.
    #[error(
        "cannot resolve `{operation}` for argument types ({})\ncandidates:{}",
        .arg_types.join(", "),
        bullet_list(.candidates)
    )]
    CannotResolve {
        operation: String,
        arg_types: Vec<String>,
        candidates: Vec<String>,
    },

    /// Several candidates tie for the lowest specificity score.
    #[error(
        "call to `{operation}` with argument types ({}) is ambiguous\ncandidates:{}",
        .arg_types.join(", "),
        bullet_list(.candidates)
    )]
    Ambiguous {
        operation: String,
        arg_types: Vec<String>,
        candidates: Vec<String>,
    },

    #[error("`{name}` is not dispatch-enabled")]
    NotDispatchEnabled { name: String },

    #[error("`{name}` is not defined in this namespace")]
    UnknownOperation { name: String },

    #[error("type {key} is not part of the type graph")]
    UnknownType { key: TypeKey },
}

/// Dispatch result type.
pub type DispatchResult<T> = Result<T, DispatchError>;

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return " <none>".to_string();
    }
    items.iter().map(|item| format!("\n  {item}")).collect()
}

/// Raised by resolution when the lowest specificity score is shared.
pub struct AmbiguityError<A, O> {
    /// The shared lowest score.
    pub score: u32,
    /// Every candidate with that score, in registration order.
    pub candidates: Vec<Candidate<A, O>>,
}

impl<A, O> AmbiguityError<A, O> {
    /// Turn into the call-time error, naming the argument types and tied candidates.
    pub fn into_dispatch_error<H: TypeHierarchy + ?Sized>(
        self,
        operation: &str,
        graph: &H,
        arg_types: &[TypeKey],
    ) -> DispatchError {
        DispatchError::Ambiguous {
            operation: operation.to_string(),
            arg_types: arg_types.iter().map(|&ty| graph.type_name(ty).to_string()).collect(),
            candidates: self
                .candidates
                .iter()
                .map(|candidate| candidate.describe(operation, graph))
                .collect(),
        }
    }
}

impl<A, O> fmt::Debug for AmbiguityError<A, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmbiguityError")
            .field("score", &self.score)
            .field("candidates", &self.candidates)
            .finish()
    }
}

/// An advisory produced by registration. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A candidate with an identical signature was already registered.
    DuplicateSignature {
        operation: String,
        signature: Signature,
        existing: String,
        incoming: String,
        /// Whether the incoming implementation replaced the existing one.
        applied: bool,
    },
    /// A generic implementation was already registered.
    GenericOverridden {
        operation: String,
        existing: String,
        incoming: String,
        applied: bool,
    },
}

/// Diagnostics returned by a registration call.
pub type Diagnostics = Vec<Diagnostic>;

impl Diagnostic {
    pub fn operation(&self) -> &str {
        match self {
            Self::DuplicateSignature { operation, .. } | Self::GenericOverridden { operation, .. } => {
                operation
            }
        }
    }

    /// Whether the registration that produced this diagnostic took effect.
    pub fn applied(&self) -> bool {
        match self {
            Self::DuplicateSignature { applied, .. } | Self::GenericOverridden { applied, .. } => *applied,
        }
    }

    /// Like `Display`, with type names taken from `graph`.
    pub fn render<H: TypeHierarchy + ?Sized>(&self, graph: &H) -> String {
        match self {
            Self::DuplicateSignature { signature, .. } => {
                self.render_with(&render_types(graph, signature.types()))
            }
            Self::GenericOverridden { .. } => self.to_string(),
        }
    }

    fn render_with(&self, params: &str) -> String {
        match self {
            Self::DuplicateSignature {
                operation,
                existing,
                incoming,
                applied,
                ..
            } => format!(
                "found implementations of `{operation}({params})` with equal signatures:\n  {existing}\n  {incoming}\n{}",
                if *applied {
                    "the later registration replaced the earlier one"
                } else {
                    "the later registration was discarded"
                }
            ),
            Self::GenericOverridden {
                operation,
                existing,
                incoming,
                applied,
            } => format!(
                "generic implementation of `{operation}` overridden:\n  {existing}\n  {incoming}\n{}",
                if *applied {
                    "the later registration replaced the earlier one"
                } else {
                    "the later registration was discarded"
                }
            ),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateSignature { signature, .. } => {
                f.write_str(&self.render_with(&signature.to_string()))
            }
            Self::GenericOverridden { .. } => f.write_str(&self.render_with("")),
        }
    }
}
