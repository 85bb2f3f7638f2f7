//! Multiple dispatch resolution.
//!
//! This module implements the algorithm that selects which implementation
//! to call based on the runtime types of all positional arguments.
//!
//! # Algorithm Overview
//!
//! 1. **Collect candidates**: Take the bucket of candidates with matching arity
//! 2. **Filter applicable**: Keep candidates where each argument type is a subtype of the parameter type
//! 3. **Rank by specificity**: Sum the inheritance distances per position; lower is more specific
//! 4. **Select best**: Choose the unique lowest score, or report ambiguity on a tie
//! 5. **Fall back**: With no applicable candidate, use the generic implementation if there is one
//!
//! # Module Structure
//!
//! - [`types`] - Core type definitions (Implementation, Signature, Candidate)
//! - [`ranker`] - Inheritance distance and specificity scores
//! - [`cache`] - Per-table resolution cache
//! - [`result`] - Dispatch errors and registration diagnostics
//! - [`table`] - Dispatch tables: registration, resolution, calls

mod cache;
mod ranker;
mod result;
mod table;
mod types;

#[cfg(test)]
mod tests;

pub use types::{Callable, CachePolicy, Candidate, Implementation, Signature, Typed};

pub use ranker::{distance, is_subtype, specificity_score};

pub use cache::{Resolution, ResolutionCache};

pub use result::{AmbiguityError, Diagnostic, Diagnostics, DispatchError, DispatchResult};

pub use table::{DispatchTable, TableId};
