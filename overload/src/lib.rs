//! Runtime multiple dispatch.
//!
//! Several implementations can be registered under one operation name, each
//! with a declared parameter signature. A call selects the single most
//! specific implementation whose signature accepts the runtime types of the
//! arguments, falls back to a generic implementation when nothing matches,
//! and reports ambiguity instead of guessing.
//!
//! # Overview
//!
//! - [`graph`] - Type tokens and the inheritance graph they live in
//! - [`dispatch`] - Dispatch tables: registration, resolution, caching, calls
//! - [`namespace`] - Named scopes holding plain and dispatch-enabled members
//! - [`hierarchy`] - Per-type namespaces and the merge performed when a type is finalized
//! - [`config`] - Runtime configuration
//!
//! # Example
//!
//! ```
//! use overload::{Implementation, Namespace, Signature, TypeGraph, TypeKey};
//!
//! let mut graph = TypeGraph::new();
//! let object = graph.define("object", &[]).unwrap();
//! let int = graph.define("int", &[object]).unwrap();
//! let boolean = graph.define("bool", &[int]).unwrap();
//!
//! let ns: Namespace<TypeKey, &'static str> = Namespace::new();
//! ns.register("describe", Implementation::new("describe_int", |_, _| "int"), Signature::new([int]), false);
//! ns.register("describe", Implementation::new("describe_bool", |_, _| "bool"), Signature::new([boolean]), false);
//!
//! assert_eq!(ns.call(&graph, "describe", None, &[int]).unwrap(), "int");
//! assert_eq!(ns.call(&graph, "describe", None, &[boolean]).unwrap(), "bool");
//! ```

pub mod config;
pub mod dispatch;
pub mod graph;
pub mod hierarchy;
pub mod namespace;

pub use config::{ConfigError, DispatchConfig};
pub use dispatch::{
    distance, is_subtype, specificity_score, AmbiguityError, CachePolicy, Candidate,
    Diagnostic, Diagnostics, DispatchError, DispatchResult, DispatchTable, Implementation,
    Resolution, ResolutionCache, Signature, TableId, Typed,
};
pub use graph::{GraphError, TypeGraph, TypeHierarchy, TypeKey};
pub use hierarchy::{ClassRegistry, FinalizeHook};
pub use namespace::{Member, Namespace};
