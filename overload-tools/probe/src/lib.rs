//! Overload Probe
//!
//! Runs dispatch scenarios against the overload runtime. A scenario is a TOML
//! file declaring a type graph, free operations, methods per type and a list
//! of calls:
//!
//! ```toml
//! [[types]]
//! name = "object"
//!
//! [[types]]
//! name = "int"
//! parents = ["object"]
//!
//! [[operations]]
//! name = "show"
//! generic = "show_any"
//! candidates = [{ label = "show_int", signature = ["int"] }]
//!
//! [[calls]]
//! operation = "show"
//! args = ["int"]
//! ```
//!
//! [`Scenario::build`] registers everything and finalizes every type in
//! definition order; [`Session::run`] performs the calls and collects a
//! [`Report`].

pub mod report;
pub mod scenario;

pub use report::{CallOutcome, CallReport, Report};
pub use scenario::{
    CallDecl, CandidateDecl, ClassDecl, OperationDecl, Scenario, ScenarioError, Session, TypeDecl,
};
