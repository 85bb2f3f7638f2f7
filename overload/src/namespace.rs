//! Named scopes of operations.
//!
//! A [`Namespace`] is the registry that registration and calls go through.
//! It replaces implicit scope lookup: callers hold the namespace and name the
//! operation explicitly. A name is bound either to a plain implementation or
//! to a dispatch table.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::DispatchConfig;
use crate::dispatch::{
    Diagnostics, DispatchError, DispatchResult, DispatchTable, Implementation, Signature, Typed,
};
use crate::graph::TypeHierarchy;

/// What a name is bound to.
pub enum Member<A, O> {
    /// A single implementation, called without dispatch.
    Plain(Implementation<A, O>),
    /// A dispatch-enabled operation.
    Dispatch(Arc<DispatchTable<A, O>>),
}

impl<A, O> Clone for Member<A, O> {
    fn clone(&self) -> Self {
        match self {
            Self::Plain(implementation) => Self::Plain(implementation.clone()),
            Self::Dispatch(table) => Self::Dispatch(Arc::clone(table)),
        }
    }
}

impl<A, O> Member<A, O> {
    pub fn is_dispatch(&self) -> bool {
        matches!(self, Self::Dispatch(_))
    }
}

/// A scope of named operations.
pub struct Namespace<A, O> {
    config: DispatchConfig,
    members: RwLock<IndexMap<String, Member<A, O>>>,
}

impl<A, O> Default for Namespace<A, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, O> Namespace<A, O> {
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default())
    }

    /// Create a namespace whose tables use `config`.
    pub fn with_config(config: DispatchConfig) -> Self {
        Self {
            config,
            members: RwLock::new(IndexMap::new()),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Bind `name` to a plain implementation, replacing any previous binding.
    ///
    /// A later [`register`](Self::register) under the same name turns the
    /// plain implementation into the generic fallback of a new table.
    pub fn define(&self, name: &str, implementation: Implementation<A, O>) {
        let previous = self
            .members
            .write()
            .insert(name.to_string(), Member::Plain(implementation));
        if previous.is_some() {
            debug!(name, "rebound namespace member");
        }
    }

    /// Bind `name` to an existing member, sharing its table when it has one.
    pub fn bind(&self, name: &str, member: Member<A, O>) {
        self.members.write().insert(name.to_string(), member);
    }

    /// Register a candidate for the operation `name`, creating the table on first use.
    pub fn register(
        &self,
        name: &str,
        implementation: Implementation<A, O>,
        signature: Signature,
        override_existing: bool,
    ) -> Diagnostics {
        self.table_or_create(name)
            .register_candidate(implementation, signature, override_existing)
    }

    /// Register the generic fallback of the operation `name`, creating the table on first use.
    pub fn register_fallback(
        &self,
        name: &str,
        implementation: Implementation<A, O>,
        override_existing: bool,
    ) -> Diagnostics {
        self.table_or_create(name)
            .register_generic(implementation, override_existing)
    }

    /// Attach a candidate to the existing operation `name`.
    ///
    /// Unlike [`register`](Self::register) this never creates an operation:
    /// `name` must already be dispatch-enabled. A duplicate signature is
    /// overridden.
    pub fn register_when(
        &self,
        name: &str,
        implementation: Implementation<A, O>,
        signature: Signature,
    ) -> DispatchResult<Diagnostics> {
        let table = self.dispatch_table(name)?;
        Ok(table.register_candidate(implementation, signature, true))
    }

    /// Call the operation `name`.
    pub fn call<H: TypeHierarchy + ?Sized>(
        &self,
        graph: &H,
        name: &str,
        receiver: Option<&A>,
        args: &[A],
    ) -> DispatchResult<O>
    where
        A: Typed,
    {
        match self.member(name) {
            Some(Member::Plain(implementation)) => Ok(implementation.invoke(receiver, args)),
            Some(Member::Dispatch(table)) => table.call(graph, receiver, args),
            None => Err(DispatchError::UnknownOperation {
                name: name.to_string(),
            }),
        }
    }

    /// The implementation a call with exactly `signature` would resolve to.
    ///
    /// `Ok(None)` when nothing applies or the resolution is ambiguous.
    /// Errors when `name` is missing or not dispatch-enabled.
    pub fn lookup_by_signature<H: TypeHierarchy + ?Sized>(
        &self,
        graph: &H,
        name: &str,
        signature: &Signature,
    ) -> DispatchResult<Option<Implementation<A, O>>> {
        Ok(self.dispatch_table(name)?.lookup_by_signature(graph, signature))
    }

    pub fn is_overloaded(&self, name: &str) -> bool {
        self.members
            .read()
            .get(name)
            .is_some_and(Member::is_dispatch)
    }

    pub fn member(&self, name: &str) -> Option<Member<A, O>> {
        self.members.read().get(name).cloned()
    }

    /// The dispatch table bound to `name`, if `name` is dispatch-enabled.
    pub fn table(&self, name: &str) -> Option<Arc<DispatchTable<A, O>>> {
        match self.member(name)? {
            Member::Dispatch(table) => Some(table),
            Member::Plain(_) => None,
        }
    }

    /// Every bound name in binding order.
    pub fn names(&self) -> Vec<String> {
        self.members.read().keys().cloned().collect()
    }

    fn dispatch_table(&self, name: &str) -> DispatchResult<Arc<DispatchTable<A, O>>> {
        match self.member(name) {
            Some(Member::Dispatch(table)) => Ok(table),
            Some(Member::Plain(_)) => Err(DispatchError::NotDispatchEnabled {
                name: name.to_string(),
            }),
            None => Err(DispatchError::UnknownOperation {
                name: name.to_string(),
            }),
        }
    }

    /// The table bound to `name`, creating it if needed. A plain member
    /// becomes the generic implementation of the new table.
    fn table_or_create(&self, name: &str) -> Arc<DispatchTable<A, O>> {
        let mut members = self.members.write();
        let promoted = match members.get(name) {
            Some(Member::Dispatch(table)) => return Arc::clone(table),
            Some(Member::Plain(implementation)) => Some(implementation.clone()),
            None => None,
        };

        let table = Arc::new(DispatchTable::new(name, self.config));
        if let Some(generic) = promoted {
            debug!(name, generic = generic.label(), "promoted plain member to generic");
            table.register_generic(generic, false);
        }
        members.insert(name.to_string(), Member::Dispatch(Arc::clone(&table)));
        table
    }
}
