//! Dispatch across a type hierarchy.
//!
//! Each type that declares methods owns a [`Namespace`]. When the host
//! finishes constructing a type it calls [`FinalizeHook::type_finalized`],
//! and every dispatch-enabled method the type declares absorbs what its
//! immediate parents declare under the same name:
//!
//! - a plain parent method becomes the generic fallback;
//! - a parent dispatch table contributes its candidates and its generic.
//!
//! Nothing merged in ever overrides the type's own registrations. Parents are
//! finalized before their children, so a parent's table already carries
//! everything from further up.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::config::DispatchConfig;
use crate::dispatch::{Diagnostics, DispatchError, DispatchResult, Typed};
use crate::graph::{TypeHierarchy, TypeKey};
use crate::namespace::{Member, Namespace};

/// Called by the host once a type is fully defined.
pub trait FinalizeHook {
    /// Merge the type's parents into its own dispatch tables.
    fn type_finalized(&self, graph: &dyn TypeHierarchy, ty: TypeKey) -> DispatchResult<Diagnostics>;
}

/// Per-type namespaces of methods.
pub struct ClassRegistry<A, O> {
    config: DispatchConfig,
    classes: RwLock<FxHashMap<TypeKey, Arc<Namespace<A, O>>>>,
}

impl<A, O> Default for ClassRegistry<A, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, O> ClassRegistry<A, O> {
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default())
    }

    pub fn with_config(config: DispatchConfig) -> Self {
        Self {
            config,
            classes: RwLock::new(FxHashMap::default()),
        }
    }

    /// The namespace of methods declared by `ty`, created on first use.
    pub fn namespace(&self, ty: TypeKey) -> Arc<Namespace<A, O>> {
        let mut classes = self.classes.write();
        Arc::clone(
            classes
                .entry(ty)
                .or_insert_with(|| Arc::new(Namespace::with_config(self.config))),
        )
    }

    /// The namespace of `ty`, if it declares anything.
    pub fn get(&self, ty: TypeKey) -> Option<Arc<Namespace<A, O>>> {
        self.classes.read().get(&ty).cloned()
    }

    /// The namespace `name` is looked up in for an instance of `ty`.
    ///
    /// That is `ty`'s own namespace when it declares `name`, else the nearest
    /// ancestor's that does. Ancestors are searched breadth-first, parents in
    /// declaration order, so the shortest inheritance path wins.
    pub fn method_namespace<H: TypeHierarchy + ?Sized>(
        &self,
        graph: &H,
        ty: TypeKey,
        name: &str,
    ) -> Option<Arc<Namespace<A, O>>> {
        let mut visited: FxHashSet<TypeKey> = FxHashSet::default();
        visited.insert(ty);
        let mut queue = VecDeque::from([ty]);

        while let Some(current) = queue.pop_front() {
            if let Some(namespace) = self.get(current) {
                if namespace.member(name).is_some() {
                    return Some(namespace);
                }
            }
            for &parent in graph.parents(current) {
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        None
    }

    /// Call the method `name` on an instance of `ty` with `receiver` passed
    /// through. Methods `ty` does not declare are found on its ancestors.
    pub fn call_method<H: TypeHierarchy + ?Sized>(
        &self,
        graph: &H,
        ty: TypeKey,
        name: &str,
        receiver: Option<&A>,
        args: &[A],
    ) -> DispatchResult<O>
    where
        A: Typed,
    {
        match self.method_namespace(graph, ty, name) {
            Some(namespace) => namespace.call(graph, name, receiver, args),
            None => Err(DispatchError::UnknownOperation {
                name: name.to_string(),
            }),
        }
    }
}

impl<A, O> FinalizeHook for ClassRegistry<A, O> {
    fn type_finalized(&self, graph: &dyn TypeHierarchy, ty: TypeKey) -> DispatchResult<Diagnostics> {
        if !graph.contains(ty) {
            return Err(DispatchError::UnknownType { key: ty });
        }
        let Some(own) = self.get(ty) else {
            return Ok(Diagnostics::new());
        };

        let mut diagnostics = Diagnostics::new();
        for name in own.names() {
            let Some(table) = own.table(&name) else {
                continue;
            };

            for &parent in graph.parents(ty) {
                let Some(inherited) = self.get(parent).and_then(|ns| ns.member(&name)) else {
                    continue;
                };

                match inherited {
                    Member::Plain(implementation) => {
                        diagnostics.extend(table.register_generic(implementation, false));
                    }
                    Member::Dispatch(parent_table) if !Arc::ptr_eq(&parent_table, &table) => {
                        diagnostics.extend(table.merge_from(&parent_table));
                        if let Some(generic) = parent_table.generic() {
                            diagnostics.extend(table.register_generic(generic, false));
                        }
                    }
                    Member::Dispatch(_) => {}
                }
            }

            if self.config.trace_merges {
                debug!(
                    ty = graph.type_name(ty),
                    method = %name,
                    "finalized method\n{}",
                    table.describe(graph)
                );
            }
        }

        Ok(diagnostics)
    }
}
