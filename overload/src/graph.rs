//! Type tokens and the inheritance graph.
//!
//! Dispatch never inspects host types directly. Every type that can appear
//! in a signature or as the runtime type of an argument is represented by a
//! [`TypeKey`], and inheritance is answered by a [`TypeHierarchy`].
//!
//! [`TypeGraph`] is the bundled hierarchy. A type can only be defined after
//! all of its parents, so the graph is acyclic by construction.

use std::fmt;

use rustc_hash::FxHashMap;
use thiserror::Error;

/// A stable identity token for one type in a hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(u32);

impl TypeKey {
    /// Create a key from a raw index.
    ///
    /// Hosts implementing [`TypeHierarchy`] themselves use this to mint keys.
    pub const fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// The raw index of this key.
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read-only view of an inheritance graph.
pub trait TypeHierarchy {
    /// Immediate parents of `ty`, in declaration order.
    fn parents(&self, ty: TypeKey) -> &[TypeKey];

    /// Human-readable name of `ty`, used in diagnostics.
    fn type_name(&self, ty: TypeKey) -> &str;

    /// Whether `ty` belongs to this hierarchy.
    fn contains(&self, ty: TypeKey) -> bool;

    /// Whether `sub` is `sup` or one of its (transitive) descendants.
    fn is_subtype(&self, sub: TypeKey, sup: TypeKey) -> bool {
        crate::dispatch::distance(self, sub, sup).is_some()
    }
}

/// Errors raised while building a [`TypeGraph`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("type `{0}` is already defined")]
    DuplicateType(String),

    #[error("type `{name}` names unknown parent {parent}")]
    UnknownParent { name: String, parent: TypeKey },
}

#[derive(Debug, Clone)]
struct TypeNode {
    name: String,
    parents: Vec<TypeKey>,
}

/// An append-only inheritance graph.
#[derive(Debug, Clone, Default)]
pub struct TypeGraph {
    nodes: Vec<TypeNode>,
    by_name: FxHashMap<String, TypeKey>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a new type with the given immediate parents.
    ///
    /// Parents must already be defined; an empty slice defines a root.
    pub fn define(&mut self, name: &str, parents: &[TypeKey]) -> Result<TypeKey, GraphError> {
        if self.by_name.contains_key(name) {
            return Err(GraphError::DuplicateType(name.to_string()));
        }
        if let Some(&parent) = parents.iter().find(|&&p| !self.contains(p)) {
            return Err(GraphError::UnknownParent {
                name: name.to_string(),
                parent,
            });
        }

        let key = TypeKey(self.nodes.len() as u32);
        self.nodes.push(TypeNode {
            name: name.to_string(),
            parents: parents.to_vec(),
        });
        self.by_name.insert(name.to_string(), key);
        Ok(key)
    }

    /// Look up a type by name.
    pub fn lookup(&self, name: &str) -> Option<TypeKey> {
        self.by_name.get(name).copied()
    }

    /// Number of defined types.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over every defined type in definition order.
    pub fn keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        (0..self.nodes.len() as u32).map(TypeKey)
    }
}

impl TypeHierarchy for TypeGraph {
    fn parents(&self, ty: TypeKey) -> &[TypeKey] {
        self.nodes
            .get(ty.0 as usize)
            .map(|node| node.parents.as_slice())
            .unwrap_or(&[])
    }

    fn type_name(&self, ty: TypeKey) -> &str {
        self.nodes
            .get(ty.0 as usize)
            .map(|node| node.name.as_str())
            .unwrap_or("<unknown>")
    }

    fn contains(&self, ty: TypeKey) -> bool {
        (ty.0 as usize) < self.nodes.len()
    }
}
