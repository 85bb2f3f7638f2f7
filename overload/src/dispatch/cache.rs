//! Resolution cache.
//!
//! Maps an exact argument-type tuple to the outcome of a previous
//! resolution. Entries are dropped by the owning table whenever a
//! registration could change the outcome for them.

use std::fmt;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::graph::TypeKey;

use super::types::Implementation;

/// A cached resolution outcome.
pub enum Resolution<A, O> {
    /// A specific candidate was selected.
    Specific(Implementation<A, O>),
    /// Nothing matched; the table's generic implementation handles the call.
    Generic,
}

impl<A, O> Clone for Resolution<A, O> {
    fn clone(&self) -> Self {
        match self {
            Self::Specific(implementation) => Self::Specific(implementation.clone()),
            Self::Generic => Self::Generic,
        }
    }
}

impl<A, O> fmt::Debug for Resolution<A, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Specific(implementation) => f.debug_tuple("Specific").field(implementation).finish(),
            Self::Generic => f.write_str("Generic"),
        }
    }
}

/// Argument-type tuple to resolution, behind a read-mostly lock.
pub struct ResolutionCache<A, O> {
    entries: RwLock<FxHashMap<Vec<TypeKey>, Resolution<A, O>>>,
}

impl<A, O> ResolutionCache<A, O> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn get(&self, arg_types: &[TypeKey]) -> Option<Resolution<A, O>> {
        self.entries.read().get(arg_types).cloned()
    }

    pub fn insert(&self, arg_types: &[TypeKey], resolution: Resolution<A, O>) {
        self.entries.write().insert(arg_types.to_vec(), resolution);
    }

    /// Drop every entry for calls with `arity` arguments. Returns how many were dropped.
    pub fn invalidate_arity(&self, arity: usize) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| key.len() != arity);
        before - entries.len()
    }

    /// Drop every entry that resolved to the generic implementation.
    pub fn invalidate_generic(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, resolution| !matches!(resolution, Resolution::Generic));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<A, O> Default for ResolutionCache<A, O> {
    fn default() -> Self {
        Self::new()
    }
}
