//! Core type definitions for dispatch.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use crate::graph::{TypeHierarchy, TypeKey};

/// A value whose runtime type can be named by a [`TypeKey`].
///
/// Call arguments must implement this so the call protocol can compute the
/// argument-type tuple it dispatches on.
pub trait Typed {
    fn type_key(&self) -> TypeKey;
}

impl Typed for TypeKey {
    fn type_key(&self) -> TypeKey {
        *self
    }
}

impl<T: Typed + ?Sized> Typed for Box<T> {
    fn type_key(&self) -> TypeKey {
        (**self).type_key()
    }
}

/// The callable behind an [`Implementation`].
///
/// The first argument is the receiver for method calls, `None` for free
/// functions.
pub type Callable<A, O> = dyn Fn(Option<&A>, &[A]) -> O + Send + Sync;

/// A registered implementation: a shared callable plus the label and source
/// location used to identify it in diagnostics.
pub struct Implementation<A, O> {
    label: Arc<str>,
    location: &'static Location<'static>,
    func: Arc<Callable<A, O>>,
}

impl<A, O> Implementation<A, O> {
    /// Wrap a closure. The caller's source location is recorded.
    #[track_caller]
    pub fn new<F>(label: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(Option<&A>, &[A]) -> O + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            location: Location::caller(),
            func: Arc::new(func),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Where this implementation was created.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Invoke the implementation.
    pub fn invoke(&self, receiver: Option<&A>, args: &[A]) -> O {
        (self.func)(receiver, args)
    }

    /// Whether both handles share the same callable.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl<A, O> Clone for Implementation<A, O> {
    fn clone(&self) -> Self {
        Self {
            label: Arc::clone(&self.label),
            location: self.location,
            func: Arc::clone(&self.func),
        }
    }
}

impl<A, O> fmt::Debug for Implementation<A, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("label", &self.label)
            .field("location", &format_args!("{}", self.location))
            .finish()
    }
}

impl<A, O> fmt::Display for Implementation<A, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.label, self.location.file(), self.location.line())
    }
}

/// The declared parameter types of an implementation, receiver excluded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(Vec<TypeKey>);

impl Signature {
    pub fn new(types: impl IntoIterator<Item = TypeKey>) -> Self {
        Self(types.into_iter().collect())
    }

    /// Number of positional parameters.
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn types(&self) -> &[TypeKey] {
        &self.0
    }

    /// Render the parameter list using type names, e.g. `int, str`.
    pub fn render<H: TypeHierarchy + ?Sized>(&self, graph: &H) -> String {
        render_types(graph, &self.0)
    }
}

impl From<Vec<TypeKey>> for Signature {
    fn from(types: Vec<TypeKey>) -> Self {
        Self(types)
    }
}

impl From<&[TypeKey]> for Signature {
    fn from(types: &[TypeKey]) -> Self {
        Self(types.to_vec())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ty) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{ty}")?;
        }
        Ok(())
    }
}

/// Join type names with `", "`.
pub(crate) fn render_types<H: TypeHierarchy + ?Sized>(graph: &H, types: &[TypeKey]) -> String {
    types
        .iter()
        .map(|&ty| graph.type_name(ty))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One registration: an implementation and the signature it accepts.
pub struct Candidate<A, O> {
    pub implementation: Implementation<A, O>,
    pub signature: Signature,
}

impl<A, O> Candidate<A, O> {
    pub fn new(implementation: Implementation<A, O>, signature: Signature) -> Self {
        Self {
            implementation,
            signature,
        }
    }

    /// Render as `name(int, str) [label]`.
    pub fn describe<H: TypeHierarchy + ?Sized>(&self, operation: &str, graph: &H) -> String {
        format!(
            "{}({}) [{}]",
            operation,
            self.signature.render(graph),
            self.implementation.label()
        )
    }
}

impl<A, O> Clone for Candidate<A, O> {
    fn clone(&self) -> Self {
        Self {
            implementation: self.implementation.clone(),
            signature: self.signature.clone(),
        }
    }
}

impl<A, O> fmt::Debug for Candidate<A, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("implementation", &self.implementation)
            .field("signature", &self.signature)
            .finish()
    }
}

/// Whether a resolution may be written to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Cache successful resolutions.
    #[default]
    Store,
    /// Resolve without touching the cache (introspection and probes).
    Bypass,
}
