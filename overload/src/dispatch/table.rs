//! Dispatch tables: registration, resolution and the call protocol.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::config::DispatchConfig;
use crate::graph::{TypeHierarchy, TypeKey};

use super::cache::{Resolution, ResolutionCache};
use super::ranker::specificity_score;
use super::result::{AmbiguityError, Diagnostic, Diagnostics, DispatchError, DispatchResult};
use super::types::{render_types, CachePolicy, Candidate, Implementation, Signature, Typed};

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`DispatchTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(u64);

impl TableId {
    fn fresh() -> Self {
        Self(NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

struct TableState<A, O> {
    /// Candidates by arity, each bucket in registration order.
    buckets: IndexMap<usize, Vec<Candidate<A, O>>>,
    generic: Option<Implementation<A, O>>,
    /// Tables whose candidates have already been merged in.
    merged: FxHashSet<TableId>,
}

/// All implementations registered under one operation name.
///
/// Lock order is always state, then cache. Resolution holds the state read
/// lock while it writes the cache, and registration holds the state write
/// lock while it invalidates, so a cached entry can never outlive the
/// registration state it was computed from. Implementations are invoked with
/// no lock held.
pub struct DispatchTable<A, O> {
    id: TableId,
    name: String,
    config: DispatchConfig,
    state: RwLock<TableState<A, O>>,
    cache: ResolutionCache<A, O>,
}

impl<A, O> DispatchTable<A, O> {
    pub fn new(name: impl Into<String>, config: DispatchConfig) -> Self {
        Self {
            id: TableId::fresh(),
            name: name.into(),
            config,
            state: RwLock::new(TableState {
                buckets: IndexMap::new(),
                generic: None,
                merged: FxHashSet::default(),
            }),
            cache: ResolutionCache::new(),
        }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    /// The operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResolutionCache<A, O> {
        &self.cache
    }

    /// The generic implementation, if any.
    pub fn generic(&self) -> Option<Implementation<A, O>> {
        self.state.read().generic.clone()
    }

    /// Every candidate, grouped by arity in the order arities were first seen.
    pub fn candidates(&self) -> Vec<Candidate<A, O>> {
        self.state.read().buckets.values().flatten().cloned().collect()
    }

    pub fn candidate_count(&self) -> usize {
        self.state.read().buckets.values().map(Vec::len).sum()
    }

    /// Register `implementation` for `signature`.
    ///
    /// An identical signature already present produces a
    /// [`Diagnostic::DuplicateSignature`]; the incoming implementation only
    /// replaces the existing one when `override_existing` is set. Registering
    /// the very same implementation again is a no-op.
    pub fn register_candidate(
        &self,
        implementation: Implementation<A, O>,
        signature: Signature,
        override_existing: bool,
    ) -> Diagnostics {
        let arity = signature.arity();
        let mut diagnostics = Diagnostics::new();
        let mut state = self.state.write();
        let bucket = state.buckets.entry(arity).or_default();

        match bucket.iter().position(|candidate| candidate.signature == signature) {
            Some(index) => {
                let existing = &bucket[index].implementation;
                if existing.same_as(&implementation) {
                    return diagnostics;
                }
                diagnostics.push(Diagnostic::DuplicateSignature {
                    operation: self.name.clone(),
                    signature: signature.clone(),
                    existing: existing.to_string(),
                    incoming: implementation.to_string(),
                    applied: override_existing,
                });
                if !override_existing {
                    drop(state);
                    self.report(&diagnostics);
                    return diagnostics;
                }
                bucket[index] = Candidate::new(implementation, signature);
            }
            None => bucket.push(Candidate::new(implementation, signature)),
        }

        let dropped = self.cache.invalidate_arity(arity);
        if dropped > 0 {
            debug!(operation = %self.name, arity, dropped, "invalidated cached resolutions");
        }
        drop(state);

        self.report(&diagnostics);
        diagnostics
    }

    /// Register the generic implementation used when no candidate matches.
    ///
    /// An existing generic produces a [`Diagnostic::GenericOverridden`] and is
    /// only replaced when `override_existing` is set.
    pub fn register_generic(&self, implementation: Implementation<A, O>, override_existing: bool) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        let mut state = self.state.write();

        if let Some(existing) = &state.generic {
            if existing.same_as(&implementation) {
                return diagnostics;
            }
            diagnostics.push(Diagnostic::GenericOverridden {
                operation: self.name.clone(),
                existing: existing.to_string(),
                incoming: implementation.to_string(),
                applied: override_existing,
            });
            if !override_existing {
                drop(state);
                self.report(&diagnostics);
                return diagnostics;
            }
        }

        state.generic = Some(implementation);
        self.cache.invalidate_generic();
        drop(state);

        self.report(&diagnostics);
        diagnostics
    }

    /// Copy every candidate of `other` into this table without overriding.
    ///
    /// Merging a table into itself, or merging the same table twice, does
    /// nothing. The generic implementation of `other` is not merged.
    ///
    /// `other` is marked as merged before its candidates are copied, so of
    /// several concurrent merges of the same table exactly one copies.
    pub fn merge_from(&self, other: &DispatchTable<A, O>) -> Diagnostics {
        if other.id == self.id || !self.state.write().merged.insert(other.id) {
            return Diagnostics::new();
        }

        let incoming = other.candidates();
        let mut diagnostics = Diagnostics::new();
        for candidate in incoming {
            diagnostics.extend(self.register_candidate(candidate.implementation, candidate.signature, false));
        }

        debug!(
            operation = %self.name,
            from = other.id.0,
            into = self.id.0,
            conflicts = diagnostics.len(),
            "merged dispatch table"
        );
        diagnostics
    }

    /// Resolve the most specific candidate for `arg_types`.
    ///
    /// Returns `Ok(None)` when nothing applies and an [`AmbiguityError`] when
    /// the lowest specificity score is shared. Resolved candidates are cached
    /// unless `policy` is [`CachePolicy::Bypass`].
    pub fn resolve<H: TypeHierarchy + ?Sized>(
        &self,
        graph: &H,
        arg_types: &[TypeKey],
        policy: CachePolicy,
    ) -> Result<Option<Implementation<A, O>>, AmbiguityError<A, O>> {
        let state = self.state.read();
        let resolved = resolve_in(&*state, graph, arg_types)?;

        if let Some(implementation) = &resolved {
            if policy == CachePolicy::Store {
                self.store(arg_types, Resolution::Specific(implementation.clone()));
            }
        }
        Ok(resolved)
    }

    /// Non-dispatching lookup of the implementation `signature` resolves to.
    ///
    /// `None` when nothing applies or when the lookup is ambiguous. Never
    /// touches the cache.
    pub fn lookup_by_signature<H: TypeHierarchy + ?Sized>(
        &self,
        graph: &H,
        signature: &Signature,
    ) -> Option<Implementation<A, O>> {
        self.resolve(graph, signature.types(), CachePolicy::Bypass)
            .ok()
            .flatten()
    }

    /// Dispatch a call on the runtime types of `args`.
    ///
    /// The receiver, when present, is passed through to the implementation
    /// and takes no part in dispatch.
    pub fn call<H: TypeHierarchy + ?Sized>(&self, graph: &H, receiver: Option<&A>, args: &[A]) -> DispatchResult<O>
    where
        A: Typed,
    {
        let arg_types: Vec<TypeKey> = args.iter().map(Typed::type_key).collect();

        let resolution = match self.cache.get(&arg_types) {
            Some(hit) => hit,
            None => self.resolve_call(graph, &arg_types)?,
        };

        let implementation = match resolution {
            Resolution::Specific(implementation) => implementation,
            Resolution::Generic => match self.generic() {
                Some(generic) => generic,
                None => return Err(self.cannot_resolve(&self.state.read(), graph, &arg_types)),
            },
        };
        Ok(implementation.invoke(receiver, args))
    }

    /// Cache miss path of [`call`](Self::call): resolve, fall back to the
    /// generic implementation, and remember the outcome.
    fn resolve_call<H: TypeHierarchy + ?Sized>(
        &self,
        graph: &H,
        arg_types: &[TypeKey],
    ) -> DispatchResult<Resolution<A, O>> {
        let state = self.state.read();

        let resolution = match resolve_in(&*state, graph, arg_types) {
            Ok(Some(implementation)) => Resolution::Specific(implementation),
            Ok(None) if state.generic.is_some() => Resolution::Generic,
            Ok(None) => return Err(self.cannot_resolve(&state, graph, arg_types)),
            Err(ambiguity) => {
                debug!(operation = %self.name, score = ambiguity.score, "ambiguous call");
                return Err(ambiguity.into_dispatch_error(&self.name, graph, arg_types));
            }
        };

        debug!(
            operation = %self.name,
            args = %render_types(graph, arg_types),
            resolution = ?resolution,
            "resolved call"
        );
        self.store(arg_types, resolution.clone());
        Ok(resolution)
    }

    fn store(&self, arg_types: &[TypeKey], resolution: Resolution<A, O>) {
        if self.config.cache {
            self.cache.insert(arg_types, resolution);
        }
    }

    fn cannot_resolve<H: TypeHierarchy + ?Sized>(
        &self,
        state: &TableState<A, O>,
        graph: &H,
        arg_types: &[TypeKey],
    ) -> DispatchError {
        DispatchError::CannotResolve {
            operation: self.name.clone(),
            arg_types: arg_types.iter().map(|&ty| graph.type_name(ty).to_string()).collect(),
            candidates: state
                .buckets
                .values()
                .flatten()
                .map(|candidate| candidate.describe(&self.name, graph))
                .collect(),
        }
    }

    fn report(&self, diagnostics: &[Diagnostic]) {
        if self.config.warn_duplicates {
            for diagnostic in diagnostics {
                warn!("{diagnostic}");
            }
        }
    }

    /// Human-readable summary of the table: generic implementation and every
    /// candidate with the location it was registered from.
    pub fn describe<H: TypeHierarchy + ?Sized>(&self, graph: &H) -> String {
        let state = self.state.read();
        let mut out = format!("<dispatch table `{}` #{}>", self.name, self.id.0);

        if let Some(generic) = &state.generic {
            let _ = write!(out, "\ngeneric:\n  {}(?) [{}]", self.name, generic);
        }
        out.push_str("\ncandidates:");
        if state.buckets.values().all(Vec::is_empty) {
            out.push_str(" <none>");
        }
        for candidate in state.buckets.values().flatten() {
            let _ = write!(
                out,
                "\n  {}({}) [{}]",
                self.name,
                candidate.signature.render(graph),
                candidate.implementation
            );
        }
        out
    }
}

/// Resolution proper, over a locked state.
fn resolve_in<A, O, H: TypeHierarchy + ?Sized>(
    state: &TableState<A, O>,
    graph: &H,
    arg_types: &[TypeKey],
) -> Result<Option<Implementation<A, O>>, AmbiguityError<A, O>> {
    let Some(bucket) = state.buckets.get(&arg_types.len()) else {
        return Ok(None);
    };

    // Step 1: Score every candidate; inapplicable ones have no score
    let scored: Vec<(u32, &Candidate<A, O>)> = bucket
        .iter()
        .filter_map(|candidate| {
            specificity_score(graph, arg_types, candidate.signature.types()).map(|score| (score, candidate))
        })
        .collect();

    // Step 2: A single applicable candidate needs no ranking
    match scored.as_slice() {
        [] => return Ok(None),
        [(_, only)] => return Ok(Some(only.implementation.clone())),
        _ => {}
    }

    // Step 3: Lowest score wins, a shared lowest score is ambiguous
    let Some(best) = scored.iter().map(|&(score, _)| score).min() else {
        return Ok(None);
    };
    let mut tied: Vec<&Candidate<A, O>> = scored
        .iter()
        .filter(|&&(score, _)| score == best)
        .map(|&(_, candidate)| candidate)
        .collect();

    if tied.len() == 1 {
        return Ok(tied.pop().map(|candidate| candidate.implementation.clone()));
    }
    Err(AmbiguityError {
        score: best,
        candidates: tied.into_iter().cloned().collect(),
    })
}
