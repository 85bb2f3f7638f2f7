//! Tests for dispatch tables.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use pretty_assertions::assert_eq;

use crate::config::DispatchConfig;
use crate::graph::{TypeGraph, TypeKey};

use super::cache::Resolution;
use super::result::{Diagnostic, DispatchError};
use super::table::DispatchTable;
use super::types::{CachePolicy, Implementation, Signature};

struct Types {
    graph: TypeGraph,
    object: TypeKey,
    int: TypeKey,
    boolean: TypeKey,
    str_ty: TypeKey,
}

fn types() -> Types {
    let mut graph = TypeGraph::new();
    let object = graph.define("object", &[]).unwrap();
    let int = graph.define("int", &[object]).unwrap();
    let boolean = graph.define("bool", &[int]).unwrap();
    let str_ty = graph.define("str", &[object]).unwrap();
    Types {
        graph,
        object,
        int,
        boolean,
        str_ty,
    }
}

fn label(name: &'static str) -> Implementation<TypeKey, &'static str> {
    Implementation::new(name, move |_, _| name)
}

fn table(name: &str) -> DispatchTable<TypeKey, &'static str> {
    DispatchTable::new(name, DispatchConfig::default())
}

fn resolved_label(table: &DispatchTable<TypeKey, &'static str>, graph: &TypeGraph, args: &[TypeKey]) -> Option<String> {
    table
        .resolve(graph, args, CachePolicy::Bypass)
        .unwrap()
        .map(|imp| imp.label().to_string())
}

#[test]
fn test_exact_match() {
    let t = types();
    let f = table("f");
    f.register_candidate(label("f_int"), Signature::new([t.int]), false);
    f.register_candidate(label("f_str"), Signature::new([t.str_ty]), false);

    assert_eq!(f.call(&t.graph, None, &[t.int]).unwrap(), "f_int");
    assert_eq!(f.call(&t.graph, None, &[t.str_ty]).unwrap(), "f_str");
}

#[test]
fn test_subtype_argument_accepted() {
    let t = types();
    let f = table("f");
    f.register_candidate(label("f_int"), Signature::new([t.int]), false);

    assert_eq!(f.call(&t.graph, None, &[t.boolean]).unwrap(), "f_int");
}

#[test]
fn test_most_specific_wins() {
    let t = types();
    let f = table("f");
    f.register_candidate(label("f_object"), Signature::new([t.object]), false);
    f.register_candidate(label("f_int"), Signature::new([t.int]), false);
    f.register_candidate(label("f_bool"), Signature::new([t.boolean]), false);

    assert_eq!(f.call(&t.graph, None, &[t.boolean]).unwrap(), "f_bool");
    assert_eq!(f.call(&t.graph, None, &[t.int]).unwrap(), "f_int");
    assert_eq!(f.call(&t.graph, None, &[t.str_ty]).unwrap(), "f_object");
}

#[test]
fn test_registration_order_does_not_matter() {
    let t = types();
    let f = table("f");
    f.register_candidate(label("f_bool"), Signature::new([t.boolean]), false);
    f.register_candidate(label("f_object"), Signature::new([t.object]), false);

    assert_eq!(resolved_label(&f, &t.graph, &[t.boolean]), Some("f_bool".to_string()));
}

#[test]
fn test_score_sums_over_positions() {
    let t = types();
    let f = table("f");
    // (bool, int) scores 1 + 0 against (int, int) and 2 + 0 against (object, int).
    f.register_candidate(label("object_int"), Signature::new([t.object, t.int]), false);
    f.register_candidate(label("int_int"), Signature::new([t.int, t.int]), false);
    f.register_candidate(label("int_bool"), Signature::new([t.int, t.boolean]), false);

    assert_eq!(resolved_label(&f, &t.graph, &[t.boolean, t.int]), Some("int_int".to_string()));
}

#[test]
fn test_cross_position_tie_is_ambiguous() {
    let t = types();
    let f = table("f");
    f.register_candidate(label("int_bool"), Signature::new([t.int, t.boolean]), false);
    f.register_candidate(label("bool_int"), Signature::new([t.boolean, t.int]), false);

    let err = f.resolve(&t.graph, &[t.boolean, t.boolean], CachePolicy::Store).unwrap_err();
    assert_eq!(err.score, 1);
    assert_eq!(err.candidates.len(), 2);
    assert!(f.cache().is_empty());
}

#[test]
fn test_tie_above_minimum_is_not_ambiguous() {
    let t = types();
    let f = table("f");
    // Two candidates tie at score 2, a third scores 0.
    f.register_candidate(label("object_bool"), Signature::new([t.object, t.boolean]), false);
    f.register_candidate(label("bool_object"), Signature::new([t.boolean, t.object]), false);
    f.register_candidate(label("bool_bool"), Signature::new([t.boolean, t.boolean]), false);

    assert_eq!(resolved_label(&f, &t.graph, &[t.boolean, t.boolean]), Some("bool_bool".to_string()));
}

#[test]
fn test_arity_mismatch() {
    let t = types();
    let f = table("f");
    f.register_candidate(label("f_int_int"), Signature::new([t.int, t.int]), false);

    assert_eq!(resolved_label(&f, &t.graph, &[t.int]), None);
    assert!(matches!(
        f.call(&t.graph, None, &[t.int]),
        Err(DispatchError::CannotResolve { .. })
    ));
}

#[test]
fn test_empty_table_fails() {
    let t = types();
    let f = table("empty");

    match f.call(&t.graph, None, &[t.int]) {
        Err(DispatchError::CannotResolve { operation, candidates, .. }) => {
            assert_eq!(operation, "empty");
            assert!(candidates.is_empty());
        }
        other => panic!("Expected CannotResolve, got {:?}", other),
    }
}

#[test]
fn test_generic_used_when_nothing_matches() {
    let t = types();
    let f = table("f");
    f.register_candidate(label("f_int"), Signature::new([t.int]), false);
    f.register_generic(label("f_any"), false);

    assert_eq!(f.call(&t.graph, None, &[t.str_ty]).unwrap(), "f_any");
    assert_eq!(f.call(&t.graph, None, &[t.int, t.int]).unwrap(), "f_any");
    assert!(matches!(f.cache().get(&[t.str_ty]), Some(Resolution::Generic)));
}

#[test]
fn test_generic_not_used_on_ambiguity() {
    let mut graph = TypeGraph::new();
    let a = graph.define("A", &[]).unwrap();
    let b1 = graph.define("B1", &[a]).unwrap();
    let b2 = graph.define("B2", &[a]).unwrap();
    let d = graph.define("D", &[b1, b2]).unwrap();

    let f = table("f");
    f.register_candidate(label("f_b1"), Signature::new([b1]), false);
    f.register_candidate(label("f_b2"), Signature::new([b2]), false);
    f.register_generic(label("f_any"), false);

    assert!(matches!(f.call(&graph, None, &[d]), Err(DispatchError::Ambiguous { .. })));
}

#[test]
fn test_receiver_is_passed_but_not_dispatched_on() {
    let t = types();
    let f: DispatchTable<TypeKey, Option<TypeKey>> = DispatchTable::new("m", DispatchConfig::default());
    f.register_candidate(
        Implementation::new("m_int", |receiver: Option<&TypeKey>, _: &[TypeKey]| receiver.copied()),
        Signature::new([t.int]),
        false,
    );

    assert_eq!(f.call(&t.graph, Some(&t.str_ty), &[t.int]).unwrap(), Some(t.str_ty));
    assert_eq!(f.call(&t.graph, None, &[t.int]).unwrap(), None);
}

#[test]
fn test_arguments_are_passed_through() {
    let t = types();
    let f: DispatchTable<TypeKey, usize> = DispatchTable::new("count", DispatchConfig::default());
    f.register_candidate(
        Implementation::new("count", |_, args: &[TypeKey]| args.len()),
        Signature::new([t.int, t.str_ty]),
        false,
    );

    assert_eq!(f.call(&t.graph, None, &[t.boolean, t.str_ty]).unwrap(), 2);
}

#[test]
fn test_duplicate_without_override_keeps_first() {
    let t = types();
    let f = table("f");
    assert!(f.register_candidate(label("first"), Signature::new([t.int]), false).is_empty());

    let diagnostics = f.register_candidate(label("second"), Signature::new([t.int]), false);
    assert_eq!(diagnostics.len(), 1);
    match &diagnostics[0] {
        Diagnostic::DuplicateSignature {
            operation,
            signature,
            existing,
            incoming,
            applied,
        } => {
            assert_eq!(operation, "f");
            assert_eq!(signature, &Signature::new([t.int]));
            assert!(existing.starts_with("first ("));
            assert!(incoming.starts_with("second ("));
            assert!(!applied);
        }
        other => panic!("Expected DuplicateSignature, got {:?}", other),
    }

    assert_eq!(f.candidate_count(), 1);
    assert_eq!(f.call(&t.graph, None, &[t.int]).unwrap(), "first");
}

#[test]
fn test_duplicate_with_override_replaces() {
    let t = types();
    let f = table("f");
    f.register_candidate(label("first"), Signature::new([t.int]), false);
    assert_eq!(f.call(&t.graph, None, &[t.int]).unwrap(), "first");

    let diagnostics = f.register_candidate(label("second"), Signature::new([t.int]), true);
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].applied());

    assert_eq!(f.candidate_count(), 1);
    assert_eq!(f.call(&t.graph, None, &[t.int]).unwrap(), "second");
}

#[test]
fn test_same_implementation_twice_is_silent() {
    let t = types();
    let f = table("f");
    let imp = label("f_int");
    f.register_candidate(imp.clone(), Signature::new([t.int]), false);

    assert!(f.register_candidate(imp, Signature::new([t.int]), false).is_empty());
    assert_eq!(f.candidate_count(), 1);
}

#[test]
fn test_generic_override_rules() {
    let t = types();
    let f = table("f");
    assert!(f.register_generic(label("g1"), false).is_empty());

    let diagnostics = f.register_generic(label("g2"), false);
    assert_eq!(diagnostics.len(), 1);
    assert!(matches!(&diagnostics[0], Diagnostic::GenericOverridden { applied: false, .. }));
    assert_eq!(f.call(&t.graph, None, &[t.int]).unwrap(), "g1");

    let diagnostics = f.register_generic(label("g3"), true);
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].applied());
    assert_eq!(f.call(&t.graph, None, &[t.int]).unwrap(), "g3");
}

#[test]
fn test_cache_populated_by_call() {
    let t = types();
    let f = table("f");
    f.register_candidate(label("f_int"), Signature::new([t.int]), false);

    assert!(f.cache().is_empty());
    f.call(&t.graph, None, &[t.boolean]).unwrap();
    assert_eq!(f.cache().len(), 1);
    assert!(matches!(f.cache().get(&[t.boolean]), Some(Resolution::Specific(_))));
}

#[test]
fn test_cache_invalidated_by_new_candidate() {
    let t = types();
    let f = table("f");
    f.register_candidate(label("f_int"), Signature::new([t.int]), false);
    f.register_candidate(label("f_pair"), Signature::new([t.int, t.int]), false);

    assert_eq!(f.call(&t.graph, None, &[t.boolean]).unwrap(), "f_int");
    assert_eq!(f.call(&t.graph, None, &[t.int, t.int]).unwrap(), "f_pair");
    assert_eq!(f.cache().len(), 2);

    f.register_candidate(label("f_bool"), Signature::new([t.boolean]), false);
    assert_eq!(f.cache().len(), 1);
    assert_eq!(f.call(&t.graph, None, &[t.boolean]).unwrap(), "f_bool");
}

#[test]
fn test_cache_invalidated_when_generic_call_gains_candidate() {
    let t = types();
    let f = table("f");
    f.register_generic(label("f_any"), false);
    assert_eq!(f.call(&t.graph, None, &[t.str_ty]).unwrap(), "f_any");

    f.register_candidate(label("f_str"), Signature::new([t.str_ty]), false);
    assert_eq!(f.call(&t.graph, None, &[t.str_ty]).unwrap(), "f_str");
}

#[test]
fn test_cache_disabled_by_config() {
    let t = types();
    let config = DispatchConfig {
        cache: false,
        ..DispatchConfig::default()
    };
    let f: DispatchTable<TypeKey, &'static str> = DispatchTable::new("f", config);
    f.register_candidate(label("f_int"), Signature::new([t.int]), false);
    f.register_generic(label("f_any"), false);

    f.call(&t.graph, None, &[t.int]).unwrap();
    f.call(&t.graph, None, &[t.str_ty]).unwrap();
    assert!(f.cache().is_empty());
}

#[test]
fn test_lookup_by_signature_bypasses_cache() {
    let t = types();
    let f = table("f");
    f.register_candidate(label("f_int"), Signature::new([t.int]), false);

    let found = f.lookup_by_signature(&t.graph, &Signature::new([t.boolean]));
    assert_eq!(found.map(|imp| imp.label().to_string()), Some("f_int".to_string()));
    assert!(f.cache().is_empty());
}

#[test]
fn test_merge_from_keeps_receiving_candidates() {
    let t = types();
    let parent = table("m");
    parent.register_candidate(label("parent_int"), Signature::new([t.int]), false);
    parent.register_candidate(label("parent_str"), Signature::new([t.str_ty]), false);

    let child = table("m");
    child.register_candidate(label("child_int"), Signature::new([t.int]), false);

    let diagnostics = child.merge_from(&parent);
    assert_eq!(diagnostics.len(), 1);
    assert!(!diagnostics[0].applied());
    assert_eq!(child.candidate_count(), 2);
    assert_eq!(child.call(&t.graph, None, &[t.int]).unwrap(), "child_int");
    assert_eq!(child.call(&t.graph, None, &[t.str_ty]).unwrap(), "parent_str");

    // Merging the same table again is a no-op.
    assert!(child.merge_from(&parent).is_empty());
    assert!(child.merge_from(&child).is_empty());
    assert_eq!(child.candidate_count(), 2);
}

#[test]
fn test_cannot_resolve_message() {
    let t = types();
    let f = table("f");
    f.register_candidate(label("f_int"), Signature::new([t.int]), false);
    f.register_candidate(label("f_int_str"), Signature::new([t.int, t.str_ty]), false);

    let err = f.call(&t.graph, None, &[t.str_ty]).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @r"
    cannot resolve `f` for argument types (str)
    candidates:
      f(int) [f_int]
      f(int, str) [f_int_str]
    ");
}

#[test]
fn test_ambiguous_message() {
    let mut graph = TypeGraph::new();
    let a = graph.define("A", &[]).unwrap();
    let b1 = graph.define("B1", &[a]).unwrap();
    let b2 = graph.define("B2", &[a]).unwrap();
    let d = graph.define("D", &[b1, b2]).unwrap();

    let f = table("f");
    f.register_candidate(label("f_b1"), Signature::new([b1]), false);
    f.register_candidate(label("f_b2"), Signature::new([b2]), false);

    let err = f.call(&graph, None, &[d]).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @r"
    call to `f` with argument types (D) is ambiguous
    candidates:
      f(B1) [f_b1]
      f(B2) [f_b2]
    ");
}

#[test]
fn test_describe_lists_generic_and_candidates() {
    let t = types();
    let f = table("f");
    assert!(f.describe(&t.graph).ends_with("candidates: <none>"));

    f.register_generic(label("f_any"), false);
    f.register_candidate(label("f_int"), Signature::new([t.int]), false);

    let report = f.describe(&t.graph);
    assert!(report.starts_with("<dispatch table `f` #"));
    assert!(report.contains("\ngeneric:\n  f(?) [f_any ("));
    assert!(report.contains("\ncandidates:\n  f(int) [f_int ("));
    assert!(report.contains("tests.rs:"));
}

#[test]
fn test_diagnostic_render_uses_type_names() {
    let t = types();
    let f = table("f");
    f.register_candidate(label("first"), Signature::new([t.int, t.str_ty]), false);
    let diagnostics = f.register_candidate(label("second"), Signature::new([t.int, t.str_ty]), false);

    let rendered = diagnostics[0].render(&t.graph);
    assert!(rendered.starts_with("found implementations of `f(int, str)` with equal signatures:"));
    assert!(rendered.ends_with("the later registration was discarded"));
    assert_eq!(diagnostics[0].operation(), "f");
}

/// Counts warnings, reading the table from inside the subscriber.
struct TableReadingSubscriber {
    table: Arc<DispatchTable<TypeKey, &'static str>>,
    warnings: Arc<AtomicUsize>,
}

impl tracing::Subscriber for TableReadingSubscriber {
    fn enabled(&self, _: &tracing::Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
        tracing::span::Id::from_u64(1)
    }

    fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}

    fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}

    fn event(&self, event: &tracing::Event<'_>) {
        if *event.metadata().level() == tracing::Level::WARN {
            // Deadlocks if the table lock is still held while reporting.
            let _ = self.table.candidate_count();
            let _ = self.table.generic();
            self.warnings.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn enter(&self, _: &tracing::span::Id) {}

    fn exit(&self, _: &tracing::span::Id) {}
}

#[test]
fn test_diagnostics_reported_outside_table_lock() {
    let t = types();
    let f = Arc::new(table("f"));
    f.register_candidate(label("first"), Signature::new([t.int]), false);
    f.register_generic(label("g1"), false);

    let warnings = Arc::new(AtomicUsize::new(0));
    let subscriber = TableReadingSubscriber {
        table: Arc::clone(&f),
        warnings: Arc::clone(&warnings),
    };
    tracing::subscriber::with_default(subscriber, || {
        f.register_candidate(label("second"), Signature::new([t.int]), false);
        f.register_candidate(label("third"), Signature::new([t.int]), true);
        f.register_generic(label("g2"), false);
        f.register_generic(label("g3"), true);
    });

    assert_eq!(warnings.load(Ordering::SeqCst), 4);
    assert_eq!(resolved_label(&f, &t.graph, &[t.int]), Some("third".to_string()));
}

#[test]
fn test_concurrent_merges_copy_once() {
    let t = types();
    let parent = Arc::new(table("m"));
    parent.register_candidate(label("parent_object"), Signature::new([t.object]), false);
    parent.register_candidate(label("parent_str"), Signature::new([t.str_ty]), false);

    // The child's own (object) conflicts with the parent's, so every copy
    // that actually runs reports one diagnostic.
    let child = Arc::new(table("m"));
    child.register_candidate(label("child_object"), Signature::new([t.object]), false);

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let parent = Arc::clone(&parent);
            let child = Arc::clone(&child);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                child.merge_from(&parent).len()
            })
        })
        .collect();
    let diagnostics: usize = handles.into_iter().map(|handle| handle.join().unwrap()).sum();

    assert_eq!(diagnostics, 1);
    assert_eq!(child.candidate_count(), 2);
    assert_eq!(resolved_label(&child, &t.graph, &[t.object]), Some("child_object".to_string()));
}

#[test]
fn test_call_through_stacked_diamonds() {
    let mut graph = TypeGraph::new();
    let root = graph.define("Root", &[]).unwrap();
    let unrelated = graph.define("Unrelated", &[]).unwrap();
    let mut top = root;
    for level in 0..30 {
        let left = graph.define(&format!("L{level}"), &[top]).unwrap();
        let right = graph.define(&format!("R{level}"), &[top]).unwrap();
        top = graph.define(&format!("J{level}"), &[left, right]).unwrap();
    }

    let f = table("f");
    f.register_candidate(label("f_unrelated"), Signature::new([unrelated]), false);
    f.register_generic(label("f_any"), false);
    assert_eq!(f.call(&graph, None, &[top]).unwrap(), "f_any");

    f.register_candidate(label("f_root"), Signature::new([root]), false);
    assert_eq!(f.call(&graph, None, &[top]).unwrap(), "f_root");
}
