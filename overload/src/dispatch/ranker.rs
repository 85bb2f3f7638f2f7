//! Specificity ranking.
//!
//! The distance between an argument type and a parameter type is the number
//! of inheritance edges on the shortest path from the argument type up to the
//! parameter type. Under multiple inheritance every parent is explored and
//! the shortest path wins; no linearized resolution order is involved.
//! Each type is visited at most once per query, so the cost is linear in the
//! size of the graph however many inheritance paths it contains.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::graph::{TypeHierarchy, TypeKey};

/// Inheritance distance from `from` up to `to`.
///
/// Returns `Some(0)` when the types are identical and `None` when `to` is not
/// an ancestor of `from`. The walk is breadth-first over parents and visits
/// each type at most once, so the first time `to` is reached is along a
/// shortest path.
pub fn distance<H: TypeHierarchy + ?Sized>(graph: &H, from: TypeKey, to: TypeKey) -> Option<u32> {
    if from == to {
        return Some(0);
    }

    let mut visited: FxHashSet<TypeKey> = FxHashSet::default();
    visited.insert(from);
    let mut queue = VecDeque::from([(from, 0u32)]);

    while let Some((ty, steps)) = queue.pop_front() {
        for &parent in graph.parents(ty) {
            if parent == to {
                return Some(steps + 1);
            }
            if visited.insert(parent) {
                queue.push_back((parent, steps + 1));
            }
        }
    }
    None
}

/// Whether `sub` is `sup` or inherits from it.
pub fn is_subtype<H: TypeHierarchy + ?Sized>(graph: &H, sub: TypeKey, sup: TypeKey) -> bool {
    distance(graph, sub, sup).is_some()
}

/// Sum of per-position distances between argument and parameter types.
///
/// Lower is more specific. Returns `None` if the arities differ or any
/// position is not applicable.
pub fn specificity_score<H: TypeHierarchy + ?Sized>(
    graph: &H,
    arg_types: &[TypeKey],
    param_types: &[TypeKey],
) -> Option<u32> {
    if arg_types.len() != param_types.len() {
        return None;
    }

    let score = arg_types
        .iter()
        .zip(param_types)
        .map(|(&arg, &param)| distance(graph, arg, param))
        .sum::<Option<u32>>();
    trace!(?arg_types, ?param_types, ?score, "specificity score");
    score
}
