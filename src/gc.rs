//! Mark-sweep garbage collection for the pack
//!
//! Finds pack records that no stored delta in the revision tree refers to
//! (payloads of abandoned or reset revisions) and removes them.
//!
//! Author: Moroya Sakamoto

use std::collections::HashSet;

use log::info;

use crate::pack::{Pack, PackKey};
use crate::revision::RevisionTree;

// ── GC Result ──────────────────────────────────────────────────────────

/// Statistics from a garbage collection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcResult {
    /// Records still referenced.
    pub retained: usize,
    /// Records removed (or removable, for a dry run).
    pub collected: usize,
    /// Records before the run.
    pub total_before: usize,
}

impl GcResult {
    /// True if any records were collected.
    #[inline]
    pub fn did_collect(&self) -> bool {
        self.collected > 0
    }
}

// ── Mark-Sweep GC ─────────────────────────────────────────────────────

/// Remove every pack record not referenced from `tree`.
///
/// 1. **Mark**: every stored delta of every revision contributes its
///    `(item id, delta id)` key, loaded or flushed.
/// 2. **Sweep**: records outside the marked set are removed.
pub fn collect_garbage(pack: &mut Pack, tree: &RevisionTree) -> GcResult {
    let keys = pack.keys();
    let total_before = keys.len();
    let reachable = mark(tree);

    let mut collected = 0;
    for key in keys {
        if !reachable.contains(&key) {
            pack.remove(key);
            collected += 1;
        }
    }

    info!(
        "event=pack_gc module=gc status=done total={} collected={}",
        total_before, collected
    );
    GcResult {
        retained: total_before - collected,
        collected,
        total_before,
    }
}

fn mark(tree: &RevisionTree) -> HashSet<PackKey> {
    tree.iter()
        .flat_map(|revision| revision.items())
        .flat_map(|item| {
            item.deltas()
                .iter()
                .map(move |d| PackKey::new(item.vcs_id(), d.id()))
        })
        .collect()
}

/// Compute what would be collected without removing anything.
pub fn dry_run(pack: &Pack, tree: &RevisionTree) -> GcResult {
    let reachable = mark(tree);
    let total_before = pack.len();
    let retained = pack.keys().iter().filter(|k| reachable.contains(*k)).count();
    GcResult {
        retained,
        collected: total_before - retained,
        total_before,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
