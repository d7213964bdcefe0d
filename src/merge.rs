//! Merge engine
//!
//! Folds the deltas of `target` (the side being merged in) onto a recorded
//! `initial_state` and re-coalesces the result into a head state with one
//! delta per scalar kind and one delta per collection family.
//!
//! Conflict policy: there is no conflict detection. A scalar present on
//! both sides resolves to target's value. Collection families use id-keyed
//! set rules (union for added, filter for removed, replace for changed)
//! applied in target order, so target's edit wins for an id both sides
//! touched.
//!
//! Kinds unknown to this build are passed through from `initial_state`
//! untouched; unknown kinds that exist only in `target` are dropped.
//!
//! Author: Moroya Sakamoto

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::delta::{
    Delta, DeltaDescription, DeltaEntry, DeltaKind, Family, ScalarKind, SubKind, HEAD_STATE,
};
use crate::diff::Diff;
use crate::events::{empty_collection, merge_by_sub_kind};
use crate::node::SerializedNode;
use crate::tracked::TrackedItem;

/// One output position; families are filled in after the scan
enum Slot {
    Ready(DeltaEntry),
    Family(Family),
}

/// Index of every delta in an item, grouped for lookup
struct DeltaIndex {
    /// Last index per scalar kind
    scalars: HashMap<ScalarKind, usize>,
    /// Indices per family, in order
    families: HashMap<Family, Vec<usize>>,
}

impl DeltaIndex {
    fn build(item: &dyn TrackedItem) -> Self {
        let mut scalars = HashMap::new();
        let mut families: HashMap<Family, Vec<usize>> = HashMap::new();
        for i in 0..item.num_deltas() {
            match item.delta_at(i).map(Delta::kind) {
                Some(DeltaKind::Scalar(k)) => {
                    scalars.insert(*k, i);
                }
                Some(DeltaKind::Collection(f, _)) => families.entry(*f).or_default().push(i),
                _ => {}
            }
        }
        Self { scalars, families }
    }
}

fn entry_at(item: &dyn TrackedItem, index: usize) -> Option<DeltaEntry> {
    let delta = item.delta_at(index)?.clone();
    let data = item.data_for_delta(index)?.clone();
    Some(DeltaEntry::new(delta, data))
}

/// Fold the family's deltas of `item` (at `indices`) onto `acc`
fn fold_family(
    family: Family,
    mut acc: SerializedNode,
    item: &dyn TrackedItem,
    indices: &[usize],
) -> SerializedNode {
    for &i in indices {
        let (Some(delta), Some(data)) = (item.delta_at(i), item.data_for_delta(i)) else {
            continue;
        };
        if let DeltaKind::Collection(_, sub) = delta.kind() {
            acc = merge_by_sub_kind(family, *sub, &acc, data);
        }
    }
    acc
}

fn head_state_entry(family: Family, data: SerializedNode) -> DeltaEntry {
    DeltaEntry::new(
        Delta::new(DeltaDescription::new(HEAD_STATE), family.kind(SubKind::Added)),
        data,
    )
}

/// Merge `target` into `initial_state`
pub fn create_merged_item(target: &dyn TrackedItem, initial_state: &dyn TrackedItem) -> Diff {
    let target_index = DeltaIndex::build(target);
    let state_index = DeltaIndex::build(initial_state);

    let mut slots: Vec<Slot> = Vec::with_capacity(initial_state.num_deltas());
    let mut emitted_scalars: HashSet<ScalarKind> = HashSet::new();
    let mut opened_families: HashSet<Family> = HashSet::new();

    // step 1: walk the recorded state
    for i in 0..initial_state.num_deltas() {
        let Some(state_entry) = entry_at(initial_state, i) else {
            continue;
        };

        match state_entry.kind().clone() {
            DeltaKind::Scalar(kind) => {
                if !emitted_scalars.insert(kind) {
                    continue;
                }
                // last occurrence wins on either side, at the first position
                let winner = target_index
                    .scalars
                    .get(&kind)
                    .and_then(|&j| entry_at(target, j))
                    .or_else(|| state_index.scalars.get(&kind).and_then(|&j| entry_at(initial_state, j)))
                    .unwrap_or(state_entry);
                slots.push(Slot::Ready(winner));
            }
            DeltaKind::Collection(family, _) => {
                if !target_index.families.contains_key(&family) {
                    slots.push(Slot::Ready(state_entry));
                } else if opened_families.insert(family) {
                    slots.push(Slot::Family(family));
                }
            }
            DeltaKind::Unknown(id) => {
                debug!("event=merge_passthrough module=merge kind={}", id);
                slots.push(Slot::Ready(state_entry));
            }
        }
    }

    let mut diff = Diff::new();
    for slot in slots {
        match slot {
            Slot::Ready(entry) => diff.apply_deltas([entry]),
            Slot::Family(family) => {
                let state_indices = state_index.families.get(&family).map_or(&[][..], Vec::as_slice);
                let target_indices = target_index.families.get(&family).map_or(&[][..], Vec::as_slice);
                let acc = fold_family(family, empty_collection(family), initial_state, state_indices);
                let acc = fold_family(family, acc, target, target_indices);
                diff.apply_deltas([head_state_entry(family, acc)]);
            }
        }
    }

    // step 2: kinds introduced after the baseline was recorded
    let mut late_scalars: HashSet<ScalarKind> = HashSet::new();
    let mut late_families: HashSet<Family> = HashSet::new();
    for j in 0..target.num_deltas() {
        let Some(delta) = target.delta_at(j) else {
            continue;
        };
        match delta.kind() {
            DeltaKind::Scalar(kind) if !state_index.scalars.contains_key(kind) => {
                if late_scalars.insert(*kind) {
                    let last = target_index.scalars.get(kind).copied().unwrap_or(j);
                    if let Some(entry) = entry_at(target, last) {
                        diff.apply_deltas([entry]);
                    }
                }
            }
            DeltaKind::Collection(family, _) if !state_index.families.contains_key(family) => {
                if late_families.insert(*family) {
                    let indices = target_index.families.get(family).map_or(&[][..], Vec::as_slice);
                    let acc = fold_family(*family, empty_collection(*family), target, indices);
                    diff.apply_deltas([head_state_entry(*family, acc)]);
                }
            }
            DeltaKind::Unknown(id) if initial_state.find_delta(delta.kind()).is_none() => {
                debug!("event=merge_drop module=merge kind={} reason=target_only", id);
            }
            _ => {}
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{collection_data, scalar_data, VALUE_KEY};
    use crate::events::{KEY_BEAT, KEY_ID};
    use crate::node::Value;
    use crate::tracked::TrackedItemState;

    fn scalar(kind: ScalarKind, text: &str, value: impl Into<Value>) -> DeltaEntry {
        let kind = DeltaKind::Scalar(kind);
        DeltaEntry::new(
            Delta::new(DeltaDescription::new(text), kind.clone()),
            scalar_data(&kind, value),
        )
    }

    fn clips(sub: SubKind, ids: &[&str]) -> DeltaEntry {
        let kind = Family::Clips.kind(sub);
        let events = ids.iter().enumerate().map(|(i, id)| {
            SerializedNode::new("clip")
                .with_property(KEY_ID, *id)
                .with_property(KEY_BEAT, i as f64)
        });
        DeltaEntry::new(
            Delta::new(DeltaDescription::new("clips"), kind.clone()),
            collection_data(&kind, events),
        )
    }

    fn state(entries: Vec<DeltaEntry>) -> TrackedItemState {
        TrackedItemState::from_entries(entries)
    }

    fn event_ids(entry: &DeltaEntry) -> Vec<String> {
        let mut ids: Vec<String> = entry
            .data
            .children()
            .iter()
            .map(|c| c.get_str(KEY_ID, "").to_string())
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_scalar_target_wins() {
        let initial = state(vec![scalar(ScalarKind::TrackMute, "init", false)]);
        let target = state(vec![scalar(ScalarKind::TrackMute, "muted", true)]);
        let merged = create_merged_item(&target, &initial);
        assert_eq!(merged.len(), 1);
        let entry = &merged.entries()[0];
        assert!(entry.data.get_bool(VALUE_KEY, false));
        assert_eq!(entry.delta.description().text, "muted");
    }

    #[test]
    fn test_last_matching_target_scalar_wins() {
        let initial = state(vec![scalar(ScalarKind::TrackColour, "init", "red")]);
        let target = state(vec![
            scalar(ScalarKind::TrackColour, "first", "green"),
            scalar(ScalarKind::TrackColour, "second", "blue"),
        ]);
        let merged = create_merged_item(&target, &initial);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.entries()[0].data.get_str(VALUE_KEY, ""), "blue");
    }

    #[test]
    fn test_family_is_coalesced_into_one_head_state_delta() {
        let initial = state(vec![clips(SubKind::Added, &["x", "y"])]);
        let target = state(vec![
            clips(SubKind::Added, &["z"]),
            clips(SubKind::Removed, &["x"]),
        ]);
        let merged = create_merged_item(&target, &initial);
        assert_eq!(merged.len(), 1);
        let entry = &merged.entries()[0];
        assert_eq!(entry.kind(), &Family::Clips.kind(SubKind::Added));
        assert_eq!(entry.delta.description().text, HEAD_STATE);
        assert_eq!(event_ids(entry), vec!["y", "z"]);
    }

    #[test]
    fn test_multiple_initial_family_deltas_emit_once() {
        let initial = state(vec![
            clips(SubKind::Added, &["a", "b"]),
            scalar(ScalarKind::TrackMute, "m", false),
            clips(SubKind::Removed, &["a"]),
        ]);
        let target = state(vec![clips(SubKind::Added, &["c"])]);
        let merged = create_merged_item(&target, &initial);
        assert_eq!(merged.len(), 2);
        // family sits at its first position
        assert_eq!(merged.entries()[0].kind(), &Family::Clips.kind(SubKind::Added));
        assert_eq!(event_ids(&merged.entries()[0]), vec!["b", "c"]);
    }

    #[test]
    fn test_untouched_kinds_are_copied_verbatim() {
        let initial = state(vec![
            scalar(ScalarKind::TrackInstrument, "init", "piano"),
            clips(SubKind::Added, &["a"]),
        ]);
        let target = state(vec![]);
        let merged = create_merged_item(&target, &initial);
        assert_eq!(merged.entries(), initial.entries());
    }

    #[test]
    fn test_unknown_kind_passes_through() {
        let odd = DeltaKind::from_id("tempoCurve");
        let entry = DeltaEntry::new(
            Delta::new(DeltaDescription::new("tempo"), odd.clone()),
            SerializedNode::new("tempoCurve").with_property(VALUE_KEY, 120),
        );
        let initial = state(vec![entry.clone()]);
        let target = state(vec![scalar(ScalarKind::TrackMute, "m", true)]);
        let merged = create_merged_item(&target, &initial);
        assert_eq!(merged.entries()[0], entry);
    }

    #[test]
    fn test_target_only_unknown_kind_is_dropped() {
        let odd = DeltaKind::from_id("tempoCurve");
        let target = state(vec![DeltaEntry::new(
            Delta::new(DeltaDescription::new("tempo"), odd),
            SerializedNode::new("tempoCurve"),
        )]);
        assert!(create_merged_item(&target, &TrackedItemState::new()).is_empty());
    }

    #[test]
    fn test_target_only_kinds_are_appended() {
        let initial = state(vec![scalar(ScalarKind::TrackMute, "m", false)]);
        let target = state(vec![
            clips(SubKind::Added, &["k"]),
            scalar(ScalarKind::TrackTimeSignature, "ts", "3/4"),
        ]);
        let merged = create_merged_item(&target, &initial);
        let kinds: Vec<&str> = merged.kinds().map(DeltaKind::as_str).collect();
        assert_eq!(kinds, vec!["trackMute", "clipsAdded", "trackTimeSignature"]);
        assert_eq!(event_ids(&merged.entries()[1]), vec!["k"]);
    }

    #[test]
    fn test_duplicate_initial_scalar_is_emitted_once() {
        let initial = state(vec![
            scalar(ScalarKind::TrackMute, "a", false),
            scalar(ScalarKind::TrackMute, "b", false),
        ]);
        let merged = create_merged_item(&TrackedItemState::new(), &initial);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_duplicate_initial_scalar_keeps_last() {
        let initial = state(vec![
            scalar(ScalarKind::TrackColour, "first", "red"),
            clips(SubKind::Added, &["a"]),
            scalar(ScalarKind::TrackColour, "second", "blue"),
        ]);
        let merged = create_merged_item(&TrackedItemState::new(), &initial);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.entries()[0].kind(), &DeltaKind::Scalar(ScalarKind::TrackColour));
        assert_eq!(merged.entries()[0].data.get_str(VALUE_KEY, ""), "blue");
    }

    #[test]
    fn test_changed_in_target_replaces_event() {
        let initial = state(vec![clips(SubKind::Added, &["a"])]);
        let kind = Family::Clips.kind(SubKind::Changed);
        let edit = DeltaEntry::new(
            Delta::new(DeltaDescription::new("c"), kind.clone()),
            collection_data(
                &kind,
                vec![SerializedNode::new("clip")
                    .with_property(KEY_ID, "a")
                    .with_property(KEY_BEAT, 8.0)],
            ),
        );
        let merged = create_merged_item(&state(vec![edit]), &initial);
        assert_eq!(merged.entries()[0].data.children()[0].get_f64(KEY_BEAT, 0.0), 8.0);
    }
}
