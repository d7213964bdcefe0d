//! Diff engine
//!
//! Compares a tracked item's current state (`target`) against a recorded
//! state (`initial_state`) and produces only what changed:
//! - scalar kinds become a single replacement delta with a description
//!   picked from a handler table,
//! - full-set collection snapshots (the family's `Added` kind) are handed
//!   to the event differ and yield added/removed/changed deltas.
//!
//! Unchanged kinds are never emitted. Kinds the engine cannot diff are
//! skipped and logged, never an error.
//!
//! Author: Moroya Sakamoto

use log::{debug, warn};

use crate::delta::{Delta, DeltaDescription, DeltaEntry, DeltaKind, ScalarKind, SubKind, VALUE_KEY};
use crate::events::{diff_events, is_collection_payload};
use crate::node::SerializedNode;
use crate::tracked::{TrackedItem, TrackedItemState};

// ── Diff ───────────────────────────────────────────────────────────────

/// Ordered owned list of (delta, payload) pairs produced by diff or merge
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    entries: Vec<DeltaEntry>,
}

impl Diff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_delta(&mut self, delta: Delta, data: SerializedNode) {
        self.entries.push(DeltaEntry::new(delta, data));
    }

    pub fn apply_deltas(&mut self, entries: impl IntoIterator<Item = DeltaEntry>) {
        self.entries.extend(entries);
    }

    pub fn entries(&self) -> &[DeltaEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DeltaEntry> {
        self.entries.iter()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &DeltaKind> {
        self.entries.iter().map(DeltaEntry::kind)
    }

    pub fn entry(&self, kind: &DeltaKind) -> Option<&DeltaEntry> {
        self.entries.iter().find(|e| e.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<DeltaEntry> {
        self.entries
    }

    /// View the result as a tracked item state
    pub fn into_state(self) -> TrackedItemState {
        TrackedItemState::from_entries(self.entries)
    }
}

impl IntoIterator for Diff {
    type Item = DeltaEntry;
    type IntoIter = std::vec::IntoIter<DeltaEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diff {
    type Item = &'a DeltaEntry;
    type IntoIter = std::slice::Iter<'a, DeltaEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ── Scalar descriptions ────────────────────────────────────────────────

type DescribeFn = fn(old: Option<&SerializedNode>, new: &SerializedNode) -> DeltaDescription;

const SCALAR_HANDLERS: &[(ScalarKind, DescribeFn)] = &[
    (ScalarKind::TrackPath, describe_path),
    (ScalarKind::TrackMute, describe_mute),
    (ScalarKind::TrackColour, |_, _| DeltaDescription::new("color changed")),
    (ScalarKind::TrackInstrument, |_, _| DeltaDescription::new("instrument changed")),
    (ScalarKind::TrackController, |_, _| DeltaDescription::new("controller changed")),
    (ScalarKind::TrackTimeSignature, |_, _| {
        DeltaDescription::with_count("changed {x} time signatures", 1)
    }),
    (ScalarKind::ProjectTitle, |_, _| DeltaDescription::new("title changed")),
    (ScalarKind::ProjectAuthor, |_, _| DeltaDescription::new("author changed")),
    (ScalarKind::ProjectDescription, |_, _| DeltaDescription::new("description changed")),
    (ScalarKind::ProjectLicense, |_, _| DeltaDescription::new("license changed")),
    (ScalarKind::ProjectTemperament, |_, _| DeltaDescription::new("temperament changed")),
];

fn describe_path(old: Option<&SerializedNode>, _new: &SerializedNode) -> DeltaDescription {
    let previous = old
        .and_then(|n| n.property(VALUE_KEY))
        .map(|v| v.to_display_string())
        .unwrap_or_default();
    DeltaDescription::with_param("moved from {x}", &previous)
}

fn describe_mute(_old: Option<&SerializedNode>, new: &SerializedNode) -> DeltaDescription {
    if new.get_bool(VALUE_KEY, false) {
        DeltaDescription::new("muted")
    } else {
        DeltaDescription::new("unmuted")
    }
}

/// Description of a scalar change
pub fn describe_scalar(
    kind: ScalarKind,
    old: Option<&SerializedNode>,
    new: &SerializedNode,
) -> DeltaDescription {
    SCALAR_HANDLERS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, describe)| describe(old, new))
        .unwrap_or_else(|| DeltaDescription::new("changed"))
}

// ── Engine ─────────────────────────────────────────────────────────────

/// Deltas turning `initial_state` into `target`, in target order
pub fn create_diff(target: &dyn TrackedItem, initial_state: &dyn TrackedItem) -> Diff {
    let mut diff = Diff::new();

    for i in 0..target.num_deltas() {
        let (Some(delta), Some(data)) = (target.delta_at(i), target.data_for_delta(i)) else {
            continue;
        };

        let state_data = initial_state
            .find_delta(delta.kind())
            .and_then(|j| initial_state.data_for_delta(j));

        let changed = match state_data {
            None => !target.delta_has_default_data(i),
            Some(old) => !data.is_equivalent_to(old),
        };
        if !changed {
            continue;
        }

        match delta.kind() {
            DeltaKind::Scalar(kind) => {
                let description = describe_scalar(*kind, state_data, data);
                diff.apply_delta(Delta::new(description, delta.kind().clone()), data.clone());
            }
            DeltaKind::Collection(family, SubKind::Added) => {
                let empty = SerializedNode::new(delta.kind().as_str());
                let old = state_data.unwrap_or(&empty);
                if !is_collection_payload(data) || !is_collection_payload(old) {
                    warn!(
                        "event=diff_skip module=diff kind={} reason=type_mismatch",
                        delta.kind()
                    );
                    continue;
                }
                diff.apply_deltas(diff_events(*family, old, data));
            }
            other => {
                debug!("event=diff_skip module=diff kind={} reason=unsupported", other);
            }
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{collection_data, scalar_data, Family};
    use crate::events::{KEY_BEAT, KEY_ID, KEY_VALUE};

    fn scalar(kind: ScalarKind, value: impl Into<crate::node::Value>) -> DeltaEntry {
        let kind = DeltaKind::Scalar(kind);
        DeltaEntry::new(
            Delta::new(DeltaDescription::new("init"), kind.clone()),
            scalar_data(&kind, value),
        )
    }

    fn autos(points: &[(&str, f64, f64)]) -> DeltaEntry {
        let kind = Family::AutomationEvents.kind(SubKind::Added);
        let events = points.iter().map(|(id, beat, val)| {
            SerializedNode::new("auto")
                .with_property(KEY_ID, *id)
                .with_property(KEY_BEAT, *beat)
                .with_property(KEY_VALUE, *val)
        });
        DeltaEntry::new(
            Delta::new(DeltaDescription::new("init"), kind.clone()),
            collection_data(&kind, events),
        )
    }

    fn state(entries: Vec<DeltaEntry>) -> TrackedItemState {
        TrackedItemState::from_entries(entries)
    }

    #[test]
    fn test_diff_of_identical_states_is_empty() {
        let s = state(vec![
            scalar(ScalarKind::TrackMute, false),
            autos(&[("a", 0.0, 0.5)]),
        ]);
        assert!(create_diff(&s, &s).is_empty());
    }

    #[test]
    fn test_scalar_change_carries_target_data() {
        let old = state(vec![scalar(ScalarKind::TrackColour, "red")]);
        let new = state(vec![scalar(ScalarKind::TrackColour, "blue")]);
        let diff = create_diff(&new, &old);
        assert_eq!(diff.len(), 1);
        let entry = &diff.entries()[0];
        assert_eq!(entry.delta.description().render(), "color changed");
        assert_eq!(entry.data.get_str(VALUE_KEY, ""), "blue");
    }

    #[test]
    fn test_path_description_embeds_old_value() {
        let old = state(vec![scalar(ScalarKind::TrackPath, "Drums/Kick")]);
        let new = state(vec![scalar(ScalarKind::TrackPath, "Drums/Snare")]);
        let diff = create_diff(&new, &old);
        assert_eq!(
            diff.entries()[0].delta.description().render(),
            "moved from Drums/Kick"
        );
    }

    #[test]
    fn test_mute_description_follows_value() {
        let old = state(vec![scalar(ScalarKind::TrackMute, false)]);
        let new = state(vec![scalar(ScalarKind::TrackMute, true)]);
        assert_eq!(create_diff(&new, &old).entries()[0].delta.description().text, "muted");
        assert_eq!(create_diff(&old, &new).entries()[0].delta.description().text, "unmuted");
    }

    #[test]
    fn test_scalar_missing_in_state_is_emitted() {
        let new = state(vec![scalar(ScalarKind::ProjectTitle, "Song")]);
        let diff = create_diff(&new, &TrackedItemState::new());
        assert_eq!(diff.entries()[0].delta.description().text, "title changed");
    }

    #[test]
    fn test_collection_change_goes_through_event_differ() {
        let old = state(vec![autos(&[("a", 0.0, 0.2)])]);
        let new = state(vec![autos(&[("a", 0.0, 0.8), ("b", 1.0, 0.1)])]);
        let diff = create_diff(&new, &old);
        let kinds: Vec<&str> = diff.kinds().map(DeltaKind::as_str).collect();
        assert_eq!(kinds, vec!["automationEventsAdded", "automationEventsChanged"]);
    }

    #[test]
    fn test_collection_missing_in_state_is_all_added() {
        let new = state(vec![autos(&[("a", 0.0, 0.8), ("b", 1.0, 0.1)])]);
        let diff = create_diff(&new, &TrackedItemState::new());
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.entries()[0].delta.description().count, Some(2));
    }

    #[test]
    fn test_unknown_and_partial_kinds_are_skipped() {
        let unknown = DeltaKind::from_id("tempoCurve");
        let removed = Family::Notes.kind(SubKind::Removed);
        let new = state(vec![
            DeltaEntry::new(
                Delta::new(DeltaDescription::new("x"), unknown.clone()),
                SerializedNode::new("tempoCurve").with_property("value", 3),
            ),
            DeltaEntry::new(
                Delta::new(DeltaDescription::new("x"), removed.clone()),
                collection_data(&removed, vec![]),
            ),
        ]);
        assert!(create_diff(&new, &TrackedItemState::new()).is_empty());
    }

    #[test]
    fn test_type_mismatch_skips_only_that_delta() {
        let kind = Family::Notes.kind(SubKind::Added);
        let bogus = DeltaEntry::new(
            Delta::new(DeltaDescription::new("x"), kind.clone()),
            SerializedNode::new("notesAdded").with_property(VALUE_KEY, 1),
        );
        let new = state(vec![bogus, scalar(ScalarKind::TrackMute, true)]);
        let diff = create_diff(&new, &TrackedItemState::new());
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.entries()[0].kind(), &DeltaKind::Scalar(ScalarKind::TrackMute));
    }

    struct DefaultsItem(TrackedItemState);

    impl TrackedItem for DefaultsItem {
        fn num_deltas(&self) -> usize {
            self.0.num_deltas()
        }
        fn delta_at(&self, index: usize) -> Option<&Delta> {
            self.0.delta_at(index)
        }
        fn data_for_delta(&self, index: usize) -> Option<&SerializedNode> {
            self.0.data_for_delta(index)
        }
        fn delta_has_default_data(&self, _index: usize) -> bool {
            true
        }
        fn reset_state_to(&mut self, state: &dyn TrackedItem) {
            self.0.reset_state_to(state);
        }
    }

    #[test]
    fn test_default_data_missing_in_state_is_not_a_change() {
        let new = DefaultsItem(state(vec![scalar(ScalarKind::TrackController, 0)]));
        assert!(create_diff(&new, &TrackedItemState::new()).is_empty());
    }

    #[test]
    fn test_every_scalar_kind_has_a_handler() {
        for kind in ScalarKind::ALL {
            assert!(SCALAR_HANDLERS.iter().any(|(k, _)| *k == kind), "{kind:?}");
        }
    }
}
