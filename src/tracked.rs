//! Tracked items
//!
//! A tracked item is any document entity (track, pattern, project info)
//! whose state is expressed as an ordered list of deltas with payloads.
//! The engine only reads through [`TrackedItem`]; [`TrackedItemState`] is
//! the owned snapshot the caller hands in and the engine hands back.
//!
//! Author: Moroya Sakamoto

use crate::delta::{Delta, DeltaEntry, DeltaKind};
use crate::node::SerializedNode;

/// Capability interface of a tracked item
pub trait TrackedItem {
    fn num_deltas(&self) -> usize;

    fn delta_at(&self, index: usize) -> Option<&Delta>;

    fn data_for_delta(&self, index: usize) -> Option<&SerializedNode>;

    /// True when the delta still holds the item's default value, so a
    /// missing counterpart in the baseline is not a change.
    fn delta_has_default_data(&self, _index: usize) -> bool {
        false
    }

    /// Replace the item's state (checkout only, never used by diff/merge)
    fn reset_state_to(&mut self, state: &dyn TrackedItem);

    /// Index of the first delta of the given kind
    fn find_delta(&self, kind: &DeltaKind) -> Option<usize> {
        (0..self.num_deltas()).find(|&i| self.delta_at(i).is_some_and(|d| d.has_type(kind)))
    }
}

/// Owned ordered list of (delta, payload) pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackedItemState {
    entries: Vec<DeltaEntry>,
}

impl TrackedItemState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<DeltaEntry>) -> Self {
        Self { entries }
    }

    /// Copy every delta of another tracked item
    pub fn capture(item: &dyn TrackedItem) -> Self {
        let entries = (0..item.num_deltas())
            .filter_map(|i| {
                let delta = item.delta_at(i)?.clone();
                let data = item.data_for_delta(i)?.clone();
                Some(DeltaEntry::new(delta, data))
            })
            .collect();
        Self { entries }
    }

    pub fn push(&mut self, delta: Delta, data: SerializedNode) {
        self.entries.push(DeltaEntry::new(delta, data));
    }

    pub fn with(mut self, delta: Delta, data: SerializedNode) -> Self {
        self.push(delta, data);
        self
    }

    pub fn entries(&self) -> &[DeltaEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<DeltaEntry> {
        self.entries
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
}

impl TrackedItem for TrackedItemState {
    fn num_deltas(&self) -> usize {
        self.entries.len()
    }

    fn delta_at(&self, index: usize) -> Option<&Delta> {
        self.entries.get(index).map(|e| &e.delta)
    }

    fn data_for_delta(&self, index: usize) -> Option<&SerializedNode> {
        self.entries.get(index).map(|e| &e.data)
    }

    fn reset_state_to(&mut self, state: &dyn TrackedItem) {
        *self = Self::capture(state);
    }
}

impl FromIterator<DeltaEntry> for TrackedItemState {
    fn from_iter<I: IntoIterator<Item = DeltaEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
