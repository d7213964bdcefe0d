//! Stashes
//!
//! Uncommitted changes put aside as detached revisions: any number of
//! named user stashes plus one quick stash. Stashed records keep their
//! payloads in memory and are never flushed to the pack.
//!
//! Author: Moroya Sakamoto

use log::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, VcsError};
use crate::node::SerializedNode;
use crate::pack::Pack;
use crate::revision::Revision;

const TAG_STASHES: &str = "stashes";
const TAG_USER: &str = "user";
const TAG_QUICK: &str = "quick";

/// User stashes and the quick stash
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StashCollection {
    user: Vec<Revision>,
    quick: Option<Revision>,
}

impl StashCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// User stashes, oldest first
    pub fn user_stashes(&self) -> &[Revision] {
        &self.user
    }

    pub fn len(&self) -> usize {
        self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty()
    }

    pub fn find(&self, id: Uuid) -> Option<&Revision> {
        self.user.iter().find(|s| s.id() == id)
    }

    /// Most recent user stash with the given message
    pub fn find_by_message(&self, message: &str) -> Option<&Revision> {
        self.user.iter().rev().find(|s| s.message() == message)
    }

    pub fn add_stash(&mut self, stash: Revision) {
        debug!(
            "event=stash_add module=stash id={} items={}",
            stash.id(),
            stash.items().len()
        );
        self.user.push(stash);
    }

    pub fn remove_stash(&mut self, id: Uuid) -> Option<Revision> {
        let pos = self.user.iter().position(|s| s.id() == id)?;
        Some(self.user.remove(pos))
    }

    // ── Quick stash ──

    pub fn has_quick_stash(&self) -> bool {
        self.quick.is_some()
    }

    pub fn quick_stash(&self) -> Option<&Revision> {
        self.quick.as_ref()
    }

    /// Store the quick stash; refused while one is held
    pub fn store_quick_stash(&mut self, stash: Revision) -> bool {
        if self.quick.is_some() {
            return false;
        }
        self.quick = Some(stash);
        true
    }

    pub fn take_quick_stash(&mut self) -> Option<Revision> {
        self.quick.take()
    }

    // ── Serialization ──

    pub fn serialize(&self, pack: &Pack) -> Result<SerializedNode> {
        let mut user = SerializedNode::new(TAG_USER);
        for stash in &self.user {
            user.append_child(stash.serialize_shallow(pack)?);
        }
        let mut quick = SerializedNode::new(TAG_QUICK);
        if let Some(stash) = &self.quick {
            quick.append_child(stash.serialize_shallow(pack)?);
        }
        Ok(SerializedNode::new(TAG_STASHES).with_child(user).with_child(quick))
    }

    /// Invalid stash revisions are skipped
    pub fn deserialize(node: &SerializedNode) -> Result<Self> {
        if !node.has_type(TAG_STASHES) {
            return Err(VcsError::UnexpectedNode {
                expected: TAG_STASHES,
                found: String::from(node.tag()),
            });
        }
        let parse_all = |tag: &str| -> Vec<Revision> {
            node.child_with_type(tag)
                .map(|group| {
                    group
                        .children()
                        .iter()
                        .filter_map(|child| {
                            let stash = Revision::deserialize_shallow(child);
                            if stash.is_none() {
                                warn!("event=deserialize_skip module=stash group={}", tag);
                            }
                            stash
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(Self {
            user: parse_all(TAG_USER),
            quick: parse_all(TAG_QUICK).into_iter().next(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{scalar_data, Delta, DeltaDescription, DeltaKind, ScalarKind};
    use crate::revision::{ItemType, RevisionItem};

    fn stash(id: u128, message: &str) -> Revision {
        let kind = DeltaKind::Scalar(ScalarKind::TrackMute);
        let mut record = RevisionItem::new(Uuid::from_u128(5), ItemType::Changed, "Track", "pianoTrack");
        record.push_delta(
            Uuid::from_u128(id * 10),
            Delta::new(DeltaDescription::new("muted"), kind.clone()),
            scalar_data(&kind, true),
        );
        Revision::with_id(Uuid::from_u128(id), message, 0).with_item(record)
    }

    #[test]
    fn test_add_find_remove() {
        let mut stashes = StashCollection::new();
        stashes.add_stash(stash(1, "wip"));
        stashes.add_stash(stash(2, "wip"));
        assert_eq!(stashes.len(), 2);
        assert_eq!(stashes.find_by_message("wip").unwrap().id(), Uuid::from_u128(2));
        assert!(stashes.find(Uuid::from_u128(1)).is_some());

        assert!(stashes.remove_stash(Uuid::from_u128(1)).is_some());
        assert!(stashes.remove_stash(Uuid::from_u128(1)).is_none());
        assert_eq!(stashes.len(), 1);
    }

    #[test]
    fn test_quick_stash_holds_one() {
        let mut stashes = StashCollection::new();
        assert!(stashes.store_quick_stash(stash(1, "quick")));
        assert!(!stashes.store_quick_stash(stash(2, "quick")));
        assert_eq!(stashes.take_quick_stash().unwrap().id(), Uuid::from_u128(1));
        assert!(!stashes.has_quick_stash());
    }

    #[test]
    fn test_serialize_round_trip() {
        let pack = Pack::with_id(Uuid::nil());
        let mut stashes = StashCollection::new();
        stashes.add_stash(stash(1, "a"));
        stashes.add_stash(stash(2, "b"));
        stashes.store_quick_stash(stash(3, "q"));

        let node = stashes.serialize(&pack).unwrap();
        assert_eq!(StashCollection::deserialize(&node).unwrap(), stashes);
    }

    #[test]
    fn test_deserialize_rejects_foreign_node() {
        assert!(StashCollection::deserialize(&SerializedNode::new("pack")).is_err());
    }
}
