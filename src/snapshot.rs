//! Head state snapshot
//!
//! The tracked items as they stand after replaying revisions from the root:
//! `Added` records insert an item, `Removed` records drop it, `Changed`
//! records are merged into the existing item with the merge engine.
//!
//! A snapshot also compares itself with the live project to produce the
//! uncommitted changes as revision records, and pushes its state back into
//! the project on checkout, cherry-pick and reset.
//!
//! Author: Moroya Sakamoto

use log::{debug, warn};
use uuid::Uuid;

use crate::diff::create_diff;
use crate::error::Result;
use crate::ids::IdGenerator;
use crate::merge::create_merged_item;
use crate::pack::Pack;
use crate::revision::{ItemType, Revision, RevisionItem};
use crate::tracked::{TrackedItem, TrackedItemState};

/// One tracked item of the head state
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotItem {
    pub vcs_id: Uuid,
    pub name: String,
    pub logic: String,
    pub state: TrackedItemState,
}

/// Live project item handed in for comparison
pub struct ProjectItem<'a> {
    pub vcs_id: Uuid,
    pub name: &'a str,
    pub logic: &'a str,
    pub item: &'a dyn TrackedItem,
}

/// The live project: tracked items addressed by vcs id.
///
/// Checkout writes through this interface only.
pub trait ItemsSource {
    fn project_items(&self) -> Vec<ProjectItem<'_>>;

    fn tracked_item_mut(&mut self, vcs_id: Uuid) -> Option<&mut dyn TrackedItem>;

    /// Create an item that was absent from the project
    fn init_item(&mut self, vcs_id: Uuid, name: &str, logic: &str, state: &dyn TrackedItem);

    fn delete_item(&mut self, vcs_id: Uuid) -> bool;

    /// Called once after a batch of resets
    fn on_reset_state(&mut self) {}
}

/// Head state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    items: Vec<SnapshotItem>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[SnapshotItem] {
        &self.items
    }

    pub fn item(&self, vcs_id: Uuid) -> Option<&SnapshotItem> {
        self.items.iter().find(|i| i.vcs_id == vcs_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert an item, or replace the one with the same id
    pub fn add_item(&mut self, record: &RevisionItem, pack: &Pack) -> Result<()> {
        let item = SnapshotItem {
            vcs_id: record.vcs_id(),
            name: String::from(record.name()),
            logic: String::from(record.logic()),
            state: record.state(pack)?,
        };
        match self.items.iter_mut().find(|i| i.vcs_id == item.vcs_id) {
            Some(slot) => *slot = item,
            None => self.items.push(item),
        }
        Ok(())
    }

    pub fn remove_item(&mut self, vcs_id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.vcs_id != vcs_id);
        self.items.len() != before
    }

    /// Merge a `Changed` record into the existing item
    pub fn merge_item(&mut self, record: &RevisionItem, pack: &Pack) -> Result<()> {
        let changes = record.state(pack)?;
        let Some(existing) = self.items.iter_mut().find(|i| i.vcs_id == record.vcs_id()) else {
            warn!(
                "event=merge_skip module=snapshot item={} reason=not_in_head",
                record.vcs_id()
            );
            return Ok(());
        };
        let merged = create_merged_item(&changes, &existing.state);
        existing.state = merged.into_state();
        if !record.name().is_empty() {
            existing.name = String::from(record.name());
        }
        Ok(())
    }

    /// Replay one revision on top of this state
    pub fn apply_revision(&mut self, revision: &Revision, pack: &Pack) -> Result<()> {
        debug!(
            "event=snapshot_apply module=snapshot revision={} items={}",
            revision.id(),
            revision.items().len()
        );
        for record in revision.items() {
            match record.item_type() {
                ItemType::Added => self.add_item(record, pack)?,
                ItemType::Removed => {
                    self.remove_item(record.vcs_id());
                }
                ItemType::Changed => self.merge_item(record, pack)?,
            }
        }
        Ok(())
    }

    /// Uncommitted changes of `project` relative to this state.
    ///
    /// Items with a non-empty diff become `Changed` records, items missing
    /// from the project become `Removed`, new project items become `Added`
    /// with all their deltas.
    pub fn changes_from(&self, project: &[ProjectItem<'_>], ids: &dyn IdGenerator) -> Vec<RevisionItem> {
        let mut records = Vec::new();

        for head in &self.items {
            match project.iter().find(|p| p.vcs_id == head.vcs_id) {
                Some(live) => {
                    let diff = create_diff(live.item, &head.state);
                    if !diff.is_empty() {
                        records.push(RevisionItem::from_diff(
                            head.vcs_id,
                            ItemType::Changed,
                            live.name,
                            live.logic,
                            diff,
                            ids,
                        ));
                    }
                }
                None => records.push(RevisionItem::new(
                    head.vcs_id,
                    ItemType::Removed,
                    &head.name,
                    &head.logic,
                )),
            }
        }

        for live in project {
            if self.item(live.vcs_id).is_none() {
                let mut record = RevisionItem::new(live.vcs_id, ItemType::Added, live.name, live.logic);
                for entry in TrackedItemState::capture(live.item).into_entries() {
                    record.push_delta(ids.next_id(), entry.delta, entry.data);
                }
                records.push(record);
            }
        }

        records
    }

    /// Write one head item into the project, creating it when missing
    fn checkout_item(item: &SnapshotItem, project: &mut dyn ItemsSource) {
        match project.tracked_item_mut(item.vcs_id) {
            Some(target) => target.reset_state_to(&item.state),
            None => project.init_item(item.vcs_id, &item.name, &item.logic, &item.state),
        }
    }

    /// Make the project match this state: items outside it are deleted,
    /// every item in it is reset or created.
    pub fn checkout_into(&self, project: &mut dyn ItemsSource) {
        let stale: Vec<Uuid> = project
            .project_items()
            .iter()
            .map(|p| p.vcs_id)
            .filter(|id| self.item(*id).is_none())
            .collect();
        for vcs_id in &stale {
            project.delete_item(*vcs_id);
        }
        for item in &self.items {
            Self::checkout_item(item, project);
        }
        project.on_reset_state();
        debug!(
            "event=checkout module=snapshot items={} deleted={}",
            self.items.len(),
            stale.len()
        );
    }

    /// Check out only the selected items; returns how many were picked.
    ///
    /// Ids this state does not hold are skipped.
    pub fn cherry_pick_into(&self, vcs_ids: &[Uuid], project: &mut dyn ItemsSource) -> usize {
        let mut picked = 0;
        for vcs_id in vcs_ids {
            match self.item(*vcs_id) {
                Some(item) => {
                    Self::checkout_item(item, project);
                    picked += 1;
                }
                None => debug!("event=cherry_pick_skip module=snapshot item={}", vcs_id),
            }
        }
        project.on_reset_state();
        picked
    }

    /// Bring the items named by `records` in line with this state: items
    /// present here are checked out, the rest are deleted from the project.
    pub fn apply_records_into(&self, records: &[RevisionItem], project: &mut dyn ItemsSource) -> usize {
        for record in records {
            match self.item(record.vcs_id()) {
                Some(item) => Self::checkout_item(item, project),
                None => {
                    project.delete_item(record.vcs_id());
                }
            }
        }
        project.on_reset_state();
        records.len()
    }

    /// Undo uncommitted changes (as produced by [`Snapshot::changes_from`]).
    ///
    /// `Changed` items get their head state back, `Added` items are
    /// deleted, `Removed` items are recreated. Returns how many changes
    /// were reset.
    pub fn reset_changes(&self, changes: &[RevisionItem], project: &mut dyn ItemsSource) -> usize {
        let mut reset = 0;
        for change in changes {
            let head = self.item(change.vcs_id());
            let done = match (change.item_type(), head) {
                (ItemType::Changed, Some(item)) => match project.tracked_item_mut(item.vcs_id) {
                    Some(target) => {
                        target.reset_state_to(&item.state);
                        true
                    }
                    None => false,
                },
                (ItemType::Added, _) => project.delete_item(change.vcs_id()),
                (ItemType::Removed, Some(item)) => {
                    project.init_item(item.vcs_id, &item.name, &item.logic, &item.state);
                    true
                }
                (_, None) => false,
            };
            if done {
                reset += 1;
            } else {
                warn!(
                    "event=reset_skip module=snapshot item={} type={}",
                    change.vcs_id(),
                    change.item_type().as_str()
                );
            }
        }
        project.on_reset_state();
        reset
    }
}

/// A snapshot doubles as an in-memory project
impl ItemsSource for Snapshot {
    fn project_items(&self) -> Vec<ProjectItem<'_>> {
        self.items
            .iter()
            .map(|i| ProjectItem {
                vcs_id: i.vcs_id,
                name: &i.name,
                logic: &i.logic,
                item: &i.state,
            })
            .collect()
    }

    fn tracked_item_mut(&mut self, vcs_id: Uuid) -> Option<&mut dyn TrackedItem> {
        self.items
            .iter_mut()
            .find(|i| i.vcs_id == vcs_id)
            .map(|i| &mut i.state as &mut dyn TrackedItem)
    }

    fn init_item(&mut self, vcs_id: Uuid, name: &str, logic: &str, state: &dyn TrackedItem) {
        self.remove_item(vcs_id);
        self.items.push(SnapshotItem {
            vcs_id,
            name: String::from(name),
            logic: String::from(logic),
            state: TrackedItemState::capture(state),
        });
    }

    fn delete_item(&mut self, vcs_id: Uuid) -> bool {
        self.remove_item(vcs_id)
    }
}
