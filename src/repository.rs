//! Repository
//!
//! Owns the revision tree, the pack, the head pointer and the stashes, and
//! drives every history operation against a live project through
//! [`ItemsSource`]: commit, checkout, cherry-pick, reset, stash and
//! grafting of fetched subtrees.
//!
//! Author: Moroya Sakamoto

use log::{debug, info};
use uuid::Uuid;

use crate::error::{Result, VcsError};
use crate::gc::{collect_garbage, GcResult};
use crate::ids::{Clock, IdGenerator};
use crate::pack::Pack;
use crate::revision::{Revision, RevisionItem, RevisionTree};
use crate::snapshot::{ItemsSource, Snapshot};
use crate::stash::StashCollection;

const ROOT_MESSAGE: &str = "root";

/// Revision history with a movable head
#[derive(Debug)]
pub struct Repository {
    tree: RevisionTree,
    pack: Pack,
    head: Uuid,
    stashes: StashCollection,
}

impl Repository {
    /// Empty history: a root revision with the head on it
    pub fn new(ids: &dyn IdGenerator, clock: &dyn Clock) -> Self {
        let pack = Pack::new(ids);
        let tree = RevisionTree::new(Revision::new(ROOT_MESSAGE, ids, clock));
        let head = tree.root_id();
        Self {
            tree,
            pack,
            head,
            stashes: StashCollection::new(),
        }
    }

    /// Reassemble from stored parts; `head` must be in `tree`
    pub fn from_parts(tree: RevisionTree, pack: Pack, head: Uuid, stashes: StashCollection) -> Result<Self> {
        if !tree.contains(head) {
            return Err(VcsError::RevisionNotFound(head));
        }
        Ok(Self {
            tree,
            pack,
            head,
            stashes,
        })
    }

    pub fn tree(&self) -> &RevisionTree {
        &self.tree
    }

    pub fn pack(&self) -> &Pack {
        &self.pack
    }

    pub fn head(&self) -> Uuid {
        self.head
    }

    pub fn stashes(&self) -> &StashCollection {
        &self.stashes
    }

    /// State replayed up to the head revision
    pub fn head_state(&self) -> Result<Snapshot> {
        self.tree.checkout(self.head, &self.pack)
    }

    /// Uncommitted changes of the project relative to the head
    pub fn changes(&self, project: &dyn ItemsSource, ids: &dyn IdGenerator) -> Result<Vec<RevisionItem>> {
        Ok(self.head_state()?.changes_from(&project.project_items(), ids))
    }

    /// Commit `changes` as a child of the head and move the head onto it.
    ///
    /// Returns `None` without touching history when there is nothing to
    /// commit. Payloads are flushed to the pack.
    pub fn commit(
        &mut self,
        changes: Vec<RevisionItem>,
        message: &str,
        ids: &dyn IdGenerator,
        clock: &dyn Clock,
    ) -> Result<Option<Uuid>> {
        if changes.is_empty() {
            return Ok(None);
        }
        let mut revision = Revision::new(message, ids, clock);
        for record in changes {
            revision.add_item(record);
        }
        let id = self.tree.add_child(self.head, revision)?;
        self.head = id;
        self.tree.flush(&mut self.pack);
        info!("event=commit module=repository id={} message={:?}", id, message);
        Ok(Some(id))
    }

    /// Point the head at `id` without touching the project
    pub fn move_head(&mut self, id: Uuid) -> Result<()> {
        if !self.tree.contains(id) {
            return Err(VcsError::RevisionNotFound(id));
        }
        self.head = id;
        Ok(())
    }

    /// Move the head to `id` and make the project match its state
    pub fn checkout(&mut self, id: Uuid, project: &mut dyn ItemsSource) -> Result<()> {
        let state = self.tree.checkout(id, &self.pack)?;
        self.head = id;
        state.checkout_into(project);
        info!("event=checkout module=repository id={} items={}", id, state.len());
        Ok(())
    }

    /// Check out the selected items as they stand at revision `id`; the
    /// head does not move
    pub fn cherry_pick(&self, id: Uuid, vcs_ids: &[Uuid], project: &mut dyn ItemsSource) -> Result<usize> {
        let state = self.tree.checkout(id, &self.pack)?;
        let picked = state.cherry_pick_into(vcs_ids, project);
        debug!(
            "event=cherry_pick module=repository id={} picked={}",
            id, picked
        );
        Ok(picked)
    }

    /// Undo the given uncommitted changes in the project
    pub fn reset_changes(&self, changes: &[RevisionItem], project: &mut dyn ItemsSource) -> Result<usize> {
        Ok(self.head_state()?.reset_changes(changes, project))
    }

    /// Undo every uncommitted change in the project
    pub fn reset_all_changes(&self, project: &mut dyn ItemsSource, ids: &dyn IdGenerator) -> Result<usize> {
        let head = self.head_state()?;
        let changes = head.changes_from(&project.project_items(), ids);
        Ok(head.reset_changes(&changes, project))
    }

    // ── Stashes ──

    /// Put `changes` aside as a user stash, resetting them in the project
    /// unless `keep_changes` is set
    pub fn stash(
        &mut self,
        changes: Vec<RevisionItem>,
        message: &str,
        keep_changes: bool,
        project: &mut dyn ItemsSource,
        ids: &dyn IdGenerator,
        clock: &dyn Clock,
    ) -> Result<Option<Uuid>> {
        if changes.is_empty() {
            return Ok(None);
        }
        if !keep_changes {
            self.reset_changes(&changes, project)?;
        }
        let mut stash = Revision::new(message, ids, clock);
        for record in changes {
            stash.add_item(record);
        }
        let id = stash.id();
        self.stashes.add_stash(stash);
        Ok(Some(id))
    }

    /// Merge a user stash onto the head state and check out the items it
    /// touches; the stash is dropped unless `keep_stash` is set
    pub fn apply_stash(&mut self, stash_id: Uuid, keep_stash: bool, project: &mut dyn ItemsSource) -> Result<bool> {
        let Some(stash) = self.stashes.find(stash_id) else {
            return Ok(false);
        };
        self.apply_changes(stash, project)?;
        if !keep_stash {
            self.stashes.remove_stash(stash_id);
        }
        Ok(true)
    }

    /// Stash every uncommitted change into the quick stash and reset the
    /// project; refused while a quick stash is held or when nothing changed
    pub fn quick_stash_all(
        &mut self,
        project: &mut dyn ItemsSource,
        ids: &dyn IdGenerator,
        clock: &dyn Clock,
    ) -> Result<bool> {
        if self.stashes.has_quick_stash() {
            return Ok(false);
        }
        let head = self.head_state()?;
        let changes = head.changes_from(&project.project_items(), ids);
        if changes.is_empty() {
            return Ok(false);
        }
        head.reset_changes(&changes, project);
        let mut stash = Revision::new("quick stash", ids, clock);
        for record in changes {
            stash.add_item(record);
        }
        Ok(self.stashes.store_quick_stash(stash))
    }

    /// Apply and drop the quick stash
    pub fn apply_quick_stash(&mut self, project: &mut dyn ItemsSource) -> Result<bool> {
        let Some(stash) = self.stashes.quick_stash() else {
            return Ok(false);
        };
        self.apply_changes(stash, project)?;
        self.stashes.take_quick_stash();
        Ok(true)
    }

    fn apply_changes(&self, changes: &Revision, project: &mut dyn ItemsSource) -> Result<usize> {
        let mut state = self.head_state()?;
        state.apply_revision(changes, &self.pack)?;
        Ok(state.apply_records_into(changes.items(), project))
    }

    // ── History maintenance ──

    /// Graft a fetched subtree under revision `parent`
    pub fn append_subtree(&mut self, parent: Uuid, subtree: RevisionTree) -> Result<()> {
        self.tree.append_subtree(parent, subtree)
    }

    /// Drop pack records no revision refers to
    pub fn collect_garbage(&mut self) -> GcResult {
        collect_garbage(&mut self.pack, &self.tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{scalar_data, Delta, DeltaDescription, DeltaEntry, DeltaKind, ScalarKind, VALUE_KEY};
    use crate::ids::{FixedClock, SequentialIds};
    use crate::revision::ItemType;
    use crate::tracked::{TrackedItem, TrackedItemState};

    const LEAD: u128 = 0xA1;
    const BASS: u128 = 0xB2;

    fn mute(on: bool) -> TrackedItemState {
        let kind = DeltaKind::Scalar(ScalarKind::TrackMute);
        TrackedItemState::from_entries(vec![DeltaEntry::new(
            Delta::new(DeltaDescription::new("mute"), kind.clone()),
            scalar_data(&kind, on),
        )])
    }

    fn set_mute(project: &mut Snapshot, item: u128, on: bool) {
        match project.tracked_item_mut(Uuid::from_u128(item)) {
            Some(target) => target.reset_state_to(&mute(on)),
            None => project.init_item(Uuid::from_u128(item), "Track", "pianoTrack", &mute(on)),
        }
    }

    fn muted(project: &Snapshot, item: u128) -> Option<bool> {
        let state = &project.item(Uuid::from_u128(item))?.state;
        Some(state.entries()[0].data.get_bool(VALUE_KEY, false))
    }

    /// Repository with two commits: lead added, then lead muted and bass added
    fn history(ids: &SequentialIds, project: &mut Snapshot) -> (Repository, Uuid, Uuid) {
        let clock = FixedClock(0);
        let mut repo = Repository::new(ids, &clock);

        set_mute(project, LEAD, false);
        let changes = repo.changes(&*project, ids).unwrap();
        let first = repo.commit(changes, "add lead", ids, &clock).unwrap().unwrap();

        set_mute(project, LEAD, true);
        set_mute(project, BASS, false);
        let changes = repo.changes(&*project, ids).unwrap();
        let second = repo.commit(changes, "mute lead, add bass", ids, &clock).unwrap().unwrap();
        (repo, first, second)
    }

    #[test]
    fn test_commit_moves_head_and_flushes() {
        let ids = SequentialIds::new();
        let mut project = Snapshot::new();
        let (repo, _, second) = history(&ids, &mut project);
        assert_eq!(repo.head(), second);
        assert_eq!(repo.tree().len(), 3);
        assert!(!repo.pack().is_empty());
        assert!(repo.changes(&project, &ids).unwrap().is_empty());
    }

    #[test]
    fn test_empty_commit_is_refused() {
        let ids = SequentialIds::new();
        let mut repo = Repository::new(&ids, &FixedClock(0));
        assert_eq!(repo.commit(Vec::new(), "nothing", &ids, &FixedClock(0)).unwrap(), None);
        assert_eq!(repo.tree().len(), 1);
    }

    #[test]
    fn test_checkout_rewrites_project() {
        let ids = SequentialIds::new();
        let mut project = Snapshot::new();
        let (mut repo, first, second) = history(&ids, &mut project);

        repo.checkout(first, &mut project).unwrap();
        assert_eq!(repo.head(), first);
        assert_eq!(muted(&project, LEAD), Some(false));
        assert_eq!(muted(&project, BASS), None);

        repo.checkout(second, &mut project).unwrap();
        assert_eq!(muted(&project, LEAD), Some(true));
        assert_eq!(muted(&project, BASS), Some(false));
    }

    #[test]
    fn test_checkout_unknown_revision_fails() {
        let ids = SequentialIds::new();
        let mut project = Snapshot::new();
        let (mut repo, _, second) = history(&ids, &mut project);
        assert!(repo.checkout(Uuid::from_u128(0xDEAD), &mut project).is_err());
        assert_eq!(repo.head(), second);
    }

    #[test]
    fn test_cherry_pick_keeps_head() {
        let ids = SequentialIds::new();
        let mut project = Snapshot::new();
        let (mut repo, first, second) = history(&ids, &mut project);
        repo.checkout(first, &mut project).unwrap();

        let picked = repo.cherry_pick(second, &[Uuid::from_u128(BASS)], &mut project).unwrap();
        assert_eq!(picked, 1);
        assert_eq!(repo.head(), first);
        assert_eq!(muted(&project, LEAD), Some(false));
        assert_eq!(muted(&project, BASS), Some(false));
    }

    #[test]
    fn test_reset_all_changes() {
        let ids = SequentialIds::new();
        let mut project = Snapshot::new();
        let (repo, _, _) = history(&ids, &mut project);
        set_mute(&mut project, LEAD, false);
        project.delete_item(Uuid::from_u128(BASS));

        assert_eq!(repo.reset_all_changes(&mut project, &ids).unwrap(), 2);
        assert!(repo.changes(&project, &ids).unwrap().is_empty());
    }

    #[test]
    fn test_stash_and_apply() {
        let ids = SequentialIds::new();
        let clock = FixedClock(0);
        let mut project = Snapshot::new();
        let (mut repo, _, _) = history(&ids, &mut project);

        set_mute(&mut project, LEAD, false);
        let changes = repo.changes(&project, &ids).unwrap();
        let stash = repo
            .stash(changes, "unmute", false, &mut project, &ids, &clock)
            .unwrap()
            .unwrap();
        assert_eq!(muted(&project, LEAD), Some(true));
        assert_eq!(repo.stashes().len(), 1);

        assert!(repo.apply_stash(stash, true, &mut project).unwrap());
        assert_eq!(muted(&project, LEAD), Some(false));
        assert_eq!(repo.stashes().len(), 1);

        repo.reset_all_changes(&mut project, &ids).unwrap();
        assert!(repo.apply_stash(stash, false, &mut project).unwrap());
        assert_eq!(muted(&project, LEAD), Some(false));
        assert!(repo.stashes().is_empty());
        assert!(!repo.apply_stash(stash, false, &mut project).unwrap());
    }

    #[test]
    fn test_stash_keeping_changes() {
        let ids = SequentialIds::new();
        let clock = FixedClock(0);
        let mut project = Snapshot::new();
        let (mut repo, _, _) = history(&ids, &mut project);

        set_mute(&mut project, BASS, true);
        let changes = repo.changes(&project, &ids).unwrap();
        repo.stash(changes, "keep", true, &mut project, &ids, &clock).unwrap();
        assert_eq!(muted(&project, BASS), Some(true));
        assert_eq!(repo.stashes().find_by_message("keep").unwrap().items()[0].item_type(), ItemType::Changed);
    }

    #[test]
    fn test_quick_stash_round_trip() {
        let ids = SequentialIds::new();
        let clock = FixedClock(0);
        let mut project = Snapshot::new();
        let (mut repo, _, _) = history(&ids, &mut project);
        assert!(!repo.quick_stash_all(&mut project, &ids, &clock).unwrap());

        set_mute(&mut project, LEAD, false);
        project.delete_item(Uuid::from_u128(BASS));
        assert!(repo.quick_stash_all(&mut project, &ids, &clock).unwrap());
        assert_eq!(muted(&project, LEAD), Some(true));
        assert_eq!(muted(&project, BASS), Some(false));

        assert!(repo.apply_quick_stash(&mut project).unwrap());
        assert_eq!(muted(&project, LEAD), Some(false));
        assert_eq!(muted(&project, BASS), None);
        assert!(!repo.stashes().has_quick_stash());
        assert!(!repo.apply_quick_stash(&mut project).unwrap());
    }

    #[test]
    fn test_append_subtree_under_head() {
        let ids = SequentialIds::new();
        let mut project = Snapshot::new();
        let (mut repo, _, second) = history(&ids, &mut project);

        let remote = RevisionTree::new(Revision::with_id(Uuid::from_u128(0xF00), "fetched", 0));
        repo.append_subtree(second, remote).unwrap();
        assert_eq!(repo.tree().parent_of(Uuid::from_u128(0xF00)).unwrap().id(), second);
        repo.move_head(Uuid::from_u128(0xF00)).unwrap();
        assert_eq!(repo.head_state().unwrap().len(), 2);
    }

    #[test]
    fn test_from_parts_checks_head() {
        let ids = SequentialIds::new();
        let tree = RevisionTree::new(Revision::new("root", &ids, &FixedClock(0)));
        let err = Repository::from_parts(tree, Pack::new(&ids), Uuid::from_u128(0xDEAD), StashCollection::new());
        assert!(matches!(err, Err(VcsError::RevisionNotFound(_))));
    }

    #[test]
    fn test_gc_after_commits_keeps_history() {
        let ids = SequentialIds::new();
        let mut project = Snapshot::new();
        let (mut repo, first, _) = history(&ids, &mut project);
        let result = repo.collect_garbage();
        assert!(!result.did_collect());
        assert_eq!(repo.tree().checkout(first, repo.pack()).unwrap().len(), 1);
    }
}
