//! Revisions and the revision tree
//!
//! A revision records, per tracked item, the deltas that were committed
//! for it. Revisions form a tree: every revision but the root has exactly
//! one parent, and the tree owns all of them in flat storage with O(1)
//! id lookup via a HashMap index. Child lists and the parent link hold ids.
//!
//! Delta payloads are either loaded in memory or flushed to a [`Pack`];
//! flushing never changes comparisons or the revision hash.
//!
//! Author: Moroya Sakamoto

use std::collections::{HashMap, VecDeque};

use log::{debug, warn};
use uuid::Uuid;

use crate::delta::{Delta, DeltaEntry};
use crate::diff::Diff;
use crate::error::{Result, VcsError};
use crate::ids::{Clock, IdGenerator};
use crate::node::{fnv1a, fnv1a_start, SerializedNode};
use crate::pack::{Pack, PackKey};
use crate::snapshot::Snapshot;
use crate::tracked::TrackedItemState;

// ── Serialization keys ─────────────────────────────────────────────────

const TAG_TREE: &str = "revisions";
const TAG_REVISION: &str = "revision";
const TAG_ITEM: &str = "item";
const KEY_ID: &str = "id";
const KEY_MESSAGE: &str = "message";
const KEY_TIMESTAMP: &str = "timestamp";
const KEY_VERSION: &str = "version";
const KEY_TYPE: &str = "type";
const KEY_NAME: &str = "name";
const KEY_LOGIC: &str = "logic";
const KEY_DELTA_ID: &str = "deltaId";
const KEY_ROOT: &str = "root";
const KEY_PARENT: &str = "parent";

fn parse_uuid(node: &SerializedNode, key: &str) -> Option<Uuid> {
    Uuid::parse_str(node.get_str(key, "")).ok()
}

// ── Stored delta ───────────────────────────────────────────────────────

/// Where a stored delta's data lives
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Loaded(SerializedNode),
    /// Held by the pack under (item id, delta id)
    Flushed,
}

/// A committed delta with its own id
#[derive(Debug, Clone)]
pub struct StoredDelta {
    id: Uuid,
    delta: Delta,
    payload: Payload,
}

impl StoredDelta {
    pub fn new(id: Uuid, delta: Delta, data: SerializedNode) -> Self {
        Self {
            id,
            delta,
            payload: Payload::Loaded(data),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn delta(&self) -> &Delta {
        &self.delta
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn is_flushed(&self) -> bool {
        matches!(self.payload, Payload::Flushed)
    }

    /// Loaded data, if any
    pub fn data(&self) -> Option<&SerializedNode> {
        match &self.payload {
            Payload::Loaded(node) => Some(node),
            Payload::Flushed => None,
        }
    }

    /// Fetch a flushed payload back into memory
    pub fn load_payload(&mut self, item: Uuid, pack: &Pack) -> Result<&SerializedNode> {
        if self.is_flushed() {
            let node = pack.get(PackKey::new(item, self.id))?;
            self.payload = Payload::Loaded(node);
        }
        match &self.payload {
            Payload::Loaded(node) => Ok(node),
            Payload::Flushed => Err(VcsError::MissingPayload {
                item,
                delta: self.id,
            }),
        }
    }

    /// Copy of the data, reading through the pack when flushed
    pub fn read_payload(&self, item: Uuid, pack: &Pack) -> Result<SerializedNode> {
        match &self.payload {
            Payload::Loaded(node) => Ok(node.clone()),
            Payload::Flushed => pack.get(PackKey::new(item, self.id)),
        }
    }

    /// Move loaded data into the pack
    pub fn flush(&mut self, item: Uuid, pack: &mut Pack) {
        if let Payload::Loaded(node) = &self.payload {
            pack.set(PackKey::new(item, self.id), node);
            self.payload = Payload::Flushed;
        }
    }
}

/// Payloads are only compared when both sides hold them in memory, so
/// flushing a delta never changes equality.
impl PartialEq for StoredDelta {
    fn eq(&self, other: &Self) -> bool {
        if self.id != other.id || self.delta != other.delta {
            return false;
        }
        match (&self.payload, &other.payload) {
            (Payload::Loaded(a), Payload::Loaded(b)) => a == b,
            _ => true,
        }
    }
}

// ── Revision item ──────────────────────────────────────────────────────

/// What happened to a tracked item in a revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Added,
    Removed,
    Changed,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Added => "added",
            ItemType::Removed => "removed",
            ItemType::Changed => "changed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "added" => Some(ItemType::Added),
            "removed" => Some(ItemType::Removed),
            "changed" => Some(ItemType::Changed),
            _ => None,
        }
    }
}

/// Per tracked item record inside a revision
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionItem {
    vcs_id: Uuid,
    item_type: ItemType,
    name: String,
    logic: String,
    deltas: Vec<StoredDelta>,
}

impl RevisionItem {
    pub fn new(vcs_id: Uuid, item_type: ItemType, name: &str, logic: &str) -> Self {
        Self {
            vcs_id,
            item_type,
            name: String::from(name),
            logic: String::from(logic),
            deltas: Vec::new(),
        }
    }

    /// Fold a diff (or merge result) into a record; every delta gets a fresh id
    pub fn from_diff(
        vcs_id: Uuid,
        item_type: ItemType,
        name: &str,
        logic: &str,
        diff: Diff,
        ids: &dyn IdGenerator,
    ) -> Self {
        let mut item = Self::new(vcs_id, item_type, name, logic);
        for entry in diff {
            item.push_delta(ids.next_id(), entry.delta, entry.data);
        }
        item
    }

    pub fn push_delta(&mut self, id: Uuid, delta: Delta, data: SerializedNode) {
        self.deltas.push(StoredDelta::new(id, delta, data));
    }

    pub fn vcs_id(&self) -> Uuid {
        self.vcs_id
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn logic(&self) -> &str {
        &self.logic
    }

    pub fn deltas(&self) -> &[StoredDelta] {
        &self.deltas
    }

    pub fn deltas_mut(&mut self) -> &mut [StoredDelta] {
        &mut self.deltas
    }

    pub fn load_payloads(&mut self, pack: &Pack) -> Result<()> {
        let item = self.vcs_id;
        for d in &mut self.deltas {
            d.load_payload(item, pack)?;
        }
        Ok(())
    }

    /// All deltas with data, reading flushed payloads through the pack
    pub fn state(&self, pack: &Pack) -> Result<TrackedItemState> {
        self.deltas
            .iter()
            .map(|d| -> Result<DeltaEntry> {
                let data = d.read_payload(self.vcs_id, pack)?;
                Ok(DeltaEntry::new(d.delta.clone(), data))
            })
            .collect::<Result<Vec<_>>>()
            .map(TrackedItemState::from_entries)
    }

    fn flush(&mut self, pack: &mut Pack) {
        let item = self.vcs_id;
        for d in &mut self.deltas {
            d.flush(item, pack);
        }
    }

    fn serialize(&self, pack: &Pack) -> Result<SerializedNode> {
        let mut node = SerializedNode::new(TAG_ITEM)
            .with_property(KEY_ID, self.vcs_id.to_string())
            .with_property(KEY_TYPE, self.item_type.as_str())
            .with_property(KEY_NAME, self.name.as_str())
            .with_property(KEY_LOGIC, self.logic.as_str());
        for d in &self.deltas {
            let mut delta_node = d.delta.to_node();
            delta_node.set_property(KEY_DELTA_ID, d.id.to_string());
            delta_node.append_child(d.read_payload(self.vcs_id, pack)?);
            node.append_child(delta_node);
        }
        Ok(node)
    }

    /// `None` when the node lacks an id or a type
    fn deserialize(node: &SerializedNode) -> Option<Self> {
        let vcs_id = parse_uuid(node, KEY_ID)?;
        let item_type = ItemType::parse(node.get_str(KEY_TYPE, ""))?;
        let mut item = Self::new(
            vcs_id,
            item_type,
            node.get_str(KEY_NAME, ""),
            node.get_str(KEY_LOGIC, ""),
        );
        for child in node.children().iter().filter(|c| Delta::is_delta_node(c)) {
            let (Some(id), Some(delta)) = (parse_uuid(child, KEY_DELTA_ID), Delta::from_node(child))
            else {
                warn!("event=deserialize_skip module=revision item={} node=delta", vcs_id);
                continue;
            };
            let data = child
                .children()
                .first()
                .cloned()
                .unwrap_or_else(|| SerializedNode::new(delta.kind().as_str()));
            item.push_delta(id, delta, data);
        }
        Some(item)
    }
}

// ── Revision ───────────────────────────────────────────────────────────

/// Commit node
#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    id: Uuid,
    message: String,
    timestamp_ms: i64,
    version: i64,
    items: Vec<RevisionItem>,
    children: Vec<Uuid>,
    parent: Option<Uuid>,
}

impl Revision {
    pub fn new(message: &str, ids: &dyn IdGenerator, clock: &dyn Clock) -> Self {
        Self::with_id(ids.next_id(), message, clock.now_ms())
    }

    pub fn with_id(id: Uuid, message: &str, timestamp_ms: i64) -> Self {
        Self {
            id,
            message: String::from(message),
            timestamp_ms,
            version: 1,
            items: Vec::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn parent(&self) -> Option<Uuid> {
        self.parent
    }

    pub fn children(&self) -> &[Uuid] {
        &self.children
    }

    pub fn items(&self) -> &[RevisionItem] {
        &self.items
    }

    pub fn item(&self, vcs_id: Uuid) -> Option<&RevisionItem> {
        self.items.iter().find(|i| i.vcs_id == vcs_id)
    }

    /// Add a record; a record with the same item id is replaced in place
    pub fn add_item(&mut self, item: RevisionItem) {
        match self.items.iter_mut().find(|i| i.vcs_id == item.vcs_id) {
            Some(slot) => *slot = item,
            None => self.items.push(item),
        }
    }

    pub fn with_item(mut self, item: RevisionItem) -> Self {
        self.add_item(item);
        self
    }

    /// Drop items and children; identity and message stay
    pub fn reset(&mut self) {
        self.items.clear();
        self.children.clear();
    }

    /// Replace all items with copies of `src`'s.
    ///
    /// Same pack: flushed payloads stay flushed. Different packs: every
    /// payload is read from `src_pack` and held in memory.
    pub fn copy_properties(&mut self, src: &Revision, src_pack: &Pack, dst_pack: &Pack) -> Result<()> {
        if src_pack.id() == dst_pack.id() {
            self.items = src.items.clone();
            return Ok(());
        }
        let mut items = Vec::with_capacity(src.items.len());
        for item in &src.items {
            let mut copy = item.clone();
            copy.load_payloads(src_pack)?;
            items.push(copy);
        }
        self.items = items;
        Ok(())
    }

    /// FNV-1a over sorted stored-delta ids, a count separator, then sorted
    /// child ids
    pub fn calculate_hash(&self) -> u64 {
        let mut delta_ids: Vec<Uuid> = self
            .items
            .iter()
            .flat_map(|i| i.deltas.iter().map(StoredDelta::id))
            .collect();
        delta_ids.sort();
        let mut child_ids = self.children.clone();
        child_ids.sort();

        let mut h = fnv1a_start();
        for id in &delta_ids {
            fnv1a(&mut h, id.as_bytes());
        }
        fnv1a(&mut h, &(delta_ids.len() as u64).to_le_bytes());
        for id in &child_ids {
            fnv1a(&mut h, id.as_bytes());
        }
        h
    }

    /// Move every loaded payload into the pack
    pub fn flush(&mut self, pack: &mut Pack) {
        for item in &mut self.items {
            item.flush(pack);
        }
        debug!("event=revision_flush module=revision id={} records={}", self.id, pack.len());
    }

    pub fn load_payloads(&mut self, pack: &Pack) -> Result<()> {
        for item in &mut self.items {
            item.load_payloads(pack)?;
        }
        Ok(())
    }

    /// Own fields and items, without children
    pub(crate) fn serialize_shallow(&self, pack: &Pack) -> Result<SerializedNode> {
        let mut node = SerializedNode::new(TAG_REVISION)
            .with_property(KEY_ID, self.id.to_string())
            .with_property(KEY_MESSAGE, self.message.as_str())
            .with_property(KEY_TIMESTAMP, self.timestamp_ms)
            .with_property(KEY_VERSION, self.version);
        for item in &self.items {
            node.append_child(item.serialize(pack)?);
        }
        Ok(node)
    }

    pub(crate) fn deserialize_shallow(node: &SerializedNode) -> Option<Self> {
        if !node.has_type(TAG_REVISION) {
            return None;
        }
        let id = parse_uuid(node, KEY_ID)?;
        let mut revision = Self::with_id(id, node.get_str(KEY_MESSAGE, ""), node.get_i64(KEY_TIMESTAMP, 0));
        revision.version = node.get_i64(KEY_VERSION, 1);
        for child in node.children_with_type(TAG_ITEM) {
            match RevisionItem::deserialize(child) {
                Some(item) => revision.add_item(item),
                None => warn!("event=deserialize_skip module=revision revision={} node=item", id),
            }
        }
        Some(revision)
    }
}

// ── Revision tree ──────────────────────────────────────────────────────

/// Revision tree: flat storage with O(1) id lookup
#[derive(Debug, Clone)]
pub struct RevisionTree {
    revisions: Vec<Revision>,
    index: HashMap<Uuid, usize>,
}

impl RevisionTree {
    pub fn new(mut root: Revision) -> Self {
        root.parent = None;
        let mut index = HashMap::new();
        index.insert(root.id, 0);
        Self {
            revisions: vec![root],
            index,
        }
    }

    pub fn root(&self) -> &Revision {
        &self.revisions[0]
    }

    pub fn root_id(&self) -> Uuid {
        self.revisions[0].id
    }

    /// Attach `child` under `parent`
    pub fn add_child(&mut self, parent: Uuid, mut child: Revision) -> Result<Uuid> {
        let parent_pos = *self.index.get(&parent).ok_or(VcsError::RevisionNotFound(parent))?;
        if self.index.contains_key(&child.id) {
            return Err(VcsError::DuplicateRevision(child.id));
        }
        let id = child.id;
        child.parent = Some(parent);
        self.revisions[parent_pos].children.push(id);
        self.index.insert(id, self.revisions.len());
        self.revisions.push(child);
        debug!("event=revision_add module=revision id={} parent={}", id, parent);
        Ok(id)
    }

    /// Get revision by ID (O(1) via HashMap index)
    pub fn find(&self, id: Uuid) -> Option<&Revision> {
        self.index.get(&id).map(|&i| &self.revisions[i])
    }

    /// Drop a revision's items; its place in the tree stays
    pub fn clear_items(&mut self, id: Uuid) -> Result<()> {
        let pos = *self.index.get(&id).ok_or(VcsError::RevisionNotFound(id))?;
        self.revisions[pos].items.clear();
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<&Revision> {
        self.find(id).ok_or(VcsError::RevisionNotFound(id))
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.index.contains_key(&id)
    }

    pub fn parent_of(&self, id: Uuid) -> Option<&Revision> {
        self.find(id)?.parent.and_then(|p| self.find(p))
    }

    pub fn children_of(&self, id: Uuid) -> Vec<&Revision> {
        self.find(id)
            .map(|r| r.children.iter().filter_map(|c| self.find(*c)).collect())
            .unwrap_or_default()
    }

    /// Revision ids from the root down to `id`, inclusive
    pub fn path_to(&self, id: Uuid) -> Result<Vec<Uuid>> {
        let mut path = vec![id];
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent {
            path.push(parent);
            current = self.get(parent)?;
        }
        path.reverse();
        Ok(path)
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    /// A tree always holds its root
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Revision> {
        self.revisions.iter()
    }

    pub fn calculate_hash(&self, id: Uuid) -> Result<u64> {
        Ok(self.get(id)?.calculate_hash())
    }

    /// Flush every revision's loaded payloads into the pack
    pub fn flush(&mut self, pack: &mut Pack) {
        for revision in &mut self.revisions {
            revision.flush(pack);
        }
    }

    /// Revision and its subtree as one flat node.
    ///
    /// Revisions are listed breadth-first under a `revisions` node that
    /// names the subtree root; every other revision carries its parent id.
    /// Flushed payloads are read through the pack.
    pub fn serialize(&self, id: Uuid, pack: &Pack) -> Result<SerializedNode> {
        let root = self.get(id)?;
        let mut node = SerializedNode::new(TAG_TREE).with_property(KEY_ROOT, id.to_string());
        node.append_child(root.serialize_shallow(pack)?);

        let mut queue: VecDeque<Uuid> = root.children.iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            let revision = self.get(current)?;
            let mut revision_node = revision.serialize_shallow(pack)?;
            if let Some(parent) = revision.parent {
                revision_node.set_property(KEY_PARENT, parent.to_string());
            }
            node.append_child(revision_node);
            queue.extend(revision.children.iter().copied());
        }
        Ok(node)
    }

    /// Rebuild a tree from a serialized subtree.
    ///
    /// Invalid revisions are skipped, and so is everything below them.
    pub fn deserialize(node: &SerializedNode) -> Result<Self> {
        if !node.has_type(TAG_TREE) {
            return Err(VcsError::UnexpectedNode {
                expected: TAG_TREE,
                found: String::from(node.tag()),
            });
        }
        let root_id = parse_uuid(node, KEY_ROOT).ok_or_else(|| VcsError::UnexpectedNode {
            expected: TAG_TREE,
            found: String::from("revisions without a root id"),
        })?;

        let mut root = None;
        let mut pending: HashMap<Uuid, Vec<Revision>> = HashMap::new();
        for child in node.children_with_type(TAG_REVISION) {
            let Some(revision) = Revision::deserialize_shallow(child) else {
                warn!("event=deserialize_skip module=revision node=revision reason=invalid");
                continue;
            };
            if revision.id == root_id && root.is_none() {
                root = Some(revision);
                continue;
            }
            match parse_uuid(child, KEY_PARENT) {
                Some(parent) => pending.entry(parent).or_default().push(revision),
                None => warn!(
                    "event=deserialize_skip module=revision revision={} reason=no_parent",
                    revision.id
                ),
            }
        }

        let root = root.ok_or(VcsError::RevisionNotFound(root_id))?;
        let mut tree = Self::new(root);
        tree.attach_pending(root_id, &mut pending);
        for orphan in pending.values().flatten() {
            warn!(
                "event=deserialize_skip module=revision revision={} reason=unreachable",
                orphan.id
            );
        }
        Ok(tree)
    }

    /// Attach every pending revision reachable from `start`, breadth-first
    fn attach_pending(&mut self, start: Uuid, pending: &mut HashMap<Uuid, Vec<Revision>>) {
        let mut queue = VecDeque::from([start]);
        while let Some(parent) = queue.pop_front() {
            for revision in pending.remove(&parent).unwrap_or_default() {
                match self.add_child(parent, revision) {
                    Ok(id) => queue.push_back(id),
                    Err(err) => warn!("event=deserialize_skip module=revision parent={} error={}", parent, err),
                }
            }
        }
    }

    /// Graft another tree under `parent`.
    ///
    /// The subtree must not share revision ids with this tree; nothing is
    /// attached when it does.
    pub fn append_subtree(&mut self, parent: Uuid, subtree: RevisionTree) -> Result<()> {
        self.get(parent)?;
        if let Some(dup) = subtree.iter().map(Revision::id).find(|id| self.contains(*id)) {
            return Err(VcsError::DuplicateRevision(dup));
        }
        let subtree_root = subtree.root_id();
        let mut pending: HashMap<Uuid, Vec<Revision>> = HashMap::new();
        for mut revision in subtree.revisions {
            let link = revision.parent.unwrap_or(parent);
            revision.children.clear();
            pending.entry(link).or_default().push(revision);
        }
        self.attach_pending(parent, &mut pending);
        debug!(
            "event=subtree_append module=revision parent={} root={} total={}",
            parent,
            subtree_root,
            self.len()
        );
        Ok(())
    }

    /// Head state at `id`: replay every revision from the root
    pub fn checkout(&self, id: Uuid, pack: &Pack) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new();
        for step in self.path_to(id)? {
            snapshot.apply_revision(self.get(step)?, pack)?;
        }
        Ok(snapshot)
    }
}
