//! Delta payload pack
//!
//! Flushed delta payloads live here as encoded records keyed by
//! `(item id, delta id)`. A revision that has been flushed keeps only the
//! delta metadata and fetches the payload back on demand.
//!
//! Author: Moroya Sakamoto

use std::collections::HashMap;

use log::debug;
use uuid::Uuid;

use crate::codec::{decode_node, encode_node};
use crate::error::{Result, VcsError};
use crate::ids::IdGenerator;
use crate::node::SerializedNode;

/// Record key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackKey {
    pub item: Uuid,
    pub delta: Uuid,
}

impl PackKey {
    pub fn new(item: Uuid, delta: Uuid) -> Self {
        Self { item, delta }
    }
}

/// Payload store (O(1) lookup via HashMap)
#[derive(Debug)]
pub struct Pack {
    id: Uuid,
    records: HashMap<PackKey, Vec<u8>>,
}

impl Pack {
    pub fn new(ids: &dyn IdGenerator) -> Self {
        Self::with_id(ids.next_id())
    }

    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            records: HashMap::new(),
        }
    }

    /// Identity; two handles with the same id are the same store
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Encode and store a payload, replacing any previous record
    pub fn set(&mut self, key: PackKey, data: &SerializedNode) {
        let bytes = encode_node(data);
        debug!(
            "event=pack_set module=pack item={} delta={} bytes={}",
            key.item,
            key.delta,
            bytes.len()
        );
        self.records.insert(key, bytes);
    }

    /// Decode a stored payload
    pub fn get(&self, key: PackKey) -> Result<SerializedNode> {
        let bytes = self.records.get(&key).ok_or(VcsError::MissingPayload {
            item: key.item,
            delta: key.delta,
        })?;
        Ok(decode_node(bytes)?)
    }

    pub fn contains(&self, key: PackKey) -> bool {
        self.records.contains_key(&key)
    }

    /// Remove a record. Returns `true` if it existed.
    pub fn remove(&mut self, key: PackKey) -> bool {
        self.records.remove(&key).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All record keys, sorted
    pub fn keys(&self) -> Vec<PackKey> {
        let mut keys: Vec<PackKey> = self.records.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Encoded size of all records
    pub fn size_bytes(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    fn key(item: u128, delta: u128) -> PackKey {
        PackKey::new(Uuid::from_u128(item), Uuid::from_u128(delta))
    }

    fn payload() -> SerializedNode {
        SerializedNode::new("trackColour").with_property("value", "ff0000")
    }

    #[test]
    fn test_set_and_get() {
        let mut pack = Pack::with_id(Uuid::from_u128(99));
        pack.set(key(1, 2), &payload());
        assert!(pack.contains(key(1, 2)));
        assert_eq!(pack.get(key(1, 2)).unwrap(), payload());
        assert_eq!(pack.len(), 1);
    }

    #[test]
    fn test_missing_record_is_error() {
        let pack = Pack::with_id(Uuid::from_u128(99));
        assert!(matches!(
            pack.get(key(1, 2)),
            Err(VcsError::MissingPayload { .. })
        ));
    }

    #[test]
    fn test_set_replaces() {
        let mut pack = Pack::with_id(Uuid::nil());
        pack.set(key(1, 1), &payload());
        pack.set(key(1, 1), &SerializedNode::new("x"));
        assert_eq!(pack.len(), 1);
        assert!(pack.get(key(1, 1)).unwrap().has_type("x"));
    }

    #[test]
    fn test_remove_and_keys() {
        let mut pack = Pack::with_id(Uuid::nil());
        pack.set(key(2, 1), &payload());
        pack.set(key(1, 1), &payload());
        assert_eq!(pack.keys(), vec![key(1, 1), key(2, 1)]);
        assert!(pack.remove(key(1, 1)));
        assert!(!pack.remove(key(1, 1)));
        assert_eq!(pack.len(), 1);
    }

    #[test]
    fn test_corrupt_record_surfaces_codec_error() {
        let mut pack = Pack::with_id(Uuid::nil());
        pack.records.insert(key(1, 1), vec![0x05, b'a']);
        assert!(matches!(
            pack.get(key(1, 1)),
            Err(VcsError::Codec(CodecError::Truncated(_)))
        ));
    }

    #[test]
    fn test_size_bytes_tracks_records() {
        let mut pack = Pack::with_id(Uuid::nil());
        assert_eq!(pack.size_bytes(), 0);
        pack.set(key(1, 1), &SerializedNode::new("x"));
        assert_eq!(pack.size_bytes(), 4);
    }
}
