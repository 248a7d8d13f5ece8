//! Record index
//!
//! Key → (offset, size) mappings for committed records.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::key::Key;

use super::ensure_len;

/// Encoded size of one index entry: key (16) + offset (8) + size (8)
pub const INDEX_ENTRY_SIZE: usize = 32;

/// Offset/size of an entry that has not been written yet
pub const UNASSIGNED: u64 = u64::MAX;

/// Location of one record inside the container file
///
/// Equality and hashing look at the key only, so two entries for the same
/// key are "the same entry" regardless of where they point.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    key: Key,
    offset: u64,
    size: u64,
    /// Set by `Container::put`, cleared once the entry has been written
    dirty: bool,
}

impl IndexEntry {
    /// A new entry for `key`; offset and size are filled in by save
    pub fn new(key: Key) -> Self {
        Self {
            key,
            offset: UNASSIGNED,
            size: UNASSIGNED,
            dirty: false,
        }
    }

    /// An entry with a known location (as read from disk)
    pub fn with_location(key: Key, offset: u64, size: u64) -> Self {
        Self {
            key,
            offset,
            size,
            dirty: false,
        }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    /// Byte offset of the record inside the file
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// On-disk payload size of the record
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    pub(crate) fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.key.to_be_bytes());
        buf.put_u64(self.offset);
        buf.put_u64(self.size);
    }

    fn decode_from(buf: &mut &[u8]) -> Self {
        let type_id = buf.get_u32();
        let group_id = buf.get_u32();
        let instance_id = buf.get_u64();
        let offset = buf.get_u64();
        let size = buf.get_u64();
        Self::with_location(Key::new(type_id, group_id, instance_id), offset, size)
    }
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for IndexEntry {}

impl Hash for IndexEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// Unique-by-key collection of index entries
///
/// Cloning produces an independent deep copy; the container relies on this
/// to keep its working and persisted indexes from sharing entries.
#[derive(Debug, Clone, Default)]
pub struct Index {
    entries: BTreeMap<Key, IndexEntry>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the entry for a key
    pub fn get(&self, key: &Key) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &Key) -> Option<&mut IndexEntry> {
        self.entries.get_mut(key)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace the entry for its key (last write wins)
    ///
    /// Returns the entry that was replaced, if any.
    pub fn upsert(&mut self, entry: IndexEntry) -> Option<IndexEntry> {
        self.entries.insert(entry.key, entry)
    }

    pub fn remove(&mut self, key: &Key) -> Option<IndexEntry> {
        self.entries.remove(key)
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Size of the encoded block in bytes
    pub fn byte_size(&self) -> u64 {
        (self.entries.len() * INDEX_ENTRY_SIZE) as u64
    }

    /// Encode all entries back-to-back
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.entries.len() * INDEX_ENTRY_SIZE);
        for entry in self.entries.values() {
            entry.encode_into(&mut buf);
        }
        buf.freeze()
    }

    /// Decode `count` entries from the start of `buf`
    ///
    /// A key that appears twice keeps its last occurrence.
    pub fn decode(mut buf: &[u8], count: usize) -> Result<Self> {
        ensure_len(buf, count * INDEX_ENTRY_SIZE, "Index")?;

        let mut index = Self::new();
        for _ in 0..count {
            index.upsert(IndexEntry::decode_from(&mut buf));
        }
        Ok(index)
    }
}

impl<'a> IntoIterator for &'a Index {
    type Item = &'a IndexEntry;
    type IntoIter = std::collections::btree_map::Values<'a, Key, IndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}
