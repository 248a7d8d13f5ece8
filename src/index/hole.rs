//! Hole index
//!
//! Free byte ranges inside a container file. Holes are persisted and can be
//! compacted, but the save path never allocates from them.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Result;

use super::ensure_len;

/// Encoded size of one hole entry: offset (8) + size (8)
pub const HOLE_ENTRY_SIZE: usize = 16;

/// One free byte range
///
/// Identity is the offset alone: two holes starting at the same offset are
/// the same hole whatever their recorded sizes.
#[derive(Debug, Clone, Copy)]
pub struct HoleIndexEntry {
    offset: u64,
    size: u64,
}

impl HoleIndexEntry {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// First byte past the hole
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

impl PartialEq for HoleIndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
    }
}

impl Eq for HoleIndexEntry {}

impl Hash for HoleIndexEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.offset.hash(state);
    }
}

/// Unique-by-offset set of holes
#[derive(Debug, Clone, Default)]
pub struct HoleIndex {
    entries: BTreeMap<u64, HoleIndexEntry>,
}

impl HoleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hole
    ///
    /// Returns false (and keeps the existing hole) if a hole is already
    /// recorded at the same offset.
    pub fn add(&mut self, hole: HoleIndexEntry) -> bool {
        if self.entries.contains_key(&hole.offset) {
            return false;
        }
        self.entries.insert(hole.offset, hole);
        true
    }

    /// Remove the hole starting at `offset`
    pub fn remove(&mut self, offset: u64) -> Option<HoleIndexEntry> {
        self.entries.remove(&offset)
    }

    pub fn get(&self, offset: u64) -> Option<&HoleIndexEntry> {
        self.entries.get(&offset)
    }

    /// Iterate holes in offset order
    pub fn iter(&self) -> impl Iterator<Item = &HoleIndexEntry> {
        self.entries.values()
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

    /// Total bytes covered by recorded holes
    pub fn total_size(&self) -> u64 {
        self.entries
            .values()
            .fold(0u64, |acc, h| acc.saturating_add(h.size))
    }

    /// Size of the encoded block in bytes
    pub fn byte_size(&self) -> u64 {
        (self.entries.len() * HOLE_ENTRY_SIZE) as u64
    }

    /// Merge holes whose ranges touch or overlap
    ///
    /// Walks the holes in offset order. When the next hole starts at or
    /// before the end of the current one, the current hole grows by the next
    /// hole's size; otherwise the current hole is emitted and the next one
    /// starts a new run.
    pub fn compact(&mut self) {
        let mut holes = self.entries.values().copied();
        let mut current = match holes.next() {
            Some(h) => h,
            None => return,
        };

        let mut merged = BTreeMap::new();
        for next in holes {
            if next.offset <= current.end() {
                current.size = current.size.saturating_add(next.size);
            } else {
                merged.insert(current.offset, current);
                current = next;
            }
        }
        merged.insert(current.offset, current);

        tracing::debug!(
            "Compacted hole index: {} -> {} holes",
            self.entries.len(),
            merged.len()
        );
        self.entries = merged;
    }

    /// Encode all holes back-to-back
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.entries.len() * HOLE_ENTRY_SIZE);
        for hole in self.entries.values() {
            buf.put_u64(hole.offset);
            buf.put_u64(hole.size);
        }
        buf.freeze()
    }

    /// Decode `count` holes from the start of `buf`
    ///
    /// A repeated offset keeps its first occurrence.
    pub fn decode(mut buf: &[u8], count: usize) -> Result<Self> {
        ensure_len(buf, count * HOLE_ENTRY_SIZE, "Hole index")?;

        let mut holes = Self::new();
        for _ in 0..count {
            let offset = buf.get_u64();
            let size = buf.get_u64();
            holes.add(HoleIndexEntry::new(offset, size));
        }
        Ok(holes)
    }
}

impl FromIterator<HoleIndexEntry> for HoleIndex {
    fn from_iter<I: IntoIterator<Item = HoleIndexEntry>>(iter: I) -> Self {
        let mut holes = Self::new();
        for hole in iter {
            holes.add(hole);
        }
        holes
    }
}
