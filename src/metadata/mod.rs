//! Metadata Module
//!
//! Small string → string tables attached to a container and to each record.
//!
//! ## Block Format
//! ```text
//! ┌────────────┬────────────┬──────────────┬────────────────┐
//! │ KeyLen (1) │ ValLen (1) │ Key (KeyLen) │ Value (ValLen) │
//! └────────────┴────────────┴──────────────┴────────────────┘
//! ... repeated for each entry, count stored by the owner ...
//! ```
//!
//! Strings use the modified UTF-8 encoding in [`mutf8`]. Lengths are the
//! encoded byte counts, so no key or value may encode to more than 255 bytes.

pub mod mutf8;

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::io::Read;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PadError, Result};

/// Longest key or value, in characters and in encoded bytes
pub const MAX_STRING_LEN: usize = 255;

/// A unique-key string table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataTable {
    tags: BTreeMap<String, String>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a tag, returning the value it replaced
    ///
    /// The key must contain something other than whitespace. Key and value
    /// are truncated to 255 characters, and further if their encoding would
    /// still exceed 255 bytes.
    pub fn put(&mut self, key: &str, value: &str) -> Result<Option<String>> {
        if key.trim().is_empty() {
            return Err(PadError::InvalidArgument(
                "Metadata key cannot be empty or whitespace".to_string(),
            ));
        }
        Ok(self.tags.insert(truncate(key), truncate(value)))
    }

    /// Store a tag whose value may be absent; `None` is stored as ""
    pub fn put_optional(&mut self, key: &str, value: Option<&str>) -> Result<Option<String>> {
        self.put(key, value.unwrap_or(""))
    }

    /// Store every pair, stopping at the first invalid key
    pub fn put_all<I, K, V>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (k, v) in pairs {
            self.put(k.as_ref(), v.as_ref())?;
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.tags.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }

    /// Iterate tags in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn clear(&mut self) {
        self.tags.clear();
    }

    /// Size of the encoded block in bytes
    pub fn encoded_len(&self) -> usize {
        self.tags
            .iter()
            .map(|(k, v)| 2 + mutf8::encoded_len(k) + mutf8::encoded_len(v))
            .sum()
    }

    /// Encode every tag back-to-back
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        let mut scratch = Vec::with_capacity(2 * MAX_STRING_LEN);

        for (key, value) in &self.tags {
            scratch.clear();
            mutf8::encode_into(key, &mut scratch);
            let key_len = scratch.len();
            mutf8::encode_into(value, &mut scratch);
            let value_len = scratch.len() - key_len;

            // put() keeps both encodings within a length byte
            buf.put_u8(key_len as u8);
            buf.put_u8(value_len as u8);
            buf.put_slice(&scratch);
        }
        buf.freeze()
    }

    /// Read `count` entries from a reader positioned at the start of a block
    pub fn read_from<R: Read>(reader: &mut R, count: usize) -> Result<Self> {
        let mut tags = BTreeMap::new();
        let mut lens = [0u8; 2];
        let mut raw = [0u8; MAX_STRING_LEN];

        for i in 0..count {
            reader.read_exact(&mut lens)?;
            let (key_len, value_len) = (lens[0] as usize, lens[1] as usize);

            reader.read_exact(&mut raw[..key_len])?;
            let key = mutf8::decode(&raw[..key_len]).map_err(|e| annotate(e, i, "key"))?;

            reader.read_exact(&mut raw[..value_len])?;
            let value = mutf8::decode(&raw[..value_len]).map_err(|e| annotate(e, i, "value"))?;

            tags.insert(key, value);
        }

        Ok(Self { tags })
    }

    /// Decode `count` entries from the start of `buf`
    pub fn decode(mut buf: &[u8], count: usize) -> Result<Self> {
        Self::read_from(&mut buf, count)
    }
}

impl<'a> IntoIterator for &'a MetadataTable {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

fn truncate(s: &str) -> String {
    let mut out: String = s.chars().take(MAX_STRING_LEN).collect();
    while mutf8::encoded_len(&out) > MAX_STRING_LEN {
        out.pop();
    }
    out
}

fn annotate(err: PadError, entry: usize, field: &str) -> PadError {
    match err {
        PadError::CorruptedMetadata(msg) => {
            PadError::CorruptedMetadata(format!("entry {} {}: {}", entry, field, msg))
        }
        other => other,
    }
}
