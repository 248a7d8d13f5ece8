//! Compression codec registry
//!
//! A record's compression type is a small integer looked up here. Only the
//! identity codec (id 0, "store") exists; every other id fails closed with
//! `UnsupportedCompression` instead of passing data through untouched.

use bytes::Bytes;

use crate::error::{PadError, Result};

/// Compression type of the identity codec
pub const STORE: u16 = 0;

type EncodeFn = fn(&Bytes) -> Result<Bytes>;
type DecodeFn = fn(&Bytes, usize) -> Result<Bytes>;

/// An encode/decode pair registered under a compression id
pub struct Codec {
    id: u16,
    name: &'static str,
    encode: EncodeFn,
    decode: DecodeFn,
}

static REGISTRY: &[Codec] = &[Codec {
    id: STORE,
    name: "store",
    encode: store_encode,
    decode: store_decode,
}];

/// Find the codec for a compression id
pub fn lookup(id: u16) -> Result<&'static Codec> {
    REGISTRY
        .iter()
        .find(|c| c.id == id)
        .ok_or(PadError::UnsupportedCompression(id))
}

/// Whether a compression id has a registered codec
pub fn is_supported(id: u16) -> bool {
    REGISTRY.iter().any(|c| c.id == id)
}

impl Codec {
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// In-memory bytes → on-disk bytes
    pub fn encode(&self, data: &Bytes) -> Result<Bytes> {
        (self.encode)(data)
    }

    /// On-disk bytes → in-memory bytes of the given decompressed size
    pub fn decode(&self, data: &Bytes, decompressed_size: usize) -> Result<Bytes> {
        (self.decode)(data, decompressed_size)
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

fn store_encode(data: &Bytes) -> Result<Bytes> {
    Ok(data.clone())
}

fn store_decode(data: &Bytes, _decompressed_size: usize) -> Result<Bytes> {
    Ok(data.clone())
}
