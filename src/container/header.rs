//! Container header
//!
//! The fixed 42-byte block at offset 0 that locates every other block.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{PadError, Result};

/// Magic number: "PADB"
pub const MAGIC: u32 = 0x5041_4442;

/// The only format version this crate reads and writes
pub const FORMAT_VERSION: u32 = 3;

/// Magic (4) + Version (4) + 3 × (Offset (8) + Count) where the counts are
/// 4, 4 and 2 bytes = 42 bytes
pub const HEADER_SIZE: u64 = 42;

/// Decoded version-3 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub index_offset: u64,
    pub index_count: u32,
    pub hole_offset: u64,
    pub hole_count: u32,
    pub metadata_offset: u64,
    pub metadata_count: u16,
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE as usize);
        buf.put_u32(MAGIC); //                 0x00
        buf.put_u32(self.version); //          0x04
        buf.put_u64(self.index_offset); //     0x08
        buf.put_u32(self.index_count); //      0x10
        buf.put_u64(self.hole_offset); //      0x14
        buf.put_u32(self.hole_count); //       0x1C
        buf.put_u64(self.metadata_offset); //  0x20
        buf.put_u16(self.metadata_count); //   0x28

        let mut out = [0u8; HEADER_SIZE as usize];
        out.copy_from_slice(&buf);
        out
    }

    /// Parse a header, rejecting a wrong magic number or an unknown version
    pub fn decode(raw: &[u8; HEADER_SIZE as usize]) -> Result<Self> {
        let mut buf = &raw[..];

        let magic = buf.get_u32();
        if magic != MAGIC {
            return Err(PadError::InvalidMagic {
                expected: MAGIC,
                found: magic,
            });
        }

        let version = buf.get_u32();
        if version != FORMAT_VERSION {
            return Err(PadError::UnsupportedVersion(version));
        }

        Ok(Self {
            version,
            index_offset: buf.get_u64(),
            index_count: buf.get_u32(),
            hole_offset: buf.get_u64(),
            hole_count: buf.get_u32(),
            metadata_offset: buf.get_u64(),
            metadata_count: buf.get_u16(),
        })
    }
}
