//! Record Module
//!
//! One stored payload together with its header, digest and metadata.
//!
//! ## Record Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (28 bytes)                                           │
//! │   Compression: u16 (2) | CompressedSize: u32 (4)            │
//! │   DecompressedSize: u32 (4) | Digest (16) | MetaCount: u16  │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Payload (CompressedSize bytes, on-disk form)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Metadata block (MetaCount entries)                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The digest is MD5 over the decompressed payload. An all-zero digest
//! disables verification.

pub mod codec;

use std::io::{self, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PadError, Result};
use crate::metadata::MetadataTable;

/// Fixed part of an encoded record
pub const RECORD_HEADER_SIZE: usize = 28;

/// Length of the payload digest
pub const DIGEST_SIZE: usize = 16;

const ZERO_DIGEST: [u8; DIGEST_SIZE] = [0u8; DIGEST_SIZE];

/// Where a record landed when it was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveInfo {
    /// Offset of the record header
    pub offset: u64,
    /// On-disk payload size, as stored in the index
    pub size: u64,
    /// Total bytes written, header and metadata included
    pub bytes_written: u64,
}

/// One stored payload
#[derive(Debug, Clone)]
pub struct Record {
    compression: u16,
    compressed_size: u32,
    decompressed_size: u32,
    digest: [u8; DIGEST_SIZE],
    metadata: MetadataTable,
    /// Bytes as stored in the file (possibly compressed)
    on_disk: Option<Bytes>,
    /// Decompressed bytes; derived lazily from `on_disk` after a load
    in_memory: Option<Bytes>,
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl Record {
    /// An empty, uncompressed record with no payload
    pub fn new() -> Self {
        Self::with_compression(codec::STORE)
    }

    /// An empty record that will use the given compression type
    ///
    /// The id is only checked when a payload is set or read.
    pub fn with_compression(compression: u16) -> Self {
        Self {
            compression,
            compressed_size: 0,
            decompressed_size: 0,
            digest: ZERO_DIGEST,
            metadata: MetadataTable::new(),
            on_disk: None,
            in_memory: None,
        }
    }

    /// Build an uncompressed record from a payload, with digest
    pub fn from_payload(data: impl Into<Bytes>) -> Result<Self> {
        let mut record = Self::new();
        record.set_payload(data, true)?;
        Ok(record)
    }

    pub fn compression_type(&self) -> u16 {
        self.compression
    }

    pub fn compressed_size(&self) -> u32 {
        self.compressed_size
    }

    pub fn decompressed_size(&self) -> u32 {
        self.decompressed_size
    }

    pub fn digest(&self) -> &[u8; DIGEST_SIZE] {
        &self.digest
    }

    /// False when the digest is all zeros (verification disabled)
    pub fn has_digest(&self) -> bool {
        self.digest != ZERO_DIGEST
    }

    pub fn metadata(&self) -> &MetadataTable {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut MetadataTable {
        &mut self.metadata
    }

    /// Whether the on-disk form is present
    pub fn is_loaded(&self) -> bool {
        self.on_disk.is_some()
    }

    /// The payload as stored in the file, if present
    pub fn raw_payload(&self) -> Option<&Bytes> {
        self.on_disk.as_ref()
    }

    /// Replace the payload
    ///
    /// Stores `data` as the in-memory form, computes the digest when asked
    /// (zeros otherwise) and derives the on-disk form through the record's
    /// codec.
    pub fn set_payload(&mut self, data: impl Into<Bytes>, compute_digest: bool) -> Result<()> {
        let data: Bytes = data.into();
        let codec = codec::lookup(self.compression)?;
        let encoded = codec.encode(&data)?;

        let decompressed_size = u32::try_from(data.len()).map_err(|_| {
            PadError::LimitExceeded(format!("Payload of {} bytes exceeds u32", data.len()))
        })?;
        let compressed_size = u32::try_from(encoded.len()).map_err(|_| {
            PadError::LimitExceeded(format!(
                "Encoded payload of {} bytes exceeds u32",
                encoded.len()
            ))
        })?;

        self.digest = if compute_digest {
            md5::compute(&data).0
        } else {
            ZERO_DIGEST
        };
        self.decompressed_size = decompressed_size;
        self.compressed_size = compressed_size;
        self.on_disk = Some(encoded);
        self.in_memory = Some(data);
        Ok(())
    }

    /// The decompressed payload
    ///
    /// The first call after a load decodes the on-disk bytes and, if a
    /// digest is stored, verifies it. Later calls return the cached bytes.
    pub fn payload(&mut self) -> Result<&Bytes> {
        let on_disk = self.on_disk.as_ref().ok_or(PadError::PayloadNotLoaded)?;

        if self.in_memory.is_none() {
            let codec = codec::lookup(self.compression)?;
            let decoded = codec.decode(on_disk, self.decompressed_size as usize)?;

            if self.has_digest() {
                let actual = md5::compute(&decoded).0;
                if actual != self.digest {
                    return Err(PadError::CorruptedData {
                        expected: hex(&self.digest),
                        actual: hex(&actual),
                    });
                }
            }
            self.in_memory = Some(decoded);
        }

        self.in_memory.as_ref().ok_or(PadError::PayloadNotLoaded)
    }

    /// Total encoded size: header, payload and metadata
    pub fn encoded_len(&self) -> u64 {
        RECORD_HEADER_SIZE as u64 + self.compressed_size as u64 + self.metadata.encoded_len() as u64
    }

    /// Read one record from a reader positioned at its header
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut header = [0u8; RECORD_HEADER_SIZE];
        reader.read_exact(&mut header)?;

        let compression = u16::from_be_bytes([header[0], header[1]]);
        let compressed_size = u32::from_be_bytes([header[2], header[3], header[4], header[5]]);
        let decompressed_size = u32::from_be_bytes([header[6], header[7], header[8], header[9]]);
        let mut digest = ZERO_DIGEST;
        digest.copy_from_slice(&header[10..26]);
        let metadata_count = u16::from_be_bytes([header[26], header[27]]);

        // The size is untrusted: grow the buffer as bytes arrive
        let mut payload = Vec::new();
        reader
            .by_ref()
            .take(compressed_size as u64)
            .read_to_end(&mut payload)?;
        if payload.len() != compressed_size as usize {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Record payload truncated: expected {} bytes, got {}",
                    compressed_size,
                    payload.len()
                ),
            )
            .into());
        }

        let metadata = MetadataTable::read_from(reader, metadata_count as usize)?;

        Ok(Self {
            compression,
            compressed_size,
            decompressed_size,
            digest,
            metadata,
            on_disk: Some(Bytes::from(payload)),
            in_memory: None,
        })
    }

    /// Write the record at the writer's current position
    ///
    /// `offset` is that position; it is echoed back in the returned
    /// [`SaveInfo`] so the caller can update the owning index entry.
    pub fn write_to<W: Write>(&self, writer: &mut W, offset: u64) -> Result<SaveInfo> {
        let payload = self.on_disk.as_ref().ok_or(PadError::PayloadNotLoaded)?;
        let metadata_count = u16::try_from(self.metadata.len()).map_err(|_| {
            PadError::LimitExceeded(format!(
                "Record has {} metadata entries (max {})",
                self.metadata.len(),
                u16::MAX
            ))
        })?;

        let mut header = BytesMut::with_capacity(RECORD_HEADER_SIZE);
        header.put_u16(self.compression);
        header.put_u32(self.compressed_size);
        header.put_u32(self.decompressed_size);
        header.put_slice(&self.digest);
        header.put_u16(metadata_count);

        let metadata = self.metadata.encode();

        writer.write_all(&header)?;
        writer.write_all(payload)?;
        writer.write_all(&metadata)?;

        Ok(SaveInfo {
            offset,
            size: self.compressed_size as u64,
            bytes_written: (header.len() + payload.len() + metadata.len()) as u64,
        })
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
