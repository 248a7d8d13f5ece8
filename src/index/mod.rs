//! Index Module
//!
//! Fixed-width bookkeeping blocks stored near the front of a container.
//!
//! ## Responsibilities
//! - Map each key to the offset and on-disk size of its record
//! - Track free byte ranges (holes) left behind by rewrites
//! - Merge touching holes on demand (never during load/save)
//!
//! ## Block Formats
//! ```text
//! Index block (32 bytes per entry)
//! ┌──────────┬──────────┬──────────────┬────────────┬──────────┐
//! │ Type (4) │ Group (4)│ Instance (8) │ Offset (8) │ Size (8) │
//! └──────────┴──────────┴──────────────┴────────────┴──────────┘
//!
//! Hole index block (16 bytes per entry)
//! ┌────────────┬──────────┐
//! │ Offset (8) │ Size (8) │
//! └────────────┴──────────┘
//! ```
//!
//! Both blocks have a size known before encoding (`count × width`), which is
//! what lets the container reserve space for them ahead of the records.

mod entry;
mod hole;

pub use entry::{Index, IndexEntry, INDEX_ENTRY_SIZE, UNASSIGNED};
pub use hole::{HoleIndex, HoleIndexEntry, HOLE_ENTRY_SIZE};

use std::io;

use crate::error::Result;

/// Fail with `UnexpectedEof` unless `buf` holds `needed` bytes
pub(crate) fn ensure_len(buf: &[u8], needed: usize, what: &str) -> Result<()> {
    if buf.len() < needed {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "{} block truncated: expected {} bytes, got {}",
                what,
                needed,
                buf.len()
            ),
        )
        .into());
    }
    Ok(())
}
