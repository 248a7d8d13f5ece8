//! Container Module
//!
//! The single-file container engine.
//!
//! ## Responsibilities
//! - Parse the header and the index, hole index and metadata blocks on load
//! - Keep a persisted index (what the file holds) apart from a working index
//!   (uncommitted edits)
//! - Stage new records until save
//! - Rewrite the whole file on save, carrying unchanged records over
//!
//! ## File Layout (version 3)
//! ```text
//! ┌──────────────────────────────────────────────┐ 0x00
//! │ Header (42 bytes)                            │
//! ├──────────────────────────────────────────────┤ index_offset = 42
//! │ Index block        (index_count × 32)        │
//! ├──────────────────────────────────────────────┤ hole_offset
//! │ Hole index block   (hole_count × 16)         │
//! ├──────────────────────────────────────────────┤ metadata_offset
//! │ Metadata block     (variable)                │
//! ├──────────────────────────────────────────────┤
//! │ Record │ Record │ ... (located via index)    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Visibility of edits
//! `put`, `remove` and `clear` only touch the working index and the staging
//! buffer. `contains`, `index`, `load_subfile` and `load_subfiles` read the
//! persisted index, so they see an edit only after `save`. Calling `load`
//! discards anything staged.
//!
//! ## Files and concurrency
//! Each `load`, `save` and `load_subfile(s)` call opens its own file handle
//! and closes it before returning. Nothing prevents another process or
//! another `Container` from rewriting the file between calls: the last writer
//! wins. With [`SaveStrategy::InPlace`] a failed save leaves the file in an
//! indeterminate state; [`SaveStrategy::AtomicReplace`] writes a temporary
//! file and renames it into place instead.

mod header;

pub use header::{Header, FORMAT_VERSION, HEADER_SIZE, MAGIC};

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::{Config, SaveStrategy};
use crate::error::{PadError, Result};
use crate::index::{HoleIndex, Index, IndexEntry, HOLE_ENTRY_SIZE, INDEX_ENTRY_SIZE};
use crate::key::Key;
use crate::metadata::MetadataTable;
use crate::record::Record;

/// A container file and its in-memory state
#[derive(Debug)]
pub struct Container {
    path: PathBuf,
    config: Config,
    version: u32,

    /// Index as last loaded or saved (mirrors the file)
    index: Index,

    /// Index including unsaved puts and removes
    working: Index,

    holes: HoleIndex,
    metadata: MetadataTable,

    /// Records staged by `put`, written on the next save
    pending: HashMap<Key, Record>,
}

impl Container {
    /// A fresh, empty container bound to `path`; nothing is read yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, Config::default())
    }

    pub fn with_config(path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            path: path.into(),
            config,
            version: FORMAT_VERSION,
            index: Index::new(),
            working: Index::new(),
            holes: HoleIndex::new(),
            metadata: MetadataTable::new(),
            pending: HashMap::new(),
        }
    }

    /// Open and load a container in one step
    pub fn open(path: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let mut container = Self::with_config(path, config);
        container.load()?;
        Ok(container)
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// Read the container from its file
    ///
    /// A missing file, or one too short to hold a header, yields an empty
    /// container. A bad magic number or unknown version fails and leaves the
    /// current state untouched. On success the working index becomes a copy
    /// of the loaded index and every staged record is discarded.
    pub fn load(&mut self) -> Result<()> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No container at {}, starting empty", self.path.display());
                self.reset_empty();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::with_capacity(self.config.io_buffer_size, file);

        let mut raw = [0u8; HEADER_SIZE as usize];
        match reader.read_exact(&mut raw) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                tracing::debug!(
                    "Container {} has no readable header ({} bytes), starting empty",
                    self.path.display(),
                    file_len
                );
                self.reset_empty();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let header = Header::decode(&raw)?;
        tracing::debug!("Version is {}", header.version);
        tracing::debug!(
            "Index located at 0x{:08X} with {} entries",
            header.index_offset,
            header.index_count
        );
        tracing::debug!(
            "Hole index located at 0x{:08X} with {} entries",
            header.hole_offset,
            header.hole_count
        );
        tracing::debug!(
            "Metadata located at 0x{:08X} with {} entries",
            header.metadata_offset,
            header.metadata_count
        );

        let in_data_region = |offset: u64| offset >= HEADER_SIZE && offset < file_len;

        let index = if header.index_count > 0 && in_data_region(header.index_offset) {
            let count = header.index_count as usize;
            let len = block_len(header.index_offset, count, INDEX_ENTRY_SIZE, file_len, "Index")?;
            let block = read_block(&mut reader, header.index_offset, len)?;
            Index::decode(&block, count)?
        } else {
            Index::new()
        };

        let holes = if header.hole_count > 0 && in_data_region(header.hole_offset) {
            let count = header.hole_count as usize;
            let len = block_len(header.hole_offset, count, HOLE_ENTRY_SIZE, file_len, "Hole index")?;
            let block = read_block(&mut reader, header.hole_offset, len)?;
            HoleIndex::decode(&block, count)?
        } else {
            HoleIndex::new()
        };

        let metadata = if header.metadata_count > 0 && in_data_region(header.metadata_offset) {
            reader.seek(SeekFrom::Start(header.metadata_offset))?;
            MetadataTable::read_from(&mut reader, header.metadata_count as usize)?
        } else {
            MetadataTable::new()
        };

        self.version = header.version;
        self.working = index.clone();
        self.index = index;
        self.holes = holes;
        self.metadata = metadata;
        self.pending.clear();

        Ok(())
    }

    fn reset_empty(&mut self) {
        self.version = FORMAT_VERSION;
        self.index.clear();
        self.working.clear();
        self.holes.clear();
        self.metadata.clear();
        self.pending.clear();
    }

    // =========================================================================
    // Reads (persisted state)
    // =========================================================================

    /// Whether the key is in the persisted index
    ///
    /// Unsaved puts and removes are not visible here.
    pub fn contains(&self, key: &Key) -> bool {
        self.index.contains(key)
    }

    /// Read one record from the file
    pub fn load_subfile(&self, key: &Key) -> Result<Record> {
        let entry = self.index.get(key).ok_or(PadError::KeyNotFound(*key))?;
        let mut reader = self.open_reader()?;
        read_record(&mut reader, entry)
    }

    /// Read several records through a single file handle
    ///
    /// All or nothing: if any key is missing (or any read fails) no records
    /// are returned. Repeated keys are read once.
    pub fn load_subfiles(&self, keys: &[Key]) -> Result<HashMap<Key, Record>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let entry = self.index.get(key).ok_or(PadError::KeyNotFound(*key))?;
            entries.push(entry);
        }

        let mut reader = self.open_reader()?;
        let mut records = HashMap::with_capacity(entries.len());
        for entry in entries {
            if records.contains_key(&entry.key()) {
                continue;
            }
            let record = read_record(&mut reader, entry)?;
            records.insert(entry.key(), record);
        }
        Ok(records)
    }

    fn open_reader(&self) -> Result<BufReader<File>> {
        let file = File::open(&self.path)?;
        Ok(BufReader::with_capacity(self.config.io_buffer_size, file))
    }

    // =========================================================================
    // Edits (working state)
    // =========================================================================

    /// Stage a record
    ///
    /// The entry's size is set to the record's on-disk size and the entry is
    /// marked dirty; it replaces any working entry for the same key. Nothing
    /// is visible through the persisted view until `save`.
    pub fn put(&mut self, mut entry: IndexEntry, record: Record) {
        entry.set_size(record.compressed_size() as u64);
        entry.mark_dirty();
        let key = entry.key();
        self.working.upsert(entry);
        self.pending.insert(key, record);
    }

    /// Stage a record under a new entry for `key`
    pub fn put_record(&mut self, key: Key, record: Record) {
        self.put(IndexEntry::new(key), record);
    }

    /// Stage several records
    pub fn put_all<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = (IndexEntry, Record)>,
    {
        for (entry, record) in records {
            self.put(entry, record);
        }
    }

    /// Drop a key from the working index
    ///
    /// A staged record for the key stays in the buffer but is not written
    /// unless the key is put again before `save`.
    pub fn remove(&mut self, key: &Key) -> Option<IndexEntry> {
        self.working.remove(key)
    }

    /// Empty the working index and the staging buffer
    ///
    /// The file is untouched until the next `save`.
    pub fn clear(&mut self) {
        self.working.clear();
        self.pending.clear();
    }

    // =========================================================================
    // Save
    // =========================================================================

    /// Rewrite the file from the working state
    ///
    /// Records still in the working index are carried over from the current
    /// file; staged records replace them. Every record is rewritten, then the
    /// index, hole index and metadata blocks are written at their reserved
    /// offsets. On success the working index becomes the persisted index and
    /// the staging buffer is cleared; on failure the in-memory state is
    /// unchanged.
    pub fn save(&mut self) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(PadError::UnsupportedVersion(self.version));
        }

        let mut working = self.working.clone();
        let mut records = self.read_surviving_records(&working)?;

        for (key, record) in &self.pending {
            if working.contains(key) {
                records.insert(*key, record.clone());
            } else {
                tracing::debug!("Skipping staged record {}: removed before save", key);
            }
        }

        let orphaned: Vec<Key> = working
            .keys()
            .filter(|k| !records.contains_key(k))
            .collect();
        for key in orphaned {
            tracing::warn!("Dropping index entry {}: no record to write", key);
            working.remove(&key);
        }

        let metadata_block = self.metadata.encode();
        let header = Header {
            version: FORMAT_VERSION,
            index_offset: HEADER_SIZE,
            index_count: count_field(working.len(), "index entries")?,
            hole_offset: HEADER_SIZE + working.byte_size(),
            hole_count: count_field(self.holes.len(), "hole entries")?,
            metadata_offset: HEADER_SIZE + working.byte_size() + self.holes.byte_size(),
            metadata_count: count_field(self.metadata.len(), "metadata entries")?,
        };

        match self.config.save_strategy {
            SaveStrategy::InPlace => {
                self.write_file(&self.path, &header, &metadata_block, &records, &mut working)?;
            }
            SaveStrategy::AtomicReplace => {
                let tmp = temp_path(&self.path);
                let result = self
                    .write_file(&tmp, &header, &metadata_block, &records, &mut working)
                    .and_then(|_| fs::rename(&tmp, &self.path).map_err(PadError::from));
                if let Err(e) = result {
                    let _ = fs::remove_file(&tmp);
                    return Err(e);
                }
            }
        }

        tracing::info!("Saved {} records to {}", working.len(), self.path.display());

        self.index = working.clone();
        self.working = working;
        self.pending.clear();
        Ok(())
    }

    /// Re-read records from the current file whose keys are still wanted
    ///
    /// Records are read one at a time through a single handle. A record that
    /// fails to read is logged and left out; the rest are still carried over.
    fn read_surviving_records(&self, working: &Index) -> Result<BTreeMap<Key, Record>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let mut previous = Container::with_config(&self.path, self.config.clone());
        let opened = previous.load().and_then(|_| previous.open_reader());
        let mut reader = match opened {
            Ok(reader) => reader,
            Err(e @ PadError::UnsupportedVersion(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(
                    "No previous records carried over from {}: {}",
                    self.path.display(),
                    e
                );
                return Ok(BTreeMap::new());
            }
        };

        let mut records = BTreeMap::new();
        for entry in previous.index().iter().filter(|e| working.contains(&e.key())) {
            match read_record(&mut reader, entry) {
                Ok(record) => {
                    records.insert(entry.key(), record);
                }
                Err(e) => {
                    tracing::warn!(
                        "Could not carry over {} from {}: {}",
                        entry.key(),
                        self.path.display(),
                        e
                    );
                }
            }
        }
        Ok(records)
    }

    fn write_file(
        &self,
        target: &Path,
        header: &Header,
        metadata_block: &[u8],
        records: &BTreeMap<Key, Record>,
        working: &mut Index,
    ) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(target)?;
        let mut writer = BufWriter::with_capacity(self.config.io_buffer_size, file);

        writer.write_all(&header.encode())?;

        // Index, holes and metadata are written last, once offsets are known
        let data_offset = header.metadata_offset + metadata_block.len() as u64;
        writer.seek(SeekFrom::Start(data_offset))?;
        tracing::debug!("Writing record data starting at 0x{:08X}", data_offset);

        let mut offset = data_offset;
        for (key, record) in records {
            let entry = match working.get_mut(key) {
                Some(entry) => entry,
                None => continue,
            };
            let info = record.write_to(&mut writer, offset)?;
            entry.set_offset(info.offset);
            entry.set_size(info.size);
            entry.mark_clean();
            tracing::debug!("Wrote {} at 0x{:08X}", key, info.offset);
            offset += info.bytes_written;
        }

        writer.seek(SeekFrom::Start(header.index_offset))?;
        writer.write_all(&working.encode())?;
        writer.seek(SeekFrom::Start(header.hole_offset))?;
        writer.write_all(&self.holes.encode())?;
        writer.seek(SeekFrom::Start(header.metadata_offset))?;
        writer.write_all(metadata_block)?;
        tracing::debug!("Finished writing blocks, file ends at 0x{:08X}", offset);

        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        if self.config.sync_on_save {
            file.sync_all()?;
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Path of the container file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format version of the loaded file (or the latest, if fresh)
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The persisted index; unsaved edits are not reflected
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// The index including unsaved puts and removes
    pub fn working_index(&self) -> &Index {
        &self.working
    }

    /// Number of records staged for the next save
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn holes(&self) -> &HoleIndex {
        &self.holes
    }

    /// Mutable hole index, e.g. for an external compaction pass
    pub fn holes_mut(&mut self) -> &mut HoleIndex {
        &mut self.holes
    }

    /// Container-level metadata; edits are written on the next save
    pub fn metadata(&self) -> &MetadataTable {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut MetadataTable {
        &mut self.metadata
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Byte length of a fixed-width block, checked against the file size
///
/// Counts come straight from the header, so a block that would run past the
/// end of the file is rejected before anything is allocated for it.
fn block_len(offset: u64, count: usize, width: usize, file_len: u64, what: &str) -> Result<usize> {
    let len = count.checked_mul(width);
    let end = len.and_then(|len| offset.checked_add(len as u64));
    match (len, end) {
        (Some(len), Some(end)) if end <= file_len => Ok(len),
        _ => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "{} block of {} entries at 0x{:08X} runs past end of file ({} bytes)",
                what, count, offset, file_len
            ),
        )
        .into()),
    }
}

fn read_block<R: Read + Seek>(reader: &mut R, offset: u64, len: usize) -> Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut block = vec![0u8; len];
    reader.read_exact(&mut block)?;
    Ok(block)
}

fn read_record<R: Read + Seek>(reader: &mut R, entry: &IndexEntry) -> Result<Record> {
    reader.seek(SeekFrom::Start(entry.offset()))?;
    Record::read_from(reader)
}

fn count_field<T: TryFrom<usize>>(count: usize, what: &str) -> Result<T> {
    T::try_from(count)
        .map_err(|_| PadError::LimitExceeded(format!("Too many {}: {}", what, count)))
}

/// Sibling path used by atomic saves: `dir/.name.tmp`
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "container".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}
