//! Integration tests for the container engine
//!
//! These tests verify:
//! - Loading missing, short and malformed files (including oversized
//!   block counts)
//! - The on-disk layout of a freshly saved container
//! - Working vs persisted visibility of puts, removes and clears
//! - Carry-over of unchanged records across saves, per record
//! - Lazy digest verification of records read from disk
//! - Atomic replace saves

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use padb::container::{Header, FORMAT_VERSION, HEADER_SIZE, MAGIC};
use padb::index::INDEX_ENTRY_SIZE;
use padb::record::RECORD_HEADER_SIZE;
use padb::{
    Config, Container, HoleIndexEntry, IndexEntry, Key, PadError, Record, SaveStrategy,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config() -> Config {
    Config::builder().sync_on_save(false).build()
}

fn container_path(dir: &TempDir) -> PathBuf {
    dir.path().join("assets.pad")
}

fn record(payload: &[u8]) -> Record {
    Record::from_payload(payload.to_vec()).unwrap()
}

fn record_with_tag(payload: &[u8], key: &str, value: &str) -> Record {
    let mut record = record(payload);
    record.metadata_mut().put(key, value).unwrap();
    record
}

fn read_header(path: &PathBuf) -> Header {
    let bytes = fs::read(path).unwrap();
    let mut raw = [0u8; HEADER_SIZE as usize];
    raw.copy_from_slice(&bytes[..HEADER_SIZE as usize]);
    Header::decode(&raw).unwrap()
}

/// Save `count` records under keys (1, 1, 0..count)
fn saved_container(dir: &TempDir, count: u64) -> Container {
    let mut container = Container::with_config(container_path(dir), test_config());
    for i in 0..count {
        container.put_record(Key::new(1, 1, i), record(format!("payload-{}", i).as_bytes()));
    }
    container.save().unwrap();
    container
}

fn payload_of(container: &Container, key: Key) -> Vec<u8> {
    let mut record = container.load_subfile(&key).unwrap();
    record.payload().unwrap().to_vec()
}

// =============================================================================
// Load
// =============================================================================

#[test]
fn test_load_missing_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let mut container = Container::with_config(container_path(&dir), test_config());

    container.load().unwrap();
    assert!(container.index().is_empty());
    assert!(container.holes().is_empty());
    assert!(container.metadata().is_empty());
    assert_eq!(container.version(), FORMAT_VERSION);
}

#[test]
fn test_load_short_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let path = container_path(&dir);
    fs::write(&path, [0x50, 0x41, 0x44]).unwrap();

    let container = Container::open(&path, test_config()).unwrap();
    assert!(container.index().is_empty());
}

#[test]
fn test_load_bad_magic_keeps_state() {
    let dir = TempDir::new().unwrap();
    let mut container = saved_container(&dir, 2);

    let mut raw = [0u8; HEADER_SIZE as usize];
    raw[..4].copy_from_slice(b"NOPE");
    fs::write(container.path(), raw).unwrap();

    match container.load() {
        Err(PadError::InvalidMagic { expected, .. }) => assert_eq!(expected, MAGIC),
        other => panic!("expected InvalidMagic, got {:?}", other),
    }
    assert_eq!(container.index().len(), 2);
}

#[test]
fn test_load_unsupported_version() {
    let dir = TempDir::new().unwrap();
    let path = container_path(&dir);
    let header = Header {
        version: 2,
        index_offset: HEADER_SIZE,
        index_count: 0,
        hole_offset: HEADER_SIZE,
        hole_count: 0,
        metadata_offset: HEADER_SIZE,
        metadata_count: 0,
    };
    fs::write(&path, header.encode()).unwrap();

    let mut container = Container::with_config(&path, test_config());
    let err = container.load().unwrap_err();
    assert!(matches!(err, PadError::UnsupportedVersion(2)));
    assert!(err.is_format_error());
}

#[test]
fn test_load_ignores_blocks_outside_file() {
    let dir = TempDir::new().unwrap();
    let path = container_path(&dir);
    let header = Header {
        version: FORMAT_VERSION,
        index_offset: 10_000,
        index_count: 3,
        hole_offset: 0,
        hole_count: 1,
        metadata_offset: 10_000,
        metadata_count: 1,
    };
    fs::write(&path, header.encode()).unwrap();

    let container = Container::open(&path, test_config()).unwrap();
    assert!(container.index().is_empty());
    assert!(container.holes().is_empty());
    assert!(container.metadata().is_empty());
}

#[test]
fn test_load_rejects_oversized_index_count() {
    let dir = TempDir::new().unwrap();
    let path = container_path(&dir);
    let header = Header {
        version: FORMAT_VERSION,
        index_offset: HEADER_SIZE,
        index_count: u32::MAX,
        hole_offset: HEADER_SIZE,
        hole_count: 0,
        metadata_offset: HEADER_SIZE,
        metadata_count: 0,
    };
    let mut bytes = header.encode().to_vec();
    bytes.extend_from_slice(&[0u8; 64]);
    fs::write(&path, bytes).unwrap();

    let mut container = Container::with_config(&path, test_config());
    assert!(matches!(container.load(), Err(PadError::Io(_))));
    assert!(container.index().is_empty());
}

#[test]
fn test_load_rejects_oversized_hole_count() {
    let dir = TempDir::new().unwrap();
    let path = container_path(&dir);
    let header = Header {
        version: FORMAT_VERSION,
        index_offset: HEADER_SIZE,
        index_count: 0,
        hole_offset: HEADER_SIZE,
        hole_count: u32::MAX,
        metadata_offset: HEADER_SIZE,
        metadata_count: 0,
    };
    let mut bytes = header.encode().to_vec();
    bytes.extend_from_slice(&[0u8; 16]);
    fs::write(&path, bytes).unwrap();

    let mut container = Container::with_config(&path, test_config());
    assert!(matches!(container.load(), Err(PadError::Io(_))));
}

#[test]
fn test_load_discards_staged_records() {
    let dir = TempDir::new().unwrap();
    let mut container = saved_container(&dir, 1);

    container.put_record(Key::new(9, 9, 9), record(b"staged"));
    assert_eq!(container.pending_len(), 1);

    container.load().unwrap();
    assert_eq!(container.pending_len(), 0);
    assert!(!container.working_index().contains(&Key::new(9, 9, 9)));
}

// =============================================================================
// Save Layout
// =============================================================================

#[test]
fn test_single_record_layout() {
    let dir = TempDir::new().unwrap();
    let path = container_path(&dir);
    let key = Key::new(1, 2, 3);

    let mut container = Container::with_config(&path, test_config());
    container.put_record(key, record_with_tag(b"hello", "k", "v"));
    container.save().unwrap();

    let mut reopened = Container::open(&path, test_config()).unwrap();
    let entry = reopened.index().get(&key).unwrap().clone();
    assert_eq!(entry.offset(), HEADER_SIZE + INDEX_ENTRY_SIZE as u64);
    assert_eq!(entry.offset(), 74);
    assert_eq!(entry.size(), 5);
    assert!(!entry.is_dirty());

    let mut record = reopened.load_subfile(&key).unwrap();
    assert_eq!(record.payload().unwrap().as_ref(), b"hello");
    assert_eq!(record.metadata().get("k"), Some("v"));

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[..4], &MAGIC.to_be_bytes());
    assert_eq!(bytes.len(), 74 + RECORD_HEADER_SIZE + 5 + 4);

    reopened.load().unwrap();
    assert_eq!(reopened.index().len(), 1);
}

#[test]
fn test_header_counts_and_offsets() {
    for count in [0u64, 1, 5] {
        let dir = TempDir::new().unwrap();
        saved_container(&dir, count);

        let header = read_header(&container_path(&dir));
        let index_bytes = count * INDEX_ENTRY_SIZE as u64;
        assert_eq!(header.version, FORMAT_VERSION);
        assert_eq!(header.index_count as u64, count);
        assert_eq!(header.index_offset, HEADER_SIZE);
        assert_eq!(header.hole_offset, HEADER_SIZE + index_bytes);
        assert_eq!(header.hole_count, 0);
        assert_eq!(header.metadata_offset, HEADER_SIZE + index_bytes);
        assert_eq!(header.metadata_count, 0);
    }
}

#[test]
fn test_records_written_in_key_order() {
    let dir = TempDir::new().unwrap();
    let path = container_path(&dir);
    let mut container = Container::with_config(&path, test_config());

    container.put_record(Key::new(0xFFFF_FFFF, 0, 0), record(b"last"));
    container.put_record(Key::new(0, 0, 1), record(b"first"));
    container.put_record(Key::new(5, 0, 0), record(b"middle"));
    container.save().unwrap();

    let offsets: Vec<u64> = container.index().iter().map(|e| e.offset()).collect();
    assert_eq!(offsets.len(), 3);
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_holes_and_metadata_persisted() {
    let dir = TempDir::new().unwrap();
    let path = container_path(&dir);

    let mut container = Container::with_config(&path, test_config());
    container.holes_mut().add(HoleIndexEntry::new(100, 20));
    container.holes_mut().add(HoleIndexEntry::new(200, 8));
    container.metadata_mut().put("title", "Level One").unwrap();
    container.metadata_mut().put("sign", "é€").unwrap();
    container.put_record(Key::new(1, 1, 1), record(b"x"));
    container.save().unwrap();

    let header = read_header(&path);
    assert_eq!(header.hole_count, 2);
    assert_eq!(header.metadata_count, 2);
    assert_eq!(header.hole_offset, HEADER_SIZE + INDEX_ENTRY_SIZE as u64);
    assert_eq!(header.metadata_offset, header.hole_offset + 32);

    let reopened = Container::open(&path, test_config()).unwrap();
    let holes: Vec<(u64, u64)> = reopened.holes().iter().map(|h| (h.offset(), h.size())).collect();
    assert_eq!(holes, vec![(100, 20), (200, 8)]);
    assert_eq!(reopened.metadata().get("title"), Some("Level One"));
    assert_eq!(reopened.metadata().get("sign"), Some("é€"));
    assert_eq!(payload_of(&reopened, Key::new(1, 1, 1)), b"x");
}

// =============================================================================
// Working vs Persisted
// =============================================================================

#[test]
fn test_put_visible_only_after_save() {
    let dir = TempDir::new().unwrap();
    let mut container = Container::with_config(container_path(&dir), test_config());
    let key = Key::new(1, 2, 3);

    container.put_record(key, record(b"hello"));
    assert!(!container.contains(&key));
    assert!(container.working_index().contains(&key));
    assert!(container.working_index().get(&key).unwrap().is_dirty());
    assert!(matches!(
        container.load_subfile(&key),
        Err(PadError::KeyNotFound(_))
    ));

    container.save().unwrap();
    assert!(container.contains(&key));
    assert_eq!(container.pending_len(), 0);
    assert!(!container.working_index().get(&key).unwrap().is_dirty());
}

#[test]
fn test_put_sets_entry_size() {
    let dir = TempDir::new().unwrap();
    let mut container = Container::with_config(container_path(&dir), test_config());
    let key = Key::new(1, 2, 3);

    container.put(IndexEntry::new(key), record(b"twelve bytes"));
    assert_eq!(container.working_index().get(&key).unwrap().size(), 12);
}

#[test]
fn test_put_all_stages_every_record() {
    let dir = TempDir::new().unwrap();
    let mut container = Container::with_config(container_path(&dir), test_config());

    container.put_all((0..3u64).map(|i| {
        let key = Key::new(6, 0, i);
        (IndexEntry::new(key), record(format!("bulk-{}", i).as_bytes()))
    }));
    assert_eq!(container.pending_len(), 3);
    assert_eq!(container.working_index().len(), 3);

    container.save().unwrap();
    assert_eq!(container.index().len(), 3);
    assert_eq!(payload_of(&container, Key::new(6, 0, 2)), b"bulk-2");
}

#[test]
fn test_working_index_is_independent() {
    let dir = TempDir::new().unwrap();
    let mut container = saved_container(&dir, 2);

    container.remove(&Key::new(1, 1, 0));
    container.put_record(Key::new(2, 2, 2), record(b"new"));

    assert_eq!(container.index().len(), 2);
    assert!(container.index().contains(&Key::new(1, 1, 0)));
    assert!(!container.index().contains(&Key::new(2, 2, 2)));
}

#[test]
fn test_remove_then_save() {
    let dir = TempDir::new().unwrap();
    let mut container = saved_container(&dir, 3);
    let removed = Key::new(1, 1, 1);

    assert!(container.remove(&removed).is_some());
    assert!(container.contains(&removed));
    container.save().unwrap();

    assert!(!container.contains(&removed));
    let reopened = Container::open(container.path(), test_config()).unwrap();
    assert_eq!(reopened.index().len(), 2);
    assert_eq!(payload_of(&reopened, Key::new(1, 1, 2)), b"payload-2");
}

#[test]
fn test_staged_record_skipped_after_remove() {
    let dir = TempDir::new().unwrap();
    let mut container = Container::with_config(container_path(&dir), test_config());
    let key = Key::new(4, 4, 4);

    container.put_record(key, record(b"gone"));
    container.remove(&key);
    container.save().unwrap();

    assert!(container.index().is_empty());
    assert_eq!(read_header(&container_path(&dir)).index_count, 0);
}

#[test]
fn test_clear_then_save_empties_file() {
    let dir = TempDir::new().unwrap();
    let mut container = saved_container(&dir, 3);

    container.put_record(Key::new(7, 7, 7), record(b"staged"));
    container.clear();
    assert_eq!(container.pending_len(), 0);
    assert_eq!(container.index().len(), 3);

    container.save().unwrap();
    assert!(container.index().is_empty());
    assert_eq!(read_header(&container_path(&dir)).index_count, 0);
}

#[test]
fn test_put_replaces_persisted_record() {
    let dir = TempDir::new().unwrap();
    let mut container = saved_container(&dir, 2);
    let key = Key::new(1, 1, 0);

    container.put_record(key, record(b"replacement"));
    container.save().unwrap();

    assert_eq!(payload_of(&container, key), b"replacement");
    assert_eq!(payload_of(&container, Key::new(1, 1, 1)), b"payload-1");
}

#[test]
fn test_unchanged_records_carried_over() {
    let dir = TempDir::new().unwrap();
    let mut container = saved_container(&dir, 3);

    container.put_record(Key::new(2, 0, 0), record_with_tag(b"added", "kind", "new"));
    container.save().unwrap();

    let reopened = Container::open(container_path(&dir), test_config()).unwrap();
    assert_eq!(reopened.index().len(), 4);
    for i in 0..3u64 {
        assert_eq!(
            payload_of(&reopened, Key::new(1, 1, i)),
            format!("payload-{}", i).as_bytes()
        );
    }
    let added = reopened.load_subfile(&Key::new(2, 0, 0)).unwrap();
    assert_eq!(added.metadata().get("kind"), Some("new"));
}

#[test]
fn test_unreadable_record_does_not_drop_others() {
    let dir = TempDir::new().unwrap();
    let container = saved_container(&dir, 3);
    let broken = Key::new(1, 1, 2);
    let offset = container.index().get(&broken).unwrap().offset();

    // Claim a compressed size far past the end of the file
    let mut file = OpenOptions::new().write(true).open(container.path()).unwrap();
    file.seek(SeekFrom::Start(offset + 2)).unwrap();
    file.write_all(&1000u32.to_be_bytes()).unwrap();
    drop(file);

    let mut reopened = Container::open(container.path(), test_config()).unwrap();
    reopened.put_record(Key::new(9, 9, 9), record(b"added"));
    reopened.save().unwrap();

    let after = Container::open(container.path(), test_config()).unwrap();
    let keys: Vec<Key> = after.index().keys().collect();
    assert_eq!(
        keys,
        vec![Key::new(1, 1, 0), Key::new(1, 1, 1), Key::new(9, 9, 9)]
    );
    assert_eq!(payload_of(&after, Key::new(1, 1, 0)), b"payload-0");
    assert_eq!(payload_of(&after, Key::new(1, 1, 1)), b"payload-1");
    assert_eq!(payload_of(&after, Key::new(9, 9, 9)), b"added");
}

#[test]
fn test_save_twice_is_stable() {
    let dir = TempDir::new().unwrap();
    let mut container = saved_container(&dir, 4);
    let first = fs::read(container.path()).unwrap();

    container.save().unwrap();
    let second = fs::read(container.path()).unwrap();
    assert_eq!(first, second);
}

// =============================================================================
// Reads
// =============================================================================

#[test]
fn test_load_subfiles_all_or_nothing() {
    let dir = TempDir::new().unwrap();
    let container = saved_container(&dir, 3);

    let keys = [Key::new(1, 1, 0), Key::new(1, 1, 2), Key::new(1, 1, 0)];
    let records = container.load_subfiles(&keys).unwrap();
    assert_eq!(records.len(), 2);

    let missing = Key::new(8, 8, 8);
    match container.load_subfiles(&[Key::new(1, 1, 0), missing]) {
        Err(PadError::KeyNotFound(key)) => assert_eq!(key, missing),
        other => panic!("expected KeyNotFound, got {:?}", other),
    }

    assert!(container.load_subfiles(&[]).unwrap().is_empty());
}

#[test]
fn test_corruption_detected_lazily() {
    let dir = TempDir::new().unwrap();
    let container = saved_container(&dir, 1);
    let key = Key::new(1, 1, 0);
    let offset = container.index().get(&key).unwrap().offset();

    let mut file = OpenOptions::new().write(true).open(container.path()).unwrap();
    file.seek(SeekFrom::Start(offset + RECORD_HEADER_SIZE as u64)).unwrap();
    file.write_all(b"X").unwrap();
    drop(file);

    let reopened = Container::open(container.path(), test_config()).unwrap();
    let mut record = reopened.load_subfile(&key).unwrap();
    assert!(matches!(
        record.payload(),
        Err(PadError::CorruptedData { .. })
    ));
}

// =============================================================================
// Save Strategies
// =============================================================================

#[test]
fn test_atomic_replace() {
    let dir = TempDir::new().unwrap();
    let path = container_path(&dir);
    let config = Config::builder()
        .save_strategy(SaveStrategy::AtomicReplace)
        .sync_on_save(false)
        .build();

    let mut container = Container::with_config(&path, config.clone());
    container.put_record(Key::new(1, 0, 0), record(b"one"));
    container.save().unwrap();
    container.put_record(Key::new(2, 0, 0), record(b"two"));
    container.save().unwrap();

    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["assets.pad".to_string()]);

    let reopened = Container::open(&path, config).unwrap();
    assert_eq!(payload_of(&reopened, Key::new(1, 0, 0)), b"one");
    assert_eq!(payload_of(&reopened, Key::new(2, 0, 0)), b"two");
}

#[test]
fn test_save_over_garbage_file() {
    let dir = TempDir::new().unwrap();
    let path = container_path(&dir);
    fs::write(&path, vec![0xAB; 128]).unwrap();

    // Nothing loaded; the unreadable file contributes no records
    let mut container = Container::with_config(&path, test_config());
    container.put_record(Key::new(1, 1, 1), record(b"fresh"));
    container.save().unwrap();

    let reopened = Container::open(&path, test_config()).unwrap();
    assert_eq!(reopened.index().len(), 1);
    assert_eq!(payload_of(&reopened, Key::new(1, 1, 1)), b"fresh");
}
