//! # padb
//!
//! A single-file asset container:
//! - Records keyed by a 128-bit Type-Group-Instance key
//! - Per-record and per-container string metadata
//! - MD5 payload digests, verified lazily on first access
//! - Copy-on-write rewrite on save, with a persisted hole index
//! - A folder catalog that merges many containers into one namespace
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     FolderCatalog                           │
//! │              (key → container file, RwLock)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ load() / load_subfiles()
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Container                              │
//! │     persisted Index  ·  working Index  ·  staged Records    │
//! └───────┬─────────────┬──────────────┬──────────────┬─────────┘
//!         │             │              │              │
//!         ▼             ▼              ▼              ▼
//!   ┌──────────┐  ┌───────────┐  ┌────────────┐  ┌──────────┐
//!   │  Header  │  │   Index   │  │  Metadata  │  │  Record  │
//!   │ (42 B)   │  │ HoleIndex │  │  (MUTF-8)  │  │ (codec)  │
//!   └──────────┘  └───────────┘  └────────────┘  └──────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod index;
pub mod metadata;
pub mod record;
pub mod container;
pub mod catalog;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use catalog::{FolderCatalog, ScanProgress, ScanReport};
pub use config::{Config, SaveStrategy};
pub use container::Container;
pub use error::{PadError, Result};
pub use index::{HoleIndex, HoleIndexEntry, Index, IndexEntry};
pub use key::Key;
pub use metadata::MetadataTable;
pub use record::{Record, SaveInfo};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of padb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
