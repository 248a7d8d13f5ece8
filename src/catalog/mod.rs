//! Catalog Module
//!
//! One key namespace over every container file found under a folder.
//!
//! ## Responsibilities
//! - Discover container files under a root directory (depth first)
//! - Load each container's persisted index (never its payloads)
//! - Map every key to the file that holds it; later files win
//! - Serve record reads by opening the owning container on demand
//!
//! ## Concurrency
//! The key map sits behind a `parking_lot::RwLock`, so a scan running on a
//! background thread can update it while other threads query it. Scan
//! progress can be streamed over a crossbeam channel.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam::channel::Sender;
use parking_lot::RwLock;

use crate::config::Config;
use crate::container::Container;
use crate::error::{PadError, Result};
use crate::key::Key;
use crate::record::Record;

/// Builds an unloaded container for a path
pub type ContainerFactory = Arc<dyn Fn(&Path) -> Container + Send + Sync>;

/// Progress events emitted while scanning
#[derive(Debug, Clone, PartialEq)]
pub enum ScanProgress {
    /// Walking the directory tree
    Scanning,
    /// Fraction of candidate files processed, in `[0, 1)`
    ///
    /// Sent once before the first file and then after each file as
    /// `index / total`, so `0.0` arrives twice and `1.0` never does; `Done`
    /// marks completion.
    Progress(f64),
    /// Scan finished
    Done(ScanReport),
    /// Scan aborted
    Failed(String),
}

/// Summary of a completed scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Container files whose index was loaded
    pub files_scanned: usize,
    /// Index entries seen across all files
    pub keys_indexed: usize,
    /// Keys that were already mapped to a different file
    pub keys_overridden: usize,
}

/// Key namespace backed by a folder of container files
pub struct FolderCatalog {
    root: PathBuf,
    config: Config,
    factory: ContainerFactory,
    /// Key → file holding it
    entries: RwLock<HashMap<Key, PathBuf>>,
}

impl FolderCatalog {
    /// Create a catalog over `root`, which must be an existing directory
    pub fn new(root: impl AsRef<Path>, config: Config) -> Result<Self> {
        let root = root.as_ref();
        if !root.exists() {
            return Err(PadError::Catalog(format!(
                "Folder {} does not exist",
                root.display()
            )));
        }
        if !root.is_dir() {
            return Err(PadError::Catalog(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        let root = fs::canonicalize(root)?;

        let factory_config = config.clone();
        let factory: ContainerFactory =
            Arc::new(move |path: &Path| Container::with_config(path, factory_config.clone()));

        Ok(Self {
            root,
            config,
            factory,
            entries: RwLock::new(HashMap::new()),
        })
    }

    /// Replace the function used to build containers
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Path) -> Container + Send + Sync + 'static,
    {
        self.factory = Arc::new(factory);
        self
    }

    // =========================================================================
    // Scanning
    // =========================================================================

    /// Index every container under the root
    pub fn scan(&self) -> Result<ScanReport> {
        self.scan_inner(|_| {})
    }

    /// Index every container under the root, reporting progress
    ///
    /// Send failures (a dropped receiver) are ignored.
    pub fn scan_with_progress(&self, progress: &Sender<ScanProgress>) -> Result<ScanReport> {
        self.scan_inner(|event| {
            let _ = progress.send(event);
        })
    }

    fn scan_inner<F: Fn(ScanProgress)>(&self, notify: F) -> Result<ScanReport> {
        notify(ScanProgress::Scanning);

        let mut candidates = Vec::new();
        if let Err(e) = list_candidates(&self.root, &self.config, &mut candidates) {
            notify(ScanProgress::Failed(e.to_string()));
            return Err(e.into());
        }
        tracing::debug!(
            "Found {} candidate containers under {}",
            candidates.len(),
            self.root.display()
        );

        notify(ScanProgress::Progress(0.0));
        let mut report = ScanReport::default();
        let count = candidates.len();

        for (i, path) in candidates.into_iter().enumerate() {
            let mut container = (self.factory)(&path);
            if let Err(e) = container.load() {
                tracing::warn!("Failed to index {}: {}", path.display(), e);
                notify(ScanProgress::Failed(e.to_string()));
                return Err(e);
            }

            {
                let mut entries = self.entries.write();
                for key in container.index().keys() {
                    if let Some(previous) = entries.insert(key, path.clone()) {
                        if previous != path {
                            report.keys_overridden += 1;
                        }
                    }
                    report.keys_indexed += 1;
                }
            }
            report.files_scanned += 1;

            notify(ScanProgress::Progress(i as f64 / count as f64));
        }

        tracing::info!(
            "Indexed {} keys from {} containers ({} overridden)",
            report.keys_indexed,
            report.files_scanned,
            report.keys_overridden
        );
        notify(ScanProgress::Done(report.clone()));
        Ok(report)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read the record for a key from whichever file holds it
    pub fn get(&self, key: &Key) -> Result<Record> {
        let path = self.location_of(key).ok_or(PadError::KeyNotFound(*key))?;
        let mut container = (self.factory)(&path);
        container.load()?;
        container.load_subfile(key)
    }

    /// Read several records, opening each backing file once
    ///
    /// Every key is resolved before any file is touched; the first unknown
    /// key fails the call and nothing is returned.
    pub fn get_many(&self, keys: &[Key]) -> Result<HashMap<Key, Record>> {
        let mut bins: BTreeMap<PathBuf, Vec<Key>> = BTreeMap::new();
        {
            let entries = self.entries.read();
            for key in keys {
                let path = entries.get(key).ok_or(PadError::KeyNotFound(*key))?;
                bins.entry(path.clone()).or_default().push(*key);
            }
        }

        let mut result = HashMap::with_capacity(keys.len());
        for (path, keys) in bins {
            let mut container = (self.factory)(&path);
            container.load()?;
            result.extend(container.load_subfiles(&keys)?);
        }
        Ok(result)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.entries.read().contains_key(key)
    }

    /// True when every key is mapped
    pub fn contains_all(&self, keys: &[Key]) -> bool {
        let entries = self.entries.read();
        keys.iter().all(|k| entries.contains_key(k))
    }

    /// The subset of `keys` that is mapped
    pub fn contains_any(&self, keys: &[Key]) -> HashSet<Key> {
        let entries = self.entries.read();
        keys.iter()
            .filter(|k| entries.contains_key(k))
            .copied()
            .collect()
    }

    /// File currently holding a key
    pub fn location_of(&self, key: &Key) -> Option<PathBuf> {
        self.entries.read().get(key).cloned()
    }

    /// Every mapped key with its file, in key order
    pub fn entries(&self) -> Vec<(Key, PathBuf)> {
        let mut all: Vec<(Key, PathBuf)> = self
            .entries
            .read()
            .iter()
            .map(|(k, p)| (*k, p.clone()))
            .collect();
        all.sort_by_key(|(k, _)| *k);
        all
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Forget every mapped key
    pub fn clear_index(&self) {
        self.entries.write().clear();
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Depth first: sub-directories (recursively) before the directory's own
/// files, each group sorted case-insensitively
fn list_candidates(dir: &Path, config: &Config, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        } else if path
            .file_name()
            .map(|n| config.is_container_file(&n.to_string_lossy()))
            .unwrap_or(false)
        {
            files.push(path);
        }
    }

    dirs.sort_by_key(|p| p.to_string_lossy().to_lowercase());
    files.sort_by_key(|p| p.to_string_lossy().to_lowercase());

    for sub in dirs {
        list_candidates(&sub, config, out)?;
    }
    out.extend(files);
    Ok(())
}
