//! Configuration for padb
//!
//! Centralized configuration with sensible defaults.

/// Main configuration shared by containers and catalogs
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Save Configuration
    // -------------------------------------------------------------------------
    /// How `Container::save` replaces the file on disk
    pub save_strategy: SaveStrategy,

    /// fsync the rewritten file before `save` returns
    pub sync_on_save: bool,

    // -------------------------------------------------------------------------
    // I/O Configuration
    // -------------------------------------------------------------------------
    /// Capacity of the buffered reader/writer wrapped around each file handle
    pub io_buffer_size: usize,

    // -------------------------------------------------------------------------
    // Catalog Configuration
    // -------------------------------------------------------------------------
    /// File extensions (without the dot) treated as containers when scanning
    /// a folder
    pub container_extensions: Vec<String>,
}

/// Save strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStrategy {
    /// Truncate and rewrite the file in place. A failure partway through
    /// leaves the file in an indeterminate state.
    InPlace,

    /// Write a sibling temporary file, then rename it over the destination
    AtomicReplace,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            save_strategy: SaveStrategy::InPlace,
            sync_on_save: true,
            io_buffer_size: 64 * 1024, // 64 KB
            container_extensions: vec!["pad".to_string()],
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Whether a file name carries one of the configured container extensions
    pub fn is_container_file(&self, name: &str) -> bool {
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                self.container_extensions.iter().any(|e| e == ext)
            }
            _ => false,
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the save strategy
    pub fn save_strategy(mut self, strategy: SaveStrategy) -> Self {
        self.config.save_strategy = strategy;
        self
    }

    /// Enable or disable fsync after save
    pub fn sync_on_save(mut self, sync: bool) -> Self {
        self.config.sync_on_save = sync;
        self
    }

    /// Set the I/O buffer capacity (in bytes)
    pub fn io_buffer_size(mut self, size: usize) -> Self {
        self.config.io_buffer_size = size.max(1);
        self
    }

    /// Replace the list of container file extensions
    pub fn container_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.container_extensions = exts
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_string())
            .collect();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
