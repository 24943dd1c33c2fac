//! Columnstore engine tunables.

use std::path::PathBuf;

use shoal_data_store::CacheSettings;

/// Configuration for one columnstore table engine instance.
///
/// Defaults match the engine's production thresholds; tests shrink the
/// size thresholds to exercise rotation without gigabyte inputs.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ColumnstoreConfig {
    /// Arms the write-through local cache and the read-side preference
    /// for cache-local paths.
    #[serde(default)]
    pub enable_local_cache: bool,

    /// Flat local directory mirroring remote data files.
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,

    /// Rows accumulated before a row group is flushed.
    #[serde(default = "default_row_group_size")]
    pub row_group_size: usize,

    /// On-disk size at which the current data file is rotated out.
    #[serde(default = "default_file_size_bytes")]
    pub file_size_bytes: u64,

    /// New cache files are only allocated while the cache filesystem has
    /// more than this many bytes available.
    #[serde(default = "default_min_disk_space")]
    pub min_disk_space: u64,

    /// The engine's standard chunk width in rows; deletion-vector bitmaps
    /// are sized to this.
    #[serde(default = "default_vector_size")]
    pub vector_size: usize,
}

fn default_cache_root() -> PathBuf {
    PathBuf::from(".shoal_cache")
}

fn default_row_group_size() -> usize {
    122_880
}

fn default_file_size_bytes() -> u64 {
    1 << 30
}

fn default_min_disk_space() -> u64 {
    1 << 30
}

fn default_vector_size() -> usize {
    2048
}

impl Default for ColumnstoreConfig {
    fn default() -> Self {
        Self {
            enable_local_cache: false,
            cache_root: default_cache_root(),
            row_group_size: default_row_group_size(),
            file_size_bytes: default_file_size_bytes(),
            min_disk_space: default_min_disk_space(),
            vector_size: default_vector_size(),
        }
    }
}

impl ColumnstoreConfig {
    /// Row groups are also flushed when the accumulated bytes reach this.
    pub fn row_group_size_bytes(&self) -> usize {
        self.row_group_size * 1024
    }

    /// The cache settings handed to the data store, `None` while the local
    /// cache is disabled.
    pub fn cache_settings(&self) -> Option<CacheSettings> {
        self.enable_local_cache.then(|| CacheSettings {
            root: self.cache_root.clone(),
            min_disk_space: self.min_disk_space,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ColumnstoreConfig::default();
        assert!(!config.enable_local_cache);
        assert_eq!(config.row_group_size, 122_880);
        assert_eq!(config.row_group_size_bytes(), 122_880 * 1024);
        assert_eq!(config.file_size_bytes, 1 << 30);
        assert_eq!(config.vector_size, 2048);
        assert!(config.cache_settings().is_none());
    }
}
