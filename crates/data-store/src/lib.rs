//! Object store abstraction layer for the shoal columnstore.
//!
//! This crate provides the [`DataStore`] wrapper: a table-scoped handle on
//! an object store (local filesystem, AWS S3, Google Cloud Storage, Azure,
//! or in-memory) plus the write-through local cache layered between the
//! columnar writer and a remote store.
//!
//! Cloud providers are configured via environment variables (`AWS_*`,
//! `GOOGLE_*`, `AZURE_*`), matching the `object_store` builders.

use std::path::PathBuf;
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::buffered::BufWriter;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::prefix::PrefixStore;
use object_store::ObjectStore;
use parquet::arrow::async_reader::ParquetObjectReader;
use tracing::{debug, trace};

pub mod cached_write;
pub mod reader;
pub mod store_url;

pub use cached_write::{CacheWriteError, CachedFileWriter, FooterRecorder, PrimaryWriteError};
pub use reader::{DataFileLocation, DataFileReader};
pub use store_url::{StoreProvider, StoreUrl, StoreUrlError};

/// Local cache mirror settings for one [`DataStore`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Flat directory holding cached data files.
    pub root: PathBuf,
    /// New cache files are only allocated while the cache filesystem
    /// reports more than this many bytes available.
    pub min_disk_space: u64,
}

/// A table-scoped handle on the store holding the table's data files.
///
/// All object paths are relative to the table's base path; a data file is
/// addressed by its bare file name. When the base path is remote and
/// caching is enabled, writes are mirrored to `<cache_root>/<file_name>`
/// and reads prefer the mirror.
#[derive(Debug, Clone)]
pub struct DataStore {
    object_store: Arc<dyn ObjectStore>,
    url: StoreUrl,
    cache: Option<CacheSettings>,
}

impl DataStore {
    /// Creates a store for the table base path, building the backend from
    /// the URL scheme.
    pub fn new(
        url: StoreUrl,
        cache: Option<CacheSettings>,
    ) -> Result<Self, ObjectStoreCreationError> {
        let prefix = url.path();
        let object_store: Arc<dyn ObjectStore> = match url.provider() {
            StoreProvider::Local => {
                Arc::new(PrefixStore::new(LocalFileSystem::new(), prefix))
            }
            StoreProvider::AmazonS3 => {
                let store = AmazonS3Builder::from_env()
                    .with_url(url.as_str())
                    .build()
                    .map_err(|source| ObjectStoreCreationError {
                        url: url.to_string(),
                        source,
                    })?;
                Arc::new(PrefixStore::new(store, prefix))
            }
            StoreProvider::GoogleCloudStorage => {
                let store = GoogleCloudStorageBuilder::from_env()
                    .with_url(url.as_str())
                    .build()
                    .map_err(|source| ObjectStoreCreationError {
                        url: url.to_string(),
                        source,
                    })?;
                Arc::new(PrefixStore::new(store, prefix))
            }
            StoreProvider::MicrosoftAzure => {
                let store = MicrosoftAzureBuilder::from_env()
                    .with_url(url.as_str())
                    .build()
                    .map_err(|source| ObjectStoreCreationError {
                        url: url.to_string(),
                        source,
                    })?;
                Arc::new(PrefixStore::new(store, prefix))
            }
            StoreProvider::InMemory => Arc::new(PrefixStore::new(InMemory::new(), prefix)),
        };
        Ok(Self {
            object_store,
            url,
            cache,
        })
    }

    /// Creates a store over an existing object store handle.
    ///
    /// Used by tests and embedders that share one store instance across
    /// tables; `url` still drives remote detection and path display.
    pub fn with_store(
        object_store: Arc<dyn ObjectStore>,
        url: StoreUrl,
        cache: Option<CacheSettings>,
    ) -> Self {
        Self {
            object_store,
            url,
            cache,
        }
    }

    pub fn url(&self) -> &StoreUrl {
        &self.url
    }

    pub fn is_remote(&self) -> bool {
        self.url.is_remote()
    }

    pub fn cache(&self) -> Option<&CacheSettings> {
        self.cache.as_ref()
    }

    /// Returns the inner object store handle.
    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.object_store
    }

    /// Creates the write-through writer for a new data file.
    ///
    /// The cache mirror is opened only when the base path is remote, the
    /// cache is enabled, and the cache filesystem reports available space
    /// above the gate. A failed disk-space probe skips the mirror; a
    /// failed cache-file creation fails the writer.
    pub async fn create_data_file_writer(
        &self,
        file_name: &str,
    ) -> Result<CachedFileWriter, OpenWriterError> {
        let primary = BufWriter::new(self.object_store.clone(), Path::from(file_name));

        let cache = match (&self.cache, self.is_remote()) {
            (Some(settings), true) => match fs2::available_space(&settings.root) {
                Ok(space) if space > settings.min_disk_space => {
                    let path = settings.root.join(file_name);
                    let file = tokio::fs::File::create(&path).await.map_err(|source| {
                        OpenWriterError::CreateCacheFile {
                            path: path.clone(),
                            source,
                        }
                    })?;
                    trace!(file_name, cache_path = %path.display(), "mirroring data file to local cache");
                    Some((path, file))
                }
                Ok(space) => {
                    debug!(
                        file_name,
                        available = space,
                        gate = settings.min_disk_space,
                        "skipping cache mirror, disk space below gate"
                    );
                    None
                }
                Err(err) => {
                    debug!(file_name, "skipping cache mirror, disk space probe failed: {err}");
                    None
                }
            },
            _ => None,
        };

        Ok(CachedFileWriter::new(primary, cache))
    }

    /// Resolves the read path for a data file, preferring the local cache
    /// mirror when it holds the file.
    pub async fn resolve_read_path(&self, file_name: &str) -> DataFileLocation {
        if let Some(settings) = &self.cache {
            if self.is_remote() {
                let candidate = settings.root.join(file_name);
                if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                    return DataFileLocation::Cached(candidate);
                }
            }
        }
        DataFileLocation::Remote(Path::from(file_name))
    }

    /// Opens a parquet reader for a resolved data-file location.
    pub async fn file_reader(
        &self,
        location: &DataFileLocation,
    ) -> Result<DataFileReader, OpenReaderError> {
        match location {
            DataFileLocation::Cached(path) => {
                let file = tokio::fs::File::open(path).await.map_err(|source| {
                    OpenReaderError {
                        location: location.clone(),
                        source: source.into(),
                    }
                })?;
                Ok(DataFileReader::Local(file))
            }
            DataFileLocation::Remote(path) => Ok(DataFileReader::Remote(ParquetObjectReader::new(
                self.object_store.clone(),
                path.clone(),
            ))),
        }
    }
}

/// Failed to create the object store backend for a base path.
///
/// The URL was validated, but the provider could not be instantiated,
/// typically because credentials are missing from the environment.
#[derive(Debug, thiserror::Error)]
#[error("failed to create object store for {url}")]
pub struct ObjectStoreCreationError {
    url: String,
    #[source]
    source: object_store::Error,
}

/// Errors that occur when creating a data-file writer.
#[derive(Debug, thiserror::Error)]
pub enum OpenWriterError {
    /// The cache mirror file could not be created.
    ///
    /// Caching was possible for this file, so a missing mirror would break
    /// the bit-identity invariant; the file is abandoned instead.
    #[error("failed to create cache file {path}")]
    CreateCacheFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failed to open a data file for reading.
#[derive(Debug, thiserror::Error)]
#[error("failed to open data file at {location}")]
pub struct OpenReaderError {
    location: DataFileLocation,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store(cache: Option<CacheSettings>) -> DataStore {
        DataStore::with_store(
            Arc::new(InMemory::new()),
            StoreUrl::parse("memory:///warehouse/t1/").unwrap(),
            cache,
        )
    }

    #[tokio::test]
    async fn read_path_prefers_existing_cache_file() {
        let cache_dir = tempfile::tempdir().unwrap();
        let store = memory_store(Some(CacheSettings {
            root: cache_dir.path().to_path_buf(),
            min_disk_space: 0,
        }));

        // Not cached yet: remote path.
        let location = store.resolve_read_path("f1.parquet").await;
        assert!(!location.is_cached());

        // Drop a mirror file in place: cache path wins.
        std::fs::write(cache_dir.path().join("f1.parquet"), b"x").unwrap();
        let location = store.resolve_read_path("f1.parquet").await;
        assert_eq!(
            location,
            DataFileLocation::Cached(cache_dir.path().join("f1.parquet"))
        );
    }

    #[tokio::test]
    async fn local_base_path_never_uses_cache() {
        let cache_dir = tempfile::tempdir().unwrap();
        let store = DataStore::with_store(
            Arc::new(InMemory::new()),
            StoreUrl::parse("file:///warehouse/t1/").unwrap(),
            Some(CacheSettings {
                root: cache_dir.path().to_path_buf(),
                min_disk_space: 0,
            }),
        );

        std::fs::write(cache_dir.path().join("f1.parquet"), b"x").unwrap();
        assert!(!store.resolve_read_path("f1.parquet").await.is_cached());

        let writer = store.create_data_file_writer("f1.parquet").await.unwrap();
        assert!(writer.cache_path().is_none());
    }

    #[tokio::test]
    async fn remote_base_path_opens_cache_mirror() {
        let cache_dir = tempfile::tempdir().unwrap();
        let store = memory_store(Some(CacheSettings {
            root: cache_dir.path().to_path_buf(),
            min_disk_space: 0,
        }));

        let writer = store.create_data_file_writer("f2.parquet").await.unwrap();
        assert_eq!(
            writer.cache_path(),
            Some(cache_dir.path().join("f2.parquet").as_path())
        );
    }

    #[tokio::test]
    async fn disk_space_gate_skips_mirror() {
        let cache_dir = tempfile::tempdir().unwrap();
        let store = memory_store(Some(CacheSettings {
            root: cache_dir.path().to_path_buf(),
            min_disk_space: u64::MAX,
        }));

        let writer = store.create_data_file_writer("f3.parquet").await.unwrap();
        assert!(writer.cache_path().is_none());
    }
}
