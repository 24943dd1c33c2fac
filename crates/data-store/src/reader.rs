//! Data-file read-path resolution and readers.

use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use parquet::arrow::arrow_reader::ArrowReaderOptions;
use parquet::arrow::async_reader::{AsyncFileReader, ParquetObjectReader};
use parquet::errors::Result as ParquetResult;
use parquet::file::metadata::ParquetMetaData;

/// Where a data file will be read from.
///
/// Cache-local paths are preferred when the cache mirror holds the file;
/// this is the only consumer-side cache hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataFileLocation {
    /// `<cache_root>/<file_name>` on the local filesystem.
    Cached(PathBuf),
    /// `<base_path>/<file_name>` in the object store.
    Remote(object_store::path::Path),
}

impl DataFileLocation {
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached(_))
    }
}

impl std::fmt::Display for DataFileLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cached(path) => write!(f, "{}", path.display()),
            Self::Remote(path) => write!(f, "{path}"),
        }
    }
}

/// A parquet [`AsyncFileReader`] over either a cache-local file or the
/// object store.
pub enum DataFileReader {
    Local(tokio::fs::File),
    Remote(ParquetObjectReader),
}

impl AsyncFileReader for DataFileReader {
    fn get_bytes(&mut self, range: Range<u64>) -> BoxFuture<'_, ParquetResult<Bytes>> {
        match self {
            Self::Local(file) => file.get_bytes(range),
            Self::Remote(reader) => reader.get_bytes(range),
        }
    }

    fn get_byte_ranges(&mut self, ranges: Vec<Range<u64>>) -> BoxFuture<'_, ParquetResult<Vec<Bytes>>> {
        match self {
            Self::Local(file) => file.get_byte_ranges(ranges),
            Self::Remote(reader) => reader.get_byte_ranges(ranges),
        }
    }

    fn get_metadata<'a>(
        &'a mut self,
        options: Option<&'a ArrowReaderOptions>,
    ) -> BoxFuture<'a, ParquetResult<Arc<ParquetMetaData>>> {
        match self {
            Self::Local(file) => file.get_metadata(options),
            Self::Remote(reader) => reader.get_metadata(options),
        }
    }
}
