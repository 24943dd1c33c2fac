//! Process-wide data-file statistics cache.
//!
//! Statistics are produced once at file finalize and published here; scan
//! initialization looks them up and lazily repopulates from the footer
//! blob stored in the catalog (e.g. after a process restart). Entries are
//! immutable after publication.

use std::sync::{Arc, LazyLock};

use datafusion::arrow::datatypes::SchemaRef;
use datafusion::common::Statistics;
use datafusion::datasource::physical_plan::parquet::metadata::DFParquetMetadata;
use datafusion::error::DataFusionError;
use foyer::Cache;
use parquet::errors::ParquetError;
use parquet::file::metadata::{ParquetMetaData, ParquetMetaDataReader};
use shoal_catalog::{Catalog, CatalogError, FileName, TableOid};

/// Upper bound on the in-process statistics cache, memory-weighted by the
/// decoded footer size.
const STATS_CACHE_CAPACITY_BYTES: usize = 256 * 1024 * 1024;

static COLUMNSTORE_STATS: LazyLock<Cache<FileName, DataFileStatistics>> = LazyLock::new(|| {
    foyer::CacheBuilder::new(STATS_CACHE_CAPACITY_BYTES)
        .with_weighter(|_k, v: &DataFileStatistics| v.metadata.memory_size())
        .build()
});

/// Cached per-file data: the decoded footer and the table-level statistics
/// derived from it.
#[derive(Clone)]
pub struct DataFileStatistics {
    pub metadata: Arc<ParquetMetaData>,
    pub statistics: Arc<Statistics>,
}

impl DataFileStatistics {
    /// Derives statistics from an already-decoded footer.
    pub fn try_new(
        metadata: Arc<ParquetMetaData>,
        schema: &SchemaRef,
    ) -> Result<Self, DataFusionError> {
        let statistics = Arc::new(DFParquetMetadata::statistics_from_parquet_metadata(
            &metadata, schema,
        )?);
        Ok(Self {
            metadata,
            statistics,
        })
    }

    /// Decodes a catalog footer blob and derives statistics from it.
    ///
    /// The blob is the footer minus its 8-byte trailer, i.e. the bare
    /// thrift metadata.
    pub fn decode(blob: &[u8], schema: &SchemaRef) -> Result<Self, StatisticsError> {
        let metadata =
            ParquetMetaDataReader::decode_metadata(blob).map_err(StatisticsError::DecodeMetadata)?;
        Self::try_new(Arc::new(metadata), schema).map_err(StatisticsError::ComputeStatistics)
    }

    /// Total row count recorded in the footer.
    pub fn row_count(&self) -> i64 {
        self.metadata.file_metadata().num_rows()
    }
}

/// Publishes freshly computed statistics for a finalized data file.
///
/// Insertion is atomic; the entry is visible to subsequent scan
/// initializations.
pub fn publish(file_name: &FileName, stats: DataFileStatistics) {
    COLUMNSTORE_STATS.insert(file_name.clone(), stats);
}

/// Looks up a file's statistics, fetching and decoding the catalog footer
/// blob on a cache miss.
pub async fn get_or_load(
    catalog: &Arc<dyn Catalog>,
    oid: TableOid,
    file_name: &FileName,
    schema: &SchemaRef,
) -> Result<DataFileStatistics, StatisticsError> {
    let catalog = Arc::clone(catalog);
    let schema = schema.clone();
    let key_file_name = file_name.clone();

    COLUMNSTORE_STATS
        .fetch(file_name.clone(), || async move {
            let blob = catalog
                .data_file_metadata(oid, &key_file_name)
                .await
                .map_err(StatisticsError::FetchFooter)?;
            DataFileStatistics::decode(&blob, &schema)
        })
        .await
        .map(|entry| entry.value().clone())
}

/// Errors that occur when loading data-file statistics.
#[derive(Debug, thiserror::Error)]
pub enum StatisticsError {
    /// The catalog could not serve the stored footer blob.
    #[error("failed to fetch file footer from catalog")]
    FetchFooter(#[source] CatalogError),

    /// The stored footer blob is not valid parquet metadata.
    ///
    /// Not recoverable by retry; it indicates a corrupted catalog row.
    #[error("failed to decode parquet metadata")]
    DecodeMetadata(#[source] ParquetError),

    /// DataFusion could not derive column statistics from the footer.
    #[error("failed to compute statistics from parquet metadata")]
    ComputeStatistics(#[source] DataFusionError),

    /// The cache layer failed during get-or-fetch.
    #[error("statistics cache error")]
    Cache(#[from] foyer_memory::Error),
}
