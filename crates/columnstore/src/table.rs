//! Table facade: binds the writer, deletion-vector plane, and scan
//! adapter to one catalog entry.

use std::collections::BTreeSet;
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use shoal_catalog::{Catalog, Lake, TableOid};
use shoal_data_store::{DataStore, StoreUrl};
use tracing::{debug, instrument};

use crate::config::ColumnstoreConfig;
use crate::dv::{group_row_ids, DvManager};
use crate::error::{DeleteError, InsertError, ScanError, TableOpenError};
use crate::row_id::RowId;
use crate::scan::{self, FilePruner, ScanFile, ScanRequest, ScanStream};
use crate::stats;
use crate::writer::ColumnstoreWriter;

/// A logical table whose physical state is a set of immutable data files
/// plus per-chunk deletion vectors.
///
/// The facade exposes the engine's three operations — insert, delete, and
/// scan — and holds the lazily constructed writer between the first
/// `insert` and `finalize_insert`. DML takes `&mut self`: the host is
/// expected to serialize writers on a table, and ownership enforces that
/// within a process.
pub struct ColumnstoreTable {
    oid: TableOid,
    schema: SchemaRef,
    catalog: Arc<dyn Catalog>,
    lake: Arc<dyn Lake>,
    data_store: Arc<DataStore>,
    config: ColumnstoreConfig,
    writer: Option<ColumnstoreWriter>,
}

impl ColumnstoreTable {
    /// Binds a facade to the table's catalog entry, building the data
    /// store from the registered base path.
    pub async fn open(
        catalog: Arc<dyn Catalog>,
        lake: Arc<dyn Lake>,
        oid: TableOid,
        schema: SchemaRef,
        config: ColumnstoreConfig,
    ) -> Result<Self, TableOpenError> {
        let base_path = catalog
            .table_base_path(oid)
            .await
            .map_err(TableOpenError::BasePath)?;
        let url = StoreUrl::parse(base_path.as_str()).map_err(TableOpenError::InvalidBasePath)?;
        let data_store = DataStore::new(url, config.cache_settings())
            .map_err(TableOpenError::CreateStore)?;
        Ok(Self::with_data_store(
            catalog,
            lake,
            oid,
            schema,
            config,
            data_store,
        ))
    }

    /// Binds a facade over an existing data store.
    ///
    /// Used by embedders that share one store handle across tables, and by
    /// tests running against an in-memory store instance.
    pub fn with_data_store(
        catalog: Arc<dyn Catalog>,
        lake: Arc<dyn Lake>,
        oid: TableOid,
        schema: SchemaRef,
        config: ColumnstoreConfig,
        data_store: DataStore,
    ) -> Self {
        Self {
            oid,
            schema,
            catalog,
            lake,
            data_store: Arc::new(data_store),
            config,
            writer: None,
        }
    }

    pub fn oid(&self) -> TableOid {
        self.oid
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Appends a chunk to the table's write stream.
    ///
    /// The writer is created on the first call and rotates data files by
    /// size internally; nothing is visible to scans until the file a row
    /// landed in is finalized.
    pub async fn insert(&mut self, batch: &RecordBatch) -> Result<(), InsertError> {
        if self.writer.is_none() {
            self.writer = Some(ColumnstoreWriter::new(
                self.oid,
                self.catalog.clone(),
                self.lake.clone(),
                self.data_store.clone(),
                self.schema.clone(),
                self.config.clone(),
            ));
        }
        self.writer
            .as_mut()
            .expect("writer was just created")
            .write(batch)
            .await
    }

    /// Closes the insert stream, finalizing and registering the in-flight
    /// data file. A no-op when nothing was inserted.
    pub async fn finalize_insert(&mut self) -> Result<(), InsertError> {
        if let Some(mut writer) = self.writer.take() {
            writer.finalize().await?;
        }
        Ok(())
    }

    /// Marks a set of rows deleted.
    ///
    /// Row ids are interpreted against the file list of the current
    /// active snapshot. With `return_collection`, the pre-delete values of
    /// the rows this call actually killed are returned (already-dead rows
    /// are omitted), ordered by file, then ascending row index.
    #[instrument(skip_all, fields(oid = %self.oid))]
    pub async fn delete(
        &mut self,
        row_ids: impl IntoIterator<Item = RowId>,
        return_collection: bool,
    ) -> Result<Option<Vec<RecordBatch>>, DeleteError> {
        let snapshot = self.catalog.active_snapshot().await;
        let file_names = self
            .catalog
            .data_files_search(self.oid, snapshot)
            .await
            .map_err(DeleteError::FileListing)?;

        let grouped = group_row_ids(row_ids, self.config.vector_size as u64);
        let dv_manager = DvManager::new(self.lake.clone(), snapshot);
        let fresh = dv_manager
            .apply_deletion_vectors(&grouped, &file_names)
            .await
            .map_err(DeleteError::Dv)?;

        let collected = if return_collection {
            let rows = scan::read_rows_marked_deleted(
                &self.data_store,
                &self.catalog,
                self.oid,
                &self.schema,
                &file_names,
                &fresh,
                self.config.vector_size as u64,
            )
            .await
            .map_err(DeleteError::ReadBack)?;
            Some(rows)
        } else {
            None
        };

        dv_manager.flush().await.map_err(DeleteError::Dv)?;
        Ok(collected)
    }

    /// Builds the scan over the table's current file list.
    ///
    /// The file list is resolved under the snapshot active now; filter
    /// predicates drive statistics-based file pruning only. An empty file
    /// list yields a degenerate empty scan.
    #[instrument(skip_all, fields(oid = %self.oid))]
    pub async fn scan(&self, request: ScanRequest) -> Result<ScanStream, ScanError> {
        let out_schema = scan::output_schema(&self.schema, &request)?;

        let snapshot = self.catalog.active_snapshot().await;
        let file_names = self
            .catalog
            .data_files_search(self.oid, snapshot)
            .await
            .map_err(ScanError::FileListing)?;
        if file_names.is_empty() {
            return Ok(scan::empty_scan());
        }

        let mut file_stats = Vec::with_capacity(file_names.len());
        for file_name in &file_names {
            let stats = stats::get_or_load(&self.catalog, self.oid, file_name, &self.schema)
                .await
                .map_err(|source| ScanError::Statistics {
                    file_name: file_name.clone(),
                    source,
                })?;
            file_stats.push(stats);
        }

        let pruner = FilePruner::new(
            self.schema.clone(),
            file_stats.iter().map(|s| s.statistics.clone()).collect(),
        );
        let kept = pruner.prune(&request.filters);
        debug!(
            total = file_names.len(),
            kept = kept.len(),
            "resolved scan file list"
        );

        let mut files = Vec::with_capacity(kept.len());
        for file_number in kept {
            let file_name = file_names[file_number].clone();
            let location = self.data_store.resolve_read_path(&file_name).await;
            files.push(ScanFile {
                file_number: file_number as u32,
                file_name,
                location,
                statistics: file_stats[file_number].clone(),
            });
        }

        Ok(scan::scan_stream(
            self.data_store.clone(),
            self.catalog.clone(),
            self.lake.clone(),
            files,
            out_schema,
            request,
            self.config.vector_size as u64,
        ))
    }

    /// Advertises one index covering every column.
    ///
    /// The host consumes this to lower UPDATE on the table as
    /// delete-plus-insert rather than in-place modification.
    pub fn storage_info(&self) -> TableStorageInfo {
        TableStorageInfo {
            index_info: vec![IndexInfo {
                column_set: (0..self.schema.fields().len()).collect(),
            }],
        }
    }
}

/// Storage description handed to the host integration layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStorageInfo {
    pub index_info: Vec<IndexInfo>,
}

/// A set of columns covered by an index, by table-schema ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub column_set: BTreeSet<usize>,
}
