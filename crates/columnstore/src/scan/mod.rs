//! Scan path: multi-file reader with statistics pruning, row-id
//! synthesis, and per-chunk deletion-vector filtering.
//!
//! Files are read strictly in file-list order and rows within a file in
//! reader order; the adapter never reorders rows. Residual predicate
//! evaluation stays with the host engine — the filters handed to a scan
//! only drive file pruning.

use std::collections::BTreeMap;
use std::ops::Range;
use std::pin::Pin;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Int64Array, RecordBatch};
use arrow::compute::filter_record_batch;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use async_stream::try_stream;
use datafusion::logical_expr::Expr;
use futures::{Stream, TryStreamExt as _};
use parquet::arrow::arrow_reader::{ArrowReaderMetadata, ArrowReaderOptions};
use parquet::arrow::{ParquetRecordBatchStreamBuilder, ProjectionMask};
use shoal_catalog::{Catalog, DeletionVector, FileName, Lake, TableOid};
use shoal_data_store::{DataFileLocation, DataStore};

use crate::dv::{DvManager, FileChunkDvs};
use crate::error::ScanError;
use crate::row_id::RowId;
use crate::stats::{self, DataFileStatistics};

mod pruning;

pub use pruning::FilePruner;

/// Name of the synthesized row-id column.
pub const ROW_ID_COLUMN: &str = "row_id";

/// What a scan should produce.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    /// Table-schema column ordinals to read, in output order. `None`
    /// reads every column. Duplicate ordinals are allowed (an UPDATE
    /// lowering can request the same column twice) and share one read.
    pub projection: Option<Vec<usize>>,

    /// Filter predicates used for statistics-based file pruning.
    pub filters: Vec<Expr>,

    /// Appends the synthesized `row_id` column to the output.
    pub with_row_id: bool,
}

/// One file of a scan, carrying its pre-pruning file number.
pub(crate) struct ScanFile {
    pub(crate) file_number: u32,
    pub(crate) file_name: FileName,
    pub(crate) location: DataFileLocation,
    pub(crate) statistics: DataFileStatistics,
}

/// Ordered stream of result batches for one scan.
pub type ScanStream = Pin<Box<dyn Stream<Item = Result<RecordBatch, ScanError>> + Send>>;

/// The scan's output schema: projected table columns, plus `row_id` when
/// requested.
pub(crate) fn output_schema(
    table_schema: &SchemaRef,
    request: &ScanRequest,
) -> Result<SchemaRef, ScanError> {
    let field_count = table_schema.fields().len();
    let mut fields: Vec<Arc<Field>> = match &request.projection {
        Some(projection) => projection
            .iter()
            .map(|&index| {
                table_schema
                    .fields()
                    .get(index)
                    .cloned()
                    .ok_or(ScanError::InvalidProjection { index, field_count })
            })
            .collect::<Result<_, _>>()?,
        None => table_schema.fields().to_vec(),
    };
    if request.with_row_id {
        fields.push(Arc::new(Field::new(ROW_ID_COLUMN, DataType::Int64, false)));
    }
    Ok(Arc::new(Schema::new(fields)))
}

/// The degenerate scan over an empty file list.
pub(crate) fn empty_scan() -> ScanStream {
    Box::pin(futures::stream::empty())
}

/// Builds the scan stream over an already pruned, ordered file list.
pub(crate) fn scan_stream(
    data_store: Arc<DataStore>,
    catalog: Arc<dyn Catalog>,
    lake: Arc<dyn Lake>,
    files: Vec<ScanFile>,
    out_schema: SchemaRef,
    request: ScanRequest,
    vector_size: u64,
) -> ScanStream {
    let stream = try_stream! {
        // Parquet returns projected columns in file order; `requested`
        // maps them back to the caller's order.
        let projection = request.projection.as_ref().map(|requested| {
            let mut sorted = requested.clone();
            sorted.sort_unstable();
            sorted.dedup();
            (sorted, requested.clone())
        });

        for file in files {
            let reader = data_store
                .file_reader(&file.location)
                .await
                .map_err(|source| ScanError::OpenFile {
                    file_name: file.file_name.clone(),
                    source,
                })?;
            let reader_metadata = ArrowReaderMetadata::try_new(
                file.statistics.metadata.clone(),
                ArrowReaderOptions::new(),
            )
            .map_err(|source| ScanError::Prepare {
                file_name: file.file_name.clone(),
                source,
            })?;

            let mut builder =
                ParquetRecordBatchStreamBuilder::new_with_metadata(reader, reader_metadata)
                    .with_batch_size(vector_size as usize);
            if let Some((sorted, _)) = &projection {
                let mask = ProjectionMask::roots(builder.parquet_schema(), sorted.iter().copied());
                builder = builder.with_projection(mask);
            }
            let mut batches = builder.build().map_err(|source| ScanError::Prepare {
                file_name: file.file_name.clone(),
                source,
            })?;

            let mut next_row: u64 = 0;
            while let Some(batch) = batches
                .try_next()
                .await
                .map_err(|source| ScanError::Read {
                    file_name: file.file_name.clone(),
                    source,
                })?
            {
                let len = batch.num_rows();
                let first_row = next_row;
                next_row += len as u64;
                if len == 0 {
                    continue;
                }

                // Deletion vectors are read under the snapshot active at
                // chunk time.
                let snapshot = catalog.active_snapshot().await;
                let dv_manager = DvManager::new(lake.clone(), snapshot);

                let mut keep = vec![true; len];
                let mut survivors = Vec::with_capacity(len);
                let mut any_deleted = false;
                for (chunk_index, rows) in chunk_ranges(first_row, len, vector_size) {
                    let dv = dv_manager
                        .fetch_dv(&file.file_name, chunk_index)
                        .await
                        .map_err(ScanError::Dv)?;
                    for row in rows {
                        if dv.is_deleted((row % vector_size) as u32) {
                            keep[(row - first_row) as usize] = false;
                            any_deleted = true;
                        } else {
                            survivors.push(row);
                        }
                    }
                }

                let batch = if any_deleted {
                    if survivors.is_empty() {
                        continue;
                    }
                    filter_record_batch(&batch, &BooleanArray::from(keep))
                        .map_err(ScanError::Assemble)?
                } else {
                    batch
                };

                let mut columns: Vec<ArrayRef> = match &projection {
                    Some((sorted, requested)) => requested
                        .iter()
                        .map(|index| {
                            let position = sorted
                                .binary_search(index)
                                .expect("requested index is present in the mask");
                            batch.column(position).clone()
                        })
                        .collect(),
                    None => batch.columns().to_vec(),
                };
                if request.with_row_id {
                    let row_ids = Int64Array::from_iter_values(
                        survivors
                            .iter()
                            .map(|&row| RowId::new(file.file_number, row as u32).as_i64()),
                    );
                    columns.push(Arc::new(row_ids));
                }

                let out = RecordBatch::try_new(out_schema.clone(), columns)
                    .map_err(ScanError::Assemble)?;
                yield out;
            }
        }
    };
    Box::pin(stream)
}

/// Reads back the rows a delete marked dead, for the return-collection
/// option of `Delete`.
///
/// Touched files are visited in ascending file-number order and each file
/// is read once in row order, so the emitted rows follow file, then
/// chunk, then in-chunk ascending row index.
pub(crate) async fn read_rows_marked_deleted(
    data_store: &Arc<DataStore>,
    catalog: &Arc<dyn Catalog>,
    oid: TableOid,
    table_schema: &SchemaRef,
    file_names: &[FileName],
    marked: &FileChunkDvs,
    vector_size: u64,
) -> Result<Vec<RecordBatch>, ScanError> {
    let mut collected = Vec::new();
    for (&file_number, chunks) in marked {
        // In range: the deletion-vector pass resolved these indices.
        let file_name = &file_names[file_number as usize];
        let statistics = stats::get_or_load(catalog, oid, file_name, table_schema)
            .await
            .map_err(|source| ScanError::Statistics {
                file_name: file_name.clone(),
                source,
            })?;
        let location = data_store.resolve_read_path(file_name).await;
        let reader = data_store
            .file_reader(&location)
            .await
            .map_err(|source| ScanError::OpenFile {
                file_name: file_name.clone(),
                source,
            })?;
        let reader_metadata =
            ArrowReaderMetadata::try_new(statistics.metadata.clone(), ArrowReaderOptions::new())
                .map_err(|source| ScanError::Prepare {
                    file_name: file_name.clone(),
                    source,
                })?;
        let mut batches =
            ParquetRecordBatchStreamBuilder::new_with_metadata(reader, reader_metadata)
                .with_batch_size(vector_size as usize)
                .build()
                .map_err(|source| ScanError::Prepare {
                    file_name: file_name.clone(),
                    source,
                })?;

        let mut next_row: u64 = 0;
        while let Some(batch) = batches
            .try_next()
            .await
            .map_err(|source| ScanError::Read {
                file_name: file_name.clone(),
                source,
            })?
        {
            let len = batch.num_rows();
            let first_row = next_row;
            next_row += len as u64;

            let (mask, any_marked) = marked_mask(chunks, first_row, len, vector_size);
            if !any_marked {
                continue;
            }
            let filtered = filter_record_batch(&batch, &BooleanArray::from(mask))
                .map_err(ScanError::Assemble)?;
            if filtered.num_rows() > 0 {
                let batch = RecordBatch::try_new(table_schema.clone(), filtered.columns().to_vec())
                    .map_err(ScanError::Assemble)?;
                collected.push(batch);
            }
        }
    }
    Ok(collected)
}

/// Splits a run of consecutive file row numbers into per-chunk ranges.
fn chunk_ranges(first_row: u64, len: usize, vector_size: u64) -> Vec<(u64, Range<u64>)> {
    let end = first_row + len as u64;
    let mut ranges = Vec::new();
    let mut row = first_row;
    while row < end {
        let chunk_index = row / vector_size;
        let chunk_end = ((chunk_index + 1) * vector_size).min(end);
        ranges.push((chunk_index, row..chunk_end));
        row = chunk_end;
    }
    ranges
}

/// Mask of the rows in `[first_row, first_row + len)` whose deletion bit
/// is set in the per-chunk map.
fn marked_mask(
    chunks: &BTreeMap<u64, DeletionVector>,
    first_row: u64,
    len: usize,
    vector_size: u64,
) -> (Vec<bool>, bool) {
    let mut mask = vec![false; len];
    let mut any = false;
    for (chunk_index, rows) in chunk_ranges(first_row, len, vector_size) {
        if let Some(dv) = chunks.get(&chunk_index) {
            for row in rows {
                if dv.is_deleted((row % vector_size) as u32) {
                    mask[(row - first_row) as usize] = true;
                    any = true;
                }
            }
        }
    }
    (mask, any)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ranges_split_on_vector_boundaries() {
        // A run crossing two chunk boundaries.
        let ranges = chunk_ranges(2000, 200, 2048);
        assert_eq!(ranges, vec![(0, 2000..2048), (1, 2048..2200)]);

        // Fully inside one chunk.
        assert_eq!(chunk_ranges(10, 5, 2048), vec![(0, 10..15)]);

        // Starting exactly on a boundary.
        assert_eq!(chunk_ranges(4096, 1, 2048), vec![(2, 4096..4097)]);
    }

    #[test]
    fn marked_mask_follows_chunk_bitmaps() {
        let mut chunks = BTreeMap::new();
        let mut dv0 = DeletionVector::new();
        dv0.mark(2047);
        chunks.insert(0, dv0);
        let mut dv1 = DeletionVector::new();
        dv1.mark(0);
        chunks.insert(1, dv1);

        // Rows 2046..2050: 2047 (chunk 0, offset 2047) and 2048 (chunk 1,
        // offset 0) are marked.
        let (mask, any) = marked_mask(&chunks, 2046, 4, 2048);
        assert!(any);
        assert_eq!(mask, vec![false, true, true, false]);
    }

    #[test]
    fn marked_mask_without_touched_chunks_is_empty() {
        let chunks = BTreeMap::new();
        let (mask, any) = marked_mask(&chunks, 0, 3, 2048);
        assert!(!any);
        assert_eq!(mask, vec![false; 3]);
    }

    #[test]
    fn row_id_output_schema_appends_int64_column() {
        let table_schema: SchemaRef = Arc::new(Schema::new(vec![Field::new(
            "v",
            DataType::Int32,
            false,
        )]));
        let schema = output_schema(
            &table_schema,
            &ScanRequest {
                with_row_id: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(schema.field(1).name(), ROW_ID_COLUMN);
        assert_eq!(schema.field(1).data_type(), &DataType::Int64);
    }

    #[test]
    fn projection_out_of_range_is_rejected() {
        let table_schema: SchemaRef = Arc::new(Schema::new(vec![Field::new(
            "v",
            DataType::Int32,
            false,
        )]));
        let err = output_schema(
            &table_schema,
            &ScanRequest {
                projection: Some(vec![3]),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ScanError::InvalidProjection {
                index: 3,
                field_count: 1
            }
        ));
    }
}
