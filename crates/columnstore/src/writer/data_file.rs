//! Row-group-sized data file writer.

use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use parquet::arrow::AsyncArrowWriter;
use parquet::basic::Compression;
use parquet::errors::ParquetError;
use parquet::file::metadata::{ParquetMetaData, ParquetMetaDataReader};
use parquet::file::properties::WriterProperties;
use shoal_data_store::{CachedFileWriter, FooterRecorder};
use tracing::trace;

/// The fixed parquet trailer: 4-byte little-endian footer length plus the
/// `PAR1` magic. Reconstructible, so it is trimmed from the stored blob.
const FOOTER_TRAILER_LEN: usize = 8;

/// Accumulates rows into row groups and tracks when the file is large
/// enough to rotate.
///
/// Writes flow through the [`CachedFileWriter`] tee, so the remote upload,
/// the optional cache mirror, and the finalize-window footer capture all
/// observe identical bytes.
pub struct DataFileWriter {
    writer: AsyncArrowWriter<CachedFileWriter>,
    recorder: FooterRecorder,
    row_group_size: usize,
    row_group_size_bytes: usize,
    file_size_bytes: u64,
}

impl DataFileWriter {
    /// `schema` is the write schema, already carrying the field-id
    /// mapping.
    pub fn try_new(
        file_writer: CachedFileWriter,
        schema: SchemaRef,
        row_group_size: usize,
        file_size_bytes: u64,
    ) -> Result<Self, ParquetError> {
        let recorder = file_writer.recorder();
        // The explicit flush in `write` drives row-group boundaries; the
        // writer's own limit only backstops oversized input chunks.
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .set_max_row_group_size(row_group_size.saturating_mul(2))
            .build();
        let writer = AsyncArrowWriter::try_new(file_writer, schema, Some(props))?;
        Ok(Self {
            writer,
            recorder,
            row_group_size,
            row_group_size_bytes: row_group_size * 1024,
            file_size_bytes,
        })
    }

    /// Appends a chunk. Returns `true` iff a row group was flushed and the
    /// on-disk file size reached the rotation threshold; the caller then
    /// rotates to a new data file.
    pub async fn write(&mut self, batch: &RecordBatch) -> Result<bool, DataFileWriteError> {
        self.writer
            .write(batch)
            .await
            .map_err(DataFileWriteError::Append)?;

        if self.writer.in_progress_rows() >= self.row_group_size
            || self.writer.in_progress_size() >= self.row_group_size_bytes
        {
            trace!(
                rows = self.writer.in_progress_rows(),
                in_progress_bytes = self.writer.in_progress_size(),
                "flushing row group"
            );
            self.writer
                .flush()
                .await
                .map_err(DataFileWriteError::Flush)?;
            return Ok(self.writer.bytes_written() as u64 >= self.file_size_bytes);
        }
        Ok(false)
    }

    /// Flushes residual rows as the last row group, captures the footer
    /// through the recorder, and closes the file.
    ///
    /// The returned `file_size` counts every byte of the finished file:
    /// the data bytes already uploaded plus the recorded footer. The
    /// metadata blob is the footer minus its trailer.
    pub async fn finalize(mut self) -> Result<FinalizedDataFile, ParquetError> {
        self.writer.flush().await?;
        let data_bytes = self.writer.bytes_written() as u64;

        // Only the footer is written after this point; record it so the
        // catalog gets the metadata without a read-back from the store.
        self.recorder.arm();
        self.writer.close().await?;

        let footer = self.recorder.take();
        if footer.len() <= FOOTER_TRAILER_LEN {
            return Err(ParquetError::General(format!(
                "captured footer is {} bytes, shorter than the parquet trailer",
                footer.len()
            )));
        }
        let file_size = data_bytes + footer.len() as u64;
        let mut metadata_blob = footer;
        metadata_blob.truncate(metadata_blob.len() - FOOTER_TRAILER_LEN);
        let parquet_metadata = ParquetMetaDataReader::decode_metadata(&metadata_blob)?;

        Ok(FinalizedDataFile {
            file_size,
            metadata_blob,
            parquet_metadata: Arc::new(parquet_metadata),
        })
    }
}

/// The outcome of closing a data file.
pub struct FinalizedDataFile {
    /// Total bytes of the finished file, footer included.
    pub file_size: u64,
    /// The footer minus its fixed 8-byte trailer, stored inline in the
    /// catalog.
    pub metadata_blob: Vec<u8>,
    /// The footer as decoded metadata, used to publish statistics without
    /// re-parsing the blob.
    pub parquet_metadata: Arc<ParquetMetaData>,
}

/// An append or row-group flush failed.
#[derive(Debug, thiserror::Error)]
pub enum DataFileWriteError {
    #[error("append failed")]
    Append(#[source] ParquetError),

    #[error("row group flush failed")]
    Flush(#[source] ParquetError),
}
