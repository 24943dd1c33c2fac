//! Per-operation error types.
//!
//! Every error aborts the current operation and propagates to the host
//! transaction; the engine never retries. Messages identify the data file
//! and the phase that failed.

use datafusion::arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use parquet::errors::ParquetError;
use shoal_catalog::{CatalogError, FileName, LakeError};
use shoal_data_store::{OpenReaderError, OpenWriterError, ObjectStoreCreationError, StoreUrlError};

use crate::dv::DvError;
use crate::stats::StatisticsError;
use crate::writer::DataFileWriteError;

/// Errors that occur when binding a table facade to its catalog entry.
#[derive(Debug, thiserror::Error)]
pub enum TableOpenError {
    /// The catalog could not resolve the table's base path.
    #[error("failed to resolve table base path")]
    BasePath(#[source] CatalogError),

    /// The catalog returned a base path the engine cannot address.
    #[error("catalog returned an unusable base path")]
    InvalidBasePath(#[source] StoreUrlError),

    /// The storage backend for the base path could not be created.
    #[error("failed to create object store")]
    CreateStore(#[source] ObjectStoreCreationError),
}

/// Errors that occur during `Insert` / `FinalizeInsert`.
#[derive(Debug, thiserror::Error)]
pub enum InsertError {
    /// Opening the data file (and its optional cache mirror) failed.
    #[error("failed to open data file {file_name} for writing")]
    OpenFile {
        file_name: FileName,
        #[source]
        source: OpenWriterError,
    },

    /// The parquet writer could not be constructed.
    #[error("failed to create parquet writer for {file_name}")]
    CreateWriter {
        file_name: FileName,
        #[source]
        source: ParquetError,
    },

    /// An append or row-group flush failed.
    #[error("failed to write data file {file_name}")]
    Write {
        file_name: FileName,
        #[source]
        source: DataFileWriteError,
    },

    /// Closing the data file (footer write) failed.
    #[error("failed to finalize data file {file_name}")]
    Finalize {
        file_name: FileName,
        #[source]
        source: ParquetError,
    },

    /// The catalog rejected the data-file registration.
    #[error("failed to register data file {file_name} in catalog")]
    RegisterFile {
        file_name: FileName,
        #[source]
        source: CatalogError,
    },

    /// The lake rejected the data-file registration.
    #[error("failed to register data file {file_name} with lake")]
    LakeAddFile {
        file_name: FileName,
        #[source]
        source: LakeError,
    },

    /// Statistics could not be derived from the captured footer.
    #[error("failed to compute statistics for data file {file_name}")]
    Statistics {
        file_name: FileName,
        #[source]
        source: DataFusionError,
    },
}

/// Errors that occur during `Delete`.
///
/// No partial results are returned from a failed delete; uncommitted
/// deletion-vector writes are discarded with the lake batch.
#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    /// The catalog could not list the table's data files.
    #[error("failed to resolve table files from catalog")]
    FileListing(#[source] CatalogError),

    /// Fetching, persisting, or committing deletion vectors failed.
    #[error("deletion vector update failed")]
    Dv(#[source] DvError),

    /// Reading back the pre-delete values failed.
    #[error("failed to read back deleted rows")]
    ReadBack(#[source] ScanError),
}

/// Errors that occur during `Scan`.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The catalog could not list the table's data files.
    #[error("failed to resolve table files from catalog")]
    FileListing(#[source] CatalogError),

    /// Per-file statistics could not be loaded.
    #[error("failed to load statistics for data file {file_name}")]
    Statistics {
        file_name: FileName,
        #[source]
        source: StatisticsError,
    },

    /// A projection index is out of range for the table schema.
    #[error("invalid projection index {index} for schema with {field_count} columns")]
    InvalidProjection { index: usize, field_count: usize },

    /// The data file could not be opened for reading.
    #[error("failed to open data file {file_name}")]
    OpenFile {
        file_name: FileName,
        #[source]
        source: OpenReaderError,
    },

    /// The parquet reader could not be prepared from cached metadata.
    #[error("failed to prepare reader for data file {file_name}")]
    Prepare {
        file_name: FileName,
        #[source]
        source: ParquetError,
    },

    /// Reading a chunk from the data file failed.
    #[error("failed to read data file {file_name}")]
    Read {
        file_name: FileName,
        #[source]
        source: ParquetError,
    },

    /// A deletion-vector lookup failed.
    #[error("deletion vector lookup failed")]
    Dv(#[source] DvError),

    /// The output batch could not be assembled.
    #[error("failed to assemble output batch")]
    Assemble(#[source] ArrowError),
}
