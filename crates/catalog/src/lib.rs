//! Catalog and lake service contracts for the shoal columnstore.
//!
//! The columnstore engine never owns its metadata: data-file registration,
//! snapshot visibility, and deletion-vector persistence all live behind the
//! [`Catalog`] and [`Lake`] contracts defined here. The host embeds the
//! engine by providing implementations of both; [`memory`] ships in-memory
//! implementations used by tests and single-process embedders.

use async_trait::async_trait;
use url::Url;

pub mod dv;
pub mod file_name;
pub mod memory;

pub use dv::DeletionVector;
pub use file_name::FileName;

/// Opaque table identifier assigned by the host catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableOid(u32);

impl TableOid {
    pub const fn new(oid: u32) -> Self {
        Self(oid)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for TableOid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Point-in-time catalog visibility token.
///
/// Opaque to the engine; it is acquired from [`Catalog::active_snapshot`]
/// and passed back to every metadata read. Ordering is an implementation
/// detail of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Snapshot(u64);

impl Snapshot {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

/// The columnar footer of a data file, minus its fixed 8-byte trailer.
///
/// Stored inline in the catalog so the planner can derive statistics
/// without a second round-trip to the data path.
pub type MetadataBlob = Vec<u8>;

/// Metadata-store operations the columnstore requires from the host.
///
/// All operations are expected to execute inside the host's surrounding
/// transaction; the engine never retries.
#[async_trait]
pub trait Catalog: Send + Sync + 'static {
    /// Resolves the table's base directory URI.
    async fn table_base_path(&self, oid: TableOid) -> Result<Url, CatalogError>;

    /// Registers a finalized data file together with its footer blob.
    async fn data_files_insert(
        &self,
        oid: TableOid,
        file_name: &FileName,
        metadata_blob: MetadataBlob,
    ) -> Result<(), CatalogError>;

    /// Lists the table's data files visible under `snapshot`, in
    /// registration order. The position of a file in this list is its
    /// `file_number` for row-id purposes.
    async fn data_files_search(
        &self,
        oid: TableOid,
        snapshot: Snapshot,
    ) -> Result<Vec<FileName>, CatalogError>;

    /// Fetches the stored footer blob for one data file.
    async fn data_file_metadata(
        &self,
        oid: TableOid,
        file_name: &FileName,
    ) -> Result<MetadataBlob, CatalogError>;

    /// The currently active visibility token.
    async fn active_snapshot(&self) -> Snapshot;
}

/// Lake-service operations: data-file registration and deletion-vector
/// persistence, transactional within the surrounding host transaction.
#[async_trait]
pub trait Lake: Send + Sync + 'static {
    /// Announces a newly written data file to the lake.
    async fn add_file(
        &self,
        oid: TableOid,
        file_name: &FileName,
        file_size: u64,
    ) -> Result<(), LakeError>;

    /// Returns the current deletion vector for `(file_name, chunk_index)`,
    /// empty if none exists.
    async fn fetch_dv(
        &self,
        file_name: &FileName,
        chunk_index: u64,
        snapshot: Snapshot,
    ) -> Result<DeletionVector, LakeError>;

    /// Persists a deletion vector. Atomic per `(file_name, chunk_index)`;
    /// ordering across chunks is unspecified.
    async fn write_dv(
        &self,
        file_name: &FileName,
        chunk_index: u64,
        dv: &DeletionVector,
    ) -> Result<(), LakeError>;

    /// Closes the current deletion-vector write batch.
    async fn commit(&self) -> Result<(), LakeError>;
}

/// Errors surfaced by [`Catalog`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The table oid is unknown to the catalog.
    #[error("table {0} not found in catalog")]
    TableNotFound(TableOid),

    /// The data file is not registered for this table.
    #[error("data file {file_name} not found for table {oid}")]
    FileNotFound { oid: TableOid, file_name: FileName },

    /// The backing metadata store rejected the operation.
    #[error("catalog backend error")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors surfaced by [`Lake`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum LakeError {
    /// The backing lake service rejected the operation.
    #[error("lake backend error")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}
