//! Columnstore table engine.
//!
//! Layers an immutable, columnar-file-backed table abstraction on top of
//! an embedded analytic query engine and a transactional catalog. A
//! logical table's physical state is a set of immutable parquet data
//! files in an object store plus per-chunk deletion vectors persisted by
//! the lake service; the engine exposes insert, delete, and scan over it.
//!
//! - Inserts accumulate row groups and rotate data files by size; each
//!   finalized file is registered with the catalog (footer inline) and
//!   the lake in one step ([`writer`]).
//! - Deletes translate packed row ids into per-(file, chunk) bitmaps and
//!   merge them through the lake ([`dv`]).
//! - Scans prune files by cached statistics, apply deletion vectors per
//!   chunk, and can synthesize a `row_id` column ([`scan`]).

pub mod config;
pub mod dv;
pub mod error;
pub mod row_id;
pub mod scan;
pub mod stats;
pub mod table;
pub mod writer;

pub use config::ColumnstoreConfig;
pub use error::{DeleteError, InsertError, ScanError, TableOpenError};
pub use row_id::RowId;
pub use scan::{ScanRequest, ScanStream, ROW_ID_COLUMN};
pub use table::{ColumnstoreTable, IndexInfo, TableStorageInfo};

pub use shoal_catalog::{Catalog, DeletionVector, FileName, Lake, Snapshot, TableOid};
