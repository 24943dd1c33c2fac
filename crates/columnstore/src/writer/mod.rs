//! Insert path: row-group accumulation, file rotation, registration.

mod columnstore;
mod data_file;

pub use columnstore::ColumnstoreWriter;
pub use data_file::{DataFileWriteError, DataFileWriter, FinalizedDataFile};
