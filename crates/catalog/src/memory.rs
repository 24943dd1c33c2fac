//! In-memory catalog and lake implementations.
//!
//! These back the engine's tests and single-process embedders. State is
//! held under async locks; every trait call is atomic, which satisfies the
//! "inside the host transaction" expectation for a single caller.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;
use url::Url;

use crate::{
    Catalog, CatalogError, DeletionVector, FileName, Lake, LakeError, MetadataBlob, Snapshot,
    TableOid,
};

#[derive(Debug, Default)]
struct CatalogState {
    tables: HashMap<TableOid, TableState>,
    active: u64,
}

#[derive(Debug)]
struct TableState {
    base_path: Url,
    files: Vec<DataFileRecord>,
}

#[derive(Debug)]
struct DataFileRecord {
    file_name: FileName,
    metadata_blob: MetadataBlob,
    visible_from: Snapshot,
}

/// Snapshot-versioned in-memory [`Catalog`].
///
/// Files registered under snapshot `n` are visible to searches at any
/// snapshot `>= n`. [`MemoryCatalog::advance_snapshot`] models the host
/// committing a transaction.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: RwLock<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table entry with its base directory URI.
    pub async fn create_table(&self, oid: TableOid, base_path: Url) {
        let mut state = self.state.write().await;
        state.tables.insert(
            oid,
            TableState {
                base_path,
                files: Vec::new(),
            },
        );
    }

    /// Moves the active snapshot forward and returns the new token.
    pub async fn advance_snapshot(&self) -> Snapshot {
        let mut state = self.state.write().await;
        state.active += 1;
        Snapshot::from_raw(state.active)
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn table_base_path(&self, oid: TableOid) -> Result<Url, CatalogError> {
        let state = self.state.read().await;
        state
            .tables
            .get(&oid)
            .map(|t| t.base_path.clone())
            .ok_or(CatalogError::TableNotFound(oid))
    }

    async fn data_files_insert(
        &self,
        oid: TableOid,
        file_name: &FileName,
        metadata_blob: MetadataBlob,
    ) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        let visible_from = Snapshot::from_raw(state.active);
        let table = state
            .tables
            .get_mut(&oid)
            .ok_or(CatalogError::TableNotFound(oid))?;
        trace!(%oid, %file_name, "registering data file");
        table.files.push(DataFileRecord {
            file_name: file_name.clone(),
            metadata_blob,
            visible_from,
        });
        Ok(())
    }

    async fn data_files_search(
        &self,
        oid: TableOid,
        snapshot: Snapshot,
    ) -> Result<Vec<FileName>, CatalogError> {
        let state = self.state.read().await;
        let table = state
            .tables
            .get(&oid)
            .ok_or(CatalogError::TableNotFound(oid))?;
        Ok(table
            .files
            .iter()
            .filter(|f| f.visible_from <= snapshot)
            .map(|f| f.file_name.clone())
            .collect())
    }

    async fn data_file_metadata(
        &self,
        oid: TableOid,
        file_name: &FileName,
    ) -> Result<MetadataBlob, CatalogError> {
        let state = self.state.read().await;
        let table = state
            .tables
            .get(&oid)
            .ok_or(CatalogError::TableNotFound(oid))?;
        table
            .files
            .iter()
            .find(|f| &f.file_name == file_name)
            .map(|f| f.metadata_blob.clone())
            .ok_or_else(|| CatalogError::FileNotFound {
                oid,
                file_name: file_name.clone(),
            })
    }

    async fn active_snapshot(&self) -> Snapshot {
        Snapshot::from_raw(self.state.read().await.active)
    }
}

type DvKey = (FileName, u64);

#[derive(Debug, Default)]
struct LakeState {
    files: HashMap<FileName, RegisteredFile>,
    committed: HashMap<DvKey, Vec<u8>>,
    staged: Vec<(DvKey, Vec<u8>)>,
}

#[derive(Debug, Clone, Copy)]
struct RegisteredFile {
    #[allow(dead_code)]
    oid: TableOid,
    file_size: u64,
}

/// In-memory [`Lake`].
///
/// Deletion-vector writes are staged and become visible at [`Lake::commit`];
/// dropping the lake without committing discards the batch, so a failed
/// delete leaves no partial vectors behind. Bitmaps cross this boundary in
/// their portable wire format.
#[derive(Debug, Default)]
pub struct MemoryLake {
    state: RwLock<LakeState>,
}

impl MemoryLake {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registered size of a data file, if the lake knows it.
    pub async fn registered_file_size(&self, file_name: &FileName) -> Option<u64> {
        let state = self.state.read().await;
        state.files.get(file_name).map(|f| f.file_size)
    }

    /// The committed deletion vector for `(file_name, chunk_index)`.
    pub async fn committed_dv(
        &self,
        file_name: &FileName,
        chunk_index: u64,
    ) -> Option<DeletionVector> {
        let state = self.state.read().await;
        let bytes = state
            .committed
            .get(&(file_name.clone(), chunk_index))?
            .clone();
        Some(DeletionVector::from_bytes(&bytes).expect("lake stores well-formed bitmaps"))
    }

    /// Number of committed deletion vectors across all files.
    pub async fn committed_dv_count(&self) -> usize {
        self.state.read().await.committed.len()
    }
}

#[async_trait]
impl Lake for MemoryLake {
    async fn add_file(
        &self,
        oid: TableOid,
        file_name: &FileName,
        file_size: u64,
    ) -> Result<(), LakeError> {
        let mut state = self.state.write().await;
        trace!(%oid, %file_name, file_size, "lake add file");
        state
            .files
            .insert(file_name.clone(), RegisteredFile { oid, file_size });
        Ok(())
    }

    async fn fetch_dv(
        &self,
        file_name: &FileName,
        chunk_index: u64,
        _snapshot: Snapshot,
    ) -> Result<DeletionVector, LakeError> {
        let state = self.state.read().await;
        let key = (file_name.clone(), chunk_index);
        // Read-your-own-writes within the open batch, committed state
        // otherwise. Snapshot-consistent historical reads are a property of
        // real lake services; the in-memory lake serves the latest state.
        let bytes = state
            .staged
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, bytes)| bytes)
            .or_else(|| state.committed.get(&key));
        match bytes {
            Some(bytes) => DeletionVector::from_bytes(bytes)
                .map_err(|err| LakeError::Backend(Box::new(err))),
            None => Ok(DeletionVector::new()),
        }
    }

    async fn write_dv(
        &self,
        file_name: &FileName,
        chunk_index: u64,
        dv: &DeletionVector,
    ) -> Result<(), LakeError> {
        let mut state = self.state.write().await;
        trace!(%file_name, chunk_index, deleted = dv.cardinality(), "staging deletion vector");
        state
            .staged
            .push(((file_name.clone(), chunk_index), dv.to_bytes()));
        Ok(())
    }

    async fn commit(&self) -> Result<(), LakeError> {
        let mut state = self.state.write().await;
        let staged = std::mem::take(&mut state.staged);
        for (key, bytes) in staged {
            state.committed.insert(key, bytes);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn files_are_visible_from_their_snapshot() {
        let catalog = MemoryCatalog::new();
        let oid = TableOid::new(16384);
        catalog
            .create_table(oid, Url::parse("memory:///warehouse/t1/").unwrap())
            .await;

        let before = catalog.active_snapshot().await;
        let file = FileName::generate();
        catalog.data_files_insert(oid, &file, vec![1, 2, 3]).await.unwrap();

        // Visible at the snapshot it was registered under, and later ones.
        assert_eq!(catalog.data_files_search(oid, before).await.unwrap(), vec![file.clone()]);
        let later = catalog.advance_snapshot().await;
        assert_eq!(catalog.data_files_search(oid, later).await.unwrap(), vec![file.clone()]);

        // A file registered after a snapshot was taken is not visible to it.
        let newer = FileName::generate();
        catalog.advance_snapshot().await;
        catalog.data_files_insert(oid, &newer, vec![]).await.unwrap();
        assert_eq!(catalog.data_files_search(oid, later).await.unwrap(), vec![file]);
    }

    #[tokio::test]
    async fn dv_writes_are_invisible_until_commit() {
        let lake = MemoryLake::new();
        let file = FileName::generate();
        let snapshot = Snapshot::from_raw(0);

        let mut dv = DeletionVector::new();
        dv.mark(42);
        lake.write_dv(&file, 0, &dv).await.unwrap();

        assert_eq!(lake.committed_dv_count().await, 0);
        // The open batch still reads its own write.
        assert!(lake.fetch_dv(&file, 0, snapshot).await.unwrap().is_deleted(42));

        lake.commit().await.unwrap();
        assert_eq!(lake.committed_dv_count().await, 1);
        assert!(lake.committed_dv(&file, 0).await.unwrap().is_deleted(42));
    }
}
