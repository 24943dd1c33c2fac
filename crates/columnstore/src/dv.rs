//! Deletion-vector plane: grouping, fetch/merge/persist, read-path lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use shoal_catalog::{DeletionVector, FileName, Lake, LakeError, Snapshot};
use tracing::{debug, instrument};

use crate::row_id::RowId;

/// Requested deletions, grouped by file number then chunk index.
///
/// Ordered maps keep the persistence and read-back passes deterministic:
/// files ascending, chunks ascending within a file.
pub type FileChunkDvs = BTreeMap<u32, BTreeMap<u64, DeletionVector>>;

/// Decodes and groups a set of row ids into per-(file, chunk) bitmaps.
pub fn group_row_ids(row_ids: impl IntoIterator<Item = RowId>, vector_size: u64) -> FileChunkDvs {
    let mut grouped = FileChunkDvs::new();
    for row_id in row_ids {
        grouped
            .entry(row_id.file_number())
            .or_default()
            .entry(row_id.chunk_index(vector_size))
            .or_default()
            .mark(row_id.offset_in_chunk(vector_size));
    }
    grouped
}

/// Builds, fetches, merges, and persists deletion vectors against the lake
/// under one snapshot.
pub struct DvManager {
    lake: Arc<dyn Lake>,
    snapshot: Snapshot,
}

impl DvManager {
    pub fn new(lake: Arc<dyn Lake>, snapshot: Snapshot) -> Self {
        Self { lake, snapshot }
    }

    /// For every requested chunk: fetch the current vector, OR-merge the
    /// new bits, persist the merged vector.
    ///
    /// Returns the bits that were newly set, in the same grouping; chunks
    /// whose rows were all already deleted are omitted. Persistence is
    /// atomic per chunk, and the whole batch becomes visible at
    /// [`DvManager::flush`].
    #[instrument(skip_all, fields(files = file_chunk_dvs.len()))]
    pub async fn apply_deletion_vectors(
        &self,
        file_chunk_dvs: &FileChunkDvs,
        file_names: &[FileName],
    ) -> Result<FileChunkDvs, DvError> {
        let mut fresh_bits = FileChunkDvs::new();
        for (&file_number, chunks) in file_chunk_dvs {
            let file_name = file_names.get(file_number as usize).ok_or_else(|| {
                DvError::UnknownFileNumber {
                    file_number,
                    file_count: file_names.len(),
                }
            })?;
            for (&chunk_index, requested) in chunks {
                let existing = self.fetch_dv(file_name, chunk_index).await?;
                let fresh = requested.difference(&existing);

                let mut merged = existing;
                merged.union_with(requested);
                self.lake
                    .write_dv(file_name, chunk_index, &merged)
                    .await
                    .map_err(|source| DvError::Persist {
                        file_name: file_name.clone(),
                        chunk_index,
                        source,
                    })?;

                if !fresh.is_empty() {
                    fresh_bits
                        .entry(file_number)
                        .or_default()
                        .insert(chunk_index, fresh);
                }
            }
        }
        debug!(
            chunks = file_chunk_dvs.values().map(|c| c.len()).sum::<usize>(),
            "persisted deletion vectors"
        );
        Ok(fresh_bits)
    }

    /// The current deletion vector for `(file_name, chunk_index)`, empty
    /// if none exists.
    pub async fn fetch_dv(
        &self,
        file_name: &FileName,
        chunk_index: u64,
    ) -> Result<DeletionVector, DvError> {
        self.lake
            .fetch_dv(file_name, chunk_index, self.snapshot)
            .await
            .map_err(|source| DvError::Fetch {
                file_name: file_name.clone(),
                chunk_index,
                source,
            })
    }

    /// Closes the deletion-vector write batch.
    pub async fn flush(&self) -> Result<(), DvError> {
        self.lake.commit().await.map_err(DvError::Commit)
    }
}

/// Errors raised by the deletion-vector plane.
#[derive(Debug, thiserror::Error)]
pub enum DvError {
    /// A row id points past the end of the snapshot's file list.
    #[error("row id references unknown file number {file_number} (table has {file_count} files)")]
    UnknownFileNumber { file_number: u32, file_count: usize },

    /// The lake could not serve a deletion vector.
    #[error("failed to fetch deletion vector for {file_name} chunk {chunk_index}")]
    Fetch {
        file_name: FileName,
        chunk_index: u64,
        #[source]
        source: LakeError,
    },

    /// The lake rejected a deletion-vector write.
    #[error("failed to persist deletion vector for {file_name} chunk {chunk_index}")]
    Persist {
        file_name: FileName,
        chunk_index: u64,
        #[source]
        source: LakeError,
    },

    /// The lake rejected the batch commit.
    #[error("failed to commit deletion vector batch")]
    Commit(#[source] LakeError),
}
