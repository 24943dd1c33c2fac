//! Stateful multi-file writer for one table.

use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::{Field, Schema, SchemaRef};
use parquet::arrow::PARQUET_FIELD_ID_META_KEY;
use shoal_catalog::{Catalog, FileName, Lake, TableOid};
use shoal_data_store::DataStore;
use tracing::debug;

use crate::config::ColumnstoreConfig;
use crate::error::InsertError;
use crate::stats::{self, DataFileStatistics};
use crate::writer::data_file::DataFileWriter;

struct CurrentDataFile {
    file_name: FileName,
    writer: DataFileWriter,
}

/// Writes a table's insert stream as a sequence of immutable data files.
///
/// The first `write` after the writer is idle opens a fresh data file
/// under a random name; when the file crosses the size threshold, or on
/// `finalize`, the file is closed and registered with the catalog and the
/// lake in one step. Registration runs inside the caller's transactional
/// context.
pub struct ColumnstoreWriter {
    oid: TableOid,
    catalog: Arc<dyn Catalog>,
    lake: Arc<dyn Lake>,
    data_store: Arc<DataStore>,
    /// Table schema as the catalog knows it.
    schema: SchemaRef,
    /// Table schema annotated with the column-name → ordinal field-id
    /// mapping the columnar format stores.
    write_schema: SchemaRef,
    config: ColumnstoreConfig,
    current: Option<CurrentDataFile>,
}

impl ColumnstoreWriter {
    pub fn new(
        oid: TableOid,
        catalog: Arc<dyn Catalog>,
        lake: Arc<dyn Lake>,
        data_store: Arc<DataStore>,
        schema: SchemaRef,
        config: ColumnstoreConfig,
    ) -> Self {
        let write_schema = schema_with_field_ids(&schema);
        Self {
            oid,
            catalog,
            lake,
            data_store,
            schema,
            write_schema,
            config,
            current: None,
        }
    }

    pub async fn write(&mut self, batch: &RecordBatch) -> Result<(), InsertError> {
        if self.current.is_none() {
            self.start_data_file().await?;
        }
        let current = self.current.as_mut().expect("a data file is open");
        let rotate = current
            .writer
            .write(batch)
            .await
            .map_err(|source| InsertError::Write {
                file_name: current.file_name.clone(),
                source,
            })?;
        if rotate {
            self.finalize_data_file().await?;
        }
        Ok(())
    }

    /// Closes and registers the in-flight data file, if any.
    pub async fn finalize(&mut self) -> Result<(), InsertError> {
        if self.current.is_some() {
            self.finalize_data_file().await?;
        }
        Ok(())
    }

    async fn start_data_file(&mut self) -> Result<(), InsertError> {
        let file_name = FileName::generate();
        let file_writer = self
            .data_store
            .create_data_file_writer(&file_name)
            .await
            .map_err(|source| InsertError::OpenFile {
                file_name: file_name.clone(),
                source,
            })?;
        let writer = DataFileWriter::try_new(
            file_writer,
            self.write_schema.clone(),
            self.config.row_group_size,
            self.config.file_size_bytes,
        )
        .map_err(|source| InsertError::CreateWriter {
            file_name: file_name.clone(),
            source,
        })?;
        debug!(oid = %self.oid, %file_name, "starting data file");
        self.current = Some(CurrentDataFile { file_name, writer });
        Ok(())
    }

    async fn finalize_data_file(&mut self) -> Result<(), InsertError> {
        let CurrentDataFile { file_name, writer } =
            self.current.take().expect("a data file is open");

        let finalized = writer
            .finalize()
            .await
            .map_err(|source| InsertError::Finalize {
                file_name: file_name.clone(),
                source,
            })?;

        debug!(
            oid = %self.oid,
            %file_name,
            file_size = finalized.file_size,
            rows = finalized.parquet_metadata.file_metadata().num_rows(),
            "finalized data file"
        );

        self.catalog
            .data_files_insert(self.oid, &file_name, finalized.metadata_blob)
            .await
            .map_err(|source| InsertError::RegisterFile {
                file_name: file_name.clone(),
                source,
            })?;
        self.lake
            .add_file(self.oid, &file_name, finalized.file_size)
            .await
            .map_err(|source| InsertError::LakeAddFile {
                file_name: file_name.clone(),
                source,
            })?;

        let file_stats = DataFileStatistics::try_new(finalized.parquet_metadata, &self.schema)
            .map_err(|source| InsertError::Statistics {
                file_name: file_name.clone(),
                source,
            })?;
        stats::publish(&file_name, file_stats);

        Ok(())
    }
}

/// Annotates every column with a parquet field id equal to its ordinal.
fn schema_with_field_ids(schema: &SchemaRef) -> SchemaRef {
    let fields: Vec<Arc<Field>> = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(ordinal, field)| {
            let mut metadata = field.metadata().clone();
            metadata.insert(PARQUET_FIELD_ID_META_KEY.to_string(), ordinal.to_string());
            Arc::new(field.as_ref().clone().with_metadata(metadata))
        })
        .collect();
    Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()))
}
