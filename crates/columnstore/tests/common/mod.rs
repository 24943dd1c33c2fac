//! Shared fixtures for the columnstore integration tests.
//!
//! Tables run against an in-memory object store standing in for the
//! remote store, with the in-memory catalog and lake implementations.
#![allow(dead_code)]

use std::sync::Arc;

use arrow::array::{Int32Array, RecordBatch};
use arrow::array::cast::AsArray;
use arrow::datatypes::{DataType, Field, Int32Type, Int64Type, Schema, SchemaRef};
use futures::TryStreamExt as _;
use object_store::memory::InMemory;
use shoal_catalog::memory::{MemoryCatalog, MemoryLake};
use shoal_catalog::TableOid;
use shoal_columnstore::{ColumnstoreConfig, ColumnstoreTable, RowId, ScanStream};
use shoal_data_store::{DataStore, StoreUrl};

pub struct TestTable {
    pub table: ColumnstoreTable,
    pub catalog: Arc<MemoryCatalog>,
    pub lake: Arc<MemoryLake>,
    pub store: Arc<InMemory>,
    pub oid: TableOid,
}

pub fn int_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new("v", DataType::Int32, false)]))
}

pub fn int_batch(values: impl IntoIterator<Item = i32>) -> RecordBatch {
    let array = Int32Array::from_iter_values(values);
    RecordBatch::try_new(int_schema(), vec![Arc::new(array)]).expect("batch matches schema")
}

/// Builds a table bound to a fresh catalog, lake, and in-memory store.
pub async fn setup(config: ColumnstoreConfig) -> TestTable {
    let catalog = Arc::new(MemoryCatalog::new());
    let lake = Arc::new(MemoryLake::new());
    let oid = TableOid::new(16401);
    let url = StoreUrl::parse("memory:///warehouse/t1/").expect("valid test url");
    catalog.create_table(oid, url.inner().clone()).await;

    let store = Arc::new(InMemory::new());
    let data_store = DataStore::with_store(store.clone(), url, config.cache_settings());
    let table = ColumnstoreTable::with_data_store(
        catalog.clone(),
        lake.clone(),
        oid,
        int_schema(),
        config,
        data_store,
    );

    TestTable {
        table,
        catalog,
        lake,
        store,
        oid,
    }
}

/// Collects the `v` column values from a scan, in emission order.
pub async fn collect_values(stream: ScanStream) -> Vec<i32> {
    let batches: Vec<RecordBatch> = stream.try_collect().await.expect("scan succeeds");
    batches
        .iter()
        .flat_map(|batch| {
            batch
                .column(0)
                .as_primitive::<Int32Type>()
                .values()
                .iter()
                .copied()
        })
        .collect()
}

/// Collects `(v, row_id)` pairs from a scan that projected `row_id` last.
pub async fn collect_with_row_ids(stream: ScanStream) -> Vec<(i32, RowId)> {
    let batches: Vec<RecordBatch> = stream.try_collect().await.expect("scan succeeds");
    batches
        .iter()
        .flat_map(|batch| {
            let values = batch.column(0).as_primitive::<Int32Type>();
            let row_ids = batch
                .column(batch.num_columns() - 1)
                .as_primitive::<Int64Type>();
            values
                .values()
                .iter()
                .zip(row_ids.values().iter())
                .map(|(&v, &id)| (v, RowId::from_i64(id)))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Scans every column with no filters and returns the sorted values.
pub async fn scan_sorted_values(table: &ColumnstoreTable) -> Vec<i32> {
    let stream = table
        .scan(Default::default())
        .await
        .expect("scan starts");
    let mut values = collect_values(stream).await;
    values.sort_unstable();
    values
}
