//! Statistics-based file pruning during scans.

mod common;

use common::{collect_values, collect_with_row_ids, int_batch, setup};
use datafusion::prelude::{col, lit};
use shoal_columnstore::{ColumnstoreConfig, ScanRequest};

/// Two files: file 0 holds `0..1000`, file 1 holds `1000..2000`.
async fn two_file_fixture() -> common::TestTable {
    let mut fixture = setup(ColumnstoreConfig::default()).await;
    fixture.table.insert(&int_batch(0..1000)).await.unwrap();
    fixture.table.finalize_insert().await.unwrap();
    fixture.table.insert(&int_batch(1000..2000)).await.unwrap();
    fixture.table.finalize_insert().await.unwrap();
    fixture
}

#[tokio::test]
async fn provably_false_files_are_pruned() {
    //* Given
    let fixture = two_file_fixture().await;

    //* When: only file 0 can satisfy v < 500.
    let stream = fixture
        .table
        .scan(ScanRequest {
            filters: vec![col("v").lt(lit(500i32))],
            with_row_id: true,
            ..Default::default()
        })
        .await
        .unwrap();
    let rows = collect_with_row_ids(stream).await;

    //* Then: file 1 was never opened; pruning is file-granular, so all of
    //* file 0 is emitted and residual filtering stays with the host.
    assert_eq!(rows.len(), 1000);
    assert!(rows.iter().all(|(_, id)| id.file_number() == 0));
    let values: Vec<i32> = rows.iter().map(|(v, _)| *v).collect();
    assert_eq!(values, (0..1000).collect::<Vec<_>>());
}

#[tokio::test]
async fn pruning_keeps_original_file_numbers() {
    //* Given
    let fixture = two_file_fixture().await;

    //* When: only file 1 survives.
    let stream = fixture
        .table
        .scan(ScanRequest {
            filters: vec![col("v").gt_eq(lit(1000i32))],
            with_row_id: true,
            ..Default::default()
        })
        .await
        .unwrap();
    let rows = collect_with_row_ids(stream).await;

    //* Then: the surviving file keeps its pre-pruning number.
    assert_eq!(rows.len(), 1000);
    assert!(rows.iter().all(|(_, id)| id.file_number() == 1));
    for (value, row_id) in rows {
        assert_eq!(row_id.file_row_number(), (value - 1000) as u32);
    }
}

#[tokio::test]
async fn pruning_every_file_yields_a_well_formed_empty_scan() {
    //* Given
    let fixture = two_file_fixture().await;

    //* When: no file can contain v < 0.
    let stream = fixture
        .table
        .scan(ScanRequest {
            filters: vec![col("v").lt(lit(0i32))],
            ..Default::default()
        })
        .await
        .unwrap();

    //* Then
    assert!(collect_values(stream).await.is_empty());
}

#[tokio::test]
async fn unrelated_filters_do_not_prune() {
    //* Given
    let fixture = two_file_fixture().await;

    //* When: the predicate is satisfiable everywhere.
    let stream = fixture
        .table
        .scan(ScanRequest {
            filters: vec![col("v").gt_eq(lit(0i32))],
            ..Default::default()
        })
        .await
        .unwrap();

    //* Then: both files are read.
    assert_eq!(collect_values(stream).await.len(), 2000);
}
