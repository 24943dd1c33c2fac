//! Write-through local cache behavior.

mod common;

use common::{int_batch, scan_sorted_values, setup};
use object_store::path::Path;
use object_store::ObjectStore as _;
use shoal_catalog::Catalog;
use shoal_columnstore::ColumnstoreConfig;

fn cached_config(cache_root: &std::path::Path) -> ColumnstoreConfig {
    ColumnstoreConfig {
        enable_local_cache: true,
        cache_root: cache_root.to_path_buf(),
        // The fixture store is tiny; any free space clears the gate.
        min_disk_space: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn cache_file_is_bit_identical_to_remote() {
    //* Given: caching armed on a remote-path table.
    let cache_dir = tempfile::tempdir().unwrap();
    let mut fixture = setup(cached_config(cache_dir.path())).await;

    //* When
    fixture.table.insert(&int_batch(0..10_000)).await.unwrap();
    fixture.table.finalize_insert().await.unwrap();

    //* Then: remote bytes and the cache mirror are equal, byte for byte.
    let snapshot = fixture.catalog.active_snapshot().await;
    let files = fixture
        .catalog
        .data_files_search(fixture.oid, snapshot)
        .await
        .unwrap();
    assert_eq!(files.len(), 1);

    let remote = fixture
        .store
        .get(&Path::from(files[0].as_str()))
        .await
        .expect("remote object exists")
        .bytes()
        .await
        .unwrap();
    let cached = std::fs::read(cache_dir.path().join(files[0].as_str()))
        .expect("cache mirror exists");
    assert_eq!(remote.as_ref(), cached.as_slice());
}

#[tokio::test]
async fn scans_are_served_after_caching() {
    //* Given
    let cache_dir = tempfile::tempdir().unwrap();
    let mut fixture = setup(cached_config(cache_dir.path())).await;
    fixture.table.insert(&int_batch(0..2500)).await.unwrap();
    fixture.table.finalize_insert().await.unwrap();

    //* When / Then: the scan resolves to the cache mirror and still
    //* returns the full row set.
    assert_eq!(
        scan_sorted_values(&fixture.table).await,
        (0..2500).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn disk_space_gate_disables_mirroring_but_not_writes() {
    //* Given: an impossible disk-space gate.
    let cache_dir = tempfile::tempdir().unwrap();
    let config = ColumnstoreConfig {
        min_disk_space: u64::MAX,
        ..cached_config(cache_dir.path())
    };
    let mut fixture = setup(config).await;

    //* When
    fixture.table.insert(&int_batch(0..100)).await.unwrap();
    fixture.table.finalize_insert().await.unwrap();

    //* Then: no mirror was written, the remote write went through.
    let entries: Vec<_> = std::fs::read_dir(cache_dir.path()).unwrap().collect();
    assert!(entries.is_empty());
    assert_eq!(
        scan_sorted_values(&fixture.table).await,
        (0..100).collect::<Vec<_>>()
    );
}
