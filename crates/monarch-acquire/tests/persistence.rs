//! Runs against the DuckDB store and a real asset directory.

#![cfg(feature = "duckdb")]
#![allow(clippy::unwrap_used)]

mod common;

use common::{FakeCatalog, small_pages};
use monarch_acquire::{AcquisitionPipeline, CancelFlag, Persistence, RecordSink};
use monarch_store::{AssetStore, DuckStore};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn persistence(dir: &std::path::Path) -> Persistence {
    let store = DuckStore::open_persistent(&dir.join("monarch.duckdb")).unwrap();
    let assets = AssetStore::open(&dir.join("images"), "/data/images").unwrap();
    Persistence::new(store, assets)
}

#[tokio::test]
async fn run_writes_rows_and_assets_together() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = FakeCatalog::synthetic(40);

    let pipeline = AcquisitionPipeline::new(&catalog, persistence(dir.path()), small_pages(40));
    let report = pipeline
        .run(6, None, &mut StdRng::seed_from_u64(4), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(report.accepted, 6);

    let sink = pipeline.into_sink();
    assert_eq!(sink.store.observation_count().unwrap(), 6);
    for id in sink.load_all_ids().unwrap() {
        let path = sink.assets.path_for(id);
        assert_eq!(std::fs::read(&path).unwrap(), format!("jpeg-bytes-{id}").into_bytes());
        assert_eq!(sink.store.raw_payload(id).unwrap()["id"], id);
    }
    assert!(
        std::fs::read_dir(sink.assets.dir())
            .unwrap()
            .all(|e| !e.unwrap().file_name().to_string_lossy().starts_with(".incoming-")),
        "temporary asset file left behind"
    );
}

#[tokio::test]
async fn reopened_store_is_not_refilled() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = FakeCatalog::synthetic(12);

    let first = AcquisitionPipeline::new(&catalog, persistence(dir.path()), small_pages(20))
        .run(8, None, &mut StdRng::seed_from_u64(1), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(first.accepted, 8);

    let pipeline = AcquisitionPipeline::new(&catalog, persistence(dir.path()), small_pages(20));
    let second = pipeline
        .run(8, None, &mut StdRng::seed_from_u64(1), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(second.pool_size, 4);
    assert_eq!(second.accepted, 4);
    assert_eq!(pipeline.sink().store.observation_count().unwrap(), 12);
}

#[test]
fn duplicate_insert_reports_conflict() {
    use monarch_core::{Candidate, Record};

    let dir = tempfile::tempdir().unwrap();
    let sink = persistence(dir.path());
    let candidate = Candidate::from_value(common::observation(77)).unwrap();
    let mut record = Record::from_candidate(
        &candidate,
        "https://assets.test/photos/77/medium.jpg".into(),
    )
    .unwrap();
    record.local_asset_path = Some(sink.store_asset(77, b"jpeg").unwrap());

    assert!(!sink.exists(77).unwrap());
    assert!(sink.insert_ignore_conflict(&record).unwrap());
    assert!(sink.exists(77).unwrap());
    assert!(!sink.insert_ignore_conflict(&record).unwrap());
    assert_eq!(sink.store.observation_count().unwrap(), 1);
    assert_eq!(record.local_asset_path.as_deref(), Some("/data/images/77.jpg"));
}
