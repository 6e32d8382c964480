use std::time::Duration;

use tempfile::TempDir;

use postviz_app::paths::AppPaths;
use postviz_app::pipeline::ArtifactKind;
use postviz_app::services::{
    Artifact, GenerationRecord, GenerationRecordStore, ImageEncoding, ReaperConfig, RecordStatus,
    RecordStoreError, reap_stuck_records,
};

fn open_store(temp: &TempDir) -> GenerationRecordStore {
    let paths = AppPaths::new(temp.path()).expect("paths");
    GenerationRecordStore::open(&paths).expect("open store")
}

fn artifact(url: &str) -> Artifact {
    Artifact {
        url: url.to_string(),
        encoding: ImageEncoding::Png,
        generated_at_ms: 0,
        size_bytes: Some(4),
    }
}

#[test]
fn record_lifecycle_is_reflected_in_status_counts() {
    let temp = TempDir::new().expect("temp dir");
    let store = open_store(&temp);

    let committed = store
        .commit(&GenerationRecord::new("item-1", "intro-post"))
        .expect("commit");
    assert_eq!(
        store
            .count_by_status(RecordStatus::Generating)
            .expect("count"),
        1
    );

    let mut done = committed;
    done.insert_artifact(ArtifactKind::Infographic, artifact("u1"));
    done.set_status(RecordStatus::Completed, None);
    store.commit(&done).expect("terminal commit");

    assert_eq!(
        store
            .count_by_status(RecordStatus::Generating)
            .expect("count"),
        0
    );
    assert_eq!(
        store
            .count_by_status(RecordStatus::Completed)
            .expect("count"),
        1
    );
}

#[test]
fn interleaved_writers_surface_the_race_instead_of_clobbering() {
    let temp = TempDir::new().expect("temp dir");
    let store = open_store(&temp);

    let base = store
        .commit(&GenerationRecord::new("item-1", "intro-post"))
        .expect("commit");

    // Run A and run B both read version 1. A commits first.
    let mut a = base.clone();
    a.insert_artifact(ArtifactKind::Infographic, artifact("a-info"));
    store.commit(&a).expect("A commits");

    let mut b = base;
    b.insert_artifact(ArtifactKind::Illustration, artifact("b-illu"));
    let error = store.commit(&b).expect_err("B's stale write is rejected");
    assert!(matches!(error, RecordStoreError::VersionConflict { .. }));

    // B recovers by re-reading through modify(); the final state contains
    // both writers' artifacts rather than B's snapshot alone.
    let merged = store
        .modify("item-1", 3, |record| {
            record.insert_artifact(ArtifactKind::Illustration, artifact("b-illu"));
        })
        .expect("modify succeeds");
    assert!(merged.artifacts.contains_key(&ArtifactKind::Infographic));
    assert!(merged.artifacts.contains_key(&ArtifactKind::Illustration));
}

#[test]
fn reaper_fails_records_stuck_in_generating() {
    let temp = TempDir::new().expect("temp dir");
    let store = open_store(&temp);

    store
        .commit(&GenerationRecord::new("item-1", "intro-post"))
        .expect("commit");

    std::thread::sleep(Duration::from_millis(30));

    let config = ReaperConfig {
        generating_max_age_ms: 10,
    };
    let report = reap_stuck_records(&store, &config).expect("reap");
    assert_eq!(report.failed, vec!["item-1".to_string()]);

    let record = store.get("item-1").expect("get").expect("present");
    assert_eq!(record.status, RecordStatus::Failed);
    assert!(
        record
            .error
            .as_deref()
            .is_some_and(|message| message.contains("did not finish")),
        "reaped records carry an operator-readable error"
    );
}
