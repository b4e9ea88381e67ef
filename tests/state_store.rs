// tests/state_store.rs
use chrono::{TimeZone, Utc};
use daily_digest::fingerprint::fingerprint_fields;
use daily_digest::{FileStateStore, PipelineError, SourceState, StateStore};
use std::fs;

fn seeded(source: &str) -> SourceState {
    let mut s = SourceState::empty(source);
    let at = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
    s.record_new(fingerprint_fields("X", "http://a", ""), at);
    s
}

#[test]
fn missing_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path().join("not-yet-created"));
    let s = store.load("feed");
    assert!(s.is_empty());
    assert_eq!(s.source_id(), "feed");
}

#[test]
fn save_then_reload_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path());
    let s = seeded("feed");
    store.save("feed", &s).unwrap();
    assert_eq!(store.load("feed"), s);
    assert_eq!(store.load("feed"), s);
}

#[test]
fn corrupt_file_degrades_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path());
    fs::write(store.path_for("feed"), "{ this is not json").unwrap();

    assert!(matches!(
        store.load_checked("feed"),
        Err(PipelineError::StateCorrupt { .. })
    ));
    assert!(store.load("feed").is_empty());
}

#[test]
fn truncated_file_degrades_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path());
    store.save("feed", &seeded("feed")).unwrap();
    let full = fs::read(store.path_for("feed")).unwrap();
    fs::write(store.path_for("feed"), &full[..full.len() / 2]).unwrap();
    assert!(store.load("feed").is_empty());
}

#[test]
fn save_leaves_no_temp_file_and_replaces_previous() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path());
    store.save("feed", &SourceState::empty("feed")).unwrap();
    store.save("feed", &seeded("feed")).unwrap();

    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["feed.json".to_string()]);
    assert_eq!(store.load("feed").len(), 1);
}

#[test]
fn failed_save_keeps_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path());
    store.save("feed", &seeded("feed")).unwrap();
    let before = fs::read(store.path_for("feed")).unwrap();

    // A directory squatting on the temp path makes the temp write fail.
    fs::create_dir(dir.path().join("feed.json.tmp")).unwrap();
    let err = store.save("feed", &SourceState::empty("feed")).unwrap_err();
    assert!(matches!(err, PipelineError::PersistFailure { .. }));
    assert_eq!(fs::read(store.path_for("feed")).unwrap(), before);
}

#[test]
fn refuses_to_save_other_sources_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path());
    let err = store.save("feed", &seeded("other")).unwrap_err();
    assert!(matches!(err, PipelineError::PersistFailure { .. }));
    assert!(!store.path_for("feed").exists());
}

#[test]
fn sources_are_independent_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path());
    store.save("a", &seeded("a")).unwrap();
    fs::write(store.path_for("b"), "garbage").unwrap();
    assert!(store.load("b").is_empty());
    assert_eq!(store.load("a").len(), 1);
}
