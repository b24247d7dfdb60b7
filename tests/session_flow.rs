//! Analysis-session lifecycle: init → result → status → finalize, the
//! conflict rules, and the bounded-output contract on session views.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use mnemo::chunk::{chunk_by_lines, ChunkParams, ChunkStrategy};
use mnemo::models::{SessionId, SessionStatus};
use mnemo::output::MAX_OUTPUT;
use mnemo::session::{format_status, format_summary, SessionStore};
use mnemo::Error;

fn store() -> (TempDir, SessionStore) {
    let dir = TempDir::new().unwrap();
    let store = SessionStore::new(dir.path().join("sessions"));
    (dir, store)
}

#[test]
fn full_lifecycle() {
    let (_guard, store) = store();
    let state = store.init("where is retry logic?", Path::new("/tmp")).unwrap();
    let id = state.session_id.clone();
    assert_eq!(id.as_str().len(), 12);

    store.add_result(&id, "k1", "v1").unwrap();
    store.add_result(&id, "k2", "v2").unwrap();

    let loaded = store.load(&id).unwrap();
    assert_eq!(loaded.results.len(), 2);
    assert!(loaded.iterations.len() >= 2);

    let status = format_status(&loaded);
    assert!(status.contains("where is retry logic?"));
    assert!(status.contains("Status: active"));

    store.finalize(&id, Some("retries live in the transport layer")).unwrap();
    let finalized = store.load(&id).unwrap();
    assert_eq!(finalized.status, SessionStatus::Finalized);

    // Frozen: the next write is a conflict and changes nothing.
    let err = store.add_result(&id, "k3", "v3").unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(store.load(&id).unwrap().results.len(), 2);
}

#[test]
fn unknown_session_surfaces_not_found() {
    let (_guard, store) = store();
    let err = store.load(&SessionId::new("deadbeef0000")).unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn status_with_huge_result_is_bounded() {
    let (_guard, store) = store();
    let state = store.init("big one", Path::new("/tmp")).unwrap();
    store
        .add_result(&state.session_id, "dump", &"z".repeat(100_000))
        .unwrap();

    let loaded = store.load(&state.session_id).unwrap();
    let summary = format_summary(&loaded, MAX_OUTPUT);
    assert!(summary.len() <= MAX_OUTPUT);
    assert!(summary.contains("big one"));
}

#[test]
fn manifest_attaches_to_session() {
    let (guard, store) = store();
    let state = store.init("chunk it", Path::new("/tmp")).unwrap();

    let target = guard.path().join("target.txt");
    let body: String = (1..=100).map(|i| format!("line {i}\n")).collect();
    fs::write(&target, body).unwrap();

    let manifest = chunk_by_lines(&target, 40, 5).unwrap();
    let path = store.store_manifest(&state.session_id, &manifest).unwrap();
    assert_eq!(path, store.manifest_path(&state.session_id));

    // The stored manifest resolves chunk ids for the extractor.
    let chunk = &manifest.chunks[0];
    let text = mnemo::extract::extract_chunk(&path, &chunk.chunk_id).unwrap();
    assert!(text.contains("line 1"));
}

#[test]
fn state_file_never_partially_written() {
    let (_guard, store) = store();
    let state = store.init("atomicity", Path::new("/tmp")).unwrap();

    // Interleave writes and reads; a torn write would fail the parse.
    for i in 0..100 {
        store
            .add_result(&state.session_id, &format!("key{i}"), &"payload".repeat(100))
            .unwrap();
        let raw = fs::read_to_string(
            store.session_dir(&state.session_id).join("state.json"),
        )
        .unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&raw).is_ok());
    }
}

#[test]
fn chunk_params_default_matches_documented_tunables() {
    let params = ChunkParams::default();
    assert_eq!(params.chunk_size, 500);
    assert_eq!(params.overlap, 50);
    assert_eq!(params.heading_level, 2);
    assert_eq!(params.target_size, 50_000);
    assert_eq!(ChunkStrategy::Lines.as_str(), "lines");
}
