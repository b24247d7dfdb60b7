//! End-to-end memory flow: remember → recall → extract → forget, plus the
//! archival dedup contract.

use tempfile::TempDir;

use mnemo::models::EntryId;
use mnemo::output::MAX_OUTPUT;
use mnemo::services::{
    archive, MemoryService, RememberRequest, SmartRememberRequest,
};
use mnemo::storage::MemoryDb;

fn in_memory_service() -> MemoryService {
    MemoryService::new(MemoryDb::in_memory().unwrap())
}

#[test]
fn remember_then_recall_finds_the_entry() {
    let svc = in_memory_service();
    let stored = svc
        .remember(RememberRequest {
            content: "The deploy requires running migrations first".to_string(),
            tags: Some(vec!["deploy".to_string(), "ops".to_string()]),
            summary: Some("Deploy prerequisites".to_string()),
            source: "text".to_string(),
            source_name: None,
        })
        .unwrap();

    let out = svc.recall("migrations deploy", &[], 20).unwrap();
    assert!(out.contains(stored.id.as_str()));
    assert!(out.contains("small"), "size category is mandatory: {out}");
}

#[test]
fn recall_output_is_bounded_even_with_many_hits() {
    let svc = in_memory_service();
    for i in 0..200 {
        svc.remember(RememberRequest {
            content: format!("benchmark note {i}: the scheduler saturates at high load"),
            tags: Some(vec!["benchmark".to_string()]),
            summary: Some(format!(
                "A fairly long benchmark summary line number {i} with extra words"
            )),
            source: "text".to_string(),
            source_name: None,
        })
        .unwrap();
    }

    let out = svc.recall("scheduler saturates benchmark", &[], 200).unwrap();
    let bounded = mnemo::output::bound_output("recall", &out);
    assert!(bounded.len() <= MAX_OUTPUT);
}

#[test]
fn tag_filtering_is_exact_not_substring() {
    let svc = in_memory_service();
    svc.remember(RememberRequest {
        content: "notes about the tool protocol".to_string(),
        tags: Some(vec!["mcp".to_string()]),
        summary: Some("mcp notes".to_string()),
        source: "text".to_string(),
        source_name: None,
    })
    .unwrap();
    svc.remember(RememberRequest {
        content: "notes about the server side".to_string(),
        tags: Some(vec!["mcp-server".to_string()]),
        summary: Some("server notes".to_string()),
        source: "text".to_string(),
        source_name: None,
    })
    .unwrap();

    let (metas, total) = svc.db().list(&["mcp".to_string()], 0, 50).unwrap();
    assert_eq!(total, 1);
    assert_eq!(metas[0].tags, vec!["mcp"]);

    let (both, _) = svc.db().list(&[], 0, 50).unwrap();
    assert_eq!(both.len(), 2);
}

#[test]
fn fts_index_tracks_entries_through_churn() {
    let svc = in_memory_service();
    let mut ids = Vec::new();
    for i in 0..20 {
        let stored = svc
            .remember(RememberRequest {
                content: format!("distinctive payload alpha{i} bravo{i}"),
                tags: Some(vec!["churn".to_string()]),
                summary: Some(format!("churn entry {i}")),
                source: "text".to_string(),
                source_name: None,
            })
            .unwrap();
        ids.push(stored.id);
    }
    for id in ids.iter().take(10) {
        svc.forget(id).unwrap();
    }

    svc.db().integrity_check().unwrap();

    // Every surviving entry is discoverable by a token from its summary.
    for i in 10..20 {
        let out = svc.recall(&format!("alpha{i}"), &[], 10).unwrap();
        assert!(!out.starts_with("No matching"), "entry {i} not found");
    }
    // Deleted entries are gone from search.
    let out = svc.recall("alpha3", &[], 10).unwrap();
    assert!(out.starts_with("No matching"));
}

#[test]
fn grep_within_entry_is_cheap_and_idempotent() {
    let svc = in_memory_service();
    let stored = svc
        .remember(RememberRequest {
            content: "header\nTOKEN=abc123\nfooter\nTOKEN=def456\n".to_string(),
            tags: None,
            summary: None,
            source: "text".to_string(),
            source_name: None,
        })
        .unwrap();

    let first = svc
        .memory_extract(&stored.id, None, Some("token"), 0)
        .unwrap();
    let second = svc
        .memory_extract(&stored.id, None, Some("token"), 0)
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first.lines().filter(|l| l.starts_with(">>")).count(), 2);
}

#[test]
fn archive_dedup_within_window() {
    // Two consecutive archives of identical content for the same session
    // file must produce exactly one primary entry.
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("chat-session.jsonl");
    let record = serde_json::json!({
        "type": "user",
        "timestamp": "2024-06-01T09:00:00.000Z",
        "message": {"role": "user", "content": "remember that redis is our cache of record"}
    });
    std::fs::write(&log, format!("{record}\n")).unwrap();

    let svc = in_memory_service();
    assert!(archive::archive_session(&svc, None, &log, "SessionEnd", None).unwrap());
    let after_first = svc.db().count_entries().unwrap();

    assert!(!archive::archive_session(&svc, None, &log, "SessionEnd", None).unwrap());
    assert_eq!(svc.db().count_entries().unwrap(), after_first);
}

#[test]
fn archive_replaces_when_transcript_grows() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("grow-session.jsonl");
    let record = |text: &str| {
        serde_json::json!({
            "type": "user",
            "timestamp": "2024-06-01T09:00:00.000Z",
            "message": {"role": "user", "content": text}
        })
        .to_string()
    };
    std::fs::write(&log, record("first exchange about the migration") + "\n").unwrap();

    let svc = in_memory_service();
    archive::archive_session(&svc, None, &log, "PreCompact", None).unwrap();
    let first_ids: Vec<String> = svc
        .db()
        .find_by_source_name("grow-session.jsonl")
        .unwrap()
        .iter()
        .map(|m| m.id.to_string())
        .collect();
    assert!(!first_ids.is_empty());

    // The transcript grows; re-archive replaces the earlier entries.
    std::fs::write(
        &log,
        record("first exchange about the migration")
            + "\n"
            + &record("second exchange about the rollback plan")
            + "\n",
    )
    .unwrap();
    archive::archive_session(&svc, None, &log, "SessionEnd", None).unwrap();

    let second_ids: Vec<String> = svc
        .db()
        .find_by_source_name("grow-session.jsonl")
        .unwrap()
        .iter()
        .map(|m| m.id.to_string())
        .collect();
    assert!(!second_ids.is_empty());
    for id in &first_ids {
        assert!(!second_ids.contains(id), "old entry {id} should be replaced");
    }
    for id in first_ids {
        assert!(svc.db().get(&EntryId::new(id)).unwrap().is_none());
    }
}

#[test]
fn smart_remember_stores_two_tiers_for_large_content() {
    let svc = in_memory_service();
    let content = "a block of session conversation\n\n".repeat(400);
    let result = archive::smart_remember(
        &svc,
        None,
        SmartRememberRequest {
            content,
            source: "session".to_string(),
            source_name: Some("big.jsonl".to_string()),
            user_tags: vec!["conversation".to_string()],
            label: Some("Session: demo".to_string()),
            dedup: false,
        },
    )
    .unwrap();

    assert!(result.content_id.is_some());
    let summary = svc.db().get(&result.summary_id).unwrap().unwrap();
    assert!(summary.char_count < 10_240, "summary tier must stay dense");
    assert!(summary.tags.contains(&"summary".to_string()));
    assert!(summary.tags.contains(&"conversation".to_string()));
}

#[test]
fn persistent_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let memory_dir = dir.path().join("memory");

    let id = {
        let svc = MemoryService::new(MemoryDb::open(&memory_dir).unwrap());
        svc.remember(RememberRequest {
            content: "durable fact about the ingestion pipeline".to_string(),
            tags: Some(vec!["durable".to_string()]),
            summary: None,
            source: "text".to_string(),
            source_name: None,
        })
        .unwrap()
        .id
    };

    let svc = MemoryService::new(MemoryDb::open(&memory_dir).unwrap());
    let entry = svc.db().get(&id).unwrap().unwrap();
    assert!(entry.content.contains("ingestion pipeline"));
    let out = svc.recall("ingestion pipeline", &[], 10).unwrap();
    assert!(out.contains(id.as_str()));
}
