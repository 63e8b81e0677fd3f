//! Crate-level integration tests: a full session lifecycle through the
//! store, and a sync export/import round trip between two databases.

use engram::storage::{NewObservation, NewPrompt, SearchFilter, Store};
use engram::sync::SyncEngine;

#[test]
fn test_full_session_lifecycle() {
    let store = Store::in_memory().unwrap();

    store.create_session("sess-1", "engram", "/home/user/engram").unwrap();
    store
        .add_prompt(NewPrompt {
            session_id: "sess-1".to_string(),
            content: "refactor the store module".to_string(),
            project: Some("engram".to_string()),
        })
        .unwrap();
    let observation_id = store
        .add_observation(NewObservation {
            session_id: "sess-1".to_string(),
            r#type: "decision".to_string(),
            title: "fix: auth token refresh".to_string(),
            content: "switched to a single refresh mutex to avoid racing requests".to_string(),
            tool_name: Some("editor".to_string()),
            project: None,
        })
        .unwrap();
    store.end_session("sess-1", "wired up token refresh locking").unwrap();

    let session = store.get_session("sess-1").unwrap();
    assert_eq!(session.observation_count, 1);
    assert!(session.end_time.is_some());

    let found = store.search("auth refresh", &SearchFilter::default()).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, observation_id);

    let context = store.format_context(None).unwrap();
    assert!(context.contains("## Recent Sessions"));
    assert!(context.contains("## Recent User Prompts"));
    assert!(context.contains("## Recent Observations"));

    let timeline = store.timeline(observation_id, 0, 0).unwrap();
    assert_eq!(timeline.pivot.id, observation_id);
    assert_eq!(timeline.total_in_session, 1);
}

#[test]
fn test_private_content_never_reaches_search_index() {
    let store = Store::in_memory().unwrap();
    store.create_session("sess-1", "engram", "/tmp").unwrap();
    store
        .add_observation(NewObservation {
            session_id: "sess-1".to_string(),
            r#type: "note".to_string(),
            title: "credential rotation".to_string(),
            content: "rotated to <private>sk-live-abcdef123456</private> successfully".to_string(),
            tool_name: None,
            project: None,
        })
        .unwrap();

    let leaked = store.search("abcdef123456", &SearchFilter::default()).unwrap();
    assert!(leaked.is_empty());

    let found = store.search("rotated", &SearchFilter::default()).unwrap();
    assert_eq!(found.len(), 1);
    assert!(!found[0].content.contains("sk-live"));
}

#[test]
fn test_sync_round_trip_between_two_databases() {
    let repo = tempfile::tempdir().unwrap();
    let source = Store::in_memory().unwrap();
    source.create_session("sess-1", "acme", "/repo").unwrap();
    source
        .add_observation(NewObservation {
            session_id: "sess-1".to_string(),
            r#type: "bugfix".to_string(),
            title: "off-by-one in pagination".to_string(),
            content: "fixed the limit check in recent_observations".to_string(),
            tool_name: None,
            project: None,
        })
        .unwrap();

    let engine = SyncEngine::new(repo.path());
    let export_report = engine.export(&source, "alice", None).unwrap();
    assert!(!export_report.is_empty);

    let second_export = engine.export(&source, "alice", None).unwrap();
    assert!(second_export.is_empty, "exporting identical data twice must be a no-op");

    let target = Store::in_memory().unwrap();
    let import_report = engine.import(&target).unwrap();
    assert_eq!(import_report.chunks_imported, 1);
    assert_eq!(import_report.observations_imported, 1);

    let second_import = engine.import(&target).unwrap();
    assert_eq!(second_import.chunks_imported, 0);
    assert_eq!(second_import.chunks_skipped, 1);

    let observations = target.recent_observations(None, 10).unwrap();
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0].title, "off-by-one in pagination");
}

#[test]
fn test_error_variants_surface_distinct_messages() {
    let store = Store::in_memory().unwrap();

    let err = store.get_observation(999).unwrap_err();
    assert!(err.to_string().contains("not found"));

    let err = store.end_session("ghost-session", "x").unwrap_err();
    assert!(err.to_string().contains("not found"));
}
