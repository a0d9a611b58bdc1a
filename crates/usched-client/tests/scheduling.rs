//! End-to-end request flows over the in-memory engine.

use usched_client::{ClientError, EntryRecord, ResultSet, Run, Session, Show, UsageError, Verb};
use usched_test_utils::FakeEngine;

const NOW: u32 = 1_700_000_000;

fn session() -> Session<FakeEngine> {
    Session::init(FakeEngine::new().with_clock(NOW)).unwrap()
}

fn run(session: &Session<FakeEngine>, text: &str) -> u64 {
    let ids = session.request(text).unwrap().into_ids().unwrap();
    assert_eq!(ids.len(), 1);
    ids[0]
}

fn show_all(session: &Session<FakeEngine>) -> Vec<EntryRecord> {
    session.request("show 'all'").unwrap().into_records().unwrap()
}

#[test]
fn test_recurring_run_scenario() {
    let session = session();
    session.set_hostname("localhost").unwrap();

    session
        .submit("run 'ls -lah /' in 10 seconds then every 5 seconds")
        .unwrap();
    let ids = session.result_run().unwrap();
    assert_eq!(ids.len(), 1);
    assert_ne!(ids[0], 0);

    session.submit("show 'all'").unwrap();
    let entries = session.result_show().unwrap();
    let entry = entries.iter().find(|e| e.id == ids[0]).unwrap();
    assert_eq!(entry.trigger, NOW + 10);
    assert_eq!(entry.step, 5);
    assert_eq!(entry.expire, 0);
    assert!(entry.is_recurring());
    assert_eq!(entry.subject(), "ls -lah /");

    session.destroy();
}

#[test]
fn test_runs_yield_unique_ids_in_order() {
    let session = session();
    let ids: Vec<u64> = (1..=5)
        .map(|n| run(&session, &format!("run 'job {n}' in {n} minutes")))
        .collect();

    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());

    let shown: Vec<u64> = show_all(&session).iter().map(|e| e.id).collect();
    assert_eq!(shown, ids);
}

#[test]
fn test_compound_run_returns_id_per_schedule() {
    let session = session();
    session
        .submit("run 'backup' in 1 hour and in 2 hours and in 3 hours")
        .unwrap();
    let ids = session.result_run().unwrap();
    assert_eq!(ids.len(), 3);

    let shown = show_all(&session);
    let order: Vec<u64> = shown.iter().map(|e| e.id).collect();
    assert_eq!(order, ids);
    let triggers: Vec<u32> = shown.iter().map(|e| e.trigger).collect();
    assert_eq!(triggers, vec![NOW + 3_600, NOW + 7_200, NOW + 10_800]);
}

#[test]
fn test_existing_schedule_is_listed() {
    let mut nightly = EntryRecord::new(0x20);
    nightly.trigger = NOW + 86_400;
    nightly.step = 86_400;
    nightly.subj = b"logrotate".to_vec();
    let engine = FakeEngine::new().with_clock(NOW).with_entries(vec![nightly.clone()]);
    let session = Session::init(engine).unwrap();

    assert_eq!(show_all(&session), vec![nightly]);
    let id = run(&session, "run 'df -h' now");
    assert!(id > 0x20);
}

#[test]
fn test_run_id_shown_exactly_once() {
    let session = session();
    run(&session, "run 'a' in 1 hour");
    let id = run(&session, "run 'b' in 2 hours");

    let hits = show_all(&session).iter().filter(|e| e.id == id).count();
    assert_eq!(hits, 1);
}

#[test]
fn test_stopped_entry_never_reappears() {
    let session = session();
    let keep = run(&session, "run 'keep' in 1 day");
    let gone = run(&session, "run 'gone' in 1 day");

    let stopped = session
        .request(&format!("stop '{gone:x}'"))
        .unwrap()
        .into_ids()
        .unwrap();
    assert_eq!(stopped, vec![gone]);

    for _ in 0..3 {
        let ids: Vec<u64> = show_all(&session).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![keep]);
    }
}

#[test]
fn test_stop_all_reports_every_id() {
    let session = session();
    let a = run(&session, "run 'a' now");
    let b = run(&session, "run 'b' now");

    session.submit("STOP 'all'").unwrap();
    assert_eq!(session.result_stop().unwrap(), vec![a, b]);
    assert!(show_all(&session).is_empty());
}

#[test]
fn test_show_order_follows_engine() {
    let session = Session::init(FakeEngine::new().with_clock(NOW).reverse_show()).unwrap();
    let first = run(&session, "run 'a' now");
    let second = run(&session, "run 'b' now");

    let shown: Vec<u64> = show_all(&session).iter().map(|e| e.id).collect();
    assert_eq!(shown, vec![second, first]);
}

#[test]
fn test_embedded_nul_truncates_request() {
    let engine = FakeEngine::new();
    let journal = engine.journal_handle();
    let session = Session::init(engine).unwrap();

    session.request("show 'all'\0 and the rest").unwrap();
    assert_eq!(journal.lock().unwrap().requests, vec!["show 'all'".to_owned()]);
}

#[test]
fn test_free_is_idempotent() {
    let engine = FakeEngine::new();
    let journal = engine.journal_handle();
    let session = Session::init(engine).unwrap();

    let mut guard = session.lock().unwrap();
    guard.submit("run 'x' now").unwrap();
    assert_eq!(guard.get::<Run>().unwrap().len(), 1);
    guard.free::<Run>();
    guard.free::<Run>();
    guard.free::<Show>();
    drop(guard);

    assert_eq!(journal.lock().unwrap().frees, vec![Verb::Run]);
}

#[test]
fn test_result_without_request_is_empty() {
    let session = session();
    assert!(session.result_run().unwrap().is_empty());
    assert!(session.result_stop().unwrap().is_empty());
    assert!(session.result_show().unwrap().is_empty());
}

#[test]
fn test_unknown_verb_and_empty_request() {
    let session = session();

    session.submit("run 'x' in 3 fortnights").unwrap_err();
    assert_eq!(session.usage_error().unwrap(), UsageError::InvalidAdverb.code());

    let err = session.submit("reschedule 'all'").unwrap_err();
    assert_eq!(err.status(), UsageError::InvalidOp.code());
    assert_eq!(session.usage_error().unwrap(), UsageError::InvalidOp.code());

    let err = session.submit("   ").unwrap_err();
    assert_eq!(err.status(), UsageError::InsufficientArgs.code());
    assert_eq!(session.usage_error().unwrap(), UsageError::InsufficientArgs.code());
}

#[test]
fn test_transport_failure_keeps_its_code() {
    let session = Session::init(FakeEngine::new().fail_transport(110)).unwrap();
    let err = session.request("show 'all'").unwrap_err();
    assert!(matches!(err, ClientError::Engine(_)));
    assert_eq!(err.status(), 110);
}

#[test]
fn test_show_result_serializes_to_json() {
    let session = session();
    run(&session, "run 'echo hi' in 30 seconds");

    let ResultSet::Records(records) = session.request("show 'all'").unwrap() else {
        panic!("show must yield records");
    };
    let json = serde_json::to_string(&records).unwrap();
    let parsed: Vec<EntryRecord> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, records);
}
