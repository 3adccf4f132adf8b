use std::fs;
use std::sync::Arc;

use safedupe::actions::GroupState;
use safedupe::fingerprint::FingerprintEngine;
use safedupe::indexer::{
    BatchIndexer, IndexError, IndexObserver, IndexProgress, IndexerConfig, NoPacer,
    NoopIndexObserver, ScanSession, SessionError, SessionStatus,
};
use safedupe::policy::Policy;
use safedupe::signal::KeepGoing;

use super::fixture::{Fixture, OLD};

struct CancelAfterFirstBatch(KeepGoing);

impl IndexObserver for CancelAfterFirstBatch {
    fn on_batch(&self, _progress: &IndexProgress) {
        self.0.cancel();
    }
}

fn indexer(fx: &Fixture, batch_size: usize) -> BatchIndexer {
    let config = IndexerConfig {
        batch_size,
        ..IndexerConfig::default()
    };
    BatchIndexer::new(FingerprintEngine::new(Arc::clone(&fx.store)), config)
        .with_pacer(Box::new(NoPacer))
}

/// Four groups of three spread over three directories, plus loners.
fn populate(fx: &Fixture) {
    for g in 0..4 {
        for (i, dir) in ["inbox", "desktop", "archive"].iter().enumerate() {
            fx.write(
                &format!("{dir}/doc{g}.txt"),
                format!("group {g} payload").as_bytes(),
                OLD + i as i64,
            );
        }
    }
    for n in 0..5 {
        fx.write(&format!("misc/unique{n}.txt"), format!("loner {n}").as_bytes(), OLD);
    }
    fx.write("misc/empty.txt", b"", OLD);
}

#[test]
fn test_index_preview_execute_restore() {
    let fx = Fixture::new();
    populate(&fx);

    let report = indexer(&fx, 5)
        .index(&[fx.root()], 0, &NoopIndexObserver)
        .unwrap();
    assert!(report.is_complete());
    // The empty file never enters the universe.
    assert_eq!(report.total, 17);
    assert_eq!(report.processed, 17);
    assert_eq!(report.found, 17);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.duplicates, 8);
    assert_eq!(report.batches, 4);

    let executor = fx.executor(&Policy::default());
    let preview = executor.preview(&[fx.root()]).unwrap();
    assert_eq!(preview.groups.len(), 4);
    assert_eq!(preview.review_groups, 0);
    assert_eq!(preview.candidate_count, 8);

    let executed = executor.execute(&[fx.root()], false).unwrap();
    assert_eq!(executed.deleted_count(), 8);
    assert!(executed.groups.iter().all(|g| g.state == GroupState::Deleted));
    for g in 0..4 {
        let survivors = ["inbox", "desktop", "archive"]
            .iter()
            .filter(|dir| fx.root().join(dir).join(format!("doc{g}.txt")).exists())
            .count();
        assert_eq!(survivors, 1);
    }

    let ledger = fx.ledger();
    for record in ledger.history(None).unwrap() {
        ledger.restore(record.id).unwrap();
    }
    for g in 0..4 {
        for dir in ["inbox", "desktop", "archive"] {
            let path = fx.root().join(dir).join(format!("doc{g}.txt"));
            assert_eq!(fs::read(path).unwrap(), format!("group {g} payload").as_bytes());
        }
    }
}

#[test]
fn test_cancelled_session_resumes_where_it_stopped() {
    let fx = Fixture::new();
    populate(&fx);
    let session_path = fx.dir.path().join("state").join("session.json");

    let signal = KeepGoing::new();
    let first = indexer(&fx, 4).with_signal(signal.clone());
    let mut session = ScanSession::new(vec![fx.root()], 0, chrono::Utc::now());
    let report = first
        .run_session(&mut session, Some(&session_path), &CancelAfterFirstBatch(signal))
        .unwrap();
    assert!(report.cancelled);
    assert_eq!(report.next_offset, 4);

    let mut saved = ScanSession::load(&session_path).unwrap();
    assert_eq!(saved.status, SessionStatus::Cancelled);
    assert_eq!(saved.resume_offset, 4);
    assert_eq!(saved.total, 17);
    assert_eq!(saved.counters.processed, 4);

    let second = indexer(&fx, 4)
        .run_session(&mut saved, Some(&session_path), &NoopIndexObserver)
        .unwrap();
    assert!(!second.cancelled);
    assert_eq!(second.processed, 13);
    assert_eq!(second.cached, 0);

    let finished = ScanSession::load(&session_path).unwrap();
    assert!(finished.is_complete());
    assert_eq!(finished.status, SessionStatus::Completed);
    assert_eq!(finished.counters.processed, 17);
    assert_eq!(finished.counters.found, 17);
    assert_eq!(finished.id, session.id);
    assert_eq!(fx.store.fingerprint_count().unwrap(), 17);
}

#[test]
fn test_rerun_uses_cache() {
    let fx = Fixture::new();
    populate(&fx);
    let engine = FingerprintEngine::new(Arc::clone(&fx.store));
    let indexer = BatchIndexer::new(engine.clone(), IndexerConfig::default())
        .with_pacer(Box::new(NoPacer));

    indexer.index(&[fx.root()], 0, &NoopIndexObserver).unwrap();
    let computed = engine.stats().secure_computations;
    let second = indexer.index(&[fx.root()], 0, &NoopIndexObserver).unwrap();

    assert_eq!(second.cached, 17);
    assert_eq!(engine.stats().secure_computations, computed);
}

#[test]
fn test_tampered_session_is_rejected() {
    let fx = Fixture::new();
    let path = fx.dir.path().join("session.json");
    let mut session = ScanSession::new(vec![fx.root()], 0, chrono::Utc::now());
    session.resume_offset = 7;
    session.save(&path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let tampered = text.replace("\"resume_offset\": 7", "\"resume_offset\": 70");
    assert_ne!(tampered, text);
    fs::write(&path, tampered).unwrap();

    assert!(matches!(
        ScanSession::load(&path),
        Err(SessionError::ChecksumMismatch(_))
    ));
}

#[test]
fn test_unwritable_session_path_surfaces_error() {
    let fx = Fixture::new();
    fx.write("a.txt", b"x", OLD);
    let blocker = fx.dir.path().join("not-a-dir");
    fs::write(&blocker, b"file").unwrap();

    let mut session = ScanSession::new(vec![fx.root()], 0, chrono::Utc::now());
    let result = indexer(&fx, 4).run_session(
        &mut session,
        Some(&blocker.join("session.json")),
        &NoopIndexObserver,
    );
    assert!(matches!(result, Err(IndexError::Session(_))));
}

#[cfg(unix)]
#[test]
fn test_relative_root_stores_absolute_paths() {
    let fx = Fixture::new();
    for i in 0..5 {
        fx.write(&format!("d/f{i}.txt"), format!("content {i}").as_bytes(), OLD);
    }
    let root = fx.root().canonicalize().unwrap();
    let cwd = std::env::current_dir().unwrap();
    let mut relative = std::path::PathBuf::new();
    for _ in cwd.components().skip(1) {
        relative.push("..");
    }
    relative.push(root.strip_prefix("/").unwrap());
    assert!(relative.is_relative());

    let first = indexer(&fx, 10)
        .index(&[relative], 0, &NoopIndexObserver)
        .unwrap();
    assert_eq!(first.found, 5);
    assert_eq!(first.cached, 0);
    assert!(fx.store.get_by_path(&root.join("d/f0.txt")).unwrap().is_some());

    let second = indexer(&fx, 10)
        .index(&[root], 0, &NoopIndexObserver)
        .unwrap();
    assert_eq!(second.cached, 5);
    assert_eq!(fx.store.fingerprint_count().unwrap(), 5);
}
