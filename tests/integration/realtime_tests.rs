use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use safedupe::duplicates::Grouper;
use safedupe::fingerprint::FingerprintEngine;
use safedupe::indexer::{BatchIndexer, IndexerConfig, NoPacer, NoopIndexObserver};
use safedupe::realtime::{DebounceCache, EventKind, Observation, RealTimeDetector};

use super::fixture::{Fixture, OLD};

fn detector(fx: &Fixture) -> RealTimeDetector {
    RealTimeDetector::new(
        FingerprintEngine::new(Arc::clone(&fx.store)),
        DebounceCache::new(Duration::from_secs(300), 64),
    )
}

#[test]
fn test_new_download_matches_indexed_file() {
    let fx = Fixture::new();
    let original = fx.write("documents/manual.pdf", b"printer manual", OLD);
    BatchIndexer::new(FingerprintEngine::new(Arc::clone(&fx.store)), IndexerConfig::default())
        .with_pacer(Box::new(NoPacer))
        .index(&[fx.root()], 0, &NoopIndexObserver)
        .unwrap();

    let download = fx.write("downloads/manual (1).pdf", b"printer manual", OLD + 60);
    let d = detector(&fx);
    match d.on_file_observed(&download, EventKind::Created).unwrap() {
        Observation::DuplicateOf(paths) => assert_eq!(paths, vec![original]),
        other => panic!("expected a duplicate, got {other:?}"),
    }

    let unrelated = fx.write("downloads/other.pdf", b"something new", OLD);
    assert!(matches!(
        d.on_file_observed(&unrelated, EventKind::Created).unwrap(),
        Observation::Unique
    ));
}

#[test]
fn test_modified_event_rehashes_and_drops_match() {
    let fx = Fixture::new();
    let a = fx.file("a/notes.txt", b"shared text", OLD);
    let b = fx.write("b/notes.txt", b"shared text", OLD);
    let d = detector(&fx);

    assert!(matches!(
        d.on_file_observed(&b, EventKind::Created).unwrap(),
        Observation::DuplicateOf(_)
    ));

    fs::write(&b, b"edited text!").unwrap();
    super::fixture::set_mtime(&b, OLD + 5);
    assert!(matches!(
        d.on_file_observed(&b, EventKind::Modified).unwrap(),
        Observation::Unique
    ));
    let (groups, _) = Grouper::new(Arc::clone(&fx.store)).build_groups(&[]).unwrap();
    assert!(groups.is_empty());
    assert!(a.exists());
}

#[test]
fn test_deleted_event_reports_gone() {
    let fx = Fixture::new();
    let path = fx.file("x.txt", b"bye", OLD);
    fs::remove_file(&path).unwrap();
    assert!(matches!(
        detector(&fx).on_file_observed(&path, EventKind::Deleted).unwrap(),
        Observation::Gone
    ));
}

#[test]
fn test_detector_and_indexer_share_a_store_concurrently() {
    let fx = Fixture::new();
    for i in 0..60 {
        fx.write(&format!("bulk/f{i:02}.dat"), format!("bulk {}", i % 30).as_bytes(), OLD);
    }
    let live: Vec<_> = (0..20)
        .map(|i| fx.write(&format!("live/n{i:02}.dat"), format!("bulk {i}").as_bytes(), OLD))
        .collect();

    let indexer = BatchIndexer::new(
        FingerprintEngine::new(Arc::clone(&fx.store)),
        IndexerConfig {
            batch_size: 7,
            ..IndexerConfig::default()
        },
    )
    .with_pacer(Box::new(NoPacer));
    let d = detector(&fx);

    let report = thread::scope(|scope| {
        let handle = scope.spawn(|| {
            indexer
                .index(&[fx.root().join("bulk")], 0, &NoopIndexObserver)
                .unwrap()
        });
        for path in &live {
            let observation = d.on_file_observed(path, EventKind::Created).unwrap();
            assert!(!matches!(observation, Observation::Unreadable(_)));
        }
        handle.join().unwrap()
    });
    assert!(report.is_complete());
    assert_eq!(report.found, 60);

    assert_eq!(fx.store.fingerprint_count().unwrap(), 80);
    let (groups, _) = Grouper::new(Arc::clone(&fx.store)).build_groups(&[]).unwrap();
    assert_eq!(groups.len(), 30);
    let sizes: Vec<_> = groups.iter().map(|g| g.len()).collect();
    assert_eq!(sizes.iter().filter(|&&n| n == 3).count(), 20);
    assert_eq!(sizes.iter().filter(|&&n| n == 2).count(), 10);
}
