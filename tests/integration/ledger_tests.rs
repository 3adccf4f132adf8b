use std::fs;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use safedupe::clock::{ManualClock, SharedClock};
use safedupe::fingerprint::{hash_to_hex, Lookup};
use safedupe::ledger::LedgerError;
use safedupe::policy::Policy;

use super::fixture::{Fixture, OLD};

fn delete_spread(fx: &Fixture, name: &str, content: &[u8]) -> Vec<safedupe::store::DeletionRecord> {
    for (i, dir) in ["inbox", "desktop", "archive"].iter().enumerate() {
        fx.file(&format!("{dir}/{name}"), content, OLD + i as i64);
    }
    let report = fx.executor(&Policy::default()).execute(&[], false).unwrap();
    assert_eq!(report.deleted_count(), 2);
    let mut records = fx.store.deletions(None).unwrap();
    records.retain(|r| r.deleted_path.file_name().unwrap() == name);
    records
}

#[test]
fn test_restore_brings_back_identical_content() {
    let fx = Fixture::new();
    let records = delete_spread(&fx, "contract.pdf", b"signed contract");
    let record = &records[0];
    assert!(!record.deleted_path.exists());

    let outcome = fx.ledger().restore(record.id).unwrap();
    assert_eq!(outcome.restored_to, record.deleted_path);
    assert!(!outcome.renamed);
    assert_eq!(fs::read(&record.deleted_path).unwrap(), b"signed contract");
    assert!(!record.backup_path.exists());

    let lookup = fx.engine.get_or_compute(&record.deleted_path, true).unwrap();
    let Lookup::Computed(fp) = lookup else {
        panic!("expected a fresh fingerprint, got {lookup:?}");
    };
    assert_eq!(hash_to_hex(&fp.secure_hash), record.group_id);

    let after = fx.store.deletion(record.id).unwrap().unwrap();
    assert!(!after.restorable);
}

#[test]
fn test_restore_twice_is_rejected() {
    let fx = Fixture::new();
    let records = delete_spread(&fx, "a.txt", b"once only");
    let ledger = fx.ledger();

    ledger.restore(records[0].id).unwrap();
    assert!(matches!(
        ledger.restore(records[0].id),
        Err(LedgerError::NotRestorable(_))
    ));
    assert!(matches!(ledger.restore(9999), Err(LedgerError::NotFound(9999))));
}

#[test]
fn test_restore_renames_when_original_path_is_taken() {
    let fx = Fixture::new();
    let records = delete_spread(&fx, "report.txt", b"quarterly numbers");
    let record = &records[0];
    fs::write(&record.deleted_path, b"a different file now lives here").unwrap();

    let outcome = fx.ledger().restore(record.id).unwrap();
    assert!(outcome.renamed);
    assert_eq!(
        outcome.restored_to,
        record.deleted_path.with_file_name("report (restored).txt")
    );
    assert_eq!(fs::read(&outcome.restored_to).unwrap(), b"quarterly numbers");
    assert_eq!(
        fs::read(&record.deleted_path).unwrap(),
        b"a different file now lives here"
    );
}

#[test]
fn test_restore_reports_missing_backup() {
    let fx = Fixture::new();
    let records = delete_spread(&fx, "a.txt", b"soon gone");
    fs::remove_file(&records[0].backup_path).unwrap();

    assert!(matches!(
        fx.ledger().restore(records[0].id),
        Err(LedgerError::BackupMissing { .. })
    ));
    assert!(fx.store.deletion(records[0].id).unwrap().unwrap().restorable);
}

#[test]
fn test_sweep_purges_only_confirmed_and_expired() {
    let fx = Fixture::new();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
    let shared: SharedClock = Arc::new(clock.clone());

    for (i, dir) in ["inbox", "desktop", "archive"].iter().enumerate() {
        fx.file(&format!("{dir}/kept.txt"), b"confirmed group", OLD + i as i64);
        fx.file(&format!("{dir}/other.txt"), b"unconfirmed group", OLD + i as i64);
    }
    let report = fx
        .executor(&Policy::default())
        .with_clock(Arc::clone(&shared))
        .execute(&[], false)
        .unwrap();
    assert_eq!(report.deleted_count(), 4);

    let ledger = fx.ledger().with_clock(shared);
    let records = ledger.history(None).unwrap();
    let confirmed: Vec<_> = records
        .iter()
        .filter(|r| r.deleted_path.ends_with("kept.txt"))
        .collect();
    ledger.confirm(confirmed[0].id).unwrap();

    let early = ledger.retention_sweep(30).unwrap();
    assert_eq!(early.purged, 0);

    clock.advance(Duration::days(31));
    let sweep = ledger.retention_sweep(30).unwrap();
    assert_eq!(sweep.purged, 2);
    assert_eq!(sweep.purged_bytes, 2 * b"confirmed group".len() as u64);
    assert!(sweep.failures.is_empty());

    for record in ledger.history(None).unwrap() {
        let is_confirmed_group = record.deleted_path.ends_with("kept.txt");
        assert_eq!(record.restorable, !is_confirmed_group);
        assert_eq!(record.backup_path.exists(), !is_confirmed_group);
    }

    let again = ledger.retention_sweep(30).unwrap();
    assert_eq!(again.purged, 0);
}

#[test]
fn test_confirm_unknown_record() {
    let fx = Fixture::new();
    assert!(matches!(fx.ledger().confirm(42), Err(LedgerError::NotFound(42))));
}

#[test]
fn test_csv_export_lists_every_record() {
    let fx = Fixture::new();
    let records = delete_spread(&fx, "invoice.pdf", b"invoice 2041");
    let out = fx.dir.path().join("ledger.csv");

    let count = fx.ledger().export_csv(&out).unwrap();
    assert_eq!(count, 2);

    let mut reader = csv::Reader::from_path(&out).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        vec![
            "id",
            "deleted_path",
            "backup_path",
            "group_id",
            "size",
            "deleted_at",
            "duplicate_of",
            "restorable"
        ]
    );
    let rows: Vec<_> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(&row[3], records[0].group_id.as_str());
        assert_eq!(&row[4], "12");
        assert_eq!(&row[7], "true");
    }
}

#[test]
fn test_restore_and_fingerprint_wait_for_a_held_path() {
    let fx = Fixture::new();
    let records = delete_spread(&fx, "shared.pdf", b"contended");
    let record = records[0].clone();

    let guard = fx.locks.lock(&record.deleted_path);
    let restorer = {
        let ledger = fx.ledger();
        let id = record.id;
        std::thread::spawn(move || ledger.restore(id))
    };
    let fingerprinter = {
        let engine = fx.engine.clone();
        let path = record.deleted_path.clone();
        std::thread::spawn(move || engine.get_or_compute(&path, true))
    };
    std::thread::sleep(std::time::Duration::from_millis(100));
    assert!(!restorer.is_finished());
    assert!(!fingerprinter.is_finished());
    assert!(!record.deleted_path.exists());

    drop(guard);
    let outcome = restorer.join().unwrap().unwrap();
    assert_eq!(outcome.restored_to, record.deleted_path);
    fingerprinter.join().unwrap().unwrap();
    assert_eq!(fs::read(&record.deleted_path).unwrap(), b"contended");
}
