use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use safedupe::actions::{
    BackupError, BackupSink, CandidateOutcome, DeletionExecutor, GroupState, SkipReason,
};
use safedupe::fingerprint::{hash_to_hex, Hash, Hasher};
use safedupe::policy::Policy;

use super::fixture::{Fixture, OLD};

struct RefusingBackup;

impl BackupSink for RefusingBackup {
    fn backup(&self, source: &Path, _: &Hash, _: DateTime<Utc>) -> Result<PathBuf, BackupError> {
        Err(BackupError::NameExhausted(source.to_path_buf()))
    }
}

/// Three copies in three directories: clears every safety factor.
fn spread_group(fx: &Fixture, name: &str, content: &[u8]) -> Vec<PathBuf> {
    ["inbox", "desktop", "archive"]
        .iter()
        .enumerate()
        .map(|(i, dir)| fx.file(&format!("{dir}/{name}"), content, OLD + i as i64))
        .collect()
}

#[test]
fn test_canonical_survives_and_candidates_are_removed() {
    let fx = Fixture::new();
    let paths = spread_group(&fx, "statement.pdf", b"bank statement");

    let report = fx.executor(&Policy::default()).execute(&[], false).unwrap();
    assert_eq!(report.groups.len(), 1);
    let group = &report.groups[0];
    assert_eq!(group.state, GroupState::Deleted);
    assert_eq!(report.deleted_count(), 2);

    let canonical = group.canonical.clone().unwrap();
    assert!(canonical.exists());
    assert!(group.candidates.iter().all(|c| c.path != canonical));
    let survivors: Vec<_> = paths.iter().filter(|p| p.exists()).collect();
    assert_eq!(survivors, vec![&canonical]);
}

#[test]
fn test_every_record_has_verified_backup() {
    let fx = Fixture::new();
    spread_group(&fx, "a.txt", b"alpha alpha");
    spread_group(&fx, "b.txt", b"bravo bravo bravo");

    let report = fx.executor(&Policy::default()).execute(&[], false).unwrap();
    assert_eq!(report.deleted_count(), 4);
    assert!(report.all_succeeded());

    let records = fx.store.deletions(None).unwrap();
    assert_eq!(records.len(), 4);
    let hasher = Hasher::new();
    for record in &records {
        assert!(record.backup_path.starts_with(fx.backup_dir()));
        assert!(!record.deleted_path.exists());
        assert!(record.duplicate_of.exists());
        assert!(record.restorable);
        let hash = hasher.compute_secure(&record.backup_path).unwrap();
        assert_eq!(hash_to_hex(&hash), record.group_id);
    }
}

#[test]
fn test_deleted_candidates_leave_the_store() {
    let fx = Fixture::new();
    spread_group(&fx, "notes.txt", b"meeting notes");
    assert_eq!(fx.store.fingerprint_count().unwrap(), 3);

    fx.executor(&Policy::default()).execute(&[], false).unwrap();
    assert_eq!(fx.store.fingerprint_count().unwrap(), 1);

    let second = fx.executor(&Policy::default()).execute(&[], false).unwrap();
    assert!(second.groups.is_empty());
}

#[test]
fn test_protected_member_forces_review_and_nothing_is_deleted() {
    let fx = Fixture::new();
    let paths = spread_group(&fx, "thesis.pdf", b"final draft");
    let policy = Policy {
        protected_paths: vec![fx.root().join("archive")],
        ..Policy::default()
    };

    let report = fx.executor(&policy).execute(&[], false).unwrap();
    assert_eq!(report.groups[0].state, GroupState::Skipped(SkipReason::ManualReview));
    assert_eq!(report.deleted_count(), 0);
    assert!(paths.iter().all(|p| p.exists()));
    assert!(fx.store.deletions(None).unwrap().is_empty());
}

#[test]
fn test_failed_backup_keeps_original_and_records_nothing() {
    let fx = Fixture::new();
    let paths = spread_group(&fx, "photo.jpg", b"pixels");

    let executor = DeletionExecutor::new(
        Arc::clone(&fx.store),
        &Policy::default(),
        Box::new(RefusingBackup),
    )
    .unwrap();
    let report = executor.execute(&[], false).unwrap();

    assert_eq!(report.groups[0].state, GroupState::Failed);
    assert_eq!(report.failure_count(), 2);
    assert!(!report.all_succeeded());
    assert!(report.groups[0]
        .candidates
        .iter()
        .all(|c| matches!(c.outcome, CandidateOutcome::Failed(_))));
    assert!(paths.iter().all(|p| p.exists()));
    assert!(fx.store.deletions(None).unwrap().is_empty());
}

#[test]
fn test_dry_run_changes_nothing() {
    let fx = Fixture::new();
    let paths = spread_group(&fx, "song.mp3", b"la la la");

    let report = fx.executor(&Policy::default()).execute(&[], true).unwrap();
    assert!(report.dry_run);
    assert_eq!(report.deleted_count(), 2);
    assert!(report.groups[0]
        .candidates
        .iter()
        .all(|c| matches!(c.outcome, CandidateOutcome::WouldDelete)));
    assert!(paths.iter().all(|p| p.exists()));
    assert!(fx.store.deletions(None).unwrap().is_empty());
    assert!(!fx.backup_dir().exists());
}

#[test]
fn test_preview_matches_execute() {
    let fx = Fixture::new();
    spread_group(&fx, "a.txt", b"0123456789");
    fx.file("solo/x.exe", b"binary", OLD);
    fx.file("solo2/x.exe", b"binary", OLD);

    let executor = fx.executor(&Policy::default());
    let preview = executor.preview(&[]).unwrap();
    assert_eq!(preview.groups.len(), 2);
    assert_eq!(preview.review_groups, 1);
    assert_eq!(preview.candidate_count, 2);
    assert_eq!(preview.freed_bytes_estimate, 20);

    let report = executor.execute(&[], false).unwrap();
    assert_eq!(report.deleted_count(), preview.candidate_count);
    assert_eq!(report.freed_bytes(), preview.freed_bytes_estimate);
    assert_eq!(report.skipped_groups(), 1);
}

#[test]
fn test_per_run_cap_limits_deletions() {
    let fx = Fixture::new();
    spread_group(&fx, "a.txt", b"first group");
    spread_group(&fx, "b.txt", b"second group");

    let report = fx
        .executor(&Policy::default())
        .with_max_deletions(3)
        .execute(&[], false)
        .unwrap();
    assert_eq!(report.deleted_count(), 3);
    assert_eq!(fx.store.deletions(None).unwrap().len(), 3);
    let capped = report
        .groups
        .iter()
        .flat_map(|g| &g.candidates)
        .filter(|c| matches!(c.outcome, CandidateOutcome::Skipped(SkipReason::CapReached)))
        .count();
    assert_eq!(capped, 1);
}

#[test]
fn test_modified_candidate_is_skipped() {
    let fx = Fixture::new();
    let paths = spread_group(&fx, "draft.txt", b"version one");
    let executor = fx.executor(&Policy::default());
    let preview = executor.preview(&[]).unwrap();
    let canonical = preview.groups[0].canonical.clone().unwrap();

    let victim = paths.iter().find(|p| **p != canonical).unwrap();
    std::fs::write(victim, b"version two!").unwrap();
    super::fixture::set_mtime(victim, OLD + 100);

    let report = executor.execute(&[], false).unwrap();
    let outcome = report.groups[0]
        .candidates
        .iter()
        .find(|c| &c.path == victim)
        .map(|c| &c.outcome)
        .unwrap();
    assert!(matches!(outcome, CandidateOutcome::Skipped(SkipReason::Changed)));
    assert!(victim.exists());
    assert_eq!(report.deleted_count(), 1);
}
