use safedupe::actions::{GroupState, SkipReason};
use safedupe::canonical::CanonicalSelector;
use safedupe::policy::Policy;

use super::fixture::Fixture;

#[test]
fn test_preferred_original_kept_and_protected_copy_blocks_deletion() {
    let fx = Fixture::new();
    let original = fx.file("keep/a.txt", b"same bytes", 1_000_000_000);
    let browser_copy = fx.file("keep/a (1).txt", b"same bytes", 1_100_000_000);
    let vaulted = fx.file("vault/a (2).txt", b"same bytes", 900_000_000);

    let policy = Policy {
        preferred_paths: vec![fx.root().join("keep")],
        protected_paths: vec![fx.root().join("vault")],
        ..Policy::default()
    };

    let executor = fx.executor(&policy);
    let preview = executor.preview(&[]).unwrap();
    assert_eq!(preview.groups.len(), 1);
    let group = &preview.groups[0];
    assert_eq!(group.canonical.as_deref(), Some(original.as_path()));
    assert!(group.requires_manual_review);
    assert_eq!(preview.review_groups, 1);
    assert_eq!(preview.candidate_count, 0);

    let selector = CanonicalSelector::new(&policy).unwrap();
    let score_of = |path: &std::path::Path| selector.score(group.member(path).unwrap());
    assert!((score_of(&original) - 130.0).abs() < 1e-9);
    assert!((score_of(&browser_copy) - 115.0).abs() < 1e-9);
    assert!((score_of(&vaulted) - 15.0).abs() < 1e-9);

    let report = executor.execute(&[], false).unwrap();
    assert_eq!(
        report.groups[0].state,
        GroupState::Skipped(SkipReason::ManualReview)
    );
    assert_eq!(report.deleted_count(), 0);
    assert!(original.exists() && browser_copy.exists() && vaulted.exists());
}

#[test]
fn test_same_scenario_without_protection_deletes_copies() {
    let fx = Fixture::new();
    let original = fx.file("keep/a.txt", b"same bytes", 1_000_000_000);
    let browser_copy = fx.file("keep/a (1).txt", b"same bytes", 1_100_000_000);
    let other = fx.file("vault/a (2).txt", b"same bytes", 900_000_000);
    let third = fx.file("spare/a.txt", b"same bytes", 1_000_000_000);

    let policy = Policy {
        preferred_paths: vec![fx.root().join("keep")],
        ..Policy::default()
    };
    let report = fx.executor(&policy).execute(&[], false).unwrap();

    assert_eq!(report.groups[0].canonical.as_deref(), Some(original.as_path()));
    assert_eq!(report.deleted_count(), 3);
    assert!(original.exists());
    assert!(!browser_copy.exists() && !other.exists() && !third.exists());
}
