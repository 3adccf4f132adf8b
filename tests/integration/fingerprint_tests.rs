use std::fs;
use std::sync::Arc;

use safedupe::duplicates::Grouper;
use safedupe::fingerprint::{FingerprintEngine, Hasher, HasherConfig, Lookup};
use safedupe::policy::Policy;

use super::fixture::{set_mtime, Fixture, OLD};

#[test]
fn test_unchanged_file_hashes_identically() {
    let fx = Fixture::new();
    let path = fx.write("report.pdf", &vec![7u8; 300_000], OLD);
    let hasher = Hasher::new();

    assert_eq!(
        hasher.compute_quick(&path).unwrap(),
        hasher.compute_quick(&path).unwrap()
    );
    assert_eq!(
        hasher.compute_secure(&path).unwrap(),
        hasher.compute_secure(&path).unwrap()
    );
}

#[test]
fn test_second_pass_over_200_files_is_all_cache_hits() {
    let fx = Fixture::new();
    let paths: Vec<_> = (0..200)
        .map(|i| fx.write(&format!("d{}/file{i:03}.txt", i % 7), format!("distinct {i}").as_bytes(), OLD))
        .collect();

    for path in &paths {
        assert!(matches!(fx.engine.get_or_compute(path, false).unwrap(), Lookup::Computed(_)));
    }
    let first = fx.engine.stats();
    assert_eq!(first.secure_computations, 200);

    for path in &paths {
        assert!(matches!(fx.engine.get_or_compute(path, false).unwrap(), Lookup::Cached(_)));
    }
    let second = fx.engine.stats();
    assert_eq!(second.secure_computations, 200);
    assert_eq!(second.cache_hits, 200);
    assert_eq!(fx.store.fingerprint_count().unwrap(), 200);
}

#[test]
fn test_cache_survives_reopening_the_store() {
    let fx = Fixture::new();
    let path = fx.file("a.txt", b"persistent", OLD);
    let db = fx.dir.path().join("state").join("store.db");

    let reopened = Arc::new(safedupe::store::FingerprintStore::open(&db).unwrap());
    let engine = FingerprintEngine::new(reopened);
    assert!(matches!(engine.get_or_compute(&path, false).unwrap(), Lookup::Cached(_)));
    assert_eq!(engine.stats().secure_computations, 0);
}

#[test]
fn test_quick_collision_never_groups() {
    let fx = Fixture::new();
    let hasher = Hasher::with_config(HasherConfig {
        quick_threshold: 64,
        quick_sample: 16,
        ..HasherConfig::default()
    });
    let engine = FingerprintEngine::new(Arc::clone(&fx.store)).with_hasher(hasher);

    // Same size, same head and tail, different middle.
    let mut left = vec![b'x'; 256];
    let mut right = left.clone();
    left[128] = b'L';
    right[128] = b'R';
    let a = fx.write("a.bin", &left, OLD);
    let b = fx.write("b.bin", &right, OLD);

    let fa = engine.get_or_compute(&a, false).unwrap().into_fingerprint().unwrap();
    let fb = engine.get_or_compute(&b, false).unwrap().into_fingerprint().unwrap();
    assert_eq!(fa.quick_hash, fb.quick_hash);
    assert_ne!(fa.secure_hash, fb.secure_hash);

    let grouper = Grouper::new(Arc::clone(&fx.store));
    let (groups, _) = grouper.build_groups(&[]).unwrap();
    assert!(groups.is_empty());

    let matched = grouper.detect_incremental(&fb).unwrap();
    assert!(matched.is_unique());
    assert_eq!(matched.quick_collisions, 1);
}

#[test]
fn test_identical_content_grouped_regardless_of_name_or_location() {
    let fx = Fixture::new();
    let content = b"the same bytes everywhere";
    let a = fx.file("photos/2019/beach.jpg", content, OLD);
    let b = fx.file("backup/IMG_0001.JPG", content, OLD + 10);
    let c = fx.file("deep/er/still/copy", content, OLD + 20);
    fx.file("unrelated.txt", b"something else", OLD);

    let (groups, stats) = Grouper::new(Arc::clone(&fx.store)).build_groups(&[]).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(stats.groups_built, 1);
    let mut paths = groups[0].paths();
    paths.sort();
    let mut expected = vec![a, b, c];
    expected.sort();
    assert_eq!(paths, expected);
}

#[test]
fn test_vanished_member_left_out_of_group_but_kept_in_store() {
    let fx = Fixture::new();
    fx.file("a/x.txt", b"dup", OLD);
    fx.file("b/x.txt", b"dup", OLD);
    let gone = fx.file("c/x.txt", b"dup", OLD);
    fs::remove_file(&gone).unwrap();

    let (groups, stats) = Grouper::new(Arc::clone(&fx.store)).build_groups(&[]).unwrap();
    assert_eq!(groups[0].len(), 2);
    assert_eq!(stats.stale_skipped, 1);
    assert!(fx.store.get_by_path(&gone).unwrap().is_some());
}

#[test]
fn test_preview_is_read_only_and_execute_prunes() {
    let fx = Fixture::new();
    fx.file("a/x.txt", b"dup", OLD);
    fx.file("b/x.txt", b"dup", OLD);
    let gone = fx.file("c/x.txt", b"dup", OLD);
    fs::remove_file(&gone).unwrap();

    fx.executor(&Policy::default()).preview(&[fx.root()]).unwrap();
    assert_eq!(fx.store.fingerprint_count().unwrap(), 3);

    let report = fx.executor(&Policy::default()).execute(&[fx.root()], false).unwrap();
    assert_eq!(report.pruned, 1);
    assert!(fx.store.get_by_path(&gone).unwrap().is_none());
}

#[test]
fn test_decomposed_name_grouped_with_its_twin() {
    let fx = Fixture::new();
    let nfd = fx.file("a/cafe\u{0301}.txt", b"twin", OLD);
    let plain = fx.file("b/menu.txt", b"twin", OLD);

    let (groups, stats) = Grouper::new(Arc::clone(&fx.store)).build_groups(&[]).unwrap();
    assert_eq!(stats.stale_skipped, 0);
    let mut paths = groups[0].paths();
    paths.sort();
    let mut expected = vec![nfd, plain];
    expected.sort();
    assert_eq!(paths, expected);
}

#[cfg(unix)]
#[test]
fn test_non_utf8_name_grouped_and_kept() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let fx = Fixture::new();
    let dir = fx.root().join("raw");
    fs::create_dir_all(&dir).unwrap();
    let odd = dir.join(OsStr::from_bytes(b"x\xff.bin"));
    fs::write(&odd, b"payload").unwrap();
    assert!(fx.engine.get_or_compute(&odd, false).unwrap().fingerprint().is_some());
    let plain = fx.file("raw/y.bin", b"payload", OLD);

    let (groups, stats) = Grouper::new(Arc::clone(&fx.store)).build_groups(&[]).unwrap();
    assert_eq!(stats.stale_skipped, 0);
    assert_eq!(groups.len(), 1);
    assert!(groups[0].paths().contains(&odd));
    assert!(groups[0].paths().contains(&plain));

    let report = fx.executor(&Policy::default()).execute(&[], true).unwrap();
    assert_eq!(report.pruned, 0);
    assert_eq!(fx.store.get_by_path(&odd).unwrap().unwrap().path, odd);
}

#[test]
fn test_file_emptied_after_indexing_loses_its_row() {
    let fx = Fixture::new();
    let a = fx.file("a/x.txt", b"dup", OLD);
    fx.file("b/x.txt", b"dup", OLD);

    fs::write(&a, b"").unwrap();
    assert!(matches!(fx.engine.get_or_compute(&a, false).unwrap(), Lookup::Empty(_)));
    assert!(fx.store.get_by_path(&a).unwrap().is_none());
    let (groups, _) = Grouper::new(Arc::clone(&fx.store)).build_groups(&[]).unwrap();
    assert!(groups.is_empty());
}

#[cfg(unix)]
#[test]
fn test_file_unreadable_after_indexing_loses_its_row() {
    use std::os::unix::fs::PermissionsExt;

    let fx = Fixture::new();
    let a = fx.file("a/x.txt", b"dup", OLD);
    fs::set_permissions(&a, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::File::open(&a).is_ok() {
        // Running as root; permission bits are not enforced.
        return;
    }
    set_mtime(&a, OLD + 60);

    assert!(matches!(fx.engine.get_or_compute(&a, false).unwrap(), Lookup::Unreadable(_)));
    assert!(fx.store.get_by_path(&a).unwrap().is_none());
}

#[test]
fn test_scope_limits_groups() {
    let fx = Fixture::new();
    fx.file("inbox/a.txt", b"one", OLD);
    fx.file("archive/a.txt", b"one", OLD);
    fx.file("music/x.mp3", b"two", OLD);
    fx.file("music2/x.mp3", b"two", OLD);

    let grouper = Grouper::new(Arc::clone(&fx.store));
    let (groups, stats) = grouper.build_groups(&[fx.root().join("inbox")]).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(stats.out_of_scope, 1);
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_is_reported_not_fatal() {
    use std::os::unix::fs::PermissionsExt;

    let fx = Fixture::new();
    let path = fx.write("secret.txt", b"classified", OLD);
    fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read(&path).is_ok() {
        // Permissions are not enforced for root.
        return;
    }

    assert!(matches!(fx.engine.get_or_compute(&path, false).unwrap(), Lookup::Unreadable(_)));
    assert!(fx.store.get_by_path(&path).unwrap().is_none());
    assert_eq!(fx.engine.stats().unreadable, 1);
}
