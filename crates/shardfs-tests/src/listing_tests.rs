//! Directory-listing protocol integration tests.

use crate::harness::storage_env;
use shardfs_client::attr::FileType;
use shardfs_client::dirlist::BATCH_SIZE;
use shardfs_client::{FileStorage, StorageError};

#[test]
fn test_listing_mixed_entries_resolves_types() {
    let env = storage_env();
    env.binding.seed_dir("/d/sub");
    env.binding.seed_file("/d/data.bin", b"12345678");

    let mut entries = env.storage.list("/d").unwrap();
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "data.bin");
    assert_eq!(entries[0].file_type, FileType::Regular);
    assert_eq!(entries[0].size, 8);
    assert_eq!(entries[1].name, "sub");
    assert_eq!(entries[1].file_type, FileType::Directory);
}

#[test]
fn test_250_entries_arrive_complete_in_three_batches() {
    let env = storage_env();
    env.binding.seed_dir("/big");
    for i in 0..250 {
        env.binding.seed_file(&format!("/big/f{i:04}"), b"");
    }
    env.binding.clear_calls();

    let entries = env.storage.list("/big").unwrap();
    assert_eq!(entries.len(), 250);

    let calls = env.binding.recorded_calls();
    let resolves = calls
        .iter()
        .filter(|c| c.starts_with("batch_get_attrs:"))
        .count();
    assert_eq!(resolves, 3);
    // batches sized 100, 100, 50
    assert!(calls.iter().any(|c| c.ends_with(&format!("n={BATCH_SIZE}"))));
    assert!(calls.iter().any(|c| c.ends_with("n=50")));
}

#[test]
fn test_entry_vanishing_between_phases_is_skipped_silently() {
    let env = storage_env();
    env.binding.seed_dir("/d");
    for i in 0..10 {
        env.binding.seed_file(&format!("/d/f{i}"), b"");
    }
    let victim = env.binding.ino_of("/d/f3").unwrap();
    env.binding.inject_resolve_miss(victim);

    let entries = env.storage.list("/d").unwrap();
    assert_eq!(entries.len(), 9);
    assert!(entries.iter().all(|e| e.name != "f3"));
}

#[test]
fn test_listing_missing_directory_is_not_found() {
    let env = storage_env();
    assert!(matches!(
        env.storage.list("/absent"),
        Err(StorageError::NotFound { .. })
    ));
}

#[test]
fn test_listing_leaks_no_descriptors() {
    let env = storage_env();
    env.binding.seed_dir("/d");
    env.binding.seed_file("/d/f", b"");
    env.binding.clear_calls();

    env.storage.list("/d").unwrap();

    let calls = env.binding.recorded_calls();
    let opens = calls.iter().filter(|c| c.starts_with("open:")).count();
    let closes = calls.iter().filter(|c| c.starts_with("close:")).count();
    assert_eq!(opens, closes);
}

#[test]
fn test_empty_directory_lists_empty_without_resolve_calls() {
    let env = storage_env();
    env.binding.seed_dir("/empty");
    env.binding.clear_calls();

    let entries = env.storage.list("/empty").unwrap();
    assert!(entries.is_empty());
    assert!(!env
        .binding
        .recorded_calls()
        .iter()
        .any(|c| c.starts_with("batch_get_attrs:")));
}
