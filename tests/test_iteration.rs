use std::collections::HashSet;

use rdbm::{Options, Store};
use tempfile::TempDir;

// Small pages force bucket chains past the split threshold so iteration
// runs across directory doublings and redistributed chains.
fn small_page_store() -> (TempDir, Store) {
    let _ = env_logger::builder().is_test(true).try_init();
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(
        temp_dir.path().join("iter.db"),
        Options {
            page_size: 1,
            ..Options::default()
        },
    )
    .unwrap();
    (temp_dir, store)
}

fn collect_keys(store: &Store) -> Vec<Vec<u8>> {
    let mut keys = Vec::new();
    store.restart().unwrap();
    while store.fetch().unwrap() {
        let (key, _) = store.entry().unwrap();
        keys.push(key);
    }
    keys
}

#[test]
fn test_iteration_completeness_across_splits() {
    let (_dir, store) = small_page_store();

    let n = 8000;
    for i in 0..n {
        let key = format!("{}x{}", i, i);
        let value = format!("{}", i * i);
        store.put(key.as_bytes(), value.as_bytes()).unwrap();
    }

    let keys = collect_keys(&store);
    assert_eq!(keys.len(), n);
    let unique: HashSet<_> = keys.iter().collect();
    assert_eq!(unique.len(), n, "iteration produced duplicate entries");

    for i in (0..n).step_by(997) {
        let key = format!("{}x{}", i, i);
        assert!(unique.contains(&key.into_bytes()), "key {} missing", i);
    }
}

#[test]
fn test_iteration_values_match() {
    let (_dir, store) = small_page_store();

    for i in 0..500 {
        store
            .put(format!("key_{}", i).as_bytes(), format!("value_{}", i).as_bytes())
            .unwrap();
    }

    let mut visited = 0;
    while store.fetch().unwrap() {
        let (key, value) = store.entry().unwrap();
        let suffix = String::from_utf8(key).unwrap();
        let suffix = suffix.strip_prefix("key_").unwrap().to_string();
        assert_eq!(value, format!("value_{}", suffix).into_bytes());
        visited += 1;
    }
    assert_eq!(visited, 500);
}

#[test]
fn test_restart_repeats_sequence() {
    let (_dir, store) = small_page_store();

    for i in 0..200 {
        store.put(format!("k{}", i).as_bytes(), b"v").unwrap();
    }

    let first = collect_keys(&store);
    let second = collect_keys(&store);
    assert_eq!(first, second, "restart must reproduce the same sequence");
}

#[test]
fn test_iteration_skips_deleted() {
    let (_dir, store) = small_page_store();

    for i in 0..100 {
        store.put(format!("k{}", i).as_bytes(), b"v").unwrap();
    }
    for i in (0..100).step_by(2) {
        store.delete(format!("k{}", i).as_bytes()).unwrap();
    }

    let keys = collect_keys(&store);
    assert_eq!(keys.len(), 50);
    for key in keys {
        let i: usize = String::from_utf8(key)
            .unwrap()
            .strip_prefix('k')
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(i % 2, 1);
    }
}

#[test]
fn test_oversized_records_iterate() {
    let (_dir, store) = small_page_store();

    // 5 KB values in 1 KB pages spill to overflow chains.
    let big = vec![0xabu8; 5000];
    store.put(b"big1", &big).unwrap();
    store.put(b"small", b"s").unwrap();
    store.put(b"big2", &big).unwrap();

    let mut found = HashSet::new();
    while store.fetch().unwrap() {
        let (key, value) = store.entry().unwrap();
        if key.starts_with(b"big") {
            assert_eq!(value, big);
        }
        found.insert(key);
    }
    assert_eq!(found.len(), 3);
}

#[test]
#[ignore = "million-entry population pass; run with --ignored"]
fn test_million_entry_population() {
    let _ = env_logger::builder().is_test(true).try_init();
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(temp_dir.path().join("big.db"), Options::default()).unwrap();

    let n = 1_000_000usize;
    for i in 0..n {
        let key = format!("{}x{}", i, i);
        let value = format!("{}", i * i);
        store.put(key.as_bytes(), value.as_bytes()).unwrap();
    }

    let mut visited = 0usize;
    while store.fetch().unwrap() {
        store.entry().unwrap();
        visited += 1;
    }
    assert_eq!(visited, n);
}
