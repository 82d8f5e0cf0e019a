use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rdbm::{Options, Store};
use tempfile::TempDir;

fn setup_store() -> (TempDir, Arc<Store>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(temp_dir.path().join("lock.db"), Options::default()).unwrap();
    (temp_dir, Arc::new(store))
}

#[test]
fn test_lock_unlock_idempotent() {
    let (_dir, store) = setup_store();

    // Nested locks collapse; one unlock leaves the handle unlocked.
    store.lock().unwrap();
    store.lock().unwrap();
    store.unlock().unwrap();

    // A put from another thread succeeds, so the lock really is gone.
    let (tx, rx) = mpsc::channel();
    let store2 = Arc::clone(&store);
    thread::spawn(move || {
        store2.put(b"k", b"v").unwrap();
        tx.send(()).unwrap();
    });
    assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());

    // Unlock without a prior lock is a no-op.
    store.unlock().unwrap();
    store.unlock().unwrap();
}

#[test]
fn test_early_break_leaves_store_locked() {
    let (_dir, store) = setup_store();
    for i in 0..50 {
        store.put(format!("k{}", i).as_bytes(), b"v").unwrap();
    }

    // Break out of the iteration early, without unlocking.
    assert!(store.fetch().unwrap());
    assert!(store.fetch().unwrap());

    // A mutation on the same handle now blocks until unlock is called.
    let (tx, rx) = mpsc::channel();
    let store2 = Arc::clone(&store);
    let writer = thread::spawn(move || {
        store2.put(b"blocked_key", b"v").unwrap();
        tx.send(()).unwrap();
    });

    assert!(
        rx.recv_timeout(Duration::from_millis(200)).is_err(),
        "put must block while the iteration lock is held"
    );

    store.unlock().unwrap();
    assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    writer.join().unwrap();
    assert_eq!(store.get(b"blocked_key").unwrap(), b"v");
}

#[test]
fn test_exhausted_iteration_releases_lock() {
    let (_dir, store) = setup_store();
    store.put(b"only", b"v").unwrap();

    while store.fetch().unwrap() {}

    // No explicit unlock: exhaustion released the lock, so a writer
    // proceeds immediately.
    let (tx, rx) = mpsc::channel();
    let store2 = Arc::clone(&store);
    thread::spawn(move || {
        store2.put(b"after", b"v").unwrap();
        tx.send(()).unwrap();
    });
    assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
}

#[test]
fn test_concurrent_readers() {
    let (_dir, store) = setup_store();
    for i in 0..100 {
        store
            .put(format!("key_{}", i).as_bytes(), format!("value_{}", i).as_bytes())
            .unwrap();
    }

    let mut handles = Vec::new();
    for t in 0..4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for round in 0..50 {
                let i = (t * 13 + round * 7) % 100;
                let value = store.get(format!("key_{}", i).as_bytes()).unwrap();
                assert_eq!(value, format!("value_{}", i).into_bytes());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_writers_serialize() {
    let (_dir, store) = setup_store();

    let mut handles = Vec::new();
    for t in 0..4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for i in 0..100 {
                let key = format!("t{}_{}", t, i);
                store.put(key.as_bytes(), key.as_bytes()).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut count = 0;
    while store.fetch().unwrap() {
        let (key, value) = store.entry().unwrap();
        assert_eq!(key, value);
        count += 1;
    }
    assert_eq!(count, 400);
}

#[test]
fn test_dup_handles_coordinate() {
    let (_dir, store) = setup_store();
    for i in 0..20 {
        store.put(format!("k{}", i).as_bytes(), b"v").unwrap();
    }

    // First handle holds the iteration lock; a dup's mutation waits on it.
    assert!(store.fetch().unwrap());
    let dup = store.dup().unwrap();

    let (tx, rx) = mpsc::channel();
    let writer = thread::spawn(move || {
        dup.put(b"from_dup", b"v").unwrap();
        tx.send(()).unwrap();
    });
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    store.unlock().unwrap();
    assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    writer.join().unwrap();
}
