//! Several `DirStore` instances over one directory, as separate processes would use it

use std::sync::Arc;
use std::thread;

use fastlease_store::{DirStore, SharedStore};

#[test]
fn test_instances_share_directory() {
    let dir = tempfile::tempdir().unwrap();
    let a = DirStore::open(dir.path()).unwrap();
    let b = DirStore::open(dir.path()).unwrap();

    a.set("jobs-x", "contender-a").unwrap();
    assert_eq!(b.get("jobs-x").unwrap().as_deref(), Some("contender-a"));

    b.remove("jobs-x").unwrap();
    assert!(a.get("jobs-x").unwrap().is_none());
}

#[test]
fn test_open_creates_nested_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("locks").join("nested");
    let store = DirStore::open(&root).unwrap();

    assert!(root.is_dir());
    store.set("jobs-y", "a,1").unwrap();
    assert_eq!(store.get("jobs-y").unwrap().as_deref(), Some("a,1"));
}

#[test]
fn test_concurrent_writers_never_expose_partial_values() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DirStore::open(dir.path()).unwrap());
    let values: Vec<String> = (0..4)
        .map(|i| format!("{},{}", i.to_string().repeat(512), i))
        .collect();

    let writers: Vec<_> = values
        .iter()
        .cloned()
        .map(|value| {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    store.set("jobs-y", &value).unwrap();
                }
            })
        })
        .collect();

    for _ in 0..200 {
        if let Some(seen) = store.get("jobs-y").unwrap() {
            assert!(values.contains(&seen), "partial value observed");
        }
    }

    for writer in writers {
        writer.join().unwrap();
    }

    // no temporary files left behind
    let leftovers = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}
