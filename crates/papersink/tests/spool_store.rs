//! Integration tests for the spool store's atomicity and concurrency
//! guarantees: committed entries appear whole or not at all, and parallel
//! jobs from one user never collide.

use std::fs;
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use papersink::spool::{SpoolEntry, SpoolStore};

fn spool_bytes(store: &SpoolStore, user: &str, job_id: &str, data: &[u8]) -> SpoolEntry {
    let mut handle = store.begin(user, job_id, "Report").unwrap();
    handle.write_all(data).unwrap();
    let raw = handle.finish_payload().unwrap().to_path_buf();
    fs::copy(&raw, handle.converted_path()).unwrap();
    handle.commit().unwrap()
}

#[test]
fn concurrent_jobs_from_one_user_all_commit_distinctly() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(SpoolStore::new(tmp.path()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let payload = format!("%PDF-1.7 job {i}").into_bytes();
                let entry = spool_bytes(&store, "bob", &i.to_string(), &payload);
                (entry, payload)
            })
        })
        .collect();

    let mut paths = Vec::new();
    for handle in handles {
        let (entry, payload) = handle.join().unwrap();
        assert_eq!(fs::read(&entry.spool_path).unwrap(), payload);
        paths.push(entry.spool_path);
    }

    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 8, "entries must never overwrite each other");
    assert_eq!(store.entries("bob").unwrap().len(), 8);
}

#[test]
fn in_flight_job_is_invisible_to_readers() {
    let tmp = TempDir::new().unwrap();
    let store = SpoolStore::new(tmp.path());

    let mut handle = store.begin("alice", "1", "Draft").unwrap();
    handle.write_all(b"half-written payload").unwrap();

    // A concurrent reader enumerating the spool sees nothing yet.
    assert!(store.entries("alice").unwrap().is_empty());

    // Simulated kill before commit: drop without committing.
    drop(handle);
    assert!(store.entries("alice").unwrap().is_empty());
    let leftovers: Vec<_> = fs::read_dir(store.user_dir("alice")).unwrap().collect();
    assert!(leftovers.is_empty(), "no stray artifacts after abort");
}

#[test]
fn commit_failure_removes_temporaries() {
    let tmp = TempDir::new().unwrap();
    let store = SpoolStore::new(tmp.path());

    let mut handle = store.begin("alice", "1", "Draft").unwrap();
    handle.write_all(b"payload").unwrap();
    handle.finish_payload().unwrap();
    // The converter never produced its output: commit must fail and clean up.
    assert!(handle.commit().is_err());

    let leftovers: Vec<_> = fs::read_dir(store.user_dir("alice")).unwrap().collect();
    assert!(leftovers.is_empty());
}

#[test]
fn entries_are_listed_oldest_first() {
    let tmp = TempDir::new().unwrap();
    let store = SpoolStore::new(tmp.path());

    let first = spool_bytes(&store, "alice", "1", b"one");
    thread::sleep(std::time::Duration::from_millis(20));
    let second = spool_bytes(&store, "alice", "2", b"two");

    let listed = store.entries("alice").unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].spool_path, first.spool_path);
    assert_eq!(listed[1].spool_path, second.spool_path);
}

#[test]
fn removed_entry_disappears_from_enumeration() {
    let tmp = TempDir::new().unwrap();
    let store = SpoolStore::new(tmp.path());

    let keep = spool_bytes(&store, "alice", "1", b"keep");
    let consumed = spool_bytes(&store, "alice", "2", b"consumed");

    store.remove(&consumed).unwrap();
    let listed = store.entries("alice").unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].spool_path, keep.spool_path);
}

#[cfg(unix)]
#[test]
fn user_directories_are_private() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let store = SpoolStore::new(tmp.path());
    let entry = spool_bytes(&store, "alice", "1", b"secret");

    let dir_mode = fs::metadata(store.user_dir("alice")).unwrap().permissions().mode();
    assert_eq!(dir_mode & 0o777, 0o700);
    let file_mode = fs::metadata(&entry.spool_path).unwrap().permissions().mode();
    assert_eq!(file_mode & 0o777, 0o600);
}
