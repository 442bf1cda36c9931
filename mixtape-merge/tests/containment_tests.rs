//! Storage-root containment tests
//!
//! Every way of pointing a local reference outside the storage root must be
//! denied without leaving anything behind in the work area.

mod helpers;

use helpers::{local_item, Harness, HarnessOptions};
use mixtape_merge::models::{ItemKind, QueueItem};
use mixtape_merge::MergeError;

const SECRET: &str = "top secret";

/// Harness with a file next to (not inside) the storage root
fn harness_with_secret() -> Harness {
    let harness = Harness::with_options(HarnessOptions {
        local_endpoint: Some("http://files.local:8080/storage/".to_string()),
        ..Default::default()
    });
    std::fs::write(harness.temp.path().join("secret.txt"), SECRET).unwrap();
    harness
}

async fn assert_denied(harness: &Harness, item: QueueItem) {
    let result = harness.resolver.acquire(&item).await;
    assert!(
        matches!(result, Err(MergeError::AccessDenied(_))),
        "expected AccessDenied for {:?}, got {:?}",
        item.content,
        result.map(|h| h.path().to_path_buf())
    );
    assert_eq!(harness.ledger.outstanding(), 0);
    assert_eq!(harness.work_entries(), 0);
}

#[tokio::test]
async fn test_parent_traversal_denied() {
    let harness = harness_with_secret();
    assert_denied(&harness, local_item("../secret.txt")).await;
    assert_denied(&harness, local_item("../../etc/passwd")).await;
}

#[tokio::test]
async fn test_encoded_traversal_denied() {
    let harness = harness_with_secret();
    assert_denied(&harness, local_item("..%2Fsecret.txt")).await;
    assert_denied(&harness, local_item("%2e%2e/secret.txt")).await;
    assert_denied(&harness, local_item("..%2F..%2Fetc%2Fpasswd")).await;
}

#[tokio::test]
async fn test_absolute_path_outside_root_denied() {
    let harness = harness_with_secret();
    assert_denied(&harness, local_item("/etc/passwd")).await;

    let secret = harness.temp.path().join("secret.txt");
    assert_denied(&harness, local_item(secret.to_str().unwrap())).await;
}

#[tokio::test]
async fn test_nested_traversal_denied() {
    let harness = harness_with_secret();
    harness.write_source("a/b/song.mp3", "audio");
    assert_denied(&harness, local_item("a/b/../../../secret.txt")).await;
}

#[tokio::test]
async fn test_missing_target_outside_root_still_denied() {
    let harness = harness_with_secret();
    assert_denied(&harness, local_item("../does-not-exist.mp3")).await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_escape_denied() {
    let harness = harness_with_secret();
    std::os::unix::fs::symlink(
        harness.temp.path().join("secret.txt"),
        harness.storage_root.join("innocent.mp3"),
    )
    .unwrap();

    assert_denied(&harness, local_item("innocent.mp3")).await;
}

#[tokio::test]
async fn test_local_endpoint_url_traversal_denied() {
    let harness = harness_with_secret();
    let item = QueueItem::new(
        ItemKind::LocalReference,
        "http://files.local:8080/storage/..%2Fsecret.txt",
        "secret",
    );
    assert_denied(&harness, item).await;
}

#[tokio::test]
async fn test_contained_reference_copied_and_released() {
    let harness = harness_with_secret();
    harness.write_source("uploads/song one.mp3", "audio bytes");

    let mut handle = harness
        .resolver
        .acquire(&local_item("uploads/song%20one.mp3"))
        .await
        .unwrap();

    assert_eq!(harness.ledger.outstanding(), 1);
    let copy = handle.path().to_path_buf();
    assert!(copy.starts_with(harness.work.root()));
    assert_eq!(std::fs::read_to_string(&copy).unwrap(), "audio bytes");

    handle.release();
    assert!(!copy.exists());
    assert_eq!(harness.ledger.outstanding(), 0);
    assert_eq!(harness.work_entries(), 0);

    // The shared original is never touched
    assert!(harness.storage_root.join("uploads/song one.mp3").exists());
}

#[tokio::test]
async fn test_local_endpoint_url_inside_root_resolves() {
    let harness = harness_with_secret();
    harness.write_source("uploads/track.mp3", "audio");

    let item = QueueItem::new(
        ItemKind::RemoteUrl,
        "http://files.local:8080/storage/uploads/track.mp3",
        "track",
    );
    let mut handle = harness.resolver.acquire(&item).await.unwrap();
    assert_eq!(std::fs::read_to_string(handle.path()).unwrap(), "audio");
    handle.release();
}

#[tokio::test]
async fn test_endpoint_host_on_other_scheme_and_port_resolves_locally() {
    let harness = harness_with_secret();
    harness.write_source("uploads/track.mp3", "audio");

    let item = QueueItem::new(
        ItemKind::RemoteUrl,
        "https://files.local/storage/uploads/track.mp3",
        "track",
    );
    let mut handle = harness.resolver.acquire(&item).await.unwrap();
    assert!(handle.path().starts_with(harness.work.root()));
    assert_eq!(std::fs::read_to_string(handle.path()).unwrap(), "audio");
    handle.release();

    let escaping = QueueItem::new(
        ItemKind::RemoteUrl,
        "https://files.local:9443/storage/..%2Fsecret.txt",
        "secret",
    );
    assert_denied(&harness, escaping).await;
}

#[tokio::test]
async fn test_missing_file_inside_root_is_not_found() {
    let harness = harness_with_secret();
    let result = harness.resolver.acquire(&local_item("nothing-here.mp3")).await;
    assert!(matches!(result, Err(MergeError::NotFound(_))));
    assert_eq!(harness.ledger.outstanding(), 0);
}
