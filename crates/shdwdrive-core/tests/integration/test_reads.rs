//! Reads: refreshes, downloads and URLs

use std::collections::BTreeSet;

use chrono::Duration;

use shdwdrive_core::domain::{ActionKind, EntityId, StoredFile};
use shdwdrive_core::usecases::DriveError;

use crate::common::{account, drain, files, key, Harness};

#[tokio::test(start_paused = true)]
async fn test_refresh_accounts_replaces_cache_newest_first() {
    let h = Harness::new();
    h.session.cache().replace_accounts(vec![account("prev9")]);

    let old = account("a1");
    let mut new = account("b2");
    new.creation_time = old.creation_time + Duration::days(3);
    h.accounts.list.push_ok(vec![old.clone(), new.clone()]);
    h.files.list.push_ok(files("a1", &["x.txt"]));

    let accounts = h.orchestrator.refresh_accounts().await.unwrap();

    assert_eq!(accounts, vec![new.clone(), old.clone()]);
    assert_eq!(h.orchestrator.accounts(), vec![new.clone(), old.clone()]);
    assert!(h.orchestrator.account(&key("prev9")).is_none());
    assert_eq!(h.files.list.calls(), 2);
    assert!(h.orchestrator.files(&old.key).is_some());
    assert!(h.orchestrator.files(&new.key).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_accounts_lists_files_concurrently() {
    let h = Harness::new();
    h.accounts
        .list
        .push_ok(vec![account("a1"), account("b2"), account("c3")]);
    h.files.list.push_ok(Vec::new());
    *h.files.latency.lock().unwrap() = Some(std::time::Duration::from_millis(100));
    let started = tokio::time::Instant::now();

    let accounts = h.orchestrator.refresh_accounts().await.unwrap();

    assert_eq!(accounts.len(), 3);
    assert_eq!(h.files.list.calls(), 3);
    // Three 100ms listings overlap instead of adding up
    assert!(started.elapsed() < std::time::Duration::from_millis(200));
    assert_eq!(h.orchestrator.files(&key("c3")), Some(Vec::new()));
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_leaves_cache_untouched() {
    let h = Harness::new();
    h.session.cache().replace_accounts(vec![account("a1")]);
    h.accounts.list.push_ok(vec![account("b2")]);
    h.files.list.push_err("gateway timeout");

    let err = h.orchestrator.refresh_accounts().await.unwrap_err();

    assert!(matches!(err, DriveError::Read(_)));
    assert!(err.to_string().contains("Failed to list files"));
    assert_eq!(h.orchestrator.accounts(), vec![account("a1")]);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_account_upserts() {
    let h = Harness::new();
    h.session.cache().replace_accounts(vec![account("a1"), account("b2")]);
    let mut changed = account("b2");
    changed.current_usage = 99;
    h.accounts.get.push_ok(changed.clone());

    let fetched = h.orchestrator.refresh_account(&key("b2")).await.unwrap();

    assert_eq!(fetched, changed);
    assert_eq!(h.session.cache().accounts()[1], changed);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_account_files_marks_fetching() {
    let h = Harness::new();
    let k = key("a1");
    h.files.list.push_ok(files("a1", &["x.txt", "y.txt"]));
    let mut rx = h.orchestrator.subscribe();

    let listed = h.orchestrator.refresh_account_files(&k).await.unwrap();

    assert_eq!(listed.len(), 2);
    assert_eq!(h.orchestrator.files(&k), Some(listed));
    assert_eq!(
        drain(&mut rx),
        vec![BTreeSet::from([ActionKind::FetchingFiles]), BTreeSet::new()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_refresh_account_files_clears_marker_on_error() {
    let h = Harness::new();
    let k = key("a1");
    h.files.list.push_err("not found");

    let err = h.orchestrator.refresh_account_files(&k).await.unwrap_err();

    assert!(matches!(err, DriveError::Read(_)));
    assert!(!h.orchestrator.is_pending(&EntityId::for_account(&k), None));
    assert!(h.orchestrator.files(&k).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_fetch_file_and_url() {
    let h = Harness::new();
    let file = StoredFile::new(key("a1"), "notes.md");

    assert_eq!(
        h.orchestrator.file_url(&file),
        format!("https://cdn.test/{}/notes.md", key("a1"))
    );

    let err = h.orchestrator.fetch_file(&file).await.unwrap_err();
    assert!(err.to_string().contains("Failed to download"));

    *h.files.content.lock().unwrap() = Some(b"# notes".to_vec());
    assert_eq!(h.orchestrator.fetch_file(&file).await.unwrap(), b"# notes");
}
