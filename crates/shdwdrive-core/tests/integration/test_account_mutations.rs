//! Account mutations: create, delete, cancel deletion, make immutable, reduce

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::timeout;

use shdwdrive_core::domain::{ActionKind, EntityId, SizeSpec, SizeUnit};
use shdwdrive_core::usecases::{DriveError, ReconcileOutcome};

use crate::common::{account, drain, key, Harness};

#[tokio::test(start_paused = true)]
async fn test_delete_account_confirms_and_merges_terminal_snapshot() {
    let h = Harness::new();
    let acct = account("a1");
    h.session.cache().replace_accounts(vec![acct.clone(), account("b2")]);

    let mut flagged = acct.clone();
    flagged.to_be_deleted = true;
    flagged.delete_request_epoch = 512;
    flagged.current_usage = 4096;
    h.accounts.get.push_ok(acct.clone());
    h.accounts.get.push_ok(flagged.clone());

    let mut rx = h.orchestrator.subscribe();
    let rec = h.orchestrator.delete_account(&acct).await.unwrap();
    assert_eq!(rec.action(), ActionKind::Deleting);
    assert_eq!(rec.entity(), &acct.entity_id());

    let confirmed = rec.outcome().await.into_confirmed().unwrap();
    assert_eq!(confirmed, flagged);

    // The whole terminal snapshot is stored, in place
    let cached = h.session.cache().accounts();
    assert_eq!(cached.len(), 2);
    assert_eq!(cached[0], flagged);

    assert_eq!(
        drain(&mut rx),
        vec![
            BTreeSet::from([ActionKind::Deleting]),
            BTreeSet::from([ActionKind::Polling]),
            BTreeSet::new(),
        ]
    );
    assert!(!h.orchestrator.is_pending(&acct.entity_id(), None));
    assert_eq!(h.accounts.get.calls(), 2);
    assert_eq!(h.provider.calls(), vec![format!("delete_account {}", acct.key)]);
    assert_eq!(h.observer.events(), vec!["success account deleting a1-name"]);
}

#[tokio::test(start_paused = true)]
async fn test_delete_immutable_account_is_refused_before_submission() {
    let h = Harness::new();
    let mut acct = account("a1");
    acct.immutable = true;
    let mut rx = h.orchestrator.subscribe();

    let err = h.orchestrator.delete_account(&acct).await.unwrap_err();

    assert!(err.is_precondition());
    assert!(err.to_string().contains("immutable"));
    assert!(h.provider.calls().is_empty());
    assert!(drain(&mut rx).is_empty());
    assert!(h.observer.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_initiation_failure_clears_marker_and_notifies() {
    let h = Harness::new();
    let acct = account("a1");
    h.provider.reject("insufficient funds");
    let mut rx = h.orchestrator.subscribe();

    let err = h.orchestrator.delete_account(&acct).await.unwrap_err();

    match &err {
        DriveError::Initiation { action, identifier, .. } => {
            assert_eq!(*action, ActionKind::Deleting);
            assert_eq!(identifier, "a1-name");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("insufficient funds"));
    assert_eq!(
        drain(&mut rx),
        vec![BTreeSet::from([ActionKind::Deleting]), BTreeSet::new()]
    );
    assert_eq!(h.accounts.get.calls(), 0);
    assert_eq!(
        h.observer.events(),
        vec!["error account deleting a1-name: Failed to submit account deletion: insufficient funds"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_repeated_read_failures_reject_the_request() {
    let h = Harness::new();
    let acct = account("a1");
    h.session.cache().replace_accounts(vec![acct.clone()]);
    h.accounts.get.push_err("rpc unavailable");

    let rec = h.orchestrator.delete_account(&acct).await.unwrap();
    let outcome = rec.outcome().await;

    assert!(matches!(outcome, ReconcileOutcome::Rejected(_)));
    assert_eq!(h.accounts.get.calls(), 3);
    assert!(!h.session.cache().account(&acct.key).unwrap().to_be_deleted);
    assert!(!h.orchestrator.is_pending(&acct.entity_id(), None));
    let events = h.observer.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].starts_with("error account deleting a1-name"));
}

#[tokio::test(start_paused = true)]
async fn test_unreflected_change_times_out() {
    let h = Harness::new();
    let acct = account("a1");
    h.accounts.get.push_ok(acct.clone());

    let rec = h.orchestrator.make_immutable(&acct).await.unwrap();
    assert_eq!(rec.outcome().await, ReconcileOutcome::TimedOut);

    assert!(!h.orchestrator.is_pending(&acct.entity_id(), None));
    assert!(h.session.cache().account(&acct.key).is_none());
    assert_eq!(
        h.observer.events(),
        vec!["error account makingImmutable a1-name: timed out waiting for confirmation"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_reconciliation_is_silent() {
    let h = Harness::new();
    let acct = account("a1");
    h.accounts.get.push_ok(acct.clone());

    let rec = h.orchestrator.delete_account(&acct).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(35)).await;
    rec.cancel();

    assert_eq!(rec.outcome().await, ReconcileOutcome::Cancelled);
    assert!(!h.orchestrator.is_pending(&acct.entity_id(), None));
    assert!(h.observer.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_delete_and_make_immutable() {
    let h = Harness::new();
    let mut flagged = account("a1");
    flagged.to_be_deleted = true;
    h.session.cache().replace_accounts(vec![flagged.clone()]);

    let restored = account("a1");
    h.accounts.get.push_ok(restored.clone());
    let rec = h.orchestrator.cancel_delete_account(&flagged).await.unwrap();
    assert_eq!(rec.outcome().await.into_confirmed(), Some(restored.clone()));
    assert!(!h.session.cache().account(&flagged.key).unwrap().to_be_deleted);

    let err = h.orchestrator.cancel_delete_account(&restored).await.unwrap_err();
    assert!(err.is_precondition());

    let mut permanent = restored.clone();
    permanent.immutable = true;
    h.accounts.get.push_ok(permanent.clone());
    let rec = h.orchestrator.make_immutable(&restored).await.unwrap();
    assert!(rec.outcome().await.is_confirmed());
    assert!(h.session.cache().account(&restored.key).unwrap().immutable);

    assert_eq!(
        h.observer.events(),
        vec![
            "success account cancellingDeletion a1-name",
            "success account makingImmutable a1-name",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reduce_storage_waits_for_smaller_reservation() {
    let h = Harness::new();
    let acct = account("a1");
    let size = SizeSpec::new(2, SizeUnit::Mb).unwrap();

    let mut reduced = acct.clone();
    reduced.reserved_bytes = 8 * 1024 * 1024;
    h.accounts.get.push_ok(acct.clone());
    h.accounts.get.push_ok(acct.clone());
    h.accounts.get.push_ok(reduced.clone());

    let rec = h.orchestrator.reduce_storage(&acct, size).await.unwrap();
    assert_eq!(rec.outcome().await.into_confirmed(), Some(reduced));
    assert_eq!(h.accounts.get.calls(), 3);
    assert_eq!(
        h.provider.calls(),
        vec![format!("reduce_storage {} 2MB", acct.key)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reduce_storage_by_whole_reservation_is_refused() {
    let h = Harness::new();
    let acct = account("a1");

    let err = h
        .orchestrator
        .reduce_storage(&acct, SizeSpec::new(10, SizeUnit::Mb).unwrap())
        .await
        .unwrap_err();

    assert!(err.is_precondition());
    assert!(h.provider.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_queued_mutation_rechecks_state_left_by_previous_one() {
    let h = Harness::new();
    let acct = account("a1");
    h.session.cache().replace_accounts(vec![acct.clone()]);
    let mut flagged = acct.clone();
    flagged.to_be_deleted = true;
    h.accounts.get.push_ok(flagged);

    let (first, second) = tokio::join!(
        h.orchestrator.delete_account(&acct),
        h.orchestrator.delete_account(&acct)
    );

    assert!(first.unwrap().outcome().await.is_confirmed());
    let err = second.unwrap_err();
    assert!(err.is_precondition());
    assert!(err.to_string().contains("already marked for deletion"));
    assert_eq!(h.provider.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_create_account_tracks_pending_creation_until_listed() {
    let h = Harness::new();
    let size = SizeSpec::new(250, SizeUnit::Mb).unwrap();
    let created = account("new1");
    h.accounts.list.push_ok(vec![account("a1")]);
    h.accounts.list.push_ok(vec![account("a1"), created.clone()]);

    let mut rx = h.orchestrator.subscribe();
    let rec = h.orchestrator.create_account(" photos ", size).await.unwrap();
    assert_eq!(rec.entity().as_str(), "new/photos");

    let pending = h.orchestrator.pending_creations();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].name, "photos");
    assert_eq!(pending[0].size, size);

    let err = h.orchestrator.create_account("photos", size).await.unwrap_err();
    assert!(err.is_precondition());

    assert_eq!(rec.outcome().await.into_confirmed(), Some(created.clone()));
    assert!(h.orchestrator.pending_creations().is_empty());
    assert_eq!(h.orchestrator.account(&key("new1")), Some(created));
    assert_eq!(h.provider.calls(), vec!["create_account photos 250MB"]);
    assert_eq!(
        drain(&mut rx),
        vec![
            BTreeSet::from([ActionKind::Creating]),
            BTreeSet::from([ActionKind::Polling]),
            BTreeSet::new(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_creation_is_no_longer_pending() {
    let h = Harness::new();
    h.provider.reject("name taken");

    let err = h
        .orchestrator
        .create_account("photos", SizeSpec::new(1, SizeUnit::Gb).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, DriveError::Initiation { .. }));
    assert!(h.orchestrator.pending_creations().is_empty());

    let err = h
        .orchestrator
        .create_account("   ", SizeSpec::new(1, SizeUnit::Gb).unwrap())
        .await
        .unwrap_err();
    assert!(err.is_precondition());
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_creation_releases_marker_and_name() {
    let h = Harness::new();
    let size: SizeSpec = "1.5GB".parse().unwrap();
    let entity = EntityId::for_new_account("photos");
    h.provider.set_hang(true);
    let mut rx = h.orchestrator.subscribe();

    let abandoned = timeout(
        Duration::from_secs(1),
        h.orchestrator.create_account("photos", size),
    )
    .await;
    assert!(abandoned.is_err());

    assert!(h.orchestrator.pending(&entity).is_empty());
    assert!(h.orchestrator.pending_creations().is_empty());
    assert_eq!(
        drain(&mut rx),
        vec![BTreeSet::from([ActionKind::Creating]), BTreeSet::new()]
    );

    h.provider.set_hang(false);
    h.accounts.list.push_ok(vec![account("new1")]);
    let rec = h.orchestrator.create_account("photos", size).await.unwrap();
    assert!(rec.outcome().await.is_confirmed());
    assert_eq!(
        h.provider.calls(),
        vec!["create_account photos 1.5GB", "create_account photos 1.5GB"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_mutation_frees_the_entity() {
    let h = Harness::new();
    let acct = account("a1");
    h.session.cache().replace_accounts(vec![acct.clone()]);
    h.provider.set_hang(true);

    let abandoned = timeout(
        Duration::from_secs(1),
        h.orchestrator.delete_account(&acct),
    )
    .await;
    assert!(abandoned.is_err());
    assert!(!h.orchestrator.is_pending(&acct.entity_id(), None));

    // The entity lock is free again, so a retry goes straight through
    h.provider.set_hang(false);
    let mut flagged = acct.clone();
    flagged.to_be_deleted = true;
    h.accounts.get.push_ok(flagged.clone());
    let rec = timeout(Duration::from_secs(1), h.orchestrator.delete_account(&acct))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec.outcome().await.into_confirmed(), Some(flagged));
}

#[tokio::test(start_paused = true)]
async fn test_simultaneous_creations_with_one_name_admit_one() {
    let h = Harness::new();
    let size = SizeSpec::new(1, SizeUnit::Gb).unwrap();
    h.accounts.list.push_ok(vec![account("new1")]);

    let (first, second) = tokio::join!(
        h.orchestrator.create_account("photos", size),
        h.orchestrator.create_account("photos", size),
    );

    let (admitted, refused) = match (first, second) {
        (Ok(rec), Err(err)) | (Err(err), Ok(rec)) => (rec, err),
        (first, second) => panic!("expected exactly one admission: {first:?} / {second:?}"),
    };
    assert!(refused.is_precondition());
    assert!(refused.to_string().contains("already being created"));
    assert!(admitted.outcome().await.is_confirmed());
    assert_eq!(h.provider.calls().len(), 1);
}
