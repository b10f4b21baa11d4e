//! Mutation reconciliation use case
//!
//! Every mutation follows the same path:
//!
//! ```text
//!  precondition ──► lock entity ──► mark <verb> ──► submit to provider
//!                                                      │
//!                    ┌─── rejected: clear marker, Err ◄┤
//!                    │                                 ▼
//!                    │                   <verb> → polling, spawn poll loop
//!                    │                                 │
//!                    │        Stopped: merge snapshot into cache ─► Confirmed
//!                    │        Exhausted ────────────────────────► Rejected
//!                    │        DeadlineElapsed ──────────────────► TimedOut
//!                    │        Cancelled ────────────────────────► Cancelled
//!                    │                                 │
//!                    └──────────── clear marker, release entity lock
//! ```
//!
//! The merge always stores the terminal probe's value as-is; snapshots are
//! never patched field by field.
//!
//! Markers are held through [`HeldMarkers`], and a mutation future dropped
//! mid-flight still releases its marker, its entity lock and its pending
//! creation.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Context;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::try_join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::DriveError;
use super::locks::{EntityGuard, EntityLocks};
use super::markers::HeldMarkers;
use crate::cache::LocalCache;
use crate::config::{Config, DEFAULT_CDN};
use crate::domain::{
    format_bytes, ActionKind, EntityId, FileUpload, SizeSpec, StorageAccount, StorageAccountKey,
    StoredFile,
};
use crate::poll::{PollConfig, PollOutcome, Poller};
use crate::ports::{
    IAccountReader, IFileReader, IRequestObserver, IStorageProvider, NoopObserver, UploadResult,
};
use crate::session::Session;
use crate::tracker::PendingChange;

type Probe<R> = Pin<Box<dyn Future<Output = anyhow::Result<R>> + Send>>;

// ============================================================================
// Outcome and handle
// ============================================================================

/// How the confirmation of an accepted mutation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome<T> {
    /// The read source reflects the mutation; carries the merged snapshot
    Confirmed(T),
    /// Confirmation was abandoned after repeated read failures
    Rejected(String),
    /// The read source did not reflect the mutation in time
    TimedOut,
    /// The reconciliation or its session was cancelled
    Cancelled,
}

impl<T> ReconcileOutcome<T> {
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ReconcileOutcome::Confirmed(_))
    }

    pub fn into_confirmed(self) -> Option<T> {
        match self {
            ReconcileOutcome::Confirmed(value) => Some(value),
            _ => None,
        }
    }
}

/// Handle to an accepted mutation being confirmed in the background
///
/// Dropping the handle does not stop the reconciliation.
#[derive(Debug)]
pub struct Reconciliation<T> {
    entity: EntityId,
    action: ActionKind,
    cancel: CancellationToken,
    join: JoinHandle<ReconcileOutcome<T>>,
}

impl<T> Reconciliation<T> {
    #[must_use]
    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    #[must_use]
    pub fn action(&self) -> ActionKind {
        self.action
    }

    /// Stops polling; the outcome becomes `Cancelled`
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the terminal outcome
    pub async fn outcome(self) -> ReconcileOutcome<T> {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => ReconcileOutcome::Cancelled,
        }
    }
}

/// An account creation that has not been confirmed yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingCreation {
    pub name: String,
    pub size: SizeSpec,
}

// ============================================================================
// Internal bookkeeping
// ============================================================================

/// What is being changed, for markers, logs and notifications
#[derive(Debug, Clone)]
struct Mutation {
    entity: EntityId,
    action: ActionKind,
    /// Human-readable name (account identifier or file name)
    identifier: String,
}

/// A mutation between marking and its terminal state
///
/// Dropping it before [`release`](Self::release) (an abandoned caller
/// future, an aborted task) still clears its marker, runs the cleanup hook
/// and frees the entity.
struct InFlight {
    mutation: Mutation,
    markers: HeldMarkers,
    /// Marker currently held, the verb and then `polling`
    marker: ActionKind,
    guard: Option<EntityGuard>,
    cleanup: Option<Box<dyn FnOnce() + Send>>,
    settled: bool,
}

impl InFlight {
    /// Replaces the verb marker with `polling`
    fn start_polling(&mut self) {
        self.markers
            .swap(&self.mutation.entity, self.marker, ActionKind::Polling);
        self.marker = ActionKind::Polling;
    }

    /// Clears the marker, runs the cleanup hook and releases the entity
    fn release(mut self) -> Mutation {
        self.settle();
        self.mutation.clone()
    }

    fn settle(&mut self) {
        if std::mem::replace(&mut self.settled, true) {
            return;
        }
        self.markers.release(&self.mutation.entity, self.marker);
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
        drop(self.guard.take());
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(
                entity = %self.mutation.entity,
                action = %self.mutation.action,
                "Mutation abandoned before completion"
            );
        }
        self.settle();
    }
}

/// Reserves a name in the pending creations until dropped
struct CreationSlot {
    pending: Arc<DashMap<String, SizeSpec>>,
    name: String,
}

impl Drop for CreationSlot {
    fn drop(&mut self) {
        self.pending.remove(&self.name);
    }
}

/// Account-level mutations confirmed with `get_account`
#[derive(Debug, Clone, Copy)]
enum AccountChange {
    Delete,
    CancelDelete,
    MakeImmutable,
    Reduce(SizeSpec),
}

impl AccountChange {
    fn action(self) -> ActionKind {
        match self {
            AccountChange::Delete => ActionKind::Deleting,
            AccountChange::CancelDelete => ActionKind::CancellingDeletion,
            AccountChange::MakeImmutable => ActionKind::MakingImmutable,
            AccountChange::Reduce(_) => ActionKind::ReducingSize,
        }
    }

    fn check(self, account: &StorageAccount) -> Result<(), String> {
        match self {
            AccountChange::Delete if account.immutable => Err("account is immutable".into()),
            AccountChange::Delete if account.to_be_deleted => {
                Err("account is already marked for deletion".into())
            }
            AccountChange::CancelDelete if !account.to_be_deleted => {
                Err("account is not marked for deletion".into())
            }
            AccountChange::MakeImmutable if account.immutable => {
                Err("account is already immutable".into())
            }
            AccountChange::Reduce(_) if account.immutable => Err("account is immutable".into()),
            AccountChange::Reduce(size) if size.bytes() >= account.reserved_bytes => Err(format!(
                "cannot reduce by {size}, only {} reserved",
                format_bytes(account.reserved_bytes)
            )),
            _ => Ok(()),
        }
    }

    async fn submit(
        self,
        provider: &dyn IStorageProvider,
        key: &StorageAccountKey,
    ) -> anyhow::Result<()> {
        match self {
            AccountChange::Delete => provider
                .delete_account(key)
                .await
                .context("Failed to submit account deletion"),
            AccountChange::CancelDelete => provider
                .cancel_delete_account(key)
                .await
                .context("Failed to submit deletion cancellation"),
            AccountChange::MakeImmutable => provider
                .make_immutable(key)
                .await
                .context("Failed to submit make-immutable request"),
            AccountChange::Reduce(size) => provider
                .reduce_storage(key, &size)
                .await
                .context("Failed to submit storage reduction"),
        }
    }

    /// Whether `after` shows the change relative to `before`
    fn is_reflected(self, before: &StorageAccount, after: &StorageAccount) -> bool {
        match self {
            AccountChange::Delete => after.to_be_deleted,
            AccountChange::CancelDelete => !after.to_be_deleted,
            AccountChange::MakeImmutable => after.immutable,
            AccountChange::Reduce(_) => after.reserved_bytes < before.reserved_bytes,
        }
    }
}

fn probe_account(
    reader: Arc<dyn IAccountReader + Send + Sync>,
    key: StorageAccountKey,
) -> impl FnMut() -> Probe<StorageAccount> + Send + 'static {
    move || {
        let reader = Arc::clone(&reader);
        let key = key.clone();
        Box::pin(async move { reader.get_account(&key).await })
    }
}

fn probe_files(
    reader: Arc<dyn IFileReader + Send + Sync>,
    key: StorageAccountKey,
) -> impl FnMut() -> Probe<Vec<StoredFile>> + Send + 'static {
    move || {
        let reader = Arc::clone(&reader);
        let key = key.clone();
        Box::pin(async move { reader.list_files(&key).await })
    }
}

/// Names of `submitted` files without a confirmed result
fn unconfirmed(submitted: &[String], results: &[UploadResult]) -> Vec<String> {
    submitted
        .iter()
        .filter(|name| {
            !results
                .iter()
                .any(|r| &r.file_name == *name && r.is_confirmed())
        })
        .cloned()
        .collect()
}

// ============================================================================
// ReconciliationOrchestrator
// ============================================================================

/// Submits mutations and confirms them against the read source
///
/// One orchestrator serves one [`Session`]: it writes into that session's
/// cache and tracker, and every poll loop it starts is cancelled when the
/// session is torn down.
pub struct ReconciliationOrchestrator {
    session: Arc<Session>,
    provider: Arc<dyn IStorageProvider + Send + Sync>,
    account_reader: Arc<dyn IAccountReader + Send + Sync>,
    file_reader: Arc<dyn IFileReader + Send + Sync>,
    observer: Arc<dyn IRequestObserver + Send + Sync>,
    poller: Poller,
    locks: EntityLocks,
    markers: HeldMarkers,
    serialize_per_entity: bool,
    cdn: String,
    pending_creations: Arc<DashMap<String, SizeSpec>>,
}

impl ReconciliationOrchestrator {
    /// Creates an orchestrator with default polling, per-entity
    /// serialization and no observer
    ///
    /// # Arguments
    ///
    /// * `session` - Session whose cache and tracker are updated
    /// * `provider` - Remote mutation port
    /// * `account_reader` - Read port for storage accounts
    /// * `file_reader` - Read port for files
    pub fn new(
        session: Arc<Session>,
        provider: Arc<dyn IStorageProvider + Send + Sync>,
        account_reader: Arc<dyn IAccountReader + Send + Sync>,
        file_reader: Arc<dyn IFileReader + Send + Sync>,
    ) -> Self {
        let markers = HeldMarkers::new(Arc::clone(session.tracker()));
        Self {
            session,
            provider,
            account_reader,
            file_reader,
            observer: Arc::new(NoopObserver),
            poller: Poller::default(),
            locks: EntityLocks::new(),
            markers,
            serialize_per_entity: true,
            cdn: DEFAULT_CDN.to_string(),
            pending_creations: Arc::new(DashMap::new()),
        }
    }

    /// Creates an orchestrator using the `polling`, `reconcile` and
    /// `network.cdn` settings of `config`
    pub fn from_config(
        config: &Config,
        session: Arc<Session>,
        provider: Arc<dyn IStorageProvider + Send + Sync>,
        account_reader: Arc<dyn IAccountReader + Send + Sync>,
        file_reader: Arc<dyn IFileReader + Send + Sync>,
    ) -> Self {
        Self::new(session, provider, account_reader, file_reader)
            .with_poll_config(config.polling.poll_config())
            .with_serialization(config.reconcile.serialize_per_entity)
            .with_cdn(config.network.cdn.clone())
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn IRequestObserver + Send + Sync>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn with_poll_config(mut self, config: PollConfig) -> Self {
        self.poller = Poller::new(config);
        self
    }

    /// Enables or disables serialization of mutations on the same entity
    #[must_use]
    pub fn with_serialization(mut self, serialize: bool) -> Self {
        self.serialize_per_entity = serialize;
        self
    }

    #[must_use]
    pub fn with_cdn(mut self, cdn: impl Into<String>) -> Self {
        self.cdn = cdn.into();
        self
    }

    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    // ------------------------------------------------------------------------
    // Account mutations
    // ------------------------------------------------------------------------

    /// Creates a storage account and waits for it to be listed
    ///
    /// While in flight the request is visible through
    /// [`pending_creations`](Self::pending_creations) and its entity is
    /// [`EntityId::for_new_account`].
    ///
    /// # Errors
    ///
    /// `Precondition` if the name is empty or a creation with the same name
    /// is already pending, `Initiation` if the provider rejects the request.
    pub async fn create_account(
        &self,
        name: &str,
        size: SizeSpec,
    ) -> Result<Reconciliation<StorageAccount>, DriveError> {
        let name = name.trim();
        let action = ActionKind::Creating;
        if name.is_empty() {
            return Err(DriveError::Precondition {
                action,
                identifier: String::new(),
                reason: "account name cannot be empty".into(),
            });
        }
        let slot = match self.pending_creations.entry(name.to_string()) {
            Entry::Occupied(_) => {
                return Err(DriveError::Precondition {
                    action,
                    identifier: name.to_string(),
                    reason: "an account with this name is already being created".into(),
                });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(size);
                CreationSlot {
                    pending: Arc::clone(&self.pending_creations),
                    name: name.to_string(),
                }
            }
        };

        let mut inflight = self
            .begin(Mutation {
                entity: EntityId::for_new_account(name),
                action,
                identifier: name.to_string(),
            })
            .await?;
        inflight.cleanup = Some(Box::new(move || drop(slot)));

        let receipt = match self
            .provider
            .create_account(name, &size)
            .await
            .context("Failed to submit account creation")
        {
            Ok(receipt) => receipt,
            Err(e) => return Err(self.initiation_failed(inflight, e)),
        };

        let key = receipt.storage_account;
        tracing::info!(name, key = %key, size = %size, "Account creation submitted");
        let reader = Arc::clone(&self.account_reader);
        let probe_key = key.clone();
        let probe = move || -> Probe<Option<StorageAccount>> {
            let reader = Arc::clone(&reader);
            let key = probe_key.clone();
            Box::pin(async move {
                let listing = reader.list_accounts().await?;
                Ok::<_, anyhow::Error>(listing.into_iter().find(|a| a.key == key))
            })
        };

        Ok(self.reconcile(
            inflight,
            probe,
            |found: &Option<StorageAccount>| found.is_some(),
            |cache, found| {
                let account = found?;
                cache.upsert_account(account.clone());
                Some(account)
            },
        ))
    }

    /// Flags an account for deletion
    ///
    /// # Errors
    ///
    /// `Precondition` if the account is immutable or already flagged.
    pub async fn delete_account(
        &self,
        account: &StorageAccount,
    ) -> Result<Reconciliation<StorageAccount>, DriveError> {
        self.mutate_account(account, AccountChange::Delete).await
    }

    /// Withdraws a pending account deletion
    ///
    /// # Errors
    ///
    /// `Precondition` if the account is not flagged for deletion.
    pub async fn cancel_delete_account(
        &self,
        account: &StorageAccount,
    ) -> Result<Reconciliation<StorageAccount>, DriveError> {
        self.mutate_account(account, AccountChange::CancelDelete)
            .await
    }

    /// Makes an account permanent
    ///
    /// # Errors
    ///
    /// `Precondition` if the account is already immutable.
    pub async fn make_immutable(
        &self,
        account: &StorageAccount,
    ) -> Result<Reconciliation<StorageAccount>, DriveError> {
        self.mutate_account(account, AccountChange::MakeImmutable)
            .await
    }

    /// Reduces the storage reserved for an account by `size`
    ///
    /// Confirmed once the read source reports fewer reserved bytes than
    /// before the request.
    ///
    /// # Errors
    ///
    /// `Precondition` if the account is immutable or `size` is not smaller
    /// than its reserved storage.
    pub async fn reduce_storage(
        &self,
        account: &StorageAccount,
        size: SizeSpec,
    ) -> Result<Reconciliation<StorageAccount>, DriveError> {
        self.mutate_account(account, AccountChange::Reduce(size))
            .await
    }

    async fn mutate_account(
        &self,
        account: &StorageAccount,
        change: AccountChange,
    ) -> Result<Reconciliation<StorageAccount>, DriveError> {
        let action = change.action();
        change
            .check(account)
            .map_err(|reason| DriveError::Precondition {
                action,
                identifier: account.identifier.clone(),
                reason,
            })?;

        let inflight = self
            .begin(Mutation {
                entity: account.entity_id(),
                action,
                identifier: account.identifier.clone(),
            })
            .await?;

        // A mutation queued behind another one checks the state it left
        let before = self
            .session
            .cache()
            .account(&account.key)
            .unwrap_or_else(|| account.clone());
        if let Err(reason) = change.check(&before) {
            return Err(self.refuse(inflight, reason));
        }

        if let Err(e) = change.submit(self.provider.as_ref(), &before.key).await {
            return Err(self.initiation_failed(inflight, e));
        }
        tracing::info!(key = %before.key, action = %action, "Account change submitted");

        let probe = probe_account(Arc::clone(&self.account_reader), before.key.clone());
        Ok(self.reconcile(
            inflight,
            probe,
            move |after: &StorageAccount| change.is_reflected(&before, after),
            |cache, after| {
                cache.upsert_account(after.clone());
                Some(after)
            },
        ))
    }

    // ------------------------------------------------------------------------
    // File mutations
    // ------------------------------------------------------------------------

    /// Deletes a file and waits for it to disappear from the listing
    ///
    /// # Errors
    ///
    /// `Precondition` if the owning account is known to be immutable.
    pub async fn delete_file(
        &self,
        file: &StoredFile,
    ) -> Result<Reconciliation<Vec<StoredFile>>, DriveError> {
        let action = ActionKind::Deleting;
        self.check_file_account(&file.storage_account, action, &file.name, false)?;

        let inflight = self
            .begin(Mutation {
                entity: file.entity_id(),
                action,
                identifier: file.name.clone(),
            })
            .await?;

        let url = file.url(&self.cdn);
        if let Err(e) = self
            .provider
            .delete_file(&file.storage_account, &url)
            .await
            .context("Failed to submit file deletion")
        {
            return Err(self.initiation_failed(inflight, e));
        }
        tracing::info!(file = %file.entity_id(), "File deletion submitted");

        let name = file.name.clone();
        Ok(self.reconcile_files(inflight, file.storage_account.clone(), move |files| {
            !files.iter().any(|f| f.name == name)
        }))
    }

    /// Replaces a file's content, keeping its name
    ///
    /// The upload is stored under `file.name` whatever name it was picked
    /// under.
    ///
    /// # Errors
    ///
    /// `Precondition` if the owning account is known to be immutable or
    /// flagged for deletion.
    pub async fn replace_file(
        &self,
        file: &StoredFile,
        upload: FileUpload,
    ) -> Result<Reconciliation<Vec<StoredFile>>, DriveError> {
        let action = ActionKind::Replacing;
        self.check_file_account(&file.storage_account, action, &file.name, true)?;
        let upload = upload
            .renamed(file.name.clone())
            .map_err(|e| DriveError::Precondition {
                action,
                identifier: file.name.clone(),
                reason: e.to_string(),
            })?;

        let inflight = self
            .begin(Mutation {
                entity: file.entity_id(),
                action,
                identifier: file.name.clone(),
            })
            .await?;

        let url = file.url(&self.cdn);
        let bytes = upload.len();
        if let Err(e) = self
            .provider
            .replace_file(&file.storage_account, &url, upload)
            .await
            .context("Failed to submit file replacement")
        {
            return Err(self.initiation_failed(inflight, e));
        }
        tracing::info!(file = %file.entity_id(), bytes, "File replacement submitted");

        let name = file.name.clone();
        Ok(self.reconcile_files(inflight, file.storage_account.clone(), move |files| {
            files.iter().any(|f| f.name == name)
        }))
    }

    /// Uploads a batch of files and waits for all of them to be listed
    ///
    /// The batch is all-or-nothing: if any item lacks a confirmation the
    /// call fails and no confirmation is attempted.
    ///
    /// # Errors
    ///
    /// `Precondition` for an empty batch, duplicate names, or an account that
    /// is immutable or flagged for deletion. `PartialUpload` lists the names
    /// the provider did not confirm.
    pub async fn upload_files(
        &self,
        account: &StorageAccount,
        uploads: Vec<FileUpload>,
    ) -> Result<Reconciliation<Vec<StoredFile>>, DriveError> {
        let action = ActionKind::Uploading;
        let precondition = |reason: String| DriveError::Precondition {
            action,
            identifier: account.identifier.clone(),
            reason,
        };
        if uploads.is_empty() {
            return Err(precondition("no files to upload".into()));
        }
        {
            let mut seen = HashSet::new();
            if let Some(dup) = uploads.iter().find(|u| !seen.insert(u.name())) {
                return Err(precondition(format!("duplicate file name '{}'", dup.name())));
            }
        }
        if account.immutable {
            return Err(precondition("account is immutable".into()));
        }
        if account.to_be_deleted {
            return Err(precondition("account is marked for deletion".into()));
        }

        let names: Vec<String> = uploads.iter().map(|u| u.name().to_string()).collect();
        let inflight = self
            .begin(Mutation {
                entity: account.entity_id(),
                action,
                identifier: account.identifier.clone(),
            })
            .await?;

        let results = match self
            .provider
            .upload_files(&account.key, uploads)
            .await
            .context("Failed to submit upload")
        {
            Ok(results) => results,
            Err(e) => return Err(self.initiation_failed(inflight, e)),
        };

        let failed = unconfirmed(&names, &results);
        if !failed.is_empty() {
            let message = format!("upload not confirmed for: {}", failed.join(", "));
            self.abort(inflight, &message, true);
            return Err(DriveError::PartialUpload { failed });
        }
        tracing::info!(key = %account.key, files = names.len(), "Upload submitted");

        Ok(self.reconcile_files(inflight, account.key.clone(), move |files| {
            names
                .iter()
                .all(|name| files.iter().any(|f| &f.name == name))
        }))
    }

    fn check_file_account(
        &self,
        key: &StorageAccountKey,
        action: ActionKind,
        identifier: &str,
        reject_flagged: bool,
    ) -> Result<(), DriveError> {
        let Some(account) = self.session.cache().account(key) else {
            return Ok(());
        };
        let reason = if account.immutable {
            "account is immutable"
        } else if reject_flagged && account.to_be_deleted {
            "account is marked for deletion"
        } else {
            return Ok(());
        };
        Err(DriveError::Precondition {
            action,
            identifier: identifier.to_string(),
            reason: reason.into(),
        })
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Re-reads every account and every account's files
    ///
    /// File listings run concurrently; the first failure fails the refresh.
    /// Replaces both cached containers. Returns the accounts newest first.
    pub async fn refresh_accounts(&self) -> Result<Vec<StorageAccount>, DriveError> {
        self.ensure_active()?;
        let accounts = self
            .account_reader
            .list_accounts()
            .await
            .context("Failed to list storage accounts")
            .map_err(DriveError::Read)?;

        let listings = try_join_all(accounts.iter().map(|account| async move {
            self.file_reader
                .list_files(&account.key)
                .await
                .with_context(|| format!("Failed to list files of {}", account.key))
                .map(|files| (account.key.clone(), files))
        }))
        .await
        .map_err(DriveError::Read)?;
        let files: HashMap<_, _> = listings.into_iter().collect();

        tracing::info!(accounts = accounts.len(), "Accounts refreshed");
        let cache = self.session.cache();
        cache.replace_accounts(accounts);
        cache.replace_all_files(files);
        Ok(cache.accounts_newest_first())
    }

    /// Re-reads one account and stores it in place
    pub async fn refresh_account(
        &self,
        key: &StorageAccountKey,
    ) -> Result<StorageAccount, DriveError> {
        self.ensure_active()?;
        let account = self
            .account_reader
            .get_account(key)
            .await
            .with_context(|| format!("Failed to read account {key}"))
            .map_err(DriveError::Read)?;
        self.session.cache().upsert_account(account.clone());
        Ok(account)
    }

    /// Re-reads one account's file list, marking it `fetchingFiles` meanwhile
    pub async fn refresh_account_files(
        &self,
        key: &StorageAccountKey,
    ) -> Result<Vec<StoredFile>, DriveError> {
        self.ensure_active()?;
        let entity = EntityId::for_account(key);
        let tracker = self.session.tracker();
        tracker.mark_pending(&entity, ActionKind::FetchingFiles);
        let result = self
            .file_reader
            .list_files(key)
            .await
            .with_context(|| format!("Failed to list files of {key}"));
        tracker.clear_pending(&entity, ActionKind::FetchingFiles);

        let files = result.map_err(DriveError::Read)?;
        tracing::debug!(key = %key, files = files.len(), "Files refreshed");
        self.session.cache().replace_files(key, files.clone());
        Ok(files)
    }

    /// Downloads a file's content
    pub async fn fetch_file(&self, file: &StoredFile) -> Result<Vec<u8>, DriveError> {
        self.file_reader
            .download_file(file)
            .await
            .with_context(|| format!("Failed to download {}", file.entity_id()))
            .map_err(DriveError::Read)
    }

    /// CDN URL of a file
    #[must_use]
    pub fn file_url(&self, file: &StoredFile) -> String {
        file.url(&self.cdn)
    }

    /// Cached accounts, newest first
    #[must_use]
    pub fn accounts(&self) -> Vec<StorageAccount> {
        self.session.cache().accounts_newest_first()
    }

    #[must_use]
    pub fn account(&self, key: &StorageAccountKey) -> Option<StorageAccount> {
        self.session.cache().account(key)
    }

    /// Cached files of an account, `None` if never fetched
    #[must_use]
    pub fn files(&self, key: &StorageAccountKey) -> Option<Vec<StoredFile>> {
        self.session.cache().files(key)
    }

    #[must_use]
    pub fn is_pending(&self, entity: &EntityId, kind: Option<ActionKind>) -> bool {
        self.session.tracker().is_pending(entity, kind)
    }

    #[must_use]
    pub fn pending(&self, entity: &EntityId) -> BTreeSet<ActionKind> {
        self.session.tracker().pending(entity)
    }

    /// Account creations not yet confirmed, by name
    #[must_use]
    pub fn pending_creations(&self) -> Vec<PendingCreation> {
        let mut pending: Vec<PendingCreation> = self
            .pending_creations
            .iter()
            .map(|entry| PendingCreation {
                name: entry.key().clone(),
                size: *entry.value(),
            })
            .collect();
        pending.sort_by(|a, b| a.name.cmp(&b.name));
        pending
    }

    /// Subscribes to pending-action changes of this session
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PendingChange> {
        self.session.tracker().subscribe()
    }

    // ------------------------------------------------------------------------
    // Lifecycle helpers
    // ------------------------------------------------------------------------

    fn ensure_active(&self) -> Result<(), DriveError> {
        if self.session.is_active() {
            Ok(())
        } else {
            Err(DriveError::SessionClosed)
        }
    }

    /// Locks the entity (when serializing) and marks the verb
    async fn begin(&self, mutation: Mutation) -> Result<InFlight, DriveError> {
        self.ensure_active()?;
        let guard = if self.serialize_per_entity {
            let guard = self.locks.acquire(&mutation.entity).await;
            // The session may have closed while waiting for the entity
            self.ensure_active()?;
            Some(guard)
        } else {
            None
        };
        self.markers.hold(&mutation.entity, mutation.action);
        Ok(InFlight {
            marker: mutation.action,
            mutation,
            markers: self.markers.clone(),
            guard,
            cleanup: None,
            settled: false,
        })
    }

    /// Ends a mutation that never reached the confirmation phase
    fn abort(&self, inflight: InFlight, message: &str, notify: bool) -> Mutation {
        let mutation = inflight.release();
        if notify {
            tracing::error!(
                entity = %mutation.entity,
                action = %mutation.action,
                error = message,
                "Request failed"
            );
            self.observer.on_error(
                mutation.entity.kind(),
                mutation.action,
                &mutation.identifier,
                message,
            );
        } else {
            tracing::debug!(
                entity = %mutation.entity,
                action = %mutation.action,
                reason = message,
                "Request refused"
            );
        }
        mutation
    }

    fn refuse(&self, inflight: InFlight, reason: String) -> DriveError {
        let mutation = self.abort(inflight, &reason, false);
        DriveError::Precondition {
            action: mutation.action,
            identifier: mutation.identifier,
            reason,
        }
    }

    fn initiation_failed(&self, inflight: InFlight, error: anyhow::Error) -> DriveError {
        let message = format!("{error:#}");
        let mutation = self.abort(inflight, &message, true);
        DriveError::Initiation {
            action: mutation.action,
            identifier: mutation.identifier,
            source: error,
        }
    }

    fn reconcile_files<P>(
        &self,
        inflight: InFlight,
        key: StorageAccountKey,
        should_stop: P,
    ) -> Reconciliation<Vec<StoredFile>>
    where
        P: Fn(&Vec<StoredFile>) -> bool + Send + 'static,
    {
        let probe = probe_files(Arc::clone(&self.file_reader), key.clone());
        self.reconcile(inflight, probe, should_stop, move |cache, files| {
            cache.replace_files(&key, files.clone());
            Some(files)
        })
    }

    /// Moves the marker to `polling` and confirms in a background task
    ///
    /// `commit` merges the accepted probe value into the cache and returns
    /// the confirmed value.
    fn reconcile<R, T, F, Fut, P, C>(
        &self,
        mut inflight: InFlight,
        probe: F,
        should_stop: P,
        commit: C,
    ) -> Reconciliation<T>
    where
        R: Send + 'static,
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        P: Fn(&R) -> bool + Send + 'static,
        C: FnOnce(&LocalCache, R) -> Option<T> + Send + 'static,
    {
        let entity = inflight.mutation.entity.clone();
        let action = inflight.mutation.action;
        let cache = Arc::clone(self.session.cache());
        let observer = Arc::clone(&self.observer);
        let poller = self.poller.clone().with_label(format!("{action}:{entity}"));
        let max_failures = poller.config().max_failures;
        let cancel = self.session.cancellation_token().child_token();
        let task_cancel = cancel.clone();

        inflight.start_polling();

        let join = tokio::spawn(async move {
            let outcome = match poller.run(probe, should_stop, &task_cancel).await {
                PollOutcome::Stopped(value) => match commit(&cache, value) {
                    Some(confirmed) => ReconcileOutcome::Confirmed(confirmed),
                    None => ReconcileOutcome::Rejected(
                        "the confirming read did not contain the expected value".into(),
                    ),
                },
                PollOutcome::Exhausted => ReconcileOutcome::Rejected(format!(
                    "could not read back the result after {max_failures} consecutive failures"
                )),
                PollOutcome::DeadlineElapsed => ReconcileOutcome::TimedOut,
                PollOutcome::Cancelled => ReconcileOutcome::Cancelled,
            };

            let mutation = inflight.release();
            let Mutation {
                entity,
                action,
                identifier,
            } = mutation;
            match &outcome {
                ReconcileOutcome::Confirmed(_) => {
                    tracing::info!(entity = %entity, action = %action, "Request confirmed");
                    observer.on_success(entity.kind(), action, &identifier);
                }
                ReconcileOutcome::Rejected(reason) => {
                    tracing::warn!(entity = %entity, action = %action, reason = %reason, "Request could not be confirmed");
                    observer.on_error(entity.kind(), action, &identifier, reason);
                }
                ReconcileOutcome::TimedOut => {
                    tracing::warn!(entity = %entity, action = %action, "Request confirmation timed out");
                    observer.on_error(
                        entity.kind(),
                        action,
                        &identifier,
                        "timed out waiting for confirmation",
                    );
                }
                ReconcileOutcome::Cancelled => {
                    tracing::debug!(entity = %entity, action = %action, "Reconciliation cancelled");
                }
            }
            outcome
        });

        Reconciliation {
            entity,
            action,
            cancel,
            join,
        }
    }
}
