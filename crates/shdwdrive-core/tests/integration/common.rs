//! Shared test helpers: fixtures and in-memory ports
//!
//! Read ports replay a script of responses; the last scripted response
//! repeats once the script is exhausted.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::broadcast;

use shdwdrive_core::domain::{
    AccountVersion, ActionKind, EntityKind, FileUpload, OwnerAddress, SizeSpec, StorageAccount,
    StorageAccountKey, StoredFile,
};
use shdwdrive_core::poll::PollConfig;
use shdwdrive_core::ports::{
    CreateAccountReceipt, IAccountReader, IFileReader, IRequestObserver, IStorageProvider,
    UploadResult,
};
use shdwdrive_core::session::Session;
use shdwdrive_core::tracker::PendingChange;
use shdwdrive_core::usecases::ReconciliationOrchestrator;

// ============================================================================
// Fixtures
// ============================================================================

/// Valid 32 character base58 key from a short seed (avoid 0, O, I, l)
pub fn key(seed: &str) -> StorageAccountKey {
    let mut value = seed.to_string();
    while value.len() < 32 {
        value.push('1');
    }
    StorageAccountKey::new(value).expect("fixture key must be base58")
}

pub fn owner() -> OwnerAddress {
    OwnerAddress::new(key("wa11et").into()).expect("fixture owner must be base58")
}

pub fn account(seed: &str) -> StorageAccount {
    StorageAccount {
        key: key(seed),
        identifier: format!("{seed}-name"),
        reserved_bytes: 10 * 1024 * 1024,
        current_usage: 1024,
        immutable: false,
        to_be_deleted: false,
        delete_request_epoch: 0,
        owner: owner(),
        version: AccountVersion::V2,
        creation_time: Utc.with_ymd_and_hms(2023, 1, 15, 10, 0, 0).unwrap(),
        creation_epoch: 400,
        last_fee_epoch: 400,
    }
}

pub fn files(seed: &str, names: &[&str]) -> Vec<StoredFile> {
    names
        .iter()
        .map(|name| StoredFile::new(key(seed), *name))
        .collect()
}

pub fn upload(name: &str) -> FileUpload {
    FileUpload::new(name, name.as_bytes().to_vec()).unwrap()
}

pub fn poll_config() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(10),
        max_failures: 3,
        deadline: Some(Duration::from_secs(5)),
        reset_failures_on_success: true,
    }
}

// ============================================================================
// Scripted responses
// ============================================================================

/// Replays responses in order, repeating the last one
pub struct Script<T> {
    steps: Mutex<VecDeque<Result<T, String>>>,
    calls: Mutex<u32>,
}

impl<T: Clone> Script<T> {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            calls: Mutex::new(0),
        }
    }

    pub fn push_ok(&self, value: T) {
        self.steps.lock().unwrap().push_back(Ok(value));
    }

    pub fn push_err(&self, message: &str) {
        self.steps.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }

    fn next(&self) -> anyhow::Result<T> {
        *self.calls.lock().unwrap() += 1;
        let mut steps = self.steps.lock().unwrap();
        let step = if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        };
        match step {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("no scripted response")),
        }
    }
}

// ============================================================================
// Mock ports
// ============================================================================

/// Storage provider that records every call and accepts by default
pub struct MockProvider {
    pub calls: Mutex<Vec<String>>,
    pub reject_with: Mutex<Option<String>>,
    pub created_key: StorageAccountKey,
    pub upload_results: Mutex<Option<Vec<UploadResult>>>,
    pub replaced: Mutex<Vec<(String, String)>>,
    /// When set, every call is recorded and then never answers
    pub hang: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reject_with: Mutex::new(None),
            created_key: key("new1"),
            upload_results: Mutex::new(None),
            replaced: Mutex::new(Vec::new()),
            hang: AtomicBool::new(false),
        }
    }

    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn reject(&self, message: &str) {
        *self.reject_with.lock().unwrap() = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn record(&self, call: String) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let rejection = self.reject_with.lock().unwrap().clone();
        match rejection {
            Some(message) => Err(anyhow::anyhow!(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl IStorageProvider for MockProvider {
    async fn create_account(
        &self,
        name: &str,
        size: &SizeSpec,
    ) -> anyhow::Result<CreateAccountReceipt> {
        self.record(format!("create_account {name} {size}")).await?;
        Ok(CreateAccountReceipt {
            storage_account: self.created_key.clone(),
            transaction_signature: "sig-create".into(),
        })
    }

    async fn delete_account(&self, key: &StorageAccountKey) -> anyhow::Result<()> {
        self.record(format!("delete_account {key}")).await
    }

    async fn cancel_delete_account(&self, key: &StorageAccountKey) -> anyhow::Result<()> {
        self.record(format!("cancel_delete_account {key}")).await
    }

    async fn make_immutable(&self, key: &StorageAccountKey) -> anyhow::Result<()> {
        self.record(format!("make_immutable {key}")).await
    }

    async fn reduce_storage(&self, key: &StorageAccountKey, size: &SizeSpec) -> anyhow::Result<()> {
        self.record(format!("reduce_storage {key} {size}")).await
    }

    async fn delete_file(&self, key: &StorageAccountKey, url: &str) -> anyhow::Result<()> {
        self.record(format!("delete_file {key} {url}")).await
    }

    async fn replace_file(
        &self,
        key: &StorageAccountKey,
        url: &str,
        upload: FileUpload,
    ) -> anyhow::Result<()> {
        self.record(format!("replace_file {key} {url}")).await?;
        self.replaced
            .lock()
            .unwrap()
            .push((upload.name().to_string(), url.to_string()));
        Ok(())
    }

    async fn upload_files(
        &self,
        key: &StorageAccountKey,
        uploads: Vec<FileUpload>,
    ) -> anyhow::Result<Vec<UploadResult>> {
        let names: Vec<&str> = uploads.iter().map(|u| u.name()).collect();
        self.record(format!("upload_files {key} {}", names.join(",")))
            .await?;
        if let Some(results) = self.upload_results.lock().unwrap().clone() {
            return Ok(results);
        }
        Ok(uploads
            .iter()
            .map(|u| UploadResult {
                file_name: u.name().to_string(),
                location: Some(format!("https://cdn.test/{key}/{}", u.name())),
                transaction_signature: Some(format!("sig-{}", u.name())),
            })
            .collect())
    }
}

/// Account reader replaying scripted snapshots
pub struct MockAccountReader {
    pub list: Script<Vec<StorageAccount>>,
    pub get: Script<StorageAccount>,
}

impl MockAccountReader {
    pub fn new() -> Self {
        Self {
            list: Script::new(),
            get: Script::new(),
        }
    }
}

#[async_trait]
impl IAccountReader for MockAccountReader {
    async fn list_accounts(&self) -> anyhow::Result<Vec<StorageAccount>> {
        self.list.next()
    }

    async fn get_account(&self, _key: &StorageAccountKey) -> anyhow::Result<StorageAccount> {
        self.get.next()
    }
}

/// File reader replaying scripted listings
pub struct MockFileReader {
    pub list: Script<Vec<StoredFile>>,
    pub content: Mutex<Option<Vec<u8>>>,
    /// Delay applied to every `list_files` call
    pub latency: Mutex<Option<Duration>>,
}

impl MockFileReader {
    pub fn new() -> Self {
        Self {
            list: Script::new(),
            content: Mutex::new(None),
            latency: Mutex::new(None),
        }
    }
}

#[async_trait]
impl IFileReader for MockFileReader {
    async fn list_files(&self, _key: &StorageAccountKey) -> anyhow::Result<Vec<StoredFile>> {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.list.next()
    }

    async fn download_file(&self, file: &StoredFile) -> anyhow::Result<Vec<u8>> {
        self.content
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("{} not found", file.name))
    }
}

/// Observer recording every notification as a string
#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl IRequestObserver for RecordingObserver {
    fn on_success(&self, entity: EntityKind, action: ActionKind, identifier: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("success {entity} {action} {identifier}"));
    }

    fn on_error(&self, entity: EntityKind, action: ActionKind, identifier: &str, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("error {entity} {action} {identifier}: {message}"));
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub session: Arc<Session>,
    pub provider: Arc<MockProvider>,
    pub accounts: Arc<MockAccountReader>,
    pub files: Arc<MockFileReader>,
    pub observer: Arc<RecordingObserver>,
    pub orchestrator: ReconciliationOrchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_serialization(true)
    }

    pub fn with_serialization(serialize: bool) -> Self {
        let session = Arc::new(Session::init(owner()));
        let provider = Arc::new(MockProvider::new());
        let accounts = Arc::new(MockAccountReader::new());
        let files = Arc::new(MockFileReader::new());
        let observer = Arc::new(RecordingObserver::default());
        let orchestrator = ReconciliationOrchestrator::new(
            Arc::clone(&session),
            provider.clone(),
            accounts.clone(),
            files.clone(),
        )
        .with_observer(observer.clone())
        .with_poll_config(poll_config())
        .with_serialization(serialize)
        .with_cdn("https://cdn.test");

        Self {
            session,
            provider,
            accounts,
            files,
            observer,
            orchestrator,
        }
    }
}

/// Drains every change published so far
pub fn drain(rx: &mut broadcast::Receiver<PendingChange>) -> Vec<BTreeSet<ActionKind>> {
    let mut sets = Vec::new();
    while let Ok(change) = rx.try_recv() {
        sets.push(change.pending);
    }
    sets
}
