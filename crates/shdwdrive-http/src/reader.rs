//! HttpFileReader - IFileReader implementation over the storage API
//!
//! Listing goes to the storage node, downloads go to the CDN.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use shdwdrive_core::domain::{StorageAccountKey, StoredFile};
use shdwdrive_core::ports::IFileReader;

use crate::client::StorageApiClient;

pub struct HttpFileReader {
    client: Arc<StorageApiClient>,
}

impl HttpFileReader {
    pub fn new(client: Arc<StorageApiClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<StorageApiClient> {
        &self.client
    }
}

#[async_trait]
impl IFileReader for HttpFileReader {
    async fn list_files(&self, key: &StorageAccountKey) -> Result<Vec<StoredFile>> {
        let names = self.client.list_objects(key).await?;
        Ok(names
            .into_iter()
            .map(|name| StoredFile::new(key.clone(), name))
            .collect())
    }

    async fn download_file(&self, file: &StoredFile) -> Result<Vec<u8>> {
        self.client
            .download(&file.storage_account, &file.name)
            .await
    }
}
