//! Downloading files from the CDN

use shdwdrive_core::domain::StoredFile;
use shdwdrive_core::ports::IFileReader;
use shdwdrive_http::reader::HttpFileReader;
use shdwdrive_http::StorageApiError;

use crate::common::{self, account_key, ACCOUNT};

#[tokio::test]
async fn test_download_reads_cdn_bytes() {
    let (server, client) = common::setup_storage_mock().await;
    common::mount_cdn_file(&server, "notes.md", b"# notes").await;

    let bytes = client.download(&account_key(), "notes.md").await.unwrap();

    assert_eq!(bytes, b"# notes");
    assert_eq!(
        client.file_url(&account_key(), "notes.md"),
        format!("{}/cdn/{ACCOUNT}/notes.md", server.uri())
    );
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let (_server, client) = common::setup_storage_mock().await;
    let reader = HttpFileReader::new(std::sync::Arc::new(client));

    let err = reader
        .download_file(&StoredFile::new(account_key(), "gone.txt"))
        .await
        .unwrap_err();

    let api = err.downcast_ref::<StorageApiError>().unwrap();
    assert!(matches!(api, StorageApiError::NotFound(_)));
    assert!(!api.is_transient());
}
