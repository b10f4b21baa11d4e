//! Shared test helpers for storage API integration tests
//!
//! A single mock server plays both the storage node and the CDN: the CDN
//! base is the server URI with a `/cdn` prefix.

use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shdwdrive_core::domain::StorageAccountKey;
use shdwdrive_http::client::StorageApiClient;

pub const ACCOUNT: &str = "7Lqm6x1Q9r2TtVZ3pPH8fHkNwRyK5ZcC";

pub fn account_key() -> StorageAccountKey {
    StorageAccountKey::new(ACCOUNT.to_string()).expect("test key must be base58")
}

/// Starts a mock server and returns a client pointing at it
pub async fn setup_storage_mock() -> (MockServer, StorageApiClient) {
    let server = MockServer::start().await;
    let client = StorageApiClient::new(server.uri(), format!("{}/cdn", server.uri()));
    (server, client)
}

/// Mounts `POST /list-objects` for [`ACCOUNT`] answering `names`
pub async fn mount_list_objects(server: &MockServer, names: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/list-objects"))
        .and(body_json(serde_json::json!({ "storageAccount": ACCOUNT })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "keys": names
        })))
        .mount(server)
        .await;
}

/// Mounts a CDN file for [`ACCOUNT`]
pub async fn mount_cdn_file(server: &MockServer, name: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/cdn/{ACCOUNT}/{name}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(content.to_vec())
                .append_header("Content-Type", "application/octet-stream"),
        )
        .mount(server)
        .await;
}
