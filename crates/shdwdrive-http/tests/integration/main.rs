//! Integration tests for shdwdrive-http
//!
//! Uses wiremock to simulate the storage node and the CDN.

mod common;

mod test_downloads;
