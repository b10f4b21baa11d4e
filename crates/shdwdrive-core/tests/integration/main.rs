//! Integration tests for shdwdrive-core
//!
//! Drives the reconciliation orchestrator end-to-end against in-memory
//! ports with a paused tokio clock.

mod common;

mod test_account_mutations;
mod test_reads;
