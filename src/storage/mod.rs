//! Key-value persistence for conversation state.
//!
//! The context store only needs string values with a time-to-live, so the
//! backend surface is four operations plus a sweep of expired entries. Two
//! implementations ship: an in-process map for tests and single-node use,
//! and SQLite.

mod memory;
mod sqlite;

pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::StorageResult;

/// Backend for serialized conversation state.
///
/// Expired keys must behave exactly like absent keys.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a live value.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write a value that expires `ttl_seconds` from now. Zero means no expiry.
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> StorageResult<()>;

    /// Delete a key. Returns whether a live value was removed.
    async fn del(&self, key: &str) -> StorageResult<bool>;

    /// Remaining lifetime in seconds, `None` when absent or without expiry.
    async fn ttl(&self, key: &str) -> StorageResult<Option<u64>>;

    /// Drop every expired entry. Returns the number removed.
    async fn purge_expired(&self) -> StorageResult<u64> {
        Ok(0)
    }
}

/// Sweep expired entries every `every`, so state of users who never return
/// does not accumulate.
pub fn spawn_purge_task(kv: Arc<dyn KvStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            match kv.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "Purged expired entries"),
                Err(e) => warn!(error = %e, "Failed to purge expired entries"),
            }
        }
    })
}
