//! Blob store trait and the in-memory reference implementation.
//!
//! Stores are content-addressed: the locator is derived from the bytes, so
//! concurrent writers of identical content collide harmlessly.

use crate::error::{Result, SupervisorError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Hex-encoded SHA-256 of `bytes`. The content hash doubles as the
/// default locator.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// An abstract store for payloads too large to cross the durable boundary
/// inline.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` and returns their locator. Storing identical bytes
    /// twice must be safe and return the same locator.
    async fn put(&self, bytes: &[u8]) -> Result<String>;

    /// Fetches the bytes behind `locator`.
    ///
    /// # Errors
    ///
    /// Returns `BlobMissing` when the locator resolves to nothing.
    async fn get(&self, locator: &str) -> Result<Vec<u8>>;
}

/// In-memory content-addressed blob store.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blobs currently held.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: &[u8]) -> Result<String> {
        let locator = content_hash(bytes);
        let mut blobs = self.blobs.write().await;
        blobs.entry(locator.clone()).or_insert_with(|| bytes.to_vec());
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>> {
        let blobs = self.blobs.read().await;
        blobs
            .get(locator)
            .cloned()
            .ok_or_else(|| SupervisorError::BlobMissing {
                locator: locator.to_string(),
            })
    }
}
