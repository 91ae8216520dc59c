//! Size-threshold payload indirection (the claim-check pattern).
//!
//! Durable-execution logs have a hard per-record size ceiling, while agent
//! and tool payloads routinely exceed it. The codec replaces any value
//! whose serialized size exceeds the threshold with a small
//! content-addressed token, and transparently resolves tokens back on
//! read. Session and gateway code never handles tokens directly.

use crate::claim_check::store::{BlobStore, content_hash};
use crate::error::{Result, SupervisorError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Wrapper key marking a value as a claim-check token. Namespaced so no
/// ordinary payload collides with it structurally.
const TOKEN_KEY: &str = "__confab_claim_check";

/// A small, substitutable stand-in for a payload held in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimCheckToken {
    /// Hex SHA-256 of the original bytes.
    pub hash: String,
    /// Size of the original bytes.
    pub size: u64,
    /// Locator into the blob store.
    pub locator: String,
}

#[derive(Serialize, Deserialize)]
struct TokenEnvelope {
    #[serde(rename = "__confab_claim_check")]
    token: ClaimCheckToken,
}

/// Encodes/decodes values crossing the durable boundary, spilling
/// over-threshold payloads to a blob store.
#[derive(Clone)]
pub struct ClaimCheckCodec {
    store: Arc<dyn BlobStore>,
    threshold: usize,
}

impl ClaimCheckCodec {
    /// Creates a codec spilling payloads of `threshold` bytes or more
    /// (serialized size) into `store`. Only payloads strictly below the
    /// threshold stay inline.
    pub fn new(store: Arc<dyn BlobStore>, threshold: usize) -> Self {
        Self { store, threshold }
    }

    /// Returns `value` unchanged when its serialized size is below the
    /// threshold, otherwise stores the bytes and returns a token value.
    pub async fn encode(&self, value: &serde_json::Value) -> Result<serde_json::Value> {
        let bytes = serde_json::to_vec(value)?;
        if bytes.len() < self.threshold {
            return Ok(value.clone());
        }

        let hash = content_hash(&bytes);
        let locator = self.store.put(&bytes).await?;
        tracing::debug!(
            size = bytes.len(),
            threshold = self.threshold,
            %locator,
            "payload exceeds claim-check threshold, storing as blob"
        );
        let envelope = TokenEnvelope {
            token: ClaimCheckToken {
                hash,
                size: bytes.len() as u64,
                locator,
            },
        };
        Ok(serde_json::to_value(envelope)?)
    }

    /// Resolves a token value back to the original payload, verifying its
    /// content hash; any other value passes through unchanged.
    pub async fn decode(&self, value: &serde_json::Value) -> Result<serde_json::Value> {
        let Some(token) = Self::match_token(value) else {
            return Ok(value.clone());
        };

        let bytes = self.store.get(&token.locator).await?;
        if content_hash(&bytes) != token.hash {
            return Err(SupervisorError::HashMismatch {
                locator: token.locator,
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Structurally matches a token envelope: an object with exactly the
    /// token key, holding a well-formed token.
    fn match_token(value: &serde_json::Value) -> Option<ClaimCheckToken> {
        let obj = value.as_object()?;
        if obj.len() != 1 || !obj.contains_key(TOKEN_KEY) {
            return None;
        }
        serde_json::from_value::<TokenEnvelope>(value.clone())
            .ok()
            .map(|e| e.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim_check::store::MemoryBlobStore;
    use serde_json::json;

    fn codec_with_store(threshold: usize) -> (ClaimCheckCodec, Arc<MemoryBlobStore>) {
        let store = Arc::new(MemoryBlobStore::new());
        (ClaimCheckCodec::new(store.clone(), threshold), store)
    }

    #[tokio::test]
    async fn test_small_payload_passes_through() {
        let (codec, store) = codec_with_store(1024);
        let value = json!({"user_input": "Hello"});

        let encoded = codec.encode(&value).await.unwrap();
        assert_eq!(encoded, value, "sub-threshold payload must be unchanged");
        assert!(store.is_empty().await, "no blob write below threshold");

        let decoded = codec.decode(&encoded).await.unwrap();
        assert_eq!(decoded, value);
    }

    #[tokio::test]
    async fn test_large_payload_roundtrips_through_blob_store() {
        let (codec, store) = codec_with_store(64);
        let value = json!({"report": "x".repeat(500)});

        let encoded = codec.encode(&value).await.unwrap();
        assert_ne!(encoded, value);
        assert_eq!(store.len().await, 1);

        // The token is strictly smaller than the original payload.
        let token_size = serde_json::to_vec(&encoded).unwrap().len();
        let payload_size = serde_json::to_vec(&value).unwrap().len();
        assert!(token_size < payload_size);

        let decoded = codec.decode(&encoded).await.unwrap();
        assert_eq!(decoded, value);
    }

    #[tokio::test]
    async fn test_exactly_threshold_sized_payload_spills() {
        let value = json!({"v": "a".repeat(40)});
        let size = serde_json::to_vec(&value).unwrap().len();

        // At exactly the threshold the payload goes to the blob store.
        let (codec, store) = codec_with_store(size);
        let encoded = codec.encode(&value).await.unwrap();
        assert_ne!(encoded, value);
        assert_eq!(store.len().await, 1);
        assert_eq!(codec.decode(&encoded).await.unwrap(), value);

        // One byte below it stays inline.
        let (codec, store) = codec_with_store(size + 1);
        let encoded = codec.encode(&value).await.unwrap();
        assert_eq!(encoded, value);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_payload_recoverable_after_in_process_copy_is_gone() {
        let (codec, _store) = codec_with_store(16);
        let value = json!({"v": "a".repeat(50)});

        let encoded = codec.encode(&value).await.unwrap();
        drop(value);

        let decoded = codec.decode(&encoded).await.unwrap();
        assert_eq!(decoded, json!({"v": "a".repeat(50)}));
    }

    #[tokio::test]
    async fn test_token_shaped_object_with_extra_keys_passes_through() {
        let (codec, _store) = codec_with_store(1024);
        // A user payload that merely mentions the key alongside others is
        // not a token.
        let value = json!({"__confab_claim_check": "just text", "more": 1});
        let decoded = codec.decode(&value).await.unwrap();
        assert_eq!(decoded, value);
    }

    #[tokio::test]
    async fn test_corrupted_blob_is_a_hash_mismatch() {
        let store = Arc::new(MemoryBlobStore::new());
        let codec = ClaimCheckCodec::new(store.clone(), 16);
        let value = json!({"big": "y".repeat(100)});

        let encoded = codec.encode(&value).await.unwrap();

        // Forge a token pointing at different content.
        let other_locator = store.put(b"\"tampered\"").await.unwrap();
        let mut forged = encoded.clone();
        forged["__confab_claim_check"]["locator"] = json!(other_locator);

        let err = codec.decode(&forged).await.unwrap_err();
        assert!(matches!(err, SupervisorError::HashMismatch { .. }));
    }

    #[tokio::test]
    async fn test_identical_payloads_share_one_blob() {
        let (codec, store) = codec_with_store(16);
        let value = json!({"dup": "z".repeat(200)});

        let a = codec.encode(&value).await.unwrap();
        let b = codec.encode(&value).await.unwrap();
        assert_eq!(a, b, "content addressing makes duplicate writes idempotent");
        assert_eq!(store.len().await, 1);
    }
}
