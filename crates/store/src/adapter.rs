//! Compressed persistence adapter with two-stage quota recovery.
//!
//! Serialized state is gzipped before it reaches the key-value backend. The
//! read path detects compression by magic bytes and returns anything else
//! verbatim, so blobs written before compression was introduced stay
//! readable indefinitely.
//!
//! When the backend signals a quota failure on write, the adapter degrades
//! in two strictly ordered stages:
//!
//! 1. decode the *currently stored* blob, truncate its portrait collection
//!    to the [`REMEDIATION_KEEP_PORTRAITS`] most recent entries, and retry
//!    that write once;
//! 2. if the stored blob cannot be parsed or the retry still fails, clear
//!    the backend's key space entirely and attempt the incoming write one
//!    final time.
//!
//! Portraits -- never photos -- are the truncation target: a portrait can be
//! regenerated from its source photo, a photo cannot be recovered at all.
//!
//! The adapter has no knowledge of the entity types. Remediation works on
//! untyped JSON and assumes only a `state.generatedPortraits` array whose
//! elements carry a numeric `createdAt`.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::backend::{BackendError, StorageBackend};

/// Number of portraits the remediation step keeps.
pub const REMEDIATION_KEEP_PORTRAITS: usize = 5;

/// Gzip stream magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors from the persistence adapter.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Compression failed: {0}")]
    Compress(std::io::Error),
}

/// How a write was ultimately satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Written on the first attempt.
    Clean,
    /// The stored blob was truncated to make space; the incoming payload
    /// was *not* written. Callers should reconcile and flush again.
    Truncated,
    /// The key space was cleared and the incoming payload written fresh.
    Wiped,
}

/// Compression layer between serialized state and a [`StorageBackend`].
#[derive(Debug, Clone)]
pub struct CompressedAdapter<B> {
    backend: B,
}

impl<B: StorageBackend> CompressedAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Read and, when applicable, decompress the value under `key`.
    ///
    /// Values without the gzip magic -- or that fail to decompress -- are
    /// returned as stored.
    pub async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        let Some(raw) = self.backend.read(key).await? else {
            return Ok(None);
        };
        if raw.starts_with(&GZIP_MAGIC) {
            match decompress(&raw) {
                Ok(plain) => return Ok(Some(plain)),
                Err(e) => {
                    tracing::warn!(key, error = %e, "stored blob has gzip magic but failed to decompress, returning raw");
                }
            }
        }
        Ok(Some(raw))
    }

    /// Compress and write `payload` under `key`, degrading on quota failure.
    pub async fn write(&self, key: &str, payload: &[u8]) -> Result<WriteOutcome, PersistError> {
        let compressed = compress(payload)?;
        match self.backend.write(key, &compressed).await {
            Ok(()) => Ok(WriteOutcome::Clean),
            Err(BackendError::QuotaExceeded { attempted, quota }) => {
                tracing::warn!(key, attempted, quota, "quota exceeded, attempting remediation");
                self.remediate(key, &compressed).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the value under `key`.
    pub async fn remove(&self, key: &str) -> Result<(), PersistError> {
        self.backend.remove(key).await?;
        Ok(())
    }

    /// Stage 1: shrink the stored blob and retry. Stage 2: wipe the key
    /// space and write the incoming payload fresh.
    async fn remediate(&self, key: &str, compressed: &[u8]) -> Result<WriteOutcome, PersistError> {
        if let Some(stored) = self.read(key).await? {
            if let Some(truncated) = truncate_stored_portraits(&stored) {
                let recompressed = compress(&truncated)?;
                match self.backend.write(key, &recompressed).await {
                    Ok(()) => {
                        tracing::warn!(key, "older portraits removed to make space");
                        return Ok(WriteOutcome::Truncated);
                    }
                    Err(BackendError::QuotaExceeded { .. }) => {
                        tracing::warn!(key, "truncated retry still over quota");
                    }
                    Err(e) => return Err(e.into()),
                }
            } else {
                tracing::warn!(key, "stored blob is not remediable, falling through to wipe");
            }
        }

        // Last resort: clear everything, then try the incoming payload once.
        self.backend.clear().await?;
        tracing::warn!(key, "cleared persistence key space to recover from quota exhaustion");
        self.backend.write(key, compressed).await?;
        Ok(WriteOutcome::Wiped)
    }
}

/// Truncate `state.generatedPortraits` in a serialized blob to the
/// [`REMEDIATION_KEEP_PORTRAITS`] most recent entries, ordered by their
/// numeric `createdAt` descending. Returns `None` when the blob does not
/// have the expected structure.
fn truncate_stored_portraits(blob: &[u8]) -> Option<Vec<u8>> {
    let mut value: serde_json::Value = serde_json::from_slice(blob).ok()?;
    let portraits = value
        .get_mut("state")?
        .get_mut("generatedPortraits")?
        .as_array_mut()?;
    portraits.sort_by_key(|p| {
        std::cmp::Reverse(p.get("createdAt").and_then(|v| v.as_i64()).unwrap_or(0))
    });
    portraits.truncate(REMEDIATION_KEEP_PORTRAITS);
    serde_json::to_vec(&value).ok()
}

fn compress(data: &[u8]) -> Result<Vec<u8>, PersistError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(PersistError::Compress)?;
    encoder.finish().map_err(PersistError::Compress)
}

fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut plain = Vec::new();
    decoder.read_to_end(&mut plain)?;
    Ok(plain)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use assert_matches::assert_matches;

    const KEY: &str = "portraify-storage";

    /// Deterministic pseudo-random base64-alphabet text. Incompressible
    /// enough that gzip cannot collapse the test payloads.
    fn noise_text(seed: u32, len: usize) -> String {
        const ALPHABET: &[u8] =
            b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
        let mut x = seed.wrapping_mul(2654435761).max(1);
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                ALPHABET[(x % 64) as usize] as char
            })
            .collect()
    }

    /// A state-shaped blob with `n` portraits carrying `payload_len`-byte
    /// images and increasing timestamps.
    fn state_blob(n: usize, payload_len: usize) -> Vec<u8> {
        let portraits: Vec<serde_json::Value> = (0..n)
            .map(|i| {
                serde_json::json!({
                    "id": format!("g{i}"),
                    "sourcePhotoId": "p0",
                    "sceneTag": "passport",
                    "encodedImage": format!(
                        "data:image/jpeg;base64,{}",
                        noise_text(i as u32 + 1, payload_len)
                    ),
                    "createdAt": 1_700_000_000_000i64 + i as i64,
                    "estimatedSizeKB": 1,
                })
            })
            .collect();
        serde_json::to_vec(&serde_json::json!({
            "state": {
                "userPhotos": [],
                "currentPhotoId": null,
                "currentScene": null,
                "generatedPortraits": portraits,
                "settings": {},
                "subscription": {},
            },
            "version": 1,
        }))
        .unwrap()
    }

    fn portraits_in(blob: &[u8]) -> Vec<serde_json::Value> {
        let value: serde_json::Value = serde_json::from_slice(blob).unwrap();
        value["state"]["generatedPortraits"]
            .as_array()
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn round_trip_is_transparent() {
        let backend = MemoryBackend::new(64 * 1024);
        let adapter = CompressedAdapter::new(backend.clone());
        let payload = state_blob(3, 256);

        let outcome = adapter.write(KEY, &payload).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Clean);
        assert_eq!(adapter.read(KEY).await.unwrap().unwrap(), payload);

        // What actually hit the backend is gzip.
        let stored = backend.read(KEY).await.unwrap().unwrap();
        assert!(stored.starts_with(&GZIP_MAGIC));
        assert_ne!(stored, payload);
    }

    #[tokio::test]
    async fn read_missing_key_is_none() {
        let adapter = CompressedAdapter::new(MemoryBackend::new(1024));
        assert!(adapter.read(KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn legacy_uncompressed_blob_reads_verbatim() {
        let backend = MemoryBackend::new(64 * 1024);
        let adapter = CompressedAdapter::new(backend.clone());
        let legacy = state_blob(2, 64);

        // Written directly, bypassing compression -- a pre-compression blob.
        backend.write(KEY, &legacy).await.unwrap();
        assert_eq!(adapter.read(KEY).await.unwrap().unwrap(), legacy);
    }

    #[test]
    fn truncation_keeps_five_most_recent_sorted() {
        let blob = state_blob(8, 32);
        let truncated = truncate_stored_portraits(&blob).unwrap();
        let portraits = portraits_in(&truncated);
        assert_eq!(portraits.len(), REMEDIATION_KEEP_PORTRAITS);
        let ids: Vec<&str> = portraits.iter().map(|p| p["id"].as_str().unwrap()).collect();
        // Newest first: g7 .. g3.
        assert_eq!(ids, ["g7", "g6", "g5", "g4", "g3"]);
    }

    #[test]
    fn truncation_rejects_unstructured_blobs() {
        assert!(truncate_stored_portraits(b"not json").is_none());
        assert!(truncate_stored_portraits(b"{\"state\":{}}").is_none());
        assert!(truncate_stored_portraits(b"{\"state\":{\"generatedPortraits\":42}}").is_none());
    }

    #[tokio::test]
    async fn quota_failure_truncates_stored_blob() {
        let backend = MemoryBackend::new(12 * 1024);
        let adapter = CompressedAdapter::new(backend.clone());

        // A blob that fits comfortably...
        let stored = state_blob(8, 1024);
        assert_eq!(adapter.write(KEY, &stored).await.unwrap(), WriteOutcome::Clean);

        // ...then one that cannot fit at all.
        let incoming = state_blob(16, 2048);
        let outcome = adapter.write(KEY, &incoming).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Truncated);

        // The persisted collection is exactly five portraits, newest first.
        let after = adapter.read(KEY).await.unwrap().unwrap();
        let portraits = portraits_in(&after);
        assert_eq!(portraits.len(), REMEDIATION_KEEP_PORTRAITS);
        let times: Vec<i64> = portraits
            .iter()
            .map(|p| p["createdAt"].as_i64().unwrap())
            .collect();
        assert!(times.windows(2).all(|w| w[0] >= w[1]), "not sorted by recency");
    }

    #[tokio::test]
    async fn unparseable_stored_blob_falls_back_to_wipe() {
        let backend = MemoryBackend::new(10 * 1024);
        let adapter = CompressedAdapter::new(backend.clone());

        // Another key hogs most of the quota, and our key holds garbage
        // that stage 1 cannot parse.
        backend.write("other", &vec![0xAAu8; 8 * 1024]).await.unwrap();
        backend.write(KEY, b"\x00\x01 definitely not json").await.unwrap();

        let incoming = state_blob(4, 1024);
        let outcome = adapter.write(KEY, &incoming).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Wiped);

        // The key space was cleared and the incoming payload persisted.
        assert!(backend.read("other").await.unwrap().is_none());
        assert_eq!(adapter.read(KEY).await.unwrap().unwrap(), incoming);
    }

    #[tokio::test]
    async fn wipe_retry_still_over_quota_errors() {
        let backend = MemoryBackend::new(1024);
        let adapter = CompressedAdapter::new(backend.clone());
        backend.write(KEY, b"garbage").await.unwrap();

        // Even alone, this payload cannot fit.
        let incoming = state_blob(8, 2048);
        let err = adapter.write(KEY, &incoming).await.unwrap_err();
        assert_matches!(
            err,
            PersistError::Backend(BackendError::QuotaExceeded { .. })
        );
    }

    #[tokio::test]
    async fn remove_deletes_the_key() {
        let backend = MemoryBackend::new(64 * 1024);
        let adapter = CompressedAdapter::new(backend.clone());
        adapter.write(KEY, b"{}").await.unwrap();
        adapter.remove(KEY).await.unwrap();
        assert!(adapter.read(KEY).await.unwrap().is_none());
    }
}
