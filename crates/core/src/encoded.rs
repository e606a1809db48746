//! Canonical encoded-image representation and the size estimator.
//!
//! Every raster handled by the pipeline is carried as a MIME type plus a
//! base64 payload. On the wire and in persisted state an image serializes
//! to its `data:<mime>;base64,<payload>` form.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// MIME type of the pipeline's canonical JPEG encoding.
pub const MIME_JPEG: &str = "image/jpeg";

/// An encoded raster image: MIME type plus base64 payload (no data-URL
/// prefix).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EncodedImage {
    pub mime: String,
    pub base64: String,
}

impl EncodedImage {
    /// Wrap raw encoded bytes (already JPEG/PNG/WebP) as a payload.
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        Self {
            mime: mime.to_string(),
            base64: BASE64.encode(bytes),
        }
    }

    /// Parse a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(url: &str) -> Result<Self, CoreError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| CoreError::Decode("missing data: prefix".into()))?;
        let (mime, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| CoreError::Decode("missing ;base64, separator".into()))?;
        if mime.is_empty() {
            return Err(CoreError::Decode("empty MIME type".into()));
        }
        Ok(Self {
            mime: mime.to_string(),
            base64: payload.to_string(),
        })
    }

    /// Render the `data:` URL form.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64)
    }

    /// Decode the base64 payload back to raw encoded bytes.
    pub fn decode_bytes(&self) -> Result<Vec<u8>, CoreError> {
        BASE64
            .decode(&self.base64)
            .map_err(|e| CoreError::Decode(format!("invalid base64 payload: {e}")))
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.base64.is_empty()
    }

    /// Estimated byte footprint in KB, from the base64 expansion ratio
    /// (payload bytes ≈ encoded length × 3/4), rounded to the nearest KB.
    ///
    /// Total function: degenerate payloads estimate to 0 rather than
    /// failing, since this runs on hot paths.
    pub fn estimated_size_kb(&self) -> u32 {
        estimate_base64_size_kb(&self.base64)
    }
}

impl From<EncodedImage> for String {
    fn from(img: EncodedImage) -> Self {
        img.to_data_url()
    }
}

impl TryFrom<String> for EncodedImage {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_data_url(&value)
    }
}

/// Estimate the decoded size of a base64 string in KB.
pub fn estimate_base64_size_kb(base64: &str) -> u32 {
    let bytes = base64.len() as f64 * 3.0 / 4.0;
    (bytes / 1024.0).round() as u32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip() {
        let img = EncodedImage::from_bytes(MIME_JPEG, b"\xff\xd8\xff\xd9");
        assert_eq!(img.decode_bytes().unwrap(), b"\xff\xd8\xff\xd9");
    }

    #[test]
    fn data_url_round_trips() {
        let img = EncodedImage::from_bytes("image/png", b"png-ish bytes");
        let url = img.to_data_url();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(EncodedImage::from_data_url(&url).unwrap(), img);
    }

    #[test]
    fn from_data_url_rejects_malformed() {
        assert!(EncodedImage::from_data_url("image/jpeg;base64,abc").is_err());
        assert!(EncodedImage::from_data_url("data:image/jpeg,abc").is_err());
        assert!(EncodedImage::from_data_url("data:;base64,abc").is_err());
    }

    #[test]
    fn serde_uses_data_url_form() {
        let img = EncodedImage::from_bytes(MIME_JPEG, b"hello");
        let json = serde_json::to_string(&img).unwrap();
        assert!(json.starts_with("\"data:image/jpeg;base64,"));
        let back: EncodedImage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, img);
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        let img = EncodedImage {
            mime: MIME_JPEG.into(),
            base64: "!!!not base64!!!".into(),
        };
        assert!(img.decode_bytes().is_err());
    }

    // -- Size estimation --

    #[test]
    fn estimate_empty_is_zero() {
        assert_eq!(estimate_base64_size_kb(""), 0);
    }

    #[test]
    fn estimate_tracks_payload_bytes() {
        // 4096 base64 chars ≈ 3072 bytes = 3 KB.
        let payload = "A".repeat(4096);
        assert_eq!(estimate_base64_size_kb(&payload), 3);
    }

    #[test]
    fn estimate_rounds_to_nearest_kb() {
        // 2000 chars ≈ 1500 bytes ≈ 1.46 KB → 1.
        assert_eq!(estimate_base64_size_kb(&"A".repeat(2000)), 1);
        // 2200 chars ≈ 1650 bytes ≈ 1.61 KB → 2.
        assert_eq!(estimate_base64_size_kb(&"A".repeat(2200)), 2);
    }

    #[test]
    fn estimate_matches_real_encoding() {
        let bytes = vec![0u8; 300 * 1024];
        let img = EncodedImage::from_bytes(MIME_JPEG, &bytes);
        let kb = img.estimated_size_kb();
        assert!((299..=301).contains(&kb), "estimated {kb} KB");
    }
}
