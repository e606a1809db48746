//! HTTP client for the Kolors generation endpoint.
//!
//! One request per generation attempt; no retry or backoff here. Any
//! failure -- transport, non-2xx, malformed payload -- surfaces as a single
//! [`KolorsError`] for the caller's fallback decision.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::request::{
    build_body, PortraitRequest, PortraitResponse, PortraitResult, PortraitStatus, ResultMetadata,
    UpstreamResponse,
};

/// Production endpoint for the SiliconFlow Kolors API.
pub const DEFAULT_ENDPOINT: &str = "https://api.siliconflow.cn/v1/images/generations";

/// HTTP timeout for a single generation attempt. Generation is slow, so
/// this is deliberately generous; a hung call blocks only its own flow.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors from the remote generation client.
#[derive(Debug, thiserror::Error)]
pub enum KolorsError {
    /// No API key is configured; the request was never sent.
    #[error("Kolors API key is not configured")]
    MissingApiKey,

    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint returned a non-2xx status code.
    #[error("Kolors API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response parsed, but did not carry a usable image.
    #[error("Malformed Kolors response: {0}")]
    Malformed(String),
}

/// HTTP client for a single Kolors endpoint.
pub struct KolorsApi {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl KolorsApi {
    /// Create a client for `endpoint` authenticating with `api_key`.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`] (useful for
    /// connection pooling).
    pub fn with_client(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    /// Whether an API key is present. Callers skip the remote path when
    /// this is false.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Run one generation attempt.
    ///
    /// The endpoint returns a URL for the generated image; the client
    /// fetches it and hands back the normalized completed response with
    /// the payload inlined as base64.
    pub async fn generate(&self, request: &PortraitRequest) -> Result<PortraitResponse, KolorsError> {
        if !self.is_configured() {
            return Err(KolorsError::MissingApiKey);
        }

        let body = build_body(request);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let upstream: UpstreamResponse = response.json().await?;

        let image = upstream
            .images
            .first()
            .ok_or_else(|| KolorsError::Malformed("no images in response".to_string()))?;

        // Fetch the generated image itself.
        let image_response = self.client.get(&image.url).send().await?;
        let image_response = Self::ensure_success(image_response).await?;
        let bytes = image_response.bytes().await?;
        if bytes.is_empty() {
            return Err(KolorsError::Malformed("empty image payload".to_string()));
        }

        let id = upstream
            .seed
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("kolors-{}", rand::random::<u32>()));
        tracing::info!(id = %id, size_bytes = bytes.len(), "remote generation completed");

        Ok(PortraitResponse {
            id,
            status: PortraitStatus::Completed,
            result: Some(PortraitResult {
                image: BASE64.encode(&bytes),
                metadata: ResultMetadata {
                    processing_time: upstream.timings.map(|t| t.inference).unwrap_or(0.0),
                    size: ((bytes.len() as f64) / 1024.0).round() as u32,
                },
            }),
            error: None,
        })
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, or capture the
    /// status and body as an [`KolorsError::Api`].
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, KolorsError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(KolorsError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use portraify_core::encoded::{EncodedImage, MIME_JPEG};
    use portraify_core::params::GenerationParameters;
    use portraify_core::scene::Scene;

    fn sample_request() -> PortraitRequest {
        let image = EncodedImage::from_bytes(MIME_JPEG, b"img");
        PortraitRequest::new(&image, Scene::Professional, &GenerationParameters::new(50, 50, 50), None)
    }

    #[test]
    fn new_does_not_panic() {
        let _api = KolorsApi::new(DEFAULT_ENDPOINT, "key");
    }

    #[test]
    fn empty_key_is_not_configured() {
        assert!(!KolorsApi::new(DEFAULT_ENDPOINT, "").is_configured());
        assert!(KolorsApi::new(DEFAULT_ENDPOINT, "sk-test").is_configured());
    }

    #[tokio::test]
    async fn generate_without_key_fails_fast() {
        let api = KolorsApi::new(DEFAULT_ENDPOINT, "");
        let err = api.generate(&sample_request()).await.unwrap_err();
        assert!(matches!(err, KolorsError::MissingApiKey));
    }

    #[tokio::test]
    async fn generate_against_unreachable_endpoint_is_a_request_error() {
        // Nothing listens on this port; the connection is refused.
        let api = KolorsApi::new("http://127.0.0.1:9/generate", "sk-test");
        let err = api.generate(&sample_request()).await.unwrap_err();
        assert!(matches!(err, KolorsError::Request(_)));
    }

    #[test]
    fn api_error_display_includes_status() {
        let err = KolorsError::Api {
            status: 429,
            body: "rate limited".into(),
        };
        assert_eq!(err.to_string(), "Kolors API error (429): rate limited");
    }
}
