//! Wire types and prompt construction for the Kolors generation API.
//!
//! The outbound request carries the base64 source image, a scene tag, and
//! the tunable parameters; the prompt text is assembled from a
//! `{placeholder}` template resolved against scene- and weight-derived
//! values.

use std::collections::HashMap;
use std::sync::LazyLock;

use rand::Rng;
use serde::{Deserialize, Serialize};

use portraify_core::encoded::EncodedImage;
use portraify_core::params::{GenerationParameters, Resolution};
use portraify_core::scene::Scene;

/// Regex matching `{placeholder}` tokens in the prompt template.
static PLACEHOLDER_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\{(\w+)\}").expect("valid regex"));

/// Prompt template resolved per request.
const PROMPT_TEMPLATE: &str = "Professional {noun} headshot of a real person, \
strictly maintain original facial features and skin texture, \
{attire} attire in neutral colors, natural lighting and skin tone, \
{background_quality} {background_type} background in {palette} tones, \
{lighting_quality} lighting with {detail_level} features{style_suffix}";

/// Fixed negative prompt sent with every request.
const NEGATIVE_PROMPT: &str = "blurry, distorted, low quality, deformed face, \
bad anatomy, disfigured, poorly drawn face, mutation, extra limbs, \
out of frame, watermark, signature, text, (cartoon, anime, 3d, doll:1.3), \
(strange lighting, overexposed:1.3), (unnatural skin texture:1.4), \
(plastic looking:1.3), (overprocessed:1.4)";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One outbound generation request.
#[derive(Debug, Clone, Serialize)]
pub struct PortraitRequest {
    /// Base64 image payload, without a data-URL prefix.
    pub image: String,
    pub scene: Scene,
    pub parameters: RequestParameters,
}

/// Request parameters as they appear on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct RequestParameters {
    pub background: u8,
    pub lighting: u8,
    pub detail: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

impl PortraitRequest {
    /// Build a request from domain values. Weights are clamped.
    pub fn new(
        image: &EncodedImage,
        scene: Scene,
        parameters: &GenerationParameters,
        resolution: Option<Resolution>,
    ) -> Self {
        let parameters = parameters.clone().clamped();
        Self {
            image: image.base64.clone(),
            scene,
            parameters: RequestParameters {
                background: parameters.background,
                lighting: parameters.lighting,
                detail: parameters.detail,
                style: parameters.style,
                resolution: resolution.map(|r| r.to_string()),
            },
        }
    }

    /// Target resolution, defaulting when the request carries none.
    pub fn resolution(&self) -> Resolution {
        self.parameters
            .resolution
            .as_deref()
            .and_then(|s| Resolution::parse(s).ok())
            .unwrap_or_default()
    }
}

/// Assemble the positive prompt for a request.
pub fn build_prompt(scene: Scene, parameters: &RequestParameters) -> String {
    let weights = GenerationParameters::new(
        parameters.background,
        parameters.lighting,
        parameters.detail,
    );
    let style_suffix = parameters
        .style
        .as_deref()
        .map(|s| format!(" in {s} style"))
        .unwrap_or_default();

    let values: HashMap<&str, String> = HashMap::from([
        ("noun", scene.api_noun().to_string()),
        ("attire", scene.attire().to_string()),
        ("background_quality", weights.background_adjective().to_string()),
        ("background_type", scene.background_type().to_string()),
        ("palette", scene.palette().to_string()),
        ("lighting_quality", weights.lighting_adjective().to_string()),
        ("detail_level", weights.detail_adjective().to_string()),
        ("style_suffix", style_suffix),
    ]);

    PLACEHOLDER_RE
        .replace_all(PROMPT_TEMPLATE, |caps: &regex::Captures| {
            values
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .to_string()
}

/// Build the JSON body the SiliconFlow endpoint expects.
pub fn build_body(request: &PortraitRequest) -> serde_json::Value {
    let resolution = request.resolution();
    serde_json::json!({
        "model": "Kwai-Kolors/Kolors",
        "prompt": build_prompt(request.scene, &request.parameters),
        "negative_prompt": NEGATIVE_PROMPT,
        "image_size": resolution.to_string(),
        "batch_size": 1,
        "seed": rand::rng().random_range(0..9_999_999_999u64),
        "num_inference_steps": 30,
        "guidance_scale": 7.5,
        "image": format!("data:image/jpeg;base64,{}", request.image),
        "enable_face_encoder": true,
        "ip_adapter": "faceid_plus",
    })
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Generation run status as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortraitStatus {
    Processing,
    Completed,
    Failed,
}

/// Normalized response shape handed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortraitResponse {
    pub id: String,
    pub status: PortraitStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PortraitResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortraitResult {
    /// Base64 image payload, without a data-URL prefix.
    pub image: String,
    pub metadata: ResultMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    /// Remote-side processing time in seconds.
    pub processing_time: f64,
    /// Result size in KB as reported by the remote.
    pub size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: String,
    pub message: String,
}

impl PortraitResponse {
    /// The completed image payload, when this response carries one.
    pub fn completed_image(&self) -> Option<&PortraitResult> {
        match self.status {
            PortraitStatus::Completed => self.result.as_ref(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Upstream shapes (SiliconFlow)
// ---------------------------------------------------------------------------

/// Raw response body from the SiliconFlow endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct UpstreamResponse {
    #[serde(default)]
    pub images: Vec<UpstreamImage>,
    #[serde(default)]
    pub timings: Option<UpstreamTimings>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpstreamImage {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpstreamTimings {
    #[serde(default)]
    pub inference: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use portraify_core::encoded::MIME_JPEG;

    fn request(scene: Scene, params: GenerationParameters) -> PortraitRequest {
        let image = EncodedImage::from_bytes(MIME_JPEG, b"source image");
        PortraitRequest::new(&image, scene, &params, None)
    }

    #[test]
    fn prompt_carries_scene_content() {
        let req = request(Scene::Passport, GenerationParameters::new(80, 60, 10));
        let prompt = build_prompt(req.scene, &req.parameters);
        assert!(prompt.contains("id photo"));
        assert!(prompt.contains("neat casual attire"));
        assert!(prompt.contains("high-quality solid background in white tones"));
        assert!(prompt.contains("professional lighting"));
        assert!(prompt.contains("smooth features"));
    }

    #[test]
    fn prompt_has_no_unresolved_placeholders() {
        for &scene in portraify_core::scene::ALL_SCENES {
            let req = request(scene, GenerationParameters::new(50, 50, 50));
            let prompt = build_prompt(req.scene, &req.parameters);
            assert!(!prompt.contains('{'), "unresolved placeholder in: {prompt}");
        }
    }

    #[test]
    fn prompt_appends_style_suffix() {
        let params = GenerationParameters::new(50, 50, 50).with_style(Some("film noir".into()));
        let req = request(Scene::Social, params);
        let prompt = build_prompt(req.scene, &req.parameters);
        assert!(prompt.ends_with("in film noir style"));
    }

    #[test]
    fn body_has_expected_fields() {
        let image = EncodedImage::from_bytes(MIME_JPEG, b"img");
        let req = PortraitRequest::new(
            &image,
            Scene::Business,
            &GenerationParameters::new(10, 20, 30),
            Some(Resolution::parse("768x1024").unwrap()),
        );
        let body = build_body(&req);
        assert_eq!(body["model"], "Kwai-Kolors/Kolors");
        assert_eq!(body["image_size"], "768x1024");
        assert_eq!(body["batch_size"], 1);
        assert_eq!(body["num_inference_steps"], 30);
        assert!(body["image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
        assert!(body["seed"].as_u64().is_some());
    }

    #[test]
    fn request_defaults_resolution() {
        let req = request(Scene::Virtual, GenerationParameters::new(0, 0, 0));
        assert_eq!(req.resolution(), Resolution::default());
    }

    #[test]
    fn request_clamps_weights() {
        let image = EncodedImage::from_bytes(MIME_JPEG, b"img");
        let params = GenerationParameters {
            background: 250,
            lighting: 50,
            detail: 120,
            style: None,
            remote_job_id: None,
        };
        let req = PortraitRequest::new(&image, Scene::Academic, &params, None);
        assert_eq!(req.parameters.background, 100);
        assert_eq!(req.parameters.detail, 100);
    }

    #[test]
    fn completed_response_deserializes() {
        let raw = r#"{
            "id": "873245",
            "status": "completed",
            "result": {
                "image": "aGVsbG8=",
                "metadata": { "processingTime": 2.5, "size": 412 }
            }
        }"#;
        let response: PortraitResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.status, PortraitStatus::Completed);
        let result = response.completed_image().unwrap();
        assert_eq!(result.image, "aGVsbG8=");
        assert_eq!(result.metadata.size, 412);
    }

    #[test]
    fn failed_response_deserializes() {
        let raw = r#"{
            "id": "x1",
            "status": "failed",
            "error": { "code": "api_error", "message": "quota exhausted" }
        }"#;
        let response: PortraitResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.status, PortraitStatus::Failed);
        assert!(response.completed_image().is_none());
        assert_eq!(response.error.unwrap().code, "api_error");
    }

    #[test]
    fn non_completed_status_yields_no_image() {
        let response = PortraitResponse {
            id: "p".into(),
            status: PortraitStatus::Processing,
            result: Some(PortraitResult {
                image: "abc".into(),
                metadata: ResultMetadata {
                    processing_time: 0.0,
                    size: 1,
                },
            }),
            error: None,
        };
        assert!(response.completed_image().is_none());
    }
}
