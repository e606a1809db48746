//! Generation flow: remote attempt, local fallback, store commit.
//!
//! The remote client gets exactly one attempt, and only when it is
//! configured. Every remote failure -- transport, API error, malformed or
//! non-completed response -- is treated identically: log and fall back to
//! the local renderer. The flow as a whole fails only when the local
//! renderer fails too.

use std::time::Instant;

use portraify_core::encoded::{EncodedImage, MIME_JPEG};
use portraify_core::params::{GenerationParameters, Resolution};
use portraify_core::scene::Scene;
use portraify_core::types::EntityId;
use portraify_kolors::{KolorsApi, PortraitRequest};
use portraify_store::{PortraitDraft, PortraitStore, StorageBackend};

use crate::local;

/// Errors from a generation run.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The source photo is not in the store.
    #[error("Photo not found: {0}")]
    PhotoNotFound(EntityId),

    /// Both the remote attempt and the local fallback failed.
    #[error("Generation failed -- remote: {remote}; local: {local}")]
    BothPathsFailed { remote: String, local: String },
}

/// Result of a completed generation run.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub portrait_id: EntityId,
    /// Whether the remote path produced the image.
    pub via_remote: bool,
    pub processing_time_secs: f64,
    pub estimated_size_kb: u32,
}

/// Orchestrates generation runs against one store and an optional remote
/// client.
pub struct PortraitGenerator<B> {
    store: PortraitStore<B>,
    api: Option<KolorsApi>,
}

impl<B: StorageBackend + 'static> PortraitGenerator<B> {
    pub fn new(store: PortraitStore<B>, api: Option<KolorsApi>) -> Self {
        Self { store, api }
    }

    /// Generate a portrait from a committed photo.
    ///
    /// Returns once the portrait's id is allocated and its commit is
    /// scheduled; the portrait appears in the collection when the commit
    /// lands.
    pub async fn generate(
        &self,
        photo_id: &str,
        scene: Scene,
        parameters: GenerationParameters,
        resolution: Option<Resolution>,
    ) -> Result<GenerationOutcome, GenerationError> {
        let started = Instant::now();
        let photo = self
            .store
            .photo(photo_id)
            .await
            .ok_or_else(|| GenerationError::PhotoNotFound(photo_id.to_string()))?;
        let parameters = parameters.clamped();

        let mut remote_failure = "remote generation not configured".to_string();
        let mut remote_image: Option<(EncodedImage, String)> = None;

        if let Some(api) = self.api.as_ref().filter(|api| api.is_configured()) {
            let request = PortraitRequest::new(&photo.encoded_image, scene, &parameters, resolution);
            match api.generate(&request).await {
                Ok(response) => match response.completed_image() {
                    Some(result) => {
                        let image = EncodedImage {
                            mime: MIME_JPEG.to_string(),
                            base64: result.image.clone(),
                        };
                        remote_image = Some((image, response.id.clone()));
                    }
                    None => {
                        remote_failure = response
                            .error
                            .as_ref()
                            .map(|e| format!("{}: {}", e.code, e.message))
                            .unwrap_or_else(|| "remote returned no image".to_string());
                    }
                },
                Err(e) => remote_failure = e.to_string(),
            }
        }

        let (image, remote_job_id, via_remote) = match remote_image {
            Some((image, job_id)) => (image, Some(job_id), true),
            None => {
                tracing::warn!(
                    photo_id = %photo_id,
                    reason = %remote_failure,
                    "falling back to local rendering"
                );
                let source = photo.encoded_image.clone();
                let render_scene = scene;
                let render_params = parameters.clone();
                let render_resolution = resolution.unwrap_or_default();
                let rendered = tokio::task::spawn_blocking(move || {
                    local::render(&source, render_scene, &render_params, render_resolution)
                })
                .await
                .unwrap_or_else(|e| {
                    Err(portraify_core::error::CoreError::Internal(format!(
                        "render task failed: {e}"
                    )))
                });
                match rendered {
                    Ok(image) => (image, None, false),
                    Err(local_error) => {
                        return Err(GenerationError::BothPathsFailed {
                            remote: remote_failure,
                            local: local_error.to_string(),
                        })
                    }
                }
            }
        };

        let mut parameters = parameters;
        parameters.remote_job_id = remote_job_id;
        let estimated_size_kb = image.estimated_size_kb();

        let portrait_id = self
            .store
            .insert_portrait(PortraitDraft {
                source_photo_id: photo.id.clone(),
                scene,
                encoded_image: image,
                parameters,
            })
            .await;

        tracing::info!(
            portrait_id = %portrait_id,
            source_photo_id = %photo.id,
            scene = scene.tag(),
            via_remote,
            "portrait generation committed"
        );

        Ok(GenerationOutcome {
            portrait_id,
            via_remote,
            processing_time_secs: started.elapsed().as_secs_f64(),
            estimated_size_kb,
        })
    }
}
