//! The bounded entity store: sole owner of the photo and portrait
//! collections, selection pointers, settings, and subscription state.
//!
//! Inserts allocate an id immediately and materialize the entity in a
//! background task (`Pending` until the commit lands, `Committed` after,
//! gone once evicted or deleted). Ids deleted while their commit is still
//! in flight are tombstoned so a late commit cannot resurrect them.
//!
//! Write-back policy: every mutating call schedules one persistence flush.
//! Callers must not assume the flush has completed when the call returns --
//! [`PortraitStore::flush`] awaits one explicitly.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use validator::Validate;

use portraify_core::encoded::EncodedImage;
use portraify_core::error::CoreError;
use portraify_core::optimizer;
use portraify_core::scene::Scene;
use portraify_core::types::{new_entity_id, now_millis, EntityId, Timestamp};

use crate::adapter::{CompressedAdapter, WriteOutcome, REMEDIATION_KEEP_PORTRAITS};
use crate::backend::StorageBackend;
use crate::models::{
    AppState, GeneratedPortrait, PersistedState, Photo, PortraitDraft, Settings, SettingsPatch,
    Subscription, SubscriptionPatch, STATE_VERSION,
};

/// Well-known key the full state blob lives under.
pub const STORE_KEY: &str = "portraify-storage";

/// Observable lifecycle state of an entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityStatus {
    /// Id allocated, commit still in flight. Not visible in iteration.
    Pending,
    /// Visible in its collection, persisted on the next flush.
    Committed,
    /// Never inserted, or evicted/deleted. Terminal.
    Unknown,
}

struct StoreState {
    app: AppState,
    /// Ids allocated but not yet committed.
    pending: HashSet<EntityId>,
    /// Ids deleted (or cleared) while their commit was in flight.
    tombstones: HashSet<EntityId>,
    /// The storage-pressure notice is surfaced at most once per process.
    quota_notice_emitted: bool,
}

struct StoreInner<B> {
    state: RwLock<StoreState>,
    adapter: CompressedAdapter<B>,
}

/// Process-wide portrait store. Cheap to clone; all clones share state.
pub struct PortraitStore<B> {
    inner: Arc<StoreInner<B>>,
}

impl<B> Clone for PortraitStore<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: StorageBackend + 'static> PortraitStore<B> {
    /// Restore the store from the persisted blob, or start empty when the
    /// blob is absent or unreadable.
    pub async fn open(adapter: CompressedAdapter<B>) -> Self {
        let app = match adapter.read(STORE_KEY).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<PersistedState>(&bytes) {
                Ok(blob) => {
                    tracing::info!(
                        photos = blob.state.user_photos.len(),
                        portraits = blob.state.generated_portraits.len(),
                        version = blob.version,
                        "restored persisted state"
                    );
                    blob.state
                }
                Err(e) => {
                    tracing::warn!(error = %e, "persisted state unreadable, starting empty");
                    AppState::default()
                }
            },
            Ok(None) => AppState::default(),
            Err(e) => {
                tracing::warn!(error = %e, "persistence read failed, starting empty");
                AppState::default()
            }
        };

        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(StoreState {
                    app,
                    pending: HashSet::new(),
                    tombstones: HashSet::new(),
                    quota_notice_emitted: false,
                }),
                adapter,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Inserts
    // -----------------------------------------------------------------------

    /// Insert a user photo. The returned id is allocated before this call
    /// resolves; optimization and commit run in a background task. On
    /// optimizer failure the unmodified input is committed instead.
    pub async fn insert_photo(&self, raw: EncodedImage, width: u32, height: u32) -> EntityId {
        let id = new_entity_id();
        self.inner.state.write().await.pending.insert(id.clone());

        let store = self.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            store.commit_photo(task_id, raw, width, height).await;
        });
        id
    }

    async fn commit_photo(&self, id: EntityId, raw: EncodedImage, width: u32, height: u32) {
        let (tier, save_original) = {
            let state = self.inner.state.read().await;
            (state.app.settings.quality, state.app.settings.save_originals)
        };

        let input = raw.clone();
        let encoded = match tokio::task::spawn_blocking(move || optimizer::optimize(&input, tier))
            .await
        {
            Ok(Ok(optimized)) => optimized,
            Ok(Err(e)) => {
                tracing::warn!(id = %id, error = %e, "photo optimization failed, committing unmodified input");
                raw.clone()
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "optimizer task failed, committing unmodified input");
                raw.clone()
            }
        };

        let photo = Photo {
            id: id.clone(),
            estimated_size_kb: encoded.estimated_size_kb(),
            encoded_image: encoded,
            width,
            height,
            created_at: now_millis(),
            original_encoded_image: save_original.then_some(raw),
        };

        {
            let mut state = self.inner.state.write().await;
            state.pending.remove(&id);
            if state.tombstones.remove(&id) {
                tracing::debug!(id = %id, "photo deleted while commit was in flight, dropping");
                return;
            }
            state.app.user_photos.insert(0, photo);
            state.app.current_photo_id = Some(id);
            let max = state.app.settings.max_stored_photos as usize;
            truncate_by_recency(&mut state.app.user_photos, max, |p| p.created_at);
        }
        self.flush().await;
    }

    /// Insert a generated portrait. Same id-now/commit-later shape as
    /// [`insert_photo`](Self::insert_photo); the source photo does not need
    /// to exist anymore by the time the commit lands.
    pub async fn insert_portrait(&self, draft: PortraitDraft) -> EntityId {
        let id = new_entity_id();
        self.inner.state.write().await.pending.insert(id.clone());

        let store = self.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            store.commit_portrait(task_id, draft).await;
        });
        id
    }

    async fn commit_portrait(&self, id: EntityId, draft: PortraitDraft) {
        let portrait = GeneratedPortrait {
            id: id.clone(),
            source_photo_id: draft.source_photo_id,
            scene_tag: draft.scene,
            estimated_size_kb: draft.encoded_image.estimated_size_kb(),
            encoded_image: draft.encoded_image,
            generation_parameters: draft.parameters.clamped(),
            created_at: now_millis(),
        };

        {
            let mut state = self.inner.state.write().await;
            state.pending.remove(&id);
            if state.tombstones.remove(&id) {
                tracing::debug!(id = %id, "portrait deleted while commit was in flight, dropping");
                return;
            }
            state.app.generated_portraits.insert(0, portrait);
            let max = state.app.settings.max_stored_portraits as usize;
            truncate_by_recency(&mut state.app.generated_portraits, max, |p| p.created_at);
        }
        self.flush().await;
    }

    // -----------------------------------------------------------------------
    // Deletes
    // -----------------------------------------------------------------------

    /// Delete a photo by id. Deleting an unknown id is a no-op; portraits
    /// referencing the photo are left alone. Returns whether anything was
    /// removed.
    pub async fn delete_photo(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.inner.state.write().await;
            if state.pending.remove(id) {
                state.tombstones.insert(id.to_string());
                true
            } else {
                let before = state.app.user_photos.len();
                state.app.user_photos.retain(|p| p.id != id);
                let removed = state.app.user_photos.len() != before;
                if removed && state.app.current_photo_id.as_deref() == Some(id) {
                    state.app.current_photo_id = None;
                }
                removed
            }
        };
        if removed {
            self.schedule_flush();
        }
        removed
    }

    /// Delete a portrait by id. Unknown ids are a no-op.
    pub async fn delete_portrait(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.inner.state.write().await;
            if state.pending.remove(id) {
                state.tombstones.insert(id.to_string());
                true
            } else {
                let before = state.app.generated_portraits.len();
                state.app.generated_portraits.retain(|p| p.id != id);
                state.app.generated_portraits.len() != before
            }
        };
        if removed {
            self.schedule_flush();
        }
        removed
    }

    /// Empty both collections and the selection pointers. Settings and
    /// subscription survive.
    pub async fn clear_all(&self) {
        {
            let mut state = self.inner.state.write().await;
            // In-flight commits must not repopulate the collections.
            let pending: Vec<EntityId> = state.pending.drain().collect();
            state.tombstones.extend(pending);
            state.app.user_photos.clear();
            state.app.generated_portraits.clear();
            state.app.current_photo_id = None;
            state.app.current_scene = None;
        }
        self.schedule_flush();
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    pub async fn set_current_photo(&self, id: Option<EntityId>) {
        self.inner.state.write().await.app.current_photo_id = id;
        self.schedule_flush();
    }

    pub async fn set_current_scene(&self, scene: Option<Scene>) {
        self.inner.state.write().await.app.current_scene = scene;
        self.schedule_flush();
    }

    // -----------------------------------------------------------------------
    // Settings & subscription
    // -----------------------------------------------------------------------

    /// Merge a settings patch. A quality-tier change re-optimizes existing
    /// photos in the background without blocking the settings write.
    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<(), CoreError> {
        patch
            .validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        let quality_changed = {
            let mut state = self.inner.state.write().await;
            let before = state.app.settings.quality;
            state.app.settings.apply(&patch);
            state.app.settings.quality != before
        };
        self.schedule_flush();

        if quality_changed {
            let store = self.clone();
            tokio::spawn(async move {
                store.reoptimize_all().await;
            });
        }
        Ok(())
    }

    pub async fn update_subscription(&self, patch: SubscriptionPatch) {
        self.inner
            .state
            .write()
            .await
            .app
            .subscription
            .apply(&patch);
        self.schedule_flush();
    }

    /// Re-run the optimizer over every committed photo at the active tier,
    /// preferring the retained original as the source. Photos whose source
    /// is unusable are skipped.
    pub async fn reoptimize_all(&self) {
        let (tier, sources) = {
            let state = self.inner.state.read().await;
            let sources: Vec<(EntityId, EncodedImage)> = state
                .app
                .user_photos
                .iter()
                .map(|p| {
                    let source = p
                        .original_encoded_image
                        .clone()
                        .unwrap_or_else(|| p.encoded_image.clone());
                    (p.id.clone(), source)
                })
                .collect();
            (state.app.settings.quality, sources)
        };

        for (id, source) in sources {
            if source.is_empty() {
                continue;
            }
            let result =
                tokio::task::spawn_blocking(move || optimizer::optimize(&source, tier)).await;
            let optimized = match result {
                Ok(Ok(img)) => img,
                Ok(Err(e)) => {
                    tracing::warn!(id = %id, error = %e, "re-optimization failed, keeping current encoding");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "re-optimization task failed");
                    continue;
                }
            };

            let mut state = self.inner.state.write().await;
            // The photo may have been deleted while we were re-encoding.
            if let Some(photo) = state.app.user_photos.iter_mut().find(|p| p.id == id) {
                photo.estimated_size_kb = optimized.estimated_size_kb();
                photo.encoded_image = optimized;
            }
        }
        self.flush().await;
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Committed photos, most recent first.
    pub async fn photos(&self) -> Vec<Photo> {
        self.inner.state.read().await.app.user_photos.clone()
    }

    /// Committed portraits, most recent first.
    pub async fn portraits(&self) -> Vec<GeneratedPortrait> {
        self.inner.state.read().await.app.generated_portraits.clone()
    }

    pub async fn photo(&self, id: &str) -> Option<Photo> {
        self.inner
            .state
            .read()
            .await
            .app
            .user_photos
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub async fn portrait(&self, id: &str) -> Option<GeneratedPortrait> {
        self.inner
            .state
            .read()
            .await
            .app
            .generated_portraits
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub async fn settings(&self) -> Settings {
        self.inner.state.read().await.app.settings.clone()
    }

    pub async fn subscription(&self) -> Subscription {
        self.inner.state.read().await.app.subscription.clone()
    }

    pub async fn current_photo_id(&self) -> Option<EntityId> {
        self.inner.state.read().await.app.current_photo_id.clone()
    }

    pub async fn current_scene(&self) -> Option<Scene> {
        self.inner.state.read().await.app.current_scene
    }

    /// Lifecycle state of an id.
    pub async fn entity_status(&self, id: &str) -> EntityStatus {
        let state = self.inner.state.read().await;
        if state.pending.contains(id) {
            EntityStatus::Pending
        } else if state.app.user_photos.iter().any(|p| p.id == id)
            || state.app.generated_portraits.iter().any(|p| p.id == id)
        {
            EntityStatus::Committed
        } else {
            EntityStatus::Unknown
        }
    }

    /// Aggregate estimated footprint of both collections, including retained
    /// originals. Recomputed on demand so it can never drift.
    pub async fn total_storage_usage_kb(&self) -> u64 {
        let state = self.inner.state.read().await;
        let photos: u64 = state
            .app
            .user_photos
            .iter()
            .map(|p| {
                p.estimated_size_kb as u64
                    + p.original_encoded_image
                        .as_ref()
                        .map(|o| o.estimated_size_kb() as u64)
                        .unwrap_or(0)
            })
            .sum();
        let portraits: u64 = state
            .app
            .generated_portraits
            .iter()
            .map(|p| p.estimated_size_kb as u64)
            .sum();
        photos + portraits
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    fn schedule_flush(&self) {
        let store = self.clone();
        tokio::spawn(async move {
            store.flush().await;
        });
    }

    /// Write the full state through the compressed adapter. Quota
    /// degradation is absorbed here: a truncated write reconciles the
    /// in-memory portraits and retries once; persistence failures are
    /// logged, never propagated.
    pub async fn flush(&self) {
        for _ in 0..2 {
            let payload = {
                let state = self.inner.state.read().await;
                let blob = PersistedState {
                    state: state.app.clone(),
                    version: STATE_VERSION,
                };
                match serde_json::to_vec(&blob) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(error = %e, "state serialization failed, skipping flush");
                        return;
                    }
                }
            };

            match self.inner.adapter.write(STORE_KEY, &payload).await {
                Ok(WriteOutcome::Clean) => return,
                Ok(WriteOutcome::Truncated) => {
                    let mut state = self.inner.state.write().await;
                    truncate_by_recency(
                        &mut state.app.generated_portraits,
                        REMEDIATION_KEEP_PORTRAITS,
                        |p| p.created_at,
                    );
                    if !state.quota_notice_emitted {
                        state.quota_notice_emitted = true;
                        tracing::warn!("storage is full: older portraits were removed to make space");
                    }
                    // Retry with the reconciled state.
                }
                Ok(WriteOutcome::Wiped) => {
                    let mut state = self.inner.state.write().await;
                    if !state.quota_notice_emitted {
                        state.quota_notice_emitted = true;
                        tracing::warn!("storage was reset to recover from quota exhaustion");
                    }
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "persistence flush failed");
                    return;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Truncation
// ---------------------------------------------------------------------------

/// Keep the `max` most recent items, leaving the collection ordered newest
/// first.
///
/// The sort is stable and the commit paths prepend new entities, so the
/// collection's order among equal timestamps is insertion-recency: the most
/// recently *inserted* item survives a cut at the boundary.
fn truncate_by_recency<T>(
    items: &mut Vec<T>,
    max: usize,
    created_at: impl Fn(&T) -> Timestamp,
) {
    items.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    items.truncate(max);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
