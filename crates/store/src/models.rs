//! Persisted entity models and the full state blob.
//!
//! Field names serialize in camelCase to match the documented blob layout;
//! timestamps serialize as epoch milliseconds so the persistence adapter's
//! remediation step can order portraits numerically without knowing the
//! entity types.

use serde::{Deserialize, Serialize};
use validator::Validate;

use portraify_core::encoded::EncodedImage;
use portraify_core::params::GenerationParameters;
use portraify_core::quality::QualityTier;
use portraify_core::scene::Scene;
use portraify_core::types::{EntityId, Timestamp};

/// Current persisted-state schema version.
pub const STATE_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Photo
// ---------------------------------------------------------------------------

/// A user-supplied source image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: EntityId,
    pub encoded_image: EncodedImage,
    pub width: u32,
    pub height: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: Timestamp,
    #[serde(rename = "estimatedSizeKB")]
    pub estimated_size_kb: u32,
    /// Retained only when `saveOriginals` was enabled at insertion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_encoded_image: Option<EncodedImage>,
}

// ---------------------------------------------------------------------------
// GeneratedPortrait
// ---------------------------------------------------------------------------

/// Output of one generation run against a source photo.
///
/// `source_photo_id` is a value back-reference, not an owning one: the photo
/// may have been deleted since, and a dangling reference is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPortrait {
    pub id: EntityId,
    pub source_photo_id: EntityId,
    pub scene_tag: Scene,
    pub encoded_image: EncodedImage,
    pub generation_parameters: GenerationParameters,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: Timestamp,
    #[serde(rename = "estimatedSizeKB")]
    pub estimated_size_kb: u32,
}

/// Everything a caller supplies to create a portrait; the store fills in
/// the id, timestamp, and size estimate at commit.
#[derive(Debug, Clone)]
pub struct PortraitDraft {
    pub source_photo_id: EntityId,
    pub scene: Scene,
    pub encoded_image: EncodedImage,
    pub parameters: GenerationParameters,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// UI colour theme. Not interpreted by the core; carried for the UI layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// Process-wide user configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub quality: QualityTier,
    /// Photo collection bound, 1..=20.
    pub max_stored_photos: u32,
    /// Portrait collection bound, 1..=30.
    pub max_stored_portraits: u32,
    pub save_originals: bool,
    pub language: String,
    pub theme: Theme,
    pub notifications: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quality: QualityTier::Medium,
            max_stored_photos: 10,
            max_stored_portraits: 20,
            save_originals: true,
            language: "en".to_string(),
            theme: Theme::System,
            notifications: true,
        }
    }
}

/// Partial settings update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub quality: Option<QualityTier>,
    #[validate(range(min = 1, max = 20))]
    pub max_stored_photos: Option<u32>,
    #[validate(range(min = 1, max = 30))]
    pub max_stored_portraits: Option<u32>,
    pub save_originals: Option<bool>,
    pub language: Option<String>,
    pub theme: Option<Theme>,
    pub notifications: Option<bool>,
}

impl Settings {
    /// Merge a patch into these settings.
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(quality) = patch.quality {
            self.quality = quality;
        }
        if let Some(max) = patch.max_stored_photos {
            self.max_stored_photos = max;
        }
        if let Some(max) = patch.max_stored_portraits {
            self.max_stored_portraits = max;
        }
        if let Some(save) = patch.save_originals {
            self.save_originals = save;
        }
        if let Some(language) = &patch.language {
            self.language = language.clone();
        }
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
        if let Some(notifications) = patch.notifications {
            self.notifications = notifications;
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Pro,
    Unlimited,
}

/// Subscription tier. Survives `clear_all`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Subscription {
    pub plan: Plan,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub expires_at: Option<Timestamp>,
}

/// Partial subscription update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionPatch {
    pub plan: Option<Plan>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub expires_at: Option<Timestamp>,
}

impl Subscription {
    /// Merge a patch into this subscription.
    pub fn apply(&mut self, patch: &SubscriptionPatch) {
        if let Some(plan) = patch.plan {
            self.plan = plan;
        }
        if let Some(expires_at) = patch.expires_at {
            self.expires_at = Some(expires_at);
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted blob
// ---------------------------------------------------------------------------

/// In-memory application state: the two bounded collections, selection
/// pointers, settings, and subscription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppState {
    pub user_photos: Vec<Photo>,
    pub current_photo_id: Option<EntityId>,
    pub current_scene: Option<Scene>,
    pub generated_portraits: Vec<GeneratedPortrait>,
    pub settings: Settings,
    pub subscription: Subscription,
}

/// The full persisted blob: state plus schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub state: AppState,
    pub version: u32,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            state: AppState::default(),
            version: STATE_VERSION,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use portraify_core::encoded::MIME_JPEG;
    use validator::Validate;

    fn sample_photo() -> Photo {
        Photo {
            id: "p1".into(),
            encoded_image: EncodedImage::from_bytes(MIME_JPEG, b"jpeg bytes"),
            width: 640,
            height: 480,
            created_at: chrono::Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            estimated_size_kb: 12,
            original_encoded_image: None,
        }
    }

    #[test]
    fn photo_serializes_documented_field_names() {
        let json = serde_json::to_value(sample_photo()).unwrap();
        assert!(json.get("encodedImage").is_some());
        assert_eq!(json["createdAt"], 1_700_000_000_000i64);
        assert_eq!(json["estimatedSizeKB"], 12);
        assert!(json.get("originalEncodedImage").is_none());
    }

    #[test]
    fn portrait_serializes_documented_field_names() {
        let portrait = GeneratedPortrait {
            id: "g1".into(),
            source_photo_id: "p1".into(),
            scene_tag: Scene::Passport,
            encoded_image: EncodedImage::from_bytes(MIME_JPEG, b"portrait"),
            generation_parameters: GenerationParameters::new(10, 20, 30),
            created_at: chrono::Utc.timestamp_millis_opt(1_700_000_001_000).unwrap(),
            estimated_size_kb: 8,
        };
        let json = serde_json::to_value(&portrait).unwrap();
        assert_eq!(json["sourcePhotoId"], "p1");
        assert_eq!(json["sceneTag"], "passport");
        assert_eq!(json["createdAt"], 1_700_000_001_000i64);
        assert!(json.get("generationParameters").is_some());
    }

    #[test]
    fn state_blob_round_trips() {
        let mut state = AppState::default();
        state.user_photos.push(sample_photo());
        state.current_photo_id = Some("p1".into());
        state.current_scene = Some(Scene::Wedding);
        let blob = PersistedState {
            state,
            version: STATE_VERSION,
        };
        let json = serde_json::to_vec(&blob).unwrap();
        let back: PersistedState = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, blob);
    }

    #[test]
    fn state_blob_layout_matches_contract() {
        let json = serde_json::to_value(PersistedState::default()).unwrap();
        let state = json.get("state").unwrap();
        for key in [
            "userPhotos",
            "currentPhotoId",
            "currentScene",
            "generatedPortraits",
            "settings",
            "subscription",
        ] {
            assert!(state.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["version"], STATE_VERSION);
    }

    #[test]
    fn settings_patch_applies_only_present_fields() {
        let mut settings = Settings::default();
        let patch = SettingsPatch {
            quality: Some(QualityTier::High),
            max_stored_photos: Some(5),
            ..Default::default()
        };
        settings.apply(&patch);
        assert_eq!(settings.quality, QualityTier::High);
        assert_eq!(settings.max_stored_photos, 5);
        // Untouched fields keep their defaults.
        assert_eq!(settings.max_stored_portraits, 20);
        assert!(settings.save_originals);
    }

    #[test]
    fn settings_patch_range_validation() {
        let too_small = SettingsPatch {
            max_stored_photos: Some(0),
            ..Default::default()
        };
        assert!(too_small.validate().is_err());

        let too_big = SettingsPatch {
            max_stored_portraits: Some(31),
            ..Default::default()
        };
        assert!(too_big.validate().is_err());

        let ok = SettingsPatch {
            max_stored_photos: Some(20),
            max_stored_portraits: Some(30),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn subscription_patch_merges() {
        let mut sub = Subscription::default();
        sub.apply(&SubscriptionPatch {
            plan: Some(Plan::Pro),
            expires_at: None,
        });
        assert_eq!(sub.plan, Plan::Pro);
        assert!(sub.expires_at.is_none());
    }

    #[test]
    fn missing_optional_fields_deserialize_with_defaults() {
        // A minimal legacy blob with absent settings/subscription.
        let raw = r#"{"state":{"userPhotos":[],"generatedPortraits":[]},"version":1}"#;
        let blob: PersistedState = serde_json::from_str(raw).unwrap();
        assert_eq!(blob.state.settings, Settings::default());
        assert_eq!(blob.state.subscription.plan, Plan::Free);
    }
}
