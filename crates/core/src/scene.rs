//! Scene catalogue: the closed set of portrait use-case templates.
//!
//! A scene selects the remote API prompt content (subject noun, background
//! treatment, palette, attire) and the local fallback renderer's canvas
//! colour. Unknown tags deserialize to [`Scene::Professional`], the explicit
//! fallback, so persisted state written by older builds never fails to load.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Scene tags
// ---------------------------------------------------------------------------

pub const SCENE_PROFESSIONAL: &str = "professional";
pub const SCENE_PASSPORT: &str = "passport";
pub const SCENE_BUSINESS: &str = "business";
pub const SCENE_ACADEMIC: &str = "academic";
pub const SCENE_SOCIAL: &str = "social";
pub const SCENE_WEDDING: &str = "wedding";
pub const SCENE_STUDENT: &str = "student";
pub const SCENE_VIRTUAL: &str = "virtual";

// ---------------------------------------------------------------------------
// Scene enum
// ---------------------------------------------------------------------------

/// A named portrait use-case template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scene {
    Passport,
    Business,
    Academic,
    Social,
    Wedding,
    Student,
    Virtual,
    /// Fallback for unrecognized tags.
    #[default]
    #[serde(other)]
    Professional,
}

/// All scenes, in display order.
pub const ALL_SCENES: &[Scene] = &[
    Scene::Professional,
    Scene::Passport,
    Scene::Business,
    Scene::Academic,
    Scene::Social,
    Scene::Wedding,
    Scene::Student,
    Scene::Virtual,
];

impl Scene {
    /// Parse a tag, falling back to [`Scene::Professional`] for anything
    /// unrecognized. Matching is case-insensitive.
    pub fn parse(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            SCENE_PROFESSIONAL => Self::Professional,
            SCENE_PASSPORT => Self::Passport,
            SCENE_BUSINESS => Self::Business,
            SCENE_ACADEMIC => Self::Academic,
            SCENE_SOCIAL => Self::Social,
            SCENE_WEDDING => Self::Wedding,
            SCENE_STUDENT => Self::Student,
            SCENE_VIRTUAL => Self::Virtual,
            _ => Self::Professional,
        }
    }

    /// Canonical tag string, as persisted on portraits.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Professional => SCENE_PROFESSIONAL,
            Self::Passport => SCENE_PASSPORT,
            Self::Business => SCENE_BUSINESS,
            Self::Academic => SCENE_ACADEMIC,
            Self::Social => SCENE_SOCIAL,
            Self::Wedding => SCENE_WEDDING,
            Self::Student => SCENE_STUDENT,
            Self::Virtual => SCENE_VIRTUAL,
        }
    }

    /// Subject noun used in the remote API prompt.
    pub fn api_noun(self) -> &'static str {
        match self {
            Self::Professional => "professional portrait",
            Self::Passport => "id photo",
            Self::Business => "business portrait",
            Self::Academic => "academic portrait",
            Self::Social => "social media portrait",
            Self::Wedding => "wedding portrait",
            Self::Student => "student id photo",
            Self::Virtual => "virtual meeting portrait",
        }
    }

    /// Background treatment requested from the remote API.
    pub fn background_type(self) -> &'static str {
        match self {
            Self::Professional | Self::Business => "gradient",
            Self::Passport | Self::Student => "solid",
            Self::Academic => "textured",
            Self::Social => "blurred",
            Self::Wedding => "elegant",
            Self::Virtual => "digital",
        }
    }

    /// Palette colour requested from the remote API.
    pub fn palette(self) -> &'static str {
        match self {
            Self::Professional => "blue-gray",
            Self::Business => "navy",
            Self::Passport | Self::Student => "white",
            Self::Academic => "maroon",
            Self::Social => "vibrant",
            Self::Wedding => "cream",
            Self::Virtual => "teal",
        }
    }

    /// Attire descriptor used in the remote API prompt.
    pub fn attire(self) -> &'static str {
        match self {
            Self::Professional | Self::Business => "formal business",
            Self::Passport | Self::Student => "neat casual",
            Self::Academic => "academic",
            Self::Social => "smart casual",
            Self::Wedding => "formal",
            Self::Virtual => "business casual",
        }
    }

    /// Canvas background colour (RGB) for the local fallback renderer.
    pub fn canvas_rgb(self) -> [u8; 3] {
        match self {
            Self::Professional => [0xe6, 0xe6, 0xe6],
            Self::Passport => [0xff, 0xff, 0xff],
            Self::Business => [0xf0, 0xf5, 0xfa],
            Self::Academic => [0xf5, 0xf5, 0xf0],
            Self::Social => [0xf0, 0xf0, 0xf5],
            Self::Wedding => [0xff, 0xf5, 0xf5],
            Self::Student => [0xf0, 0xf8, 0xff],
            Self::Virtual => [0xe0, 0xf0, 0xe0],
        }
    }

    /// Human-readable label for display.
    pub fn label(self) -> &'static str {
        match self {
            Self::Professional => "Professional",
            Self::Passport => "Passport",
            Self::Business => "Business",
            Self::Academic => "Academic",
            Self::Social => "Social",
            Self::Wedding => "Wedding",
            Self::Student => "Student",
            Self::Virtual => "Virtual",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
