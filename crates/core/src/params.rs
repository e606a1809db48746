//! Generation parameters: the user-tunable weights attached to every
//! portrait generation run, plus the target resolution.
//!
//! Weights are clamped to `[0, 100]` at construction; the prompt builder
//! maps each weight onto a descriptive adjective bucket.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Upper bound for every numeric generation weight.
pub const WEIGHT_MAX: u8 = 100;

// ---------------------------------------------------------------------------
// GenerationParameters
// ---------------------------------------------------------------------------

/// Tunable weights for a single generation run.
///
/// Persisted on each portrait. `remote_job_id` is set only when the remote
/// path produced the image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParameters {
    pub background: u8,
    pub lighting: u8,
    pub detail: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_job_id: Option<String>,
}

impl GenerationParameters {
    /// Build a parameter set, clamping each weight to [`WEIGHT_MAX`].
    pub fn new(background: u8, lighting: u8, detail: u8) -> Self {
        Self {
            background: background.min(WEIGHT_MAX),
            lighting: lighting.min(WEIGHT_MAX),
            detail: detail.min(WEIGHT_MAX),
            style: None,
            remote_job_id: None,
        }
    }

    /// Attach an optional style tag.
    pub fn with_style(mut self, style: Option<String>) -> Self {
        self.style = style;
        self
    }

    /// Return a copy with every weight clamped to [`WEIGHT_MAX`].
    ///
    /// Used when parameters arrive from deserialized state rather than
    /// through [`GenerationParameters::new`].
    pub fn clamped(mut self) -> Self {
        self.background = self.background.min(WEIGHT_MAX);
        self.lighting = self.lighting.min(WEIGHT_MAX);
        self.detail = self.detail.min(WEIGHT_MAX);
        self
    }

    /// Prompt adjective for the background weight.
    pub fn background_adjective(&self) -> &'static str {
        match self.background {
            b if b > 75 => "high-quality",
            b if b > 50 => "medium-quality",
            _ => "simple",
        }
    }

    /// Prompt adjective for the lighting weight.
    pub fn lighting_adjective(&self) -> &'static str {
        match self.lighting {
            l if l > 75 => "dramatic",
            l if l > 50 => "professional",
            _ => "soft",
        }
    }

    /// Prompt adjective for the detail weight.
    pub fn detail_adjective(&self) -> &'static str {
        match self.detail {
            d if d > 75 => "highly detailed",
            d if d > 50 => "detailed",
            _ => "smooth",
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Default output resolution when none is requested.
pub const DEFAULT_RESOLUTION: Resolution = Resolution {
    width: 1024,
    height: 1024,
};

/// A `"WxH"` output resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Parse a `"WxH"` string. Both dimensions must be positive integers.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let invalid = || {
            CoreError::Validation(format!(
                "Invalid resolution '{s}'. Expected WxH, e.g. 1024x1024"
            ))
        };
        let (w, h) = s.split_once('x').ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

impl Default for Resolution {
    fn default() -> Self {
        DEFAULT_RESOLUTION
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
