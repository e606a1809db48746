//! Quality tiers controlling the image optimizer.
//!
//! Each tier maps to a fixed `(re-encode quality, max dimension)` preset.
//! The tier is a user setting; the preset values themselves are not
//! configurable.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A fixed optimizer preset: lossy re-encode factor plus a width bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityPreset {
    /// Lossy compression factor in `[0, 1]`, applied at JPEG re-encode.
    pub re_encode_quality: f32,
    /// Upper bound on the output width in pixels. Height scales
    /// proportionally and is never rounded up.
    pub max_dimension: u32,
}

/// User-selectable quality tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityTier {
    /// The fixed preset for this tier.
    pub fn preset(self) -> QualityPreset {
        match self {
            Self::Low => QualityPreset {
                re_encode_quality: 0.5,
                max_dimension: 600,
            },
            Self::Medium => QualityPreset {
                re_encode_quality: 0.7,
                max_dimension: 800,
            },
            Self::High => QualityPreset {
                re_encode_quality: 0.9,
                max_dimension: 1200,
            },
        }
    }

    /// Parse a tier name.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(CoreError::Validation(format!(
                "Invalid quality tier '{other}'. Must be one of: low, medium, high"
            ))),
        }
    }

    /// Human-readable label for display.
    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medium_bounds_width_at_800() {
        assert_eq!(QualityTier::Medium.preset().max_dimension, 800);
    }

    #[test]
    fn presets_are_ordered_by_fidelity() {
        let low = QualityTier::Low.preset();
        let medium = QualityTier::Medium.preset();
        let high = QualityTier::High.preset();
        assert!(low.re_encode_quality < medium.re_encode_quality);
        assert!(medium.re_encode_quality < high.re_encode_quality);
        assert!(low.max_dimension < medium.max_dimension);
        assert!(medium.max_dimension < high.max_dimension);
    }

    #[test]
    fn parse_valid_tiers() {
        assert_eq!(QualityTier::parse("low").unwrap(), QualityTier::Low);
        assert_eq!(QualityTier::parse("Medium").unwrap(), QualityTier::Medium);
        assert_eq!(QualityTier::parse("HIGH").unwrap(), QualityTier::High);
    }

    #[test]
    fn parse_invalid_tier() {
        assert!(QualityTier::parse("ultra").is_err());
        assert!(QualityTier::parse("").is_err());
    }

    #[test]
    fn default_is_medium() {
        assert_eq!(QualityTier::default(), QualityTier::Medium);
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&QualityTier::High).unwrap(), "\"high\"");
        let tier: QualityTier = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(tier, QualityTier::Low);
    }
}
