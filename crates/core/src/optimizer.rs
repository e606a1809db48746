//! Image optimizer: bounded resize plus quality-controlled JPEG re-encode.
//!
//! Inputs below [`SKIP_THRESHOLD_KB`] are returned unchanged -- re-encoding
//! them costs more than it saves. Callers that cannot tolerate a decode
//! failure fall back to the unmodified input rather than aborting.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::encoded::{EncodedImage, MIME_JPEG};
use crate::error::CoreError;
use crate::quality::QualityTier;

/// Estimated size below which optimization is skipped entirely.
pub const SKIP_THRESHOLD_KB: u32 = 100;

/// Optimize an image for storage under the given quality tier.
///
/// Width is bounded by the tier's `max_dimension`; height scales
/// proportionally (floored, never rounded up). The result is always JPEG.
pub fn optimize(input: &EncodedImage, tier: QualityTier) -> Result<EncodedImage, CoreError> {
    let preset = tier.preset();
    optimize_with(input, preset.re_encode_quality, preset.max_dimension)
}

/// Size-adaptive optimization: larger inputs get a more aggressive preset.
///
/// Used by upload paths that have no explicit tier in hand.
pub fn auto_optimize(input: &EncodedImage) -> Result<EncodedImage, CoreError> {
    let size_kb = input.estimated_size_kb();
    if size_kb < SKIP_THRESHOLD_KB {
        return Ok(input.clone());
    }
    let (quality, max_dimension) = if size_kb > 1000 {
        (0.5, 600)
    } else if size_kb > 500 {
        (0.6, 700)
    } else {
        (0.7, 800)
    };
    optimize_with(input, quality, max_dimension)
}

/// Decode an image just far enough to report its pixel dimensions.
pub fn dimensions(input: &EncodedImage) -> Result<(u32, u32), CoreError> {
    let bytes = input.decode_bytes()?;
    let img = image::load_from_memory(&bytes).map_err(|e| CoreError::Decode(e.to_string()))?;
    Ok((img.width(), img.height()))
}

fn optimize_with(
    input: &EncodedImage,
    quality: f32,
    max_dimension: u32,
) -> Result<EncodedImage, CoreError> {
    if input.estimated_size_kb() < SKIP_THRESHOLD_KB {
        return Ok(input.clone());
    }

    let bytes = input.decode_bytes()?;
    let img = image::load_from_memory(&bytes).map_err(|e| CoreError::Decode(e.to_string()))?;

    let (width, height) = (img.width(), img.height());
    let img = if width > max_dimension {
        // Proportional height, floored.
        let target_h = ((height as u64 * max_dimension as u64) / width as u64).max(1) as u32;
        img.resize_exact(max_dimension, target_h, FilterType::Lanczos3)
    } else {
        img
    };

    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, (quality * 100.0).round() as u8);
    rgb.write_with_encoder(encoder)
        .map_err(|e| CoreError::Internal(format!("JPEG encode failed: {e}")))?;

    Ok(EncodedImage::from_bytes(MIME_JPEG, &out))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
