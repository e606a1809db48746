//! Local fallback renderer.
//!
//! When the remote path is unavailable the portrait is produced here: the
//! source is aspect-fit onto a scene-coloured canvas at the target
//! resolution, lighting and detail weights drive a contrast and sharpen
//! pass, and a scene-specific finishing effect is applied.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use portraify_core::encoded::{EncodedImage, MIME_JPEG};
use portraify_core::error::CoreError;
use portraify_core::params::{GenerationParameters, Resolution};
use portraify_core::scene::Scene;

/// Render a portrait locally from an encoded source image.
pub fn render(
    source: &EncodedImage,
    scene: Scene,
    parameters: &GenerationParameters,
    resolution: Resolution,
) -> Result<EncodedImage, CoreError> {
    let bytes = source.decode_bytes()?;
    let img = image::load_from_memory(&bytes).map_err(|e| CoreError::Decode(e.to_string()))?;

    let (width, height) = (resolution.width, resolution.height);
    let [r, g, b] = scene.canvas_rgb();
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([r, g, b]));

    // Aspect-fit the source and centre it on the canvas.
    let fitted = img.resize(width, height, FilterType::Lanczos3).to_rgb8();
    let x = (width.saturating_sub(fitted.width()) / 2) as i64;
    let y = (height.saturating_sub(fitted.height()) / 2) as i64;
    imageops::overlay(&mut canvas, &fitted, x, y);

    // Lighting drives a subtle contrast shift around the midpoint.
    let contrast = (parameters.lighting as f32 - 50.0) * 0.1;
    let mut canvas = imageops::contrast(&canvas, contrast);

    // Detail above the midpoint sharpens.
    if parameters.detail > 50 {
        let sigma = 0.5 + (parameters.detail - 50) as f32 / 50.0;
        canvas = imageops::unsharpen(&canvas, sigma, 1);
    }

    apply_scene_effect(&mut canvas, scene);

    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, 100);
    canvas
        .write_with_encoder(encoder)
        .map_err(|e| CoreError::Internal(format!("JPEG encode failed: {e}")))?;
    Ok(EncodedImage::from_bytes(MIME_JPEG, &out))
}

/// Scene-specific finishing pass.
fn apply_scene_effect(canvas: &mut RgbImage, scene: Scene) {
    match scene {
        Scene::Professional => vignette(canvas, 0.05),
        Scene::Passport => border(canvas, Rgb([255, 255, 255]), 5),
        Scene::Business => tint(canvas, [0, 0, 100], 0.02),
        Scene::Academic => tint(canvas, [100, 50, 0], 0.02),
        Scene::Social => tint(canvas, [50, 0, 100], 0.02),
        Scene::Wedding => tint(canvas, [255, 255, 200], 0.05),
        Scene::Student => tint(canvas, [0, 50, 100], 0.02),
        Scene::Virtual => grid(canvas, 20, [0, 100, 200], 0.1),
    }
}

/// Blend a flat colour over the whole canvas at `alpha`.
fn tint(canvas: &mut RgbImage, colour: [u8; 3], alpha: f32) {
    for pixel in canvas.pixels_mut() {
        for c in 0..3 {
            let blended = pixel[c] as f32 * (1.0 - alpha) + colour[c] as f32 * alpha;
            pixel[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Darken toward the corners, strongest at `intensity`.
fn vignette(canvas: &mut RgbImage, intensity: f32) {
    let (w, h) = (canvas.width() as f32, canvas.height() as f32);
    let (cx, cy) = (w / 2.0, h / 2.0);
    let max_dist = (cx * cx + cy * cy).sqrt();
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let dist = (dx * dx + dy * dy).sqrt() / max_dist;
        let factor = 1.0 - intensity * dist;
        for c in 0..3 {
            pixel[c] = (pixel[c] as f32 * factor).round() as u8;
        }
    }
}

/// Solid border of the given thickness.
fn border(canvas: &mut RgbImage, colour: Rgb<u8>, thickness: u32) {
    let (w, h) = (canvas.width(), canvas.height());
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        if x < thickness
            || y < thickness
            || x >= w.saturating_sub(thickness)
            || y >= h.saturating_sub(thickness)
        {
            *pixel = colour;
        }
    }
}

/// Subtle grid overlay for virtual-meeting backgrounds.
fn grid(canvas: &mut RgbImage, spacing: u32, colour: [u8; 3], alpha: f32) {
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        if x % spacing == 0 || y % spacing == 0 {
            for c in 0..3 {
                let blended = pixel[c] as f32 * (1.0 - alpha) + colour[c] as f32 * alpha;
                pixel[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use portraify_core::optimizer;

    fn gradient_jpeg(width: u32, height: u32) -> EncodedImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buf = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buf, 90);
        img.write_with_encoder(encoder).unwrap();
        EncodedImage::from_bytes(MIME_JPEG, &buf)
    }

    fn params() -> GenerationParameters {
        GenerationParameters::new(50, 50, 50)
    }

    #[test]
    fn renders_at_requested_resolution() {
        let source = gradient_jpeg(400, 300);
        let out = render(
            &source,
            Scene::Professional,
            &params(),
            Resolution::parse("640x480").unwrap(),
        )
        .unwrap();
        assert_eq!(optimizer::dimensions(&out).unwrap(), (640, 480));
        assert_eq!(out.mime, MIME_JPEG);
    }

    #[test]
    fn passport_scene_draws_white_border() {
        let source = gradient_jpeg(512, 512);
        let out = render(
            &source,
            Scene::Passport,
            &params(),
            Resolution::parse("256x256").unwrap(),
        )
        .unwrap();
        let decoded = image::load_from_memory(&out.decode_bytes().unwrap())
            .unwrap()
            .to_rgb8();
        let corner = decoded.get_pixel(0, 0);
        // JPEG is lossy; the border stays near-white.
        assert!(corner[0] > 240 && corner[1] > 240 && corner[2] > 240);
    }

    #[test]
    fn portrait_canvas_letterboxes_wide_sources() {
        // A wide source on a square canvas leaves scene-coloured bars at
        // the top and bottom.
        let source = gradient_jpeg(800, 200);
        let out = render(
            &source,
            Scene::Student,
            &params(),
            Resolution::parse("400x400").unwrap(),
        )
        .unwrap();
        let decoded = image::load_from_memory(&out.decode_bytes().unwrap())
            .unwrap()
            .to_rgb8();
        let [r, g, b] = Scene::Student.canvas_rgb();
        let top = decoded.get_pixel(200, 2);
        assert!(
            (top[0] as i32 - r as i32).abs() < 16
                && (top[1] as i32 - g as i32).abs() < 16
                && (top[2] as i32 - b as i32).abs() < 16,
            "expected canvas colour at the letterbox, got {top:?}"
        );
    }

    #[test]
    fn high_detail_applies_sharpening() {
        let source = gradient_jpeg(300, 300);
        let soft = render(&source, Scene::Social, &GenerationParameters::new(50, 50, 0), Resolution::default());
        let sharp = render(&source, Scene::Social, &GenerationParameters::new(50, 50, 100), Resolution::default());
        // Both succeed; the outputs differ.
        assert_ne!(soft.unwrap(), sharp.unwrap());
    }

    #[test]
    fn corrupt_source_reports_decode_error() {
        let garbage = EncodedImage::from_bytes(MIME_JPEG, b"not an image");
        let err = render(&garbage, Scene::Wedding, &params(), Resolution::default()).unwrap_err();
        assert!(matches!(err, CoreError::Decode(_)));
    }
}
