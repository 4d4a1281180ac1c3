// ============================================================================
// Module: core/src/image_optimizer.rs
// Description: Normalizes uploaded images to a bounded JPEG (C1)
// ============================================================================

use image::{imageops::FilterType, DynamicImage, ImageFormat};
use invoice_shared::error::{Error, Result};
use tracing::{info, warn};

/// Longest side, in pixels, an optimized image is resized to.
pub const MAX_DIMENSION: u32 = 1920;
/// Starting JPEG quality for the first re-encode attempt.
pub const OPTIMAL_QUALITY: u8 = 85;
/// Target size, in KB, the quality-reduction loop aims for.
pub const TARGET_FILE_SIZE_KB: u64 = 500;
/// Quality floor: the loop stops reducing once it would fall below this.
const MIN_QUALITY: u8 = 60;
/// Fast-path ceiling: already-JPEG inputs at or under this size skip
/// re-encoding entirely.
const FAST_PATH_MAX_KB: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationKind {
    Original,
    Reencoded,
}

#[derive(Debug, Clone)]
pub struct OptimizedImage {
    pub bytes: Vec<u8>,
    pub metadata: OptimizationMetadata,
}

#[derive(Debug, Clone)]
pub struct OptimizationMetadata {
    pub kind: OptimizationKind,
    pub original_size_kb: u64,
    pub optimized_size_kb: u64,
    pub original_dimensions: (u32, u32),
    pub final_dimensions: (u32, u32),
    pub compression_ratio: f64,
    pub quality: u8,
}

/// Non-fatal quality warnings, spec §4.1: "Quality validator produces
/// non-fatal warnings for `min_dimension < 600`, aspect ratio > 5:1, or
/// file < 20 KB; warnings are logged, never raised."
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityWarning {
    LowResolution { min_dimension: u32 },
    ExtremeAspectRatio { ratio_hundredths: u32 },
    SuspiciouslySmall { size_kb: u64 },
}

fn size_kb(bytes: &[u8]) -> u64 {
    (bytes.len() as u64 + 1023) / 1024
}

/// Non-fatal validation pass, grounded on
/// `original_source/backend/utils/image_optimizer.py`'s
/// `validate_image_quality`.
pub fn validate_image_quality(dimensions: (u32, u32), bytes_len: usize) -> Vec<QualityWarning> {
    let (width, height) = dimensions;
    let min_dimension = width.min(height);
    let mut warnings = Vec::new();

    if min_dimension < 600 {
        warnings.push(QualityWarning::LowResolution { min_dimension });
    }

    if height > 0 {
        let ratio = width.max(height) as f64 / width.min(height).max(1) as f64;
        if ratio > 5.0 {
            warnings.push(QualityWarning::ExtremeAspectRatio {
                ratio_hundredths: (ratio * 100.0).round() as u32,
            });
        }
    }

    let kb = size_kb(&vec![0u8; bytes_len]);
    if kb < 20 {
        warnings.push(QualityWarning::SuspiciouslySmall { size_kb: kb });
    }

    for warning in &warnings {
        warn!(?warning, "image quality warning");
    }

    warnings
}

/// Fast-path check: already-JPEG, small enough, and within bounds.
fn should_optimize(content_type: &str, bytes: &[u8], dims: (u32, u32)) -> bool {
    let is_jpeg = content_type.eq_ignore_ascii_case("image/jpeg")
        || content_type.eq_ignore_ascii_case("image/jpg");
    let within_size = size_kb(bytes) <= FAST_PATH_MAX_KB;
    let within_dims = dims.0 <= MAX_DIMENSION && dims.1 <= MAX_DIMENSION;

    !(is_jpeg && within_size && within_dims)
}

/// Optimize raw image bytes into a bounded JPEG, spec §4.1.
pub fn optimize(raw: &[u8], content_type: &str) -> Result<OptimizedImage> {
    let decoded = image::load_from_memory(raw)
        .map_err(|e| Error::BadRequest(format!("invalid image: {e}")))?;
    let original_dimensions = (decoded.width(), decoded.height());

    validate_image_quality(original_dimensions, raw.len());

    if !should_optimize(content_type, raw, original_dimensions) {
        info!("image optimizer fast-path: identity");
        let original_kb = size_kb(raw);
        return Ok(OptimizedImage {
            bytes: raw.to_vec(),
            metadata: OptimizationMetadata {
                kind: OptimizationKind::Original,
                original_size_kb: original_kb,
                optimized_size_kb: original_kb,
                original_dimensions,
                final_dimensions: original_dimensions,
                compression_ratio: 1.0,
                quality: 100,
            },
        });
    }

    let flattened = flatten_to_white(decoded);
    let resized = resize_preserving_aspect(flattened, MAX_DIMENSION);
    let final_dimensions = (resized.width(), resized.height());

    let (bytes, quality) = encode_with_quality_reduction(&resized, OPTIMAL_QUALITY, TARGET_FILE_SIZE_KB)?;

    let original_kb = size_kb(raw);
    let optimized_kb = size_kb(&bytes);
    Ok(OptimizedImage {
        bytes,
        metadata: OptimizationMetadata {
            kind: OptimizationKind::Reencoded,
            original_size_kb: original_kb,
            optimized_size_kb: optimized_kb,
            original_dimensions,
            final_dimensions,
            compression_ratio: if optimized_kb == 0 {
                1.0
            } else {
                original_kb as f64 / optimized_kb as f64
            },
            quality,
        },
    })
}

/// Flatten transparency onto a white background, spec §4.1.
fn flatten_to_white(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgba8(_) | DynamicImage::ImageLumaA8(_) => {
            let rgba = img.to_rgba8();
            let (w, h) = (rgba.width(), rgba.height());
            let mut canvas = image::RgbImage::from_pixel(w, h, image::Rgb([255, 255, 255]));
            for (x, y, pixel) in rgba.enumerate_pixels() {
                let [r, g, b, a] = pixel.0;
                if a == 255 {
                    canvas.put_pixel(x, y, image::Rgb([r, g, b]));
                } else if a > 0 {
                    let alpha = a as f32 / 255.0;
                    let blend = |channel: u8, bg: u8| -> u8 {
                        (channel as f32 * alpha + bg as f32 * (1.0 - alpha)).round() as u8
                    };
                    canvas.put_pixel(x, y, image::Rgb([blend(r, 255), blend(g, 255), blend(b, 255)]));
                }
            }
            DynamicImage::ImageRgb8(canvas)
        }
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Resize preserving aspect ratio so `max(width, height) <= max_dimension`,
/// using Lanczos3 (high-quality down-sampling), spec §4.1.
fn resize_preserving_aspect(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    if w.max(h) <= max_dimension {
        return img;
    }

    let scale = max_dimension as f64 / w.max(h) as f64;
    let new_w = (w as f64 * scale).round().max(1.0) as u32;
    let new_h = (h as f64 * scale).round().max(1.0) as u32;
    img.resize(new_w, new_h, FilterType::Lanczos3)
}

/// Encode as JPEG at `start_quality`, then iteratively reduce by 5 until
/// either the target size is met or quality would fall below `MIN_QUALITY`,
/// spec §4.1.
fn encode_with_quality_reduction(
    img: &DynamicImage,
    start_quality: u8,
    target_kb: u64,
) -> Result<(Vec<u8>, u8)> {
    let mut quality = start_quality;
    let mut best = encode_jpeg(img, quality)?;

    while size_kb(&best) > target_kb && quality >= MIN_QUALITY + 5 {
        quality -= 5;
        best = encode_jpeg(img, quality)?;
    }

    Ok((best, quality))
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buf);
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
    img.write_with_encoder(encoder)
        .map_err(|e| Error::Internal(format!("jpeg encode failed: {e}")))?;
    Ok(buf)
}

/// Content-type for a successfully optimized image is always JPEG, spec
/// §4.8.1: "Content type is `image/jpeg` after optimization."
pub const OPTIMIZED_CONTENT_TYPE: &str = "image/jpeg";

pub fn output_format() -> ImageFormat {
    ImageFormat::Jpeg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
        let dynamic = DynamicImage::ImageRgb8(img);
        encode_jpeg(&dynamic, quality).unwrap()
    }

    #[test]
    fn fast_path_identity_for_small_jpeg() {
        let bytes = solid_jpeg(800, 600, 90);
        let result = optimize(&bytes, "image/jpeg").unwrap();
        assert_eq!(result.metadata.kind, OptimizationKind::Original);
        assert_eq!(result.bytes, bytes);
    }

    #[test]
    fn oversized_dimensions_trigger_reencode() {
        let bytes = solid_jpeg(3000, 2000, 90);
        let result = optimize(&bytes, "image/jpeg").unwrap();
        assert_eq!(result.metadata.kind, OptimizationKind::Reencoded);
        assert!(result.metadata.final_dimensions.0 <= MAX_DIMENSION);
        assert!(result.metadata.final_dimensions.1 <= MAX_DIMENSION);
    }

    #[test]
    fn png_input_is_always_reencoded() {
        let img = image::RgbaImage::from_pixel(100, 100, image::Rgba([1, 2, 3, 128]));
        let dynamic = DynamicImage::ImageRgba8(img);
        let mut buf = Vec::new();
        dynamic
            .write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();

        let result = optimize(&buf, "image/png").unwrap();
        assert_eq!(result.metadata.kind, OptimizationKind::Reencoded);
    }

    #[test]
    fn quality_warnings_flag_small_dimension() {
        let warnings = validate_image_quality((400, 300), 100_000);
        assert!(warnings.contains(&QualityWarning::LowResolution { min_dimension: 300 }));
    }

    #[test]
    fn quality_warnings_flag_extreme_aspect_ratio() {
        let warnings = validate_image_quality((2000, 200), 100_000);
        assert!(matches!(warnings[0], QualityWarning::ExtremeAspectRatio { .. }) || warnings.iter().any(|w| matches!(w, QualityWarning::ExtremeAspectRatio { .. })));
    }

    #[test]
    fn quality_warnings_flag_tiny_files() {
        let warnings = validate_image_quality((800, 600), 5_000);
        assert!(warnings.contains(&QualityWarning::SuspiciouslySmall { size_kb: 5 }));
    }
}
