use crate::error::{AppError, EnhancementWarning};
use crate::models::diagnosis_types::ImageStatistics;
use base64::Engine;
use image::{ColorType, DynamicImage, ImageReader, RgbImage};
use std::io::Cursor;
use std::path::Path;

// 3x3 SMOOTH kernel; the sharpness blend pulls away from this blurred copy.
const SMOOTH_KERNEL: [f32; 9] = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0];

/// Checks that an image is worth sending to the model.
///
/// Never errors: too-small, zero-area and single-valued images all yield `false`.
pub fn validate_image(image: &DynamicImage, min_size: (u32, u32)) -> bool {
    let (width, height) = (image.width(), image.height());
    if width < min_size.0 || height < min_size.1 {
        return false;
    }
    if width == 0 || height == 0 {
        return false;
    }

    match native_summary(image) {
        Some(summary) => summary.min != summary.max,
        None => false,
    }
}

/// Converts any decoded image to 8-bit RGB.
///
/// Alpha-bearing images are composited onto opaque white so transparent
/// regions do not turn black. Palette PNGs arrive here already expanded to
/// RGBA by the decoder and take the same path.
pub fn to_canonical_rgb(image: &DynamicImage) -> RgbImage {
    if let DynamicImage::ImageRgb8(rgb) = image {
        return rgb.clone();
    }
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut out = RgbImage::new(width, height);
    for (src, dst) in rgba.pixels().zip(out.pixels_mut()) {
        let alpha = src[3] as u16;
        for c in 0..3 {
            let value = src[c] as u16 * alpha + 255 * (255 - alpha);
            dst[c] = ((value + 127) / 255) as u8;
        }
    }
    out
}

/// Contrast then sharpness, both as blends against a degenerate image.
/// A factor of 1.0 leaves the image untouched.
pub fn enhance_image(
    image: &RgbImage,
    contrast_factor: f32,
    sharpness_factor: f32,
) -> Result<RgbImage, EnhancementWarning> {
    check_factor("contrast", contrast_factor)?;
    check_factor("sharpness", sharpness_factor)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(EnhancementWarning::EmptyImage);
    }

    let contrasted = adjust_contrast(image, contrast_factor);
    Ok(adjust_sharpness(&contrasted, sharpness_factor))
}

fn check_factor(name: &'static str, value: f32) -> Result<(), EnhancementWarning> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(EnhancementWarning::InvalidFactor { name, value })
    }
}

fn adjust_contrast(image: &RgbImage, factor: f32) -> RgbImage {
    // Degenerate image is a flat grey at the mean of the 8-bit ITU-R 601 luma.
    let pixel_count = image.width() as f64 * image.height() as f64;
    let luma_sum: u64 = image.pixels().map(|p| luma8(p) as u64).sum();
    let mean = (luma_sum as f64 / pixel_count + 0.5).floor() as f32;

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for c in 0..3 {
            pixel[c] = blend_channel(mean, pixel[c], factor);
        }
    }
    out
}

/// Integer luma, rounded per pixel like an `L` conversion.
fn luma8(pixel: &image::Rgb<u8>) -> u8 {
    ((pixel[0] as u32 * 19595 + pixel[1] as u32 * 38470 + pixel[2] as u32 * 7471 + 0x8000) >> 16)
        as u8
}

fn adjust_sharpness(image: &RgbImage, factor: f32) -> RgbImage {
    let smoothed: RgbImage = image::imageops::filter3x3(image, &SMOOTH_KERNEL);
    let (width, height) = image.dimensions();

    let mut out = image.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        // Border pixels have no full neighbourhood and stay as they are.
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            continue;
        }
        let blurred = smoothed.get_pixel(x, y);
        for c in 0..3 {
            pixel[c] = blend_channel(blurred[c] as f32, pixel[c], factor);
        }
    }
    out
}

fn blend_channel(degenerate: f32, value: u8, factor: f32) -> u8 {
    (degenerate + factor * (value as f32 - degenerate))
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Statistics over the image's own channels (alpha included when present),
/// on the image's own sample scale.
pub fn image_statistics(image: &DynamicImage) -> Result<ImageStatistics, AppError> {
    let summary = native_summary(image).ok_or_else(|| {
        AppError::Prediction("Cannot compute statistics of an empty image".to_string())
    })?;

    Ok(ImageStatistics {
        width: image.width(),
        height: image.height(),
        color_mode: color_mode(image).to_string(),
        mean_brightness: summary.mean,
        std_brightness: summary.std,
        min_pixel: summary.min,
        max_pixel: summary.max,
    })
}

pub fn color_mode(image: &DynamicImage) -> &'static str {
    match image.color() {
        ColorType::L8 => "L",
        ColorType::La8 => "LA",
        ColorType::Rgb8 => "RGB",
        ColorType::Rgba8 => "RGBA",
        ColorType::L16 => "L;16",
        ColorType::La16 => "LA;16",
        ColorType::Rgb16 => "RGB;16",
        ColorType::Rgba16 => "RGBA;16",
        ColorType::Rgb32F => "RGB;32F",
        ColorType::Rgba32F => "RGBA;32F",
        _ => "unknown",
    }
}

struct SampleSummary {
    min: f64,
    max: f64,
    mean: f64,
    std: f64,
}

/// Summary of the raw sample buffer, without any bit-depth conversion.
fn native_summary(image: &DynamicImage) -> Option<SampleSummary> {
    match image {
        DynamicImage::ImageLuma8(buf) => summarize(buf.as_raw().as_slice()),
        DynamicImage::ImageLumaA8(buf) => summarize(buf.as_raw().as_slice()),
        DynamicImage::ImageRgb8(buf) => summarize(buf.as_raw().as_slice()),
        DynamicImage::ImageRgba8(buf) => summarize(buf.as_raw().as_slice()),
        DynamicImage::ImageLuma16(buf) => summarize(buf.as_raw().as_slice()),
        DynamicImage::ImageLumaA16(buf) => summarize(buf.as_raw().as_slice()),
        DynamicImage::ImageRgb16(buf) => summarize(buf.as_raw().as_slice()),
        DynamicImage::ImageRgba16(buf) => summarize(buf.as_raw().as_slice()),
        DynamicImage::ImageRgb32F(buf) => summarize(buf.as_raw().as_slice()),
        DynamicImage::ImageRgba32F(buf) => summarize(buf.as_raw().as_slice()),
        other => summarize(other.to_rgba8().as_raw().as_slice()),
    }
}

fn summarize<T: Copy + Into<f64>>(samples: &[T]) -> Option<SampleSummary> {
    if samples.is_empty() {
        return None;
    }
    let count = samples.len() as f64;
    let mut sum = 0f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &s in samples {
        let v: f64 = s.into();
        sum += v;
        min = min.min(v);
        max = max.max(v);
    }
    let mean = sum / count;
    let variance = samples
        .iter()
        .map(|&s| {
            let v: f64 = s.into();
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / count;
    Some(SampleSummary {
        min,
        max,
        mean,
        std: variance.sqrt(),
    })
}

pub fn load_image(path: &Path) -> Result<DynamicImage, AppError> {
    ImageReader::open(path)
        .map_err(|e| {
            AppError::preprocessing_with(format!("Failed to open image {}", path.display()), e)
        })?
        .with_guessed_format()
        .map_err(|e| {
            AppError::preprocessing_with(format!("Failed to read image {}", path.display()), e)
        })?
        .decode()
        .map_err(|e| {
            AppError::preprocessing_with(format!("Failed to decode image {}", path.display()), e)
        })
}

/// Decodes an uploaded image, rejecting empty or oversized payloads up front.
pub fn decode_image(bytes: &[u8], max_bytes: usize) -> Result<DynamicImage, AppError> {
    if bytes.is_empty() {
        return Err(AppError::InvalidImage("Uploaded image is empty".to_string()));
    }
    if bytes.len() > max_bytes {
        return Err(AppError::InvalidImage(format!(
            "Uploaded image is {} bytes, limit is {}",
            bytes.len(),
            max_bytes
        )));
    }

    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AppError::preprocessing_with("Failed to read image format", e))?
        .decode()
        .map_err(|e| AppError::preprocessing_with("Failed to decode image", e))
}

/// Accepts plain base64 or a `data:image/...;base64,` URL. Line breaks and
/// other ASCII whitespace inside the payload are ignored.
pub fn decode_base64_image(data: &str, max_bytes: usize) -> Result<DynamicImage, AppError> {
    let body = match data.trim().strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, body)| body)
            .ok_or_else(|| AppError::preprocessing("Malformed data URL: missing ','"))?,
        None => data.trim(),
    };
    let payload: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    // Reject before allocating when the decoded size is certain to exceed the limit.
    if payload.len() / 4 * 3 > max_bytes + 2 {
        return Err(AppError::InvalidImage(format!(
            "Uploaded image exceeds {} bytes",
            max_bytes
        )));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&payload)
        .map_err(|e| AppError::preprocessing_with("Invalid base64 image payload", e))?;
    decode_image(&bytes, max_bytes)
}
