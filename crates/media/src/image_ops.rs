//! Image processing operations for LLM-ready media.
//!
//! Provides utilities for resizing and optimizing images before sending to LLMs.
//! Handles dimension limits, file size constraints, and format conversion.

use std::io::Cursor;

use {
    anyhow::{Context, Result},
    image::{DynamicImage, GenericImageView, ImageFormat, ImageReader},
};

/// Default maximum dimension (width or height) for images.
/// Claude API allows 8000px for single images, 2000px for multi-image requests.
/// We use 1568px as a conservative default that works well with both providers.
pub const DEFAULT_MAX_DIMENSION: u32 = 1568;

/// Maximum file size for Anthropic API (5MB).
pub const MAX_FILE_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// JPEG quality for resized images (0-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Image metadata.
#[derive(Debug, Clone)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: Option<ImageFormat>,
}

/// Result of image optimization.
#[derive(Debug)]
pub struct OptimizedImage {
    /// The optimized image data.
    pub data: Vec<u8>,
    /// MIME type of the output image.
    pub media_type: String,
    /// Original dimensions.
    pub original_width: u32,
    pub original_height: u32,
    /// Final dimensions after resizing.
    pub final_width: u32,
    pub final_height: u32,
    /// Whether the image was resized.
    pub was_resized: bool,
}

/// Get metadata about an image without fully decoding it.
pub fn get_image_metadata(data: &[u8]) -> Result<ImageMetadata> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .context("failed to guess image format")?;

    let format = reader.format();
    let (width, height) = reader
        .into_dimensions()
        .context("failed to read image dimensions")?;

    Ok(ImageMetadata {
        width,
        height,
        format,
    })
}

/// Check if an image needs resizing based on dimensions or file size.
pub fn needs_optimization(data: &[u8], max_dimension: u32) -> Result<bool> {
    // Check file size
    if data.len() > MAX_FILE_SIZE_BYTES {
        return Ok(true);
    }

    // Check dimensions
    let meta = get_image_metadata(data)?;
    if meta.width > max_dimension || meta.height > max_dimension {
        return Ok(true);
    }

    Ok(false)
}

/// Resize image to fit within max dimensions while preserving aspect ratio.
/// Returns the original data if no resizing is needed.
pub fn resize_image(data: &[u8], max_width: u32, max_height: u32) -> Result<Vec<u8>> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .context("failed to guess image format")?
        .decode()
        .context("failed to decode image")?;

    let (orig_width, orig_height) = img.dimensions();

    // Check if resizing is needed
    if orig_width <= max_width && orig_height <= max_height {
        return Ok(data.to_vec());
    }

    // Calculate new dimensions preserving aspect ratio
    let ratio = (max_width as f64 / orig_width as f64).min(max_height as f64 / orig_height as f64);
    let new_width = (orig_width as f64 * ratio).round() as u32;
    let new_height = (orig_height as f64 * ratio).round() as u32;

    // Resize using Lanczos3 filter for high quality
    let resized = img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3);

    // Encode as JPEG
    let mut output = Cursor::new(Vec::new());
    resized
        .write_to(&mut output, ImageFormat::Jpeg)
        .context("failed to encode resized image")?;

    Ok(output.into_inner())
}

/// Optimize an image for LLM consumption.
///
/// This function:
/// 1. Checks if the image exceeds dimension or file size limits
/// 2. Resizes if needed, preserving aspect ratio
/// 3. Converts to JPEG for efficiency (unless PNG with transparency is needed)
/// 4. Ensures the output is under the API size limit
///
/// # Arguments
/// * `data` - Raw image bytes
/// * `max_dimension` - Maximum width or height (default: 1568)
///
/// # Returns
/// * `OptimizedImage` with the processed data and metadata
pub fn optimize_for_llm(data: &[u8], max_dimension: Option<u32>) -> Result<OptimizedImage> {
    let max_dim = max_dimension.unwrap_or(DEFAULT_MAX_DIMENSION);

    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .context("failed to guess image format")?
        .decode()
        .context("failed to decode image")?;

    let (orig_width, orig_height) = img.dimensions();
    let needs_resize =
        orig_width > max_dim || orig_height > max_dim || data.len() > MAX_FILE_SIZE_BYTES;

    if !needs_resize {
        // Determine media type from format
        let format = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .ok()
            .and_then(|r| r.format());
        let media_type = format_to_media_type(format).to_string();

        return Ok(OptimizedImage {
            data: data.to_vec(),
            media_type,
            original_width: orig_width,
            original_height: orig_height,
            final_width: orig_width,
            final_height: orig_height,
            was_resized: false,
        });
    }

    // Resize the image
    let (final_width, final_height, resized) = resize_to_fit(&img, max_dim);

    // Check if image has alpha channel (transparency)
    let has_alpha = matches!(
        img,
        DynamicImage::ImageRgba8(_)
            | DynamicImage::ImageRgba16(_)
            | DynamicImage::ImageRgba32F(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLumaA16(_)
    );

    // Try encoding with target quality
    let (output_data, media_type) = if has_alpha {
        // Keep as PNG for transparency
        let mut output = Cursor::new(Vec::new());
        resized
            .write_to(&mut output, ImageFormat::Png)
            .context("failed to encode as PNG")?;
        (output.into_inner(), "image/png")
    } else {
        // Convert to JPEG for efficiency
        encode_jpeg_with_quality(&resized, DEFAULT_JPEG_QUALITY)?
    };

    // If still too large, try progressive quality reduction
    let final_data = if output_data.len() > MAX_FILE_SIZE_BYTES && !has_alpha {
        reduce_size_to_fit(&resized, MAX_FILE_SIZE_BYTES)?
    } else {
        output_data
    };

    Ok(OptimizedImage {
        data: final_data,
        media_type: media_type.to_string(),
        original_width: orig_width,
        original_height: orig_height,
        final_width,
        final_height,
        was_resized: true,
    })
}

/// Resize image to fit within max dimension, preserving aspect ratio.
fn resize_to_fit(img: &DynamicImage, max_dimension: u32) -> (u32, u32, DynamicImage) {
    let (width, height) = img.dimensions();

    if width <= max_dimension && height <= max_dimension {
        return (width, height, img.clone());
    }

    let ratio = if width > height {
        max_dimension as f64 / width as f64
    } else {
        max_dimension as f64 / height as f64
    };

    let new_width = (width as f64 * ratio).round() as u32;
    let new_height = (height as f64 * ratio).round() as u32;

    let resized = img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3);
    (new_width, new_height, resized)
}

/// Encode image as JPEG with specified quality.
fn encode_jpeg_with_quality(img: &DynamicImage, quality: u8) -> Result<(Vec<u8>, &'static str)> {
    let mut output = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, quality);
    img.write_with_encoder(encoder)
        .context("failed to encode as JPEG")?;
    Ok((output.into_inner(), "image/jpeg"))
}

/// Progressively reduce quality until image fits within size limit.
fn reduce_size_to_fit(img: &DynamicImage, max_bytes: usize) -> Result<Vec<u8>> {
    // Try progressively lower quality
    for quality in [80, 70, 60, 50, 40, 30] {
        let (data, _) = encode_jpeg_with_quality(img, quality)?;
        if data.len() <= max_bytes {
            return Ok(data);
        }
    }

    // If still too large, resize further
    let (width, height) = img.dimensions();
    let smaller_dim = (width.min(height) as f64 * 0.75).round() as u32;

    if smaller_dim < 256 {
        anyhow::bail!("image cannot be reduced to fit within size limit");
    }

    let resized = img.resize(
        smaller_dim,
        smaller_dim,
        image::imageops::FilterType::Lanczos3,
    );
    reduce_size_to_fit(&resized, max_bytes)
}

/// Convert ImageFormat to MIME type string.
fn format_to_media_type(format: Option<ImageFormat>) -> &'static str {
    match format {
        Some(ImageFormat::Jpeg) => "image/jpeg",
        Some(ImageFormat::Png) => "image/png",
        Some(ImageFormat::WebP) => "image/webp",
        Some(ImageFormat::Gif) => "image/gif",
        Some(ImageFormat::Bmp) => "image/bmp",
        _ => "image/jpeg", // Default to JPEG for unknown formats
    }
}
