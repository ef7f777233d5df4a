//! Transformer Module
//! Resizes downloaded images with an aspect-ratio heuristic and re-encodes them

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::str::FromStr;

use crate::config::SizingConfig;
use crate::error::LocalizeError;

/// Encoding for every localized asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Lossless WebP.
    WebP,
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::WebP => "webp",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "webp" => Ok(OutputFormat::WebP),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            other => Err(format!("unsupported output format '{}'", other)),
        }
    }
}

/// A re-encoded image ready to be written.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub source_width: u32,
    pub source_height: u32,
}

/// Compute output dimensions from the source dimensions.
///
/// Profile images (ratio below the cutoff) are clamped to the profile
/// minimums, everything else to the wide minimums.
pub fn target_dimensions(width: u32, height: u32, sizing: &SizingConfig) -> (u32, u32) {
    let (w, h) = (width as f64, height as f64);
    let ratio = if height == 0 { f64::INFINITY } else { w / h };

    let (min_w, min_h) = if ratio < sizing.aspect_cutoff {
        (sizing.min_profile_width, sizing.min_profile_height)
    } else {
        (sizing.min_wide_width, sizing.min_wide_height)
    };

    let target_w = (w * sizing.shrink_factor).max(min_w as f64);
    let target_h = (h * sizing.shrink_factor).max(min_h as f64);

    (target_w.round() as u32, target_h.round() as u32)
}

/// Decode, cover-fit resize, and re-encode. CPU bound; call from a blocking context.
pub fn transform(
    bytes: &[u8],
    source_format: ImageFormat,
    sizing: &SizingConfig,
    output: OutputFormat,
    quality: u8,
) -> Result<EncodedImage, LocalizeError> {
    let img = image::load_from_memory_with_format(bytes, source_format)
        .map_err(|e| LocalizeError::Transform(format!("failed to decode image: {}", e)))?;

    let (source_width, source_height) = (img.width(), img.height());
    let (width, height) = target_dimensions(source_width, source_height, sizing);

    tracing::debug!(
        "Transformer: Resizing {}x{} to {}x{}",
        source_width,
        source_height,
        width,
        height
    );
    let resized = img.resize_to_fill(width, height, FilterType::Lanczos3);

    let bytes = encode(resized, output, quality)?;
    tracing::debug!("Transformer: Encoded {} bytes as {}", bytes.len(), output.extension());

    Ok(EncodedImage {
        bytes,
        width,
        height,
        source_width,
        source_height,
    })
}

fn encode(img: DynamicImage, output: OutputFormat, quality: u8) -> Result<Vec<u8>, LocalizeError> {
    let mut data = Vec::new();

    match output {
        OutputFormat::WebP => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_to(&mut Cursor::new(&mut data), ImageFormat::WebP)
                .map_err(|e| LocalizeError::Transform(format!("failed to encode WebP: {}", e)))?;
        }
        OutputFormat::Jpeg => {
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut data, quality)
                .encode_image(&rgb)
                .map_err(|e| LocalizeError::Transform(format!("failed to encode JPEG: {}", e)))?;
        }
        OutputFormat::Png => {
            img.write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
                .map_err(|e| LocalizeError::Transform(format!("failed to encode PNG: {}", e)))?;
        }
    }

    Ok(data)
}
