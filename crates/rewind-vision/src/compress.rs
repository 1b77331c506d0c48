//! Dynamic JPEG compression: quality and resolution scale with both the
//! configured level and the measured content importance.

use std::io::Cursor;
use std::str::FromStr;

use image::imageops::FilterType;
use serde::Serialize;
use tracing::{debug, warn};

use crate::importance::{Importance, ImportanceAnalyzer, ImportanceStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Ultra,
    Aggressive,
    Balanced,
    Quality,
}

impl FromStr for CompressionLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ultra" => Ok(Self::Ultra),
            "aggressive" => Ok(Self::Aggressive),
            "balanced" => Ok(Self::Balanced),
            "quality" => Ok(Self::Quality),
            other => Err(format!("unknown compression level: {other}")),
        }
    }
}

/// JPEG quality and resolution cap for one (level, importance) cell.
#[derive(Debug, Clone, Copy)]
pub struct CompressionParams {
    pub quality: u8,
    pub max_size: (u32, u32),
}

/// The level × importance table. Higher importance keeps more pixels.
pub fn params_for(level: CompressionLevel, importance: Importance) -> CompressionParams {
    use CompressionLevel::*;
    use Importance::*;
    let (quality, max_size) = match (level, importance) {
        (Ultra, High) => (50, (600, 400)),
        (Ultra, Medium) => (40, (480, 320)),
        (Ultra, Low) => (30, (400, 300)),
        (Aggressive, High) => (60, (800, 600)),
        (Aggressive, Medium) => (50, (640, 480)),
        (Aggressive, Low) => (40, (480, 360)),
        (Balanced, High) => (75, (1280, 720)),
        (Balanced, Medium) => (65, (960, 540)),
        (Balanced, Low) => (55, (800, 450)),
        (Quality, High) => (85, (1920, 1080)),
        (Quality, Medium) => (80, (1600, 900)),
        (Quality, Low) => (75, (1280, 720)),
    };
    CompressionParams { quality, max_size }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompressMeta {
    pub original_size: usize,
    pub compressed_size: usize,
    pub compression_ratio: f64,
    pub original_dimensions: (u32, u32),
    pub final_dimensions: (u32, u32),
    pub quality: u8,
    pub importance: Importance,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompressStats {
    pub images_processed: u64,
    pub original_bytes: u64,
    pub compressed_bytes: u64,
}

impl CompressStats {
    pub fn overall_ratio(&self) -> f64 {
        if self.original_bytes == 0 {
            1.0
        } else {
            self.compressed_bytes as f64 / self.original_bytes as f64
        }
    }
}

/// Compresses screenshots with importance-dependent parameters.
pub struct DynamicCompressor {
    level: CompressionLevel,
    analyzer: ImportanceAnalyzer,
    stats: CompressStats,
}

impl DynamicCompressor {
    pub fn new(level: CompressionLevel) -> Self {
        Self {
            level,
            analyzer: ImportanceAnalyzer::new(),
            stats: CompressStats::default(),
        }
    }

    /// Compress one image. Failure policy: any error returns the original
    /// bytes unchanged, never an error to the pipeline.
    pub fn compress(&mut self, bytes: &[u8]) -> (Vec<u8>, Option<CompressMeta>) {
        match self.try_compress(bytes) {
            Ok((out, meta)) => {
                self.stats.images_processed += 1;
                self.stats.original_bytes += meta.original_size as u64;
                self.stats.compressed_bytes += meta.compressed_size as u64;
                debug!(
                    from = meta.original_size,
                    to = meta.compressed_size,
                    quality = meta.quality,
                    "image compressed"
                );
                (out, Some(meta))
            }
            Err(e) => {
                warn!("image compression failed, keeping original: {e}");
                (bytes.to_vec(), None)
            }
        }
    }

    fn try_compress(&mut self, bytes: &[u8]) -> crate::error::Result<(Vec<u8>, CompressMeta)> {
        let importance = self.analyzer.analyze(bytes);
        let params = params_for(self.level, importance);

        let img = image::load_from_memory(bytes)
            .map_err(|e| crate::error::VisionError::Decode(e.to_string()))?;
        let original_dimensions = (img.width(), img.height());

        let img = resize_to_fit(img, params.max_size);
        let final_dimensions = (img.width(), img.height());

        // Re-encoding to JPEG drops alpha and strips metadata (EXIF included).
        let rgb = img.to_rgb8();
        let mut out = Cursor::new(Vec::new());
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, params.quality);
        encoder
            .encode_image(&rgb)
            .map_err(|e| crate::error::VisionError::Encode(e.to_string()))?;
        let compressed = out.into_inner();

        let meta = CompressMeta {
            original_size: bytes.len(),
            compressed_size: compressed.len(),
            compression_ratio: if bytes.is_empty() {
                1.0
            } else {
                compressed.len() as f64 / bytes.len() as f64
            },
            original_dimensions,
            final_dimensions,
            quality: params.quality,
            importance,
        };
        Ok((compressed, meta))
    }

    pub fn stats(&self) -> CompressStats {
        self.stats
    }

    pub fn importance_stats(&self) -> ImportanceStats {
        self.analyzer.stats()
    }
}

/// Aspect-preserving downscale via Lanczos. No-op when already in bounds.
fn resize_to_fit(img: image::DynamicImage, max_size: (u32, u32)) -> image::DynamicImage {
    let (w, h) = (img.width(), img.height());
    let (max_w, max_h) = max_size;
    if w <= max_w && h <= max_h {
        return img;
    }
    let ratio = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    let new_w = ((w as f64 * ratio) as u32).max(1);
    let new_h = ((h as f64 * ratio) as u32).max(1);
    img.resize_exact(new_w, new_h, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_images::{gradient, png_bytes};

    #[test]
    fn table_matches_levels() {
        let p = params_for(CompressionLevel::Aggressive, Importance::High);
        assert_eq!(p.quality, 60);
        assert_eq!(p.max_size, (800, 600));

        let p = params_for(CompressionLevel::Quality, Importance::Low);
        assert_eq!(p.quality, 75);
        assert_eq!(p.max_size, (1280, 720));
    }

    #[test]
    fn compression_resizes_oversized_frames() {
        let mut compressor = DynamicCompressor::new(CompressionLevel::Ultra);
        let bytes = png_bytes(&gradient(1920, 1080));
        let (out, meta) = compressor.compress(&bytes);
        let meta = meta.expect("compression should succeed");
        assert!(meta.final_dimensions.0 <= 600);
        assert!(meta.final_dimensions.1 <= 400);
        // Output must be JPEG.
        assert_eq!(
            image::guess_format(&out).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    fn aspect_ratio_is_preserved() {
        let img = image::DynamicImage::ImageRgb8(gradient(1000, 500));
        let resized = resize_to_fit(img, (100, 100));
        assert_eq!(resized.width(), 100);
        assert_eq!(resized.height(), 50);
    }

    #[test]
    fn garbage_bytes_pass_through_unchanged() {
        let mut compressor = DynamicCompressor::new(CompressionLevel::Balanced);
        let (out, meta) = compressor.compress(b"definitely not an image");
        assert!(meta.is_none());
        assert_eq!(out, b"definitely not an image");
    }
}
