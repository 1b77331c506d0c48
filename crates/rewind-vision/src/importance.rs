//! Content-importance classification. Drives how hard the dynamic
//! compressor is allowed to squeeze each screenshot.

use image::imageops::FilterType;
use serde::Serialize;
use tracing::warn;

/// Importance tier of a screenshot's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportanceStats {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

/// Classifies images by information density.
///
/// Three features on a 32×32 downsample, each normalised to 0–100:
/// contrast (luma stddev), complexity (mean first-difference), edge density
/// (fraction of edge-filter responses above 50). Weighted 0.4/0.3/0.3;
/// tiers split at 60 and 30.
pub struct ImportanceAnalyzer {
    stats: ImportanceStats,
}

impl ImportanceAnalyzer {
    pub fn new() -> Self {
        Self {
            stats: ImportanceStats::default(),
        }
    }

    /// Failure policy: unreadable bytes classify as Medium.
    pub fn analyze(&mut self, bytes: &[u8]) -> Importance {
        let img = match image::load_from_memory(bytes) {
            Ok(img) => img,
            Err(e) => {
                warn!("importance analysis failed to decode image: {e}");
                return Importance::Medium;
            }
        };
        let importance = self.analyze_image(&img);
        match importance {
            Importance::High => self.stats.high += 1,
            Importance::Medium => self.stats.medium += 1,
            Importance::Low => self.stats.low += 1,
        }
        importance
    }

    pub fn analyze_image(&self, img: &image::DynamicImage) -> Importance {
        let small = img.resize_exact(32, 32, FilterType::Lanczos3);
        let rgb = small.to_rgb8();
        let luma = small.to_luma8();

        let contrast = contrast_score(&luma);
        let complexity = complexity_score(&rgb);
        let edges = edge_density_score(&luma);

        let score = contrast * 0.4 + complexity * 0.3 + edges * 0.3;

        if score > 60.0 {
            Importance::High
        } else if score > 30.0 {
            Importance::Medium
        } else {
            Importance::Low
        }
    }

    pub fn stats(&self) -> ImportanceStats {
        self.stats
    }
}

impl Default for ImportanceAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard deviation of luminance, normalised to 0–100.
fn contrast_score(luma: &image::GrayImage) -> f64 {
    let n = luma.len() as f64;
    let mean = luma.pixels().map(|p| p.0[0] as f64).sum::<f64>() / n;
    let var = luma
        .pixels()
        .map(|p| {
            let d = p.0[0] as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (var.sqrt() / 2.55).min(100.0)
}

/// Mean absolute first difference across rows and columns, normalised.
fn complexity_score(rgb: &image::RgbImage) -> f64 {
    let (w, h) = rgb.dimensions();
    if w < 2 || h < 2 {
        return 0.0;
    }

    let mut row_diff = 0.0;
    let mut row_count = 0u64;
    for y in 1..h {
        for x in 0..w {
            let a = rgb.get_pixel(x, y).0;
            let b = rgb.get_pixel(x, y - 1).0;
            for c in 0..3 {
                row_diff += (a[c] as f64 - b[c] as f64).abs();
                row_count += 1;
            }
        }
    }

    let mut col_diff = 0.0;
    let mut col_count = 0u64;
    for y in 0..h {
        for x in 1..w {
            let a = rgb.get_pixel(x, y).0;
            let b = rgb.get_pixel(x - 1, y).0;
            for c in 0..3 {
                col_diff += (a[c] as f64 - b[c] as f64).abs();
                col_count += 1;
            }
        }
    }

    let complexity = (row_diff / row_count as f64 + col_diff / col_count as f64) / 2.0;
    (complexity / 2.55).min(100.0)
}

/// Fraction of pixels whose 3×3 edge-filter magnitude exceeds 50, scaled.
fn edge_density_score(luma: &image::GrayImage) -> f64 {
    let (w, h) = luma.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut edge_pixels = 0u64;
    let total = (w - 2) as u64 * (h - 2) as u64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            // 8-neighbour Laplacian response
            let mut sum = 8.0 * luma.get_pixel(x, y).0[0] as f64;
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    sum -= luma
                        .get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)
                        .0[0] as f64;
                }
            }
            if sum.abs() > 50.0 {
                edge_pixels += 1;
            }
        }
    }

    (edge_pixels as f64 / total as f64 * 500.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_images::{checkerboard, png_bytes, solid};

    #[test]
    fn flat_image_is_low_importance() {
        let mut analyzer = ImportanceAnalyzer::new();
        let bytes = png_bytes(&solid(64, 64, [128, 128, 128]));
        assert_eq!(analyzer.analyze(&bytes), Importance::Low);
        assert_eq!(analyzer.stats().low, 1);
    }

    #[test]
    fn checkerboard_is_high_importance() {
        let mut analyzer = ImportanceAnalyzer::new();
        let bytes = png_bytes(&checkerboard(64, 64, 4));
        assert_eq!(analyzer.analyze(&bytes), Importance::High);
    }

    #[test]
    fn garbage_bytes_default_to_medium() {
        let mut analyzer = ImportanceAnalyzer::new();
        assert_eq!(analyzer.analyze(b"not an image"), Importance::Medium);
    }
}
