//! Changed-region cropping against the previous full frame.

use serde::Serialize;
use tracing::{debug, warn};

/// Margin added around the detected change box, in pixels.
const CROP_MARGIN: u32 = 10;
/// Crops smaller than this on either side are abandoned.
const MIN_REGION_SIZE: u32 = 100;
/// Crops covering more than this fraction of the frame are abandoned.
const MAX_CROP_RATIO: f64 = 0.8;
/// JPEG quality for the emitted crop.
const CROP_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, Serialize)]
pub struct CropMeta {
    pub is_cropped: bool,
    pub crop_ratio: f64,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CropStats {
    pub full_frames: u64,
    pub cropped_frames: u64,
}

/// Emits only the changed bounding box between consecutive frames.
/// Falls back to the full frame whenever cropping would lose context.
pub struct RegionCropper {
    diff_threshold: u8,
    last_frame: Option<image::RgbImage>,
    stats: CropStats,
}

impl RegionCropper {
    pub fn new(diff_threshold: u8) -> Self {
        Self {
            diff_threshold,
            last_frame: None,
            stats: CropStats::default(),
        }
    }

    /// Crop to the changed region, or return the original bytes with a
    /// reason when cropping does not apply. Errors never propagate.
    pub fn crop_changed_region(&mut self, bytes: &[u8], force_full: bool) -> (Vec<u8>, CropMeta) {
        let img = match image::load_from_memory(bytes) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                warn!("region cropper failed to decode frame: {e}");
                return (
                    bytes.to_vec(),
                    CropMeta {
                        is_cropped: false,
                        crop_ratio: 1.0,
                        reason: "decode_failed",
                    },
                );
            }
        };

        let previous = self.last_frame.replace(img.clone());

        let previous = match (previous, force_full) {
            (Some(prev), false) => prev,
            (_, true) | (None, _) => {
                self.stats.full_frames += 1;
                return (
                    bytes.to_vec(),
                    CropMeta {
                        is_cropped: false,
                        crop_ratio: 1.0,
                        reason: if force_full { "forced_full" } else { "first_frame" },
                    },
                );
            }
        };

        let bbox = match diff_bbox(&previous, &img, self.diff_threshold) {
            Some(b) => b,
            None => {
                self.stats.full_frames += 1;
                return (
                    bytes.to_vec(),
                    CropMeta {
                        is_cropped: false,
                        crop_ratio: 1.0,
                        reason: "no_significant_change",
                    },
                );
            }
        };

        let (left, top, right, bottom) = bbox;
        let crop_w = right - left;
        let crop_h = bottom - top;
        let crop_ratio =
            (crop_w as f64 * crop_h as f64) / (img.width() as f64 * img.height() as f64);

        if crop_ratio > MAX_CROP_RATIO {
            self.stats.full_frames += 1;
            return (
                bytes.to_vec(),
                CropMeta {
                    is_cropped: false,
                    crop_ratio,
                    reason: "change_too_large",
                },
            );
        }

        let cropped = image::imageops::crop_imm(&img, left, top, crop_w, crop_h).to_image();
        let mut out = std::io::Cursor::new(Vec::new());
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, CROP_JPEG_QUALITY);
        if let Err(e) = encoder.encode_image(&cropped) {
            warn!("region crop encode failed, keeping full frame: {e}");
            self.stats.full_frames += 1;
            return (
                bytes.to_vec(),
                CropMeta {
                    is_cropped: false,
                    crop_ratio: 1.0,
                    reason: "encode_failed",
                },
            );
        }

        self.stats.cropped_frames += 1;
        debug!(
            w = crop_w,
            h = crop_h,
            ratio = format!("{:.2}", crop_ratio),
            "changed region cropped"
        );
        (
            out.into_inner(),
            CropMeta {
                is_cropped: true,
                crop_ratio,
                reason: "cropped",
            },
        )
    }

    pub fn reset(&mut self) {
        self.last_frame = None;
    }

    pub fn stats(&self) -> CropStats {
        self.stats
    }
}

/// Bounding box of pixels whose mean RGB difference exceeds the threshold,
/// expanded by the margin. None when frames mismatch in size, nothing
/// changed, or the region is below the minimum size.
fn diff_bbox(
    a: &image::RgbImage,
    b: &image::RgbImage,
    threshold: u8,
) -> Option<(u32, u32, u32, u32)> {
    if a.dimensions() != b.dimensions() {
        return None;
    }
    let (w, h) = a.dimensions();

    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut any = false;

    for y in 0..h {
        for x in 0..w {
            let pa = a.get_pixel(x, y).0;
            let pb = b.get_pixel(x, y).0;
            let diff: u32 = (0..3).map(|c| pa[c].abs_diff(pb[c]) as u32).sum::<u32>() / 3;
            if diff > threshold as u32 {
                any = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }

    if !any {
        return None;
    }

    let left = min_x.saturating_sub(CROP_MARGIN);
    let top = min_y.saturating_sub(CROP_MARGIN);
    let right = (max_x + 1 + CROP_MARGIN).min(w);
    let bottom = (max_y + 1 + CROP_MARGIN).min(h);

    if right - left < MIN_REGION_SIZE || bottom - top < MIN_REGION_SIZE {
        return None;
    }

    Some((left, top, right, bottom))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_images::{png_bytes, solid};

    #[test]
    fn first_frame_is_always_full() {
        let mut cropper = RegionCropper::new(30);
        let bytes = png_bytes(&solid(400, 400, [10, 10, 10]));
        let (_, meta) = cropper.crop_changed_region(&bytes, false);
        assert!(!meta.is_cropped);
        assert_eq!(meta.reason, "first_frame");
    }

    #[test]
    fn unchanged_frame_returns_full() {
        let mut cropper = RegionCropper::new(30);
        let bytes = png_bytes(&solid(400, 400, [10, 10, 10]));
        cropper.crop_changed_region(&bytes, false);
        let (_, meta) = cropper.crop_changed_region(&bytes, false);
        assert!(!meta.is_cropped);
        assert_eq!(meta.reason, "no_significant_change");
    }

    #[test]
    fn localized_change_produces_crop() {
        let mut cropper = RegionCropper::new(30);
        let base = solid(600, 600, [10, 10, 10]);
        cropper.crop_changed_region(&png_bytes(&base), false);

        // Paint a 150×150 bright square into one corner region.
        let mut changed = base.clone();
        for y in 100..250 {
            for x in 100..250 {
                changed.put_pixel(x, y, image::Rgb([250, 250, 250]));
            }
        }
        let (out, meta) = cropper.crop_changed_region(&png_bytes(&changed), false);
        assert!(meta.is_cropped, "reason: {}", meta.reason);
        assert!(meta.crop_ratio < 0.5);
        let cropped = image::load_from_memory(&out).unwrap();
        assert!(cropped.width() < 600);
    }

    #[test]
    fn whole_frame_change_abandons_crop() {
        let mut cropper = RegionCropper::new(30);
        cropper.crop_changed_region(&png_bytes(&solid(400, 400, [0, 0, 0])), false);
        let (_, meta) =
            cropper.crop_changed_region(&png_bytes(&solid(400, 400, [255, 255, 255])), false);
        assert!(!meta.is_cropped);
        assert_eq!(meta.reason, "change_too_large");
    }

    #[test]
    fn tiny_change_is_not_worth_cropping() {
        let mut cropper = RegionCropper::new(30);
        let base = solid(400, 400, [10, 10, 10]);
        cropper.crop_changed_region(&png_bytes(&base), false);

        let mut changed = base.clone();
        for y in 200..220 {
            for x in 200..220 {
                changed.put_pixel(x, y, image::Rgb([250, 250, 250]));
            }
        }
        let (_, meta) = cropper.crop_changed_region(&png_bytes(&changed), false);
        assert!(!meta.is_cropped);
        assert_eq!(meta.reason, "no_significant_change");
    }
}
