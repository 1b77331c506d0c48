//! Perceptual hashing for near-duplicate screenshot detection, plus the
//! content hash used to address images throughout the store.

use image::imageops::FilterType;
use sha2::Digest as _;

use crate::error::{Result, VisionError};

/// 64-bit average hash: 8×8 grayscale downsample, one bit per pixel against
/// the mean. Robust against recompression and small pixel noise, which is
/// exactly the failure mode of back-to-back screen captures.
pub fn perceptual_hash(bytes: &[u8]) -> Result<u64> {
    let img = image::load_from_memory(bytes).map_err(|e| VisionError::Decode(e.to_string()))?;
    Ok(perceptual_hash_image(&img))
}

pub fn perceptual_hash_image(img: &image::DynamicImage) -> u64 {
    let small = img.resize_exact(8, 8, FilterType::Triangle).to_luma8();
    let pixels: Vec<u8> = small.pixels().map(|p| p.0[0]).collect();
    let mean: u32 = pixels.iter().map(|&p| p as u32).sum::<u32>() / 64;

    let mut hash: u64 = 0;
    for (i, &p) in pixels.iter().enumerate() {
        if p as u32 > mean {
            hash |= 1 << i;
        }
    }
    hash
}

/// Hamming distance between two perceptual hashes.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// SHA-256 of the raw bytes, hex-encoded. The canonical screenshot id.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(sha2::Sha256::digest(bytes))
}

/// Stateful capture gate: drops frames whose pHash distance to the previous
/// admitted frame is below the threshold.
pub struct PhashGate {
    threshold: u32,
    last: Option<u64>,
    admitted: u64,
    skipped: u64,
}

impl PhashGate {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            last: None,
            admitted: 0,
            skipped: 0,
        }
    }

    /// Returns true when the frame should enter the buffer.
    pub fn admit(&mut self, phash: u64) -> bool {
        let pass = match self.last {
            None => true,
            Some(prev) => hamming_distance(prev, phash) >= self.threshold,
        };
        if pass {
            self.last = Some(phash);
            self.admitted += 1;
        } else {
            self.skipped += 1;
        }
        pass
    }

    pub fn admitted(&self) -> u64 {
        self.admitted
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_images::{png_bytes, solid, gradient};

    #[test]
    fn identical_bytes_produce_equal_hashes() {
        let a = png_bytes(&solid(64, 64, [200, 30, 30]));
        let b = png_bytes(&solid(64, 64, [200, 30, 30]));
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_eq!(
            perceptual_hash(&a).unwrap(),
            perceptual_hash(&b).unwrap()
        );
    }

    #[test]
    fn different_content_differs_in_phash() {
        let flat = png_bytes(&solid(64, 64, [0, 0, 0]));
        let grad = png_bytes(&gradient(64, 64));
        let d = hamming_distance(
            perceptual_hash(&flat).unwrap(),
            perceptual_hash(&grad).unwrap(),
        );
        assert!(d > 4, "distance was {d}");
    }

    #[test]
    fn gate_skips_near_duplicates() {
        let mut gate = PhashGate::new(6);
        let frame = perceptual_hash(&png_bytes(&gradient(64, 64))).unwrap();

        assert!(gate.admit(frame));
        for _ in 0..9 {
            assert!(!gate.admit(frame));
        }
        assert_eq!(gate.admitted(), 1);
        assert_eq!(gate.skipped(), 9);
    }

    #[test]
    fn gate_admits_changed_frames() {
        let mut gate = PhashGate::new(6);
        let a = perceptual_hash(&png_bytes(&gradient(64, 64))).unwrap();
        let b = perceptual_hash(&png_bytes(&solid(64, 64, [255, 255, 255]))).unwrap();
        assert!(gate.admit(a));
        assert!(gate.admit(b));
        assert_eq!(gate.admitted(), 2);
    }
}
