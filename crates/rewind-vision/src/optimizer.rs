//! The per-tick image optimizer: optional region crop, then dynamic
//! compression, with a running token-budget estimate.

use serde::Serialize;
use tracing::debug;

use rewind_core::config::{CompressionConfig, TOKENS_PER_KB};

use crate::compress::{CompressionLevel, CompressStats, DynamicCompressor};
use crate::crop::{CropStats, RegionCropper};
use crate::importance::ImportanceStats;

#[derive(Debug, Clone, Serialize)]
pub struct OptimizeMeta {
    pub original_size: usize,
    pub final_size: usize,
    pub original_tokens: u64,
    pub optimized_tokens: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OptimizerStats {
    pub images_processed: u64,
    pub original_tokens: u64,
    pub optimized_tokens: u64,
}

/// Estimated LLM cost of an image payload (≈85 tokens per KB of JPEG).
pub fn estimate_tokens(byte_len: usize) -> u64 {
    (byte_len as f64 / 1024.0 * TOKENS_PER_KB) as u64
}

pub struct ImageOptimizer {
    compressor: DynamicCompressor,
    cropper: Option<RegionCropper>,
    stats: OptimizerStats,
}

impl ImageOptimizer {
    pub fn new(config: &CompressionConfig) -> Self {
        let level: CompressionLevel = config
            .level
            .parse()
            .unwrap_or(CompressionLevel::Aggressive);
        let cropper = config
            .enable_region_cropping
            .then(|| RegionCropper::new(config.crop_threshold));
        Self {
            compressor: DynamicCompressor::new(level),
            cropper,
            stats: OptimizerStats::default(),
        }
    }

    /// Optimize one screenshot. `is_first` forces a full frame through the
    /// cropper so a batch never opens with a context-free crop.
    /// Never fails: the worst case is the original bytes back.
    pub fn optimize(&mut self, bytes: &[u8], is_first: bool) -> (Vec<u8>, OptimizeMeta) {
        let original_size = bytes.len();
        let original_tokens = estimate_tokens(original_size);

        let staged = match self.cropper.as_mut() {
            Some(cropper) => cropper.crop_changed_region(bytes, is_first).0,
            None => bytes.to_vec(),
        };

        let (compressed, _) = self.compressor.compress(&staged);
        let optimized_tokens = estimate_tokens(compressed.len());

        self.stats.images_processed += 1;
        self.stats.original_tokens += original_tokens;
        self.stats.optimized_tokens += optimized_tokens;

        debug!(
            from_kb = original_size / 1024,
            to_kb = compressed.len() / 1024,
            tokens_saved = original_tokens.saturating_sub(optimized_tokens),
            "image optimized"
        );

        let meta = OptimizeMeta {
            original_size,
            final_size: compressed.len(),
            original_tokens,
            optimized_tokens,
        };
        (compressed, meta)
    }

    /// Reset per-batch state (the cropper's previous frame).
    pub fn reset(&mut self) {
        if let Some(cropper) = self.cropper.as_mut() {
            cropper.reset();
        }
    }

    pub fn stats(&self) -> OptimizerStats {
        self.stats
    }

    pub fn compress_stats(&self) -> CompressStats {
        self.compressor.stats()
    }

    pub fn importance_stats(&self) -> ImportanceStats {
        self.compressor.importance_stats()
    }

    pub fn crop_stats(&self) -> Option<CropStats> {
        self.cropper.as_ref().map(|c| c.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_images::{gradient, png_bytes};

    #[test]
    fn token_estimate_tracks_size() {
        assert_eq!(estimate_tokens(1024), 85);
        assert_eq!(estimate_tokens(0), 0);
    }

    #[test]
    fn optimize_shrinks_large_frames() {
        let mut optimizer = ImageOptimizer::new(&CompressionConfig::default());
        let bytes = png_bytes(&gradient(1920, 1080));
        let (out, meta) = optimizer.optimize(&bytes, true);
        assert!(out.len() < bytes.len());
        assert!(meta.optimized_tokens < meta.original_tokens);
        assert_eq!(optimizer.stats().images_processed, 1);
    }

    #[test]
    fn bad_input_passes_through() {
        let mut optimizer = ImageOptimizer::new(&CompressionConfig::default());
        let (out, meta) = optimizer.optimize(b"garbage", true);
        assert_eq!(out, b"garbage");
        assert_eq!(meta.final_size, meta.original_size);
    }
}
