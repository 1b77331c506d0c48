//! Image processing for the Rewind pipeline: perceptual-hash dedup,
//! content-importance classification, dynamic JPEG compression, changed
//! region cropping, an LRU byte cache, and thumbnail persistence.

pub mod cache;
pub mod compress;
pub mod crop;
pub mod error;
pub mod importance;
pub mod optimizer;
pub mod phash;
pub mod thumbs;

pub use cache::ImageCache;
pub use compress::{CompressionLevel, DynamicCompressor};
pub use crop::RegionCropper;
pub use error::VisionError;
pub use importance::{Importance, ImportanceAnalyzer};
pub use optimizer::{estimate_tokens, ImageOptimizer};
pub use phash::{content_hash, hamming_distance, perceptual_hash, PhashGate};
pub use thumbs::ThumbnailStore;

/// Encode raw image bytes as a JPEG data URL for multimodal LLM messages.
pub fn to_data_url(jpeg_bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
    format!("data:image/jpeg;base64,{}", B64.encode(jpeg_bytes))
}

#[cfg(test)]
pub(crate) mod test_images {
    //! Synthetic images for the in-crate tests.

    use image::{Rgb, RgbImage};

    pub fn solid(w: u32, h: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb(rgb))
    }

    pub fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            Rgb([
                (x * 255 / w.max(1)) as u8,
                (y * 255 / h.max(1)) as u8,
                ((x + y) % 256) as u8,
            ])
        })
    }

    pub fn checkerboard(w: u32, h: u32, cell: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    pub fn png_bytes(img: &RgbImage) -> Vec<u8> {
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn data_url_has_jpeg_prefix() {
        let url = crate::to_data_url(&[1, 2, 3]);
        assert!(url.starts_with("data:image/jpeg;base64,"));
    }
}
