//! Thumbnail persistence. Screenshots referenced by an action are stored as
//! a bounded JPEG under `<data_dir>/screenshots/<hash[..2]>/<hash>.jpg`;
//! originals are never written to disk.

use std::path::{Path, PathBuf};

use tracing::debug;

use rewind_core::config::{THUMBNAIL_JPEG_QUALITY, THUMBNAIL_MAX_DIM};
use rewind_core::paths::thumbnail_path;

use crate::error::{Result, VisionError};

#[derive(Debug, Clone)]
pub struct ThumbnailMeta {
    pub hash: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
}

pub struct ThumbnailStore {
    root: PathBuf,
}

impl ThumbnailStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the thumbnail for a screenshot. Downscales to fit 600px,
    /// re-encodes as JPEG q70. Overwrites any existing file for the hash.
    pub fn save(&self, hash: &str, image_bytes: &[u8]) -> Result<ThumbnailMeta> {
        let img = image::load_from_memory(image_bytes)
            .map_err(|e| VisionError::Decode(e.to_string()))?;

        let img = if img.width() > THUMBNAIL_MAX_DIM || img.height() > THUMBNAIL_MAX_DIM {
            img.resize(
                THUMBNAIL_MAX_DIM,
                THUMBNAIL_MAX_DIM,
                image::imageops::FilterType::Lanczos3,
            )
        } else {
            img
        };

        let rgb = img.to_rgb8();
        let mut out = std::io::Cursor::new(Vec::new());
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
            &mut out,
            THUMBNAIL_JPEG_QUALITY,
        );
        encoder
            .encode_image(&rgb)
            .map_err(|e| VisionError::Encode(e.to_string()))?;
        let jpeg = out.into_inner();

        let path = thumbnail_path(&self.root, hash);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &jpeg)?;
        debug!(hash, path = %path.display(), bytes = jpeg.len(), "thumbnail written");

        Ok(ThumbnailMeta {
            hash: hash.to_string(),
            path,
            width: rgb.width(),
            height: rgb.height(),
            bytes: jpeg.len() as u64,
        })
    }

    pub fn load(&self, hash: &str) -> Option<Vec<u8>> {
        std::fs::read(thumbnail_path(&self.root, hash)).ok()
    }

    pub fn exists(&self, hash: &str) -> bool {
        thumbnail_path(&self.root, hash).is_file()
    }

    pub fn remove(&self, hash: &str) -> Result<()> {
        let path = thumbnail_path(&self.root, hash);
        if path.is_file() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phash::content_hash;
    use crate::test_images::{gradient, png_bytes};

    #[test]
    fn save_writes_bounded_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThumbnailStore::new(dir.path());
        let bytes = png_bytes(&gradient(1920, 1080));
        let hash = content_hash(&bytes);

        let meta = store.save(&hash, &bytes).unwrap();
        assert!(meta.width <= 600 && meta.height <= 600);
        assert!(store.exists(&hash));

        let loaded = store.load(&hash).unwrap();
        assert_eq!(
            image::guess_format(&loaded).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThumbnailStore::new(dir.path());
        let bytes = png_bytes(&gradient(200, 200));
        let hash = content_hash(&bytes);
        store.save(&hash, &bytes).unwrap();

        store.remove(&hash).unwrap();
        assert!(!store.exists(&hash));
        store.remove(&hash).unwrap();
    }
}
