//! Screenshot capture loop. Grabs frames on a timer, drops near-duplicates
//! through the pHash gate, and buffers admitted frames with their content
//! hash so downstream stages can address them.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use rewind_vision::{content_hash, perceptual_hash, ImageCache, PhashGate};

use crate::error::PerceptionError;
use crate::types::{RawRecord, ScreenshotData};
use crate::window::SlidingWindow;

/// One captured frame from a monitor, PNG-encoded.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub monitor_index: u32,
    pub width: u32,
    pub height: u32,
    pub png_bytes: Vec<u8>,
}

/// Platform framebuffer access. Out of the pipeline's scope; swapped per OS.
pub trait ScreenGrabber: Send + Sync {
    fn grab(&self) -> Result<Vec<CapturedFrame>, PerceptionError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureStats {
    pub frames_grabbed: u64,
    pub frames_admitted: u64,
    pub frames_deduped: u64,
    pub grab_failures: u64,
}

/// Periodic capture driver. Pixel math (pHash) runs on the blocking pool so
/// the event loop never stalls on it.
pub struct CaptureLoop {
    grabber: Arc<dyn ScreenGrabber>,
    window: Arc<SlidingWindow>,
    cache: Arc<ImageCache>,
    interval_ms: u64,
    phash_threshold: u32,
}

impl CaptureLoop {
    pub fn new(
        grabber: Arc<dyn ScreenGrabber>,
        window: Arc<SlidingWindow>,
        cache: Arc<ImageCache>,
        interval_ms: u64,
        phash_threshold: u32,
    ) -> Self {
        Self {
            grabber,
            window,
            cache,
            interval_ms,
            phash_threshold,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> CaptureStats {
        info!(interval_ms = self.interval_ms, "screenshot capture started");
        let mut gate = PhashGate::new(self.phash_threshold);
        let mut stats = CaptureStats::default();
        let mut interval =
            tokio::time::interval(std::time::Duration::from_millis(self.interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(&mut gate, &mut stats).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("screenshot capture shutting down");
                        break;
                    }
                }
            }
        }
        stats
    }

    async fn tick(&self, gate: &mut PhashGate, stats: &mut CaptureStats) {
        let frames = match self.grabber.grab() {
            Ok(frames) => frames,
            Err(e) => {
                stats.grab_failures += 1;
                error!("screen grab failed: {e}");
                return;
            }
        };

        for frame in frames {
            stats.frames_grabbed += 1;
            let bytes = frame.png_bytes;

            // pHash on the blocking pool: decode + downsample is pixel math.
            let hash_result =
                tokio::task::spawn_blocking(move || {
                    let phash = perceptual_hash(&bytes)?;
                    let hash = content_hash(&bytes);
                    Ok::<_, rewind_vision::VisionError>((phash, hash, bytes))
                })
                .await;

            let (phash, hash, bytes) = match hash_result {
                Ok(Ok(t)) => t,
                Ok(Err(e)) => {
                    stats.grab_failures += 1;
                    error!("frame hashing failed: {e}");
                    continue;
                }
                Err(e) => {
                    stats.grab_failures += 1;
                    error!("frame hashing task panicked: {e}");
                    continue;
                }
            };

            if !gate.admit(phash) {
                stats.frames_deduped += 1;
                debug!(hash = %&hash[..8.min(hash.len())], "near-duplicate frame dropped");
                continue;
            }

            stats.frames_admitted += 1;
            self.cache.put(hash.clone(), bytes.clone());
            self.window.add(RawRecord::screenshot(
                chrono::Utc::now(),
                ScreenshotData {
                    hash,
                    width: frame.width,
                    height: frame.height,
                    monitor_index: frame.monitor_index,
                    bytes: Some(bytes),
                },
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::RecordFilter;
    use crate::types::RecordKind;
    use std::sync::Mutex;

    /// Grabber that returns the same synthetic frame every time.
    struct StaticGrabber {
        frames: Mutex<Vec<Vec<u8>>>,
    }

    impl ScreenGrabber for StaticGrabber {
        fn grab(&self) -> Result<Vec<CapturedFrame>, PerceptionError> {
            let mut frames = self.frames.lock().unwrap();
            match frames.pop() {
                Some(png_bytes) => Ok(vec![CapturedFrame {
                    monitor_index: 0,
                    width: 64,
                    height: 64,
                    png_bytes,
                }]),
                None => Ok(vec![]),
            }
        }
    }

    fn png(rgb: [u8; 3]) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(64, 64, image::Rgb(rgb));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn duplicate_frames_are_deduped() {
        // Ten byte-identical frames, newest popped first.
        let frames: Vec<Vec<u8>> = (0..10).map(|_| png([40, 90, 200])).collect();
        let grabber = Arc::new(StaticGrabber {
            frames: Mutex::new(frames),
        });
        let window = Arc::new(SlidingWindow::new());
        let cache = Arc::new(ImageCache::new(16));

        let capture = CaptureLoop::new(grabber, window.clone(), cache.clone(), 1, 6);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(capture.run(stop_rx));
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        stop_tx.send(true).unwrap();
        let stats = handle.await.unwrap();

        assert_eq!(stats.frames_admitted, 1, "only the first frame is new");
        assert_eq!(stats.frames_deduped, 9);

        let shots = window.get(&RecordFilter {
            kind: Some(RecordKind::Screenshot),
            ..Default::default()
        });
        assert_eq!(shots.len(), 1);
        let shot = shots[0].as_screenshot().unwrap();
        assert!(cache.get(&shot.hash).is_some(), "admitted frame is cached");
    }
}
