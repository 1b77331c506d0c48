//! Perception layer: raw record types, the 20-second sliding window, the
//! platform source abstraction, and the pHash-gated screenshot capture loop.

pub mod capture;
pub mod error;
pub mod source;
pub mod types;
pub mod window;

pub use capture::{CaptureLoop, CapturedFrame, ScreenGrabber};
pub use error::PerceptionError;
pub use source::{pump_records, RecordSource};
pub use types::{KeyboardEvent, MouseEvent, RawRecord, RecordKind, RecordPayload, ScreenshotData};
pub use window::{RecordFilter, SlidingWindow};
