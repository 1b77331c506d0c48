use chrono::{DateTime, Utc};
use serde::Serialize;

use rewind_perception::RawRecord;

/// In-memory structured description of one screenshot, produced by the
/// scene agent and consumed by the text-only agents within the same tick.
/// Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Scene {
    pub screenshot_index: usize,
    pub screenshot_hash: String,
    pub timestamp: DateTime<Utc>,
    pub visual_summary: String,
    pub detected_text: String,
    pub ui_elements: String,
    pub application_context: String,
    pub inferred_activity: String,
    pub focus_areas: String,
}

/// Input to action extraction. Scene-based is the normal path; the
/// screenshot path is the fallback when scene extraction yielded nothing.
pub enum ActionExtractionInput<'a> {
    FromScenes(&'a [Scene]),
    FromScreenshots(&'a [RawRecord]),
}
