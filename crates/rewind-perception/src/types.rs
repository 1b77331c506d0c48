use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a raw perception record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Keyboard,
    Mouse,
    Screenshot,
}

/// A timestamped raw record flowing from the platform input sources into
/// the sliding window. In-memory only; evicted after the window expires
/// unless a persisted artifact references the screenshot hash.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub timestamp: DateTime<Utc>,
    pub payload: RecordPayload,
}

impl RawRecord {
    pub fn kind(&self) -> RecordKind {
        match &self.payload {
            RecordPayload::Keyboard(_) => RecordKind::Keyboard,
            RecordPayload::Mouse(_) => RecordKind::Mouse,
            RecordPayload::Screenshot(_) => RecordKind::Screenshot,
        }
    }

    pub fn keyboard(timestamp: DateTime<Utc>, event: KeyboardEvent) -> Self {
        Self {
            timestamp,
            payload: RecordPayload::Keyboard(event),
        }
    }

    pub fn mouse(timestamp: DateTime<Utc>, event: MouseEvent) -> Self {
        Self {
            timestamp,
            payload: RecordPayload::Mouse(event),
        }
    }

    pub fn screenshot(timestamp: DateTime<Utc>, shot: ScreenshotData) -> Self {
        Self {
            timestamp,
            payload: RecordPayload::Screenshot(shot),
        }
    }

    pub fn as_screenshot(&self) -> Option<&ScreenshotData> {
        match &self.payload {
            RecordPayload::Screenshot(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RecordPayload {
    Keyboard(KeyboardEvent),
    Mouse(MouseEvent),
    Screenshot(ScreenshotData),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyboardEvent {
    /// Key name as reported by the platform hook (e.g. "Enter", "a").
    pub key: String,
    #[serde(default)]
    pub modifiers: Vec<String>,
}

impl KeyboardEvent {
    /// Only special keys are buffered; plain character keys would record
    /// everything the user types.
    pub fn is_special(&self) -> bool {
        if !self.modifiers.is_empty() {
            return true;
        }
        matches!(
            self.key.as_str(),
            "Enter"
                | "Tab"
                | "Escape"
                | "Backspace"
                | "Delete"
                | "Home"
                | "End"
                | "PageUp"
                | "PageDown"
                | "ArrowUp"
                | "ArrowDown"
                | "ArrowLeft"
                | "ArrowRight"
                | "F1"
                | "F2"
                | "F3"
                | "F4"
                | "F5"
                | "F6"
                | "F7"
                | "F8"
                | "F9"
                | "F10"
                | "F11"
                | "F12"
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MouseEvent {
    /// "click", "double_click", "right_click", "drag", "scroll", "move".
    pub action: String,
    pub x: i32,
    pub y: i32,
}

impl MouseEvent {
    /// Bare movement is noise; only deliberate interactions are buffered.
    pub fn is_important(&self) -> bool {
        self.action != "move"
    }
}

/// Screenshot payload. `bytes` holds the PNG while buffered and is purged
/// once the hash has been persisted into an artifact.
#[derive(Debug, Clone)]
pub struct ScreenshotData {
    pub hash: String,
    pub width: u32,
    pub height: u32,
    pub monitor_index: u32,
    pub bytes: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_keys_are_recognised() {
        let enter = KeyboardEvent {
            key: "Enter".to_string(),
            modifiers: vec![],
        };
        assert!(enter.is_special());

        let plain = KeyboardEvent {
            key: "a".to_string(),
            modifiers: vec![],
        };
        assert!(!plain.is_special());

        let shortcut = KeyboardEvent {
            key: "s".to_string(),
            modifiers: vec!["ctrl".to_string()],
        };
        assert!(shortcut.is_special());
    }

    #[test]
    fn mouse_moves_are_noise() {
        let mv = MouseEvent {
            action: "move".to_string(),
            x: 1,
            y: 1,
        };
        assert!(!mv.is_important());
        let click = MouseEvent {
            action: "click".to_string(),
            x: 1,
            y: 1,
        };
        assert!(click.is_important());
    }
}
