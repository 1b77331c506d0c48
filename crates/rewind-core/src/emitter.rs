//! Outbound notification channel to the UI host.
//!
//! The host runtime supplies one implementation at startup; the coordinator
//! and chat service capture it as a trait object. Event names and payload
//! shapes are part of the external interface and must stay stable.

use serde_json::Value;

pub const ACTIVITY_CREATED: &str = "activity-created";
pub const ACTIVITY_UPDATED: &str = "activity-updated";
pub const ACTIVITY_DELETED: &str = "activity-deleted";
pub const BULK_UPDATE_COMPLETED: &str = "bulk-update-completed";
pub const CHAT_MESSAGE_CHUNK: &str = "chat-message-chunk";
pub const AGENT_TASK_UPDATE: &str = "agent-task-update";

pub trait Emitter: Send + Sync {
    fn emit(&self, event: &str, payload: Value);
}

/// Discards everything. Used in tests and headless runs.
pub struct NullEmitter;

impl Emitter for NullEmitter {
    fn emit(&self, _event: &str, _payload: Value) {}
}

/// Buffers events in memory for test assertions.
#[derive(Default)]
pub struct RecordingEmitter {
    events: std::sync::Mutex<Vec<(String, Value)>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_named(&self, name: &str) -> Vec<Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

impl Emitter for RecordingEmitter {
    fn emit(&self, event: &str, payload: Value) {
        self.events
            .lock()
            .unwrap()
            .push((event.to_string(), payload));
    }
}
