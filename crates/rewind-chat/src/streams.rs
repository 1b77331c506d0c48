//! Per-conversation stream isolation: at most one in-flight response task
//! per conversation; resubmission cancels the previous task; different
//! conversations never interact.

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct StreamSlot {
    generation: u64,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct ChatStreamManager {
    active: DashMap<String, StreamSlot>,
    next_generation: std::sync::atomic::AtomicU64,
}

impl ChatStreamManager {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
            next_generation: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Reserve the stream slot for a conversation, cancelling any task
    /// already in flight. Returns the cancel receiver for the new task and
    /// the generation token to pass back into [`finish`].
    pub fn begin(&self, conversation_id: &str) -> (watch::Receiver<bool>, u64) {
        let generation = self
            .next_generation
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        if let Some(previous) = self.active.insert(
            conversation_id.to_string(),
            StreamSlot {
                generation,
                cancel: cancel_tx,
                handle: tokio::spawn(async {}), // placeholder until attach()
            },
        ) {
            if !previous.handle.is_finished() {
                warn!(conversation_id, "cancelling in-flight chat stream");
                // The task finalizes itself (error message + terminal
                // chunk) when it observes the signal.
                let _ = previous.cancel.send(true);
            }
        }
        (cancel_rx, generation)
    }

    /// Attach the spawned task handle to the slot reserved by [`begin`].
    pub fn attach(&self, conversation_id: &str, generation: u64, handle: JoinHandle<()>) {
        if let Some(mut slot) = self.active.get_mut(conversation_id) {
            if slot.generation == generation {
                slot.handle = handle;
            }
        }
    }

    /// Called by a task when it finishes. Only removes the slot when it is
    /// still this task's: a newer stream must not be evicted.
    pub fn finish(&self, conversation_id: &str, generation: u64) {
        let owned = self
            .active
            .get(conversation_id)
            .map(|slot| slot.generation == generation)
            .unwrap_or(false);
        if owned {
            self.active.remove(conversation_id);
            debug!(conversation_id, "chat stream slot released");
        }
    }

    /// Cancel a conversation's in-flight stream, if any.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        match self.active.get(conversation_id) {
            Some(slot) if !slot.handle.is_finished() => {
                let _ = slot.cancel.send(true);
                true
            }
            _ => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active
            .iter()
            .filter(|slot| !slot.handle.is_finished())
            .count()
    }
}

impl Default for ChatStreamManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn begin_cancels_previous_stream() {
        let manager = ChatStreamManager::new();
        let (mut cancel_rx, gen1) = manager.begin("c1");

        let task = tokio::spawn(async move {
            cancel_rx.changed().await.ok();
            *cancel_rx.borrow()
        });
        manager.attach("c1", gen1, tokio::spawn(async {}));

        // Second begin for the same conversation fires the first cancel.
        let (_rx2, _gen2) = manager.begin("c1");
        assert!(task.await.unwrap(), "first stream saw the cancel signal");
    }

    #[tokio::test]
    async fn distinct_conversations_are_independent() {
        let manager = ChatStreamManager::new();
        let (rx1, _g1) = manager.begin("c1");
        let (_rx2, _g2) = manager.begin("c2");
        // c2's begin must not cancel c1.
        assert!(!*rx1.borrow());
    }

    #[tokio::test]
    async fn finish_only_removes_own_generation() {
        let manager = ChatStreamManager::new();
        let (_rx1, gen1) = manager.begin("c1");
        let (_rx2, gen2) = manager.begin("c1");

        // The stale task finishing must not evict the new slot.
        manager.finish("c1", gen1);
        assert!(manager.active.contains_key("c1"));

        manager.finish("c1", gen2);
        assert!(!manager.active.contains_key("c1"));
    }
}
