//! Platform input abstraction. The pipeline never imports a platform
//! module; macOS/Windows/Linux hook implementations live behind
//! [`RecordSource`] and hand records over a channel.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::PerceptionError;
use crate::types::{RawRecord, RecordPayload};
use crate::window::SlidingWindow;

/// A platform input hook (keyboard, mouse, ...). Implementations run on
/// their own OS threads and push timestamped records into the sender.
pub trait RecordSource: Send + Sync {
    fn name(&self) -> &str;

    /// Begin capturing. Must not block; spawn a thread if needed.
    fn start(&self, tx: mpsc::Sender<RawRecord>) -> Result<(), PerceptionError>;

    /// Stop capturing and release platform hooks.
    fn stop(&self);
}

/// Drains records from the sources into the sliding window, applying the
/// keyboard/mouse noise filters, until shutdown.
pub async fn pump_records(
    mut rx: mpsc::Receiver<RawRecord>,
    window: Arc<SlidingWindow>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("record pump started");
    loop {
        tokio::select! {
            maybe = rx.recv() => {
                match maybe {
                    Some(record) => {
                        if admit(&record) {
                            window.add(record);
                        }
                    }
                    None => {
                        warn!("record channel closed, pump exiting");
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("record pump shutting down");
                    break;
                }
            }
        }
    }
}

/// Noise filter: plain typing and bare mouse motion never enter the window.
fn admit(record: &RawRecord) -> bool {
    let pass = match &record.payload {
        RecordPayload::Keyboard(k) => k.is_special(),
        RecordPayload::Mouse(m) => m.is_important(),
        RecordPayload::Screenshot(_) => true,
    };
    if !pass {
        debug!(kind = ?record.kind(), "record filtered as noise");
    }
    pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KeyboardEvent, MouseEvent};
    use crate::window::RecordFilter;
    use chrono::Utc;

    #[tokio::test]
    async fn pump_filters_noise_and_stops_on_shutdown() {
        let window = Arc::new(SlidingWindow::new());
        let (tx, rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(pump_records(rx, window.clone(), stop_rx));

        tx.send(RawRecord::keyboard(
            Utc::now(),
            KeyboardEvent {
                key: "Enter".to_string(),
                modifiers: vec![],
            },
        ))
        .await
        .unwrap();
        tx.send(RawRecord::keyboard(
            Utc::now(),
            KeyboardEvent {
                key: "x".to_string(),
                modifiers: vec![],
            },
        ))
        .await
        .unwrap();
        tx.send(RawRecord::mouse(
            Utc::now(),
            MouseEvent {
                action: "move".to_string(),
                x: 0,
                y: 0,
            },
        ))
        .await
        .unwrap();

        // Give the pump a moment to drain, then stop it.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        let records = window.get(&RecordFilter::default());
        assert_eq!(records.len(), 1, "only the special key should remain");
    }
}
