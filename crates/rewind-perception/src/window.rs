//! The 20-second sliding window of raw records. The single handoff point
//! between the platform input sources and the processing pipeline.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use rewind_core::config::{WINDOW_SECONDS, WINDOW_SWEEP_SECONDS};

use crate::types::{RawRecord, RecordKind};

/// Filter for window reads. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub kind: Option<RecordKind>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct WindowStats {
    pub total_records: usize,
    pub keyboard: usize,
    pub mouse: usize,
    pub screenshots: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

struct WindowState {
    records: VecDeque<RawRecord>,
    last_sweep: DateTime<Utc>,
}

/// Thread-safe sliding window. All mutation is under one mutex; readers
/// receive snapshot clones, never references into the deque.
pub struct SlidingWindow {
    window: Duration,
    state: Mutex<WindowState>,
}

impl SlidingWindow {
    pub fn new() -> Self {
        Self::with_window_seconds(WINDOW_SECONDS)
    }

    pub fn with_window_seconds(seconds: i64) -> Self {
        Self {
            window: Duration::seconds(seconds),
            state: Mutex::new(WindowState {
                records: VecDeque::new(),
                last_sweep: Utc::now(),
            }),
        }
    }

    /// Append a record. Sweeps expired records from the head at most once
    /// per sweep interval.
    pub fn add(&self, record: RawRecord) {
        let mut state = self.state.lock().unwrap();
        state.records.push_back(record);

        let now = Utc::now();
        let since_sweep = now - state.last_sweep;
        if since_sweep.num_milliseconds() as f64 / 1000.0 >= WINDOW_SWEEP_SECONDS {
            let cutoff = now - self.window;
            let before = state.records.len();
            while state
                .records
                .front()
                .is_some_and(|r| r.timestamp < cutoff)
            {
                state.records.pop_front();
            }
            let dropped = before - state.records.len();
            if dropped > 0 {
                debug!(dropped, remaining = state.records.len(), "window swept");
            }
            state.last_sweep = now;
        }
    }

    /// Snapshot of records matching the filter, in insertion order.
    pub fn get(&self, filter: &RecordFilter) -> Vec<RawRecord> {
        let state = self.state.lock().unwrap();
        state
            .records
            .iter()
            .filter(|r| {
                filter.kind.map_or(true, |k| r.kind() == k)
                    && filter.start.map_or(true, |s| r.timestamp >= s)
                    && filter.end.map_or(true, |e| r.timestamp <= e)
            })
            .cloned()
            .collect()
    }

    /// The newest `n` records, oldest of them first.
    pub fn get_latest(&self, n: usize) -> Vec<RawRecord> {
        let state = self.state.lock().unwrap();
        let skip = state.records.len().saturating_sub(n);
        state.records.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.records.clear();
        debug!("window cleared");
    }

    /// Drop buffered screenshot bytes for hashes that are now persisted.
    /// The records stay in the window for timestamp context.
    pub fn purge_screenshot_bytes(&self, hashes: &[String]) {
        let mut state = self.state.lock().unwrap();
        for record in state.records.iter_mut() {
            if let crate::types::RecordPayload::Screenshot(shot) = &mut record.payload {
                if shot.bytes.is_some() && hashes.contains(&shot.hash) {
                    shot.bytes = None;
                }
            }
        }
    }

    pub fn stats(&self) -> WindowStats {
        let state = self.state.lock().unwrap();
        let mut stats = WindowStats {
            total_records: state.records.len(),
            oldest: state.records.front().map(|r| r.timestamp),
            newest: state.records.back().map(|r| r.timestamp),
            ..Default::default()
        };
        for r in &state.records {
            match r.kind() {
                RecordKind::Keyboard => stats.keyboard += 1,
                RecordKind::Mouse => stats.mouse += 1,
                RecordKind::Screenshot => stats.screenshots += 1,
            }
        }
        stats
    }
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KeyboardEvent, ScreenshotData};

    fn key_record(at: DateTime<Utc>) -> RawRecord {
        RawRecord::keyboard(
            at,
            KeyboardEvent {
                key: "Enter".to_string(),
                modifiers: vec![],
            },
        )
    }

    fn shot_record(at: DateTime<Utc>, hash: &str) -> RawRecord {
        RawRecord::screenshot(
            at,
            ScreenshotData {
                hash: hash.to_string(),
                width: 100,
                height: 100,
                monitor_index: 0,
                bytes: Some(vec![1, 2, 3]),
            },
        )
    }

    #[test]
    fn filter_by_kind_and_time() {
        let window = SlidingWindow::new();
        let now = Utc::now();
        window.add(key_record(now - Duration::seconds(10)));
        window.add(shot_record(now - Duration::seconds(5), "h1"));
        window.add(key_record(now));

        let shots = window.get(&RecordFilter {
            kind: Some(RecordKind::Screenshot),
            ..Default::default()
        });
        assert_eq!(shots.len(), 1);

        let recent = window.get(&RecordFilter {
            start: Some(now - Duration::seconds(6)),
            ..Default::default()
        });
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn expired_records_are_swept_on_add() {
        let window = SlidingWindow::new();
        let now = Utc::now();
        // Stale record well past the 20 s window.
        window.add(key_record(now - Duration::seconds(60)));

        // Force the sweep timer to fire by backdating last_sweep.
        {
            let mut state = window.state.lock().unwrap();
            state.last_sweep = now - Duration::seconds(30);
        }
        window.add(key_record(now));

        let all = window.get(&RecordFilter::default());
        assert_eq!(all.len(), 1);
        assert!(all[0].timestamp >= now - Duration::seconds(20));
    }

    #[test]
    fn get_latest_returns_tail_in_order() {
        let window = SlidingWindow::new();
        let now = Utc::now();
        for i in 0..5 {
            window.add(key_record(now + Duration::milliseconds(i)));
        }
        let latest = window.get_latest(2);
        assert_eq!(latest.len(), 2);
        assert!(latest[0].timestamp < latest[1].timestamp);
    }

    #[test]
    fn purge_drops_bytes_but_keeps_record() {
        let window = SlidingWindow::new();
        let now = Utc::now();
        window.add(shot_record(now, "h1"));
        window.purge_screenshot_bytes(&["h1".to_string()]);

        let shots = window.get(&RecordFilter {
            kind: Some(RecordKind::Screenshot),
            ..Default::default()
        });
        assert_eq!(shots.len(), 1);
        assert!(shots[0].as_screenshot().unwrap().bytes.is_none());
    }

    #[test]
    fn clear_empties_window() {
        let window = SlidingWindow::new();
        window.add(key_record(Utc::now()));
        window.clear();
        assert_eq!(window.stats().total_records, 0);
    }
}
