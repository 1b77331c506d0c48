//! Per-stage counters surfaced through `get_pipeline_stats`. Stage failures
//! bump a counter and never cross stage boundaries.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct PipelineStats {
    pub ticks: AtomicU64,
    pub scenes_extracted: AtomicU64,
    pub actions_saved: AtomicU64,
    pub actions_filtered: AtomicU64,
    pub events_created: AtomicU64,
    pub activities_created: AtomicU64,
    pub activities_overlap_merged: AtomicU64,
    pub knowledge_extracted: AtomicU64,
    pub knowledge_merged: AtomicU64,
    pub todos_extracted: AtomicU64,
    pub todos_merged: AtomicU64,
    pub diaries_generated: AtomicU64,
    pub cleanup_runs: AtomicU64,
    pub thumbnails_gc: AtomicU64,
    pub stage_failures: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub scenes_extracted: u64,
    pub actions_saved: u64,
    pub actions_filtered: u64,
    pub events_created: u64,
    pub activities_created: u64,
    pub activities_overlap_merged: u64,
    pub knowledge_extracted: u64,
    pub knowledge_merged: u64,
    pub todos_extracted: u64,
    pub todos_merged: u64,
    pub diaries_generated: u64,
    pub cleanup_runs: u64,
    pub thumbnails_gc: u64,
    pub stage_failures: u64,
}

impl PipelineStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            ticks: read(&self.ticks),
            scenes_extracted: read(&self.scenes_extracted),
            actions_saved: read(&self.actions_saved),
            actions_filtered: read(&self.actions_filtered),
            events_created: read(&self.events_created),
            activities_created: read(&self.activities_created),
            activities_overlap_merged: read(&self.activities_overlap_merged),
            knowledge_extracted: read(&self.knowledge_extracted),
            knowledge_merged: read(&self.knowledge_merged),
            todos_extracted: read(&self.todos_extracted),
            todos_merged: read(&self.todos_merged),
            diaries_generated: read(&self.diaries_generated),
            cleanup_runs: read(&self.cleanup_runs),
            thumbnails_gc: read(&self.thumbnails_gc),
            stage_failures: read(&self.stage_failures),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_into_snapshot() {
        let stats = PipelineStats::default();
        PipelineStats::bump(&stats.ticks);
        PipelineStats::add(&stats.actions_saved, 3);
        let snap = stats.snapshot();
        assert_eq!(snap.ticks, 1);
        assert_eq!(snap.actions_saved, 3);
        assert_eq!(snap.events_created, 0);
    }
}
