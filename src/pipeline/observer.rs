use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::debug;

/// Events emitted by [`super::Pipeline::run`].
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    RunStarted { run: u64 },
    /// An item reached the end of the root sequence.
    ItemProcessed,
    ItemDropped { action: String, reason: String },
    BranchEntered { depth: usize },
    /// The root producer is exhausted and the pipeline sleeps before restarting.
    Idle { sleep: Duration },
    RunFinished {
        run: u64,
        elapsed: Duration,
        metrics: PipelineMetricsSnapshot,
    },
    RunAborted {
        run: u64,
        error: String,
        metrics: PipelineMetricsSnapshot,
    },
}

/// Observer hook for pipeline events.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Forwards every event to `tracing` at debug level.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        debug!(?event, "pipeline event");
    }
}

/// Live counters of a pipeline.
///
/// Counters accumulate across idle restarts; only `run_id` and `elapsed` describe the latest run.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    run_id: AtomicU64,
    elapsed_ns: AtomicU64,

    items_processed: AtomicU64,
    items_dropped: AtomicU64,
    actions_invoked: AtomicU64,
    branches_entered: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new run and return its id (1-based).
    pub fn begin_run(&self) -> u64 {
        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.run_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns
            .store(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    pub fn on_item_processed(&self) {
        let _ = self.items_processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_item_dropped(&self) {
        let _ = self.items_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_action(&self) {
        let _ = self.actions_invoked.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_branch(&self) {
        let _ = self.branches_entered.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        let elapsed = if elapsed_ns > 0 {
            Some(Duration::from_nanos(elapsed_ns))
        } else {
            None
        };

        PipelineMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed,
            items_processed: self.items_processed.load(Ordering::SeqCst),
            items_dropped: self.items_dropped.load(Ordering::SeqCst),
            actions_invoked: self.actions_invoked.load(Ordering::SeqCst),
            branches_entered: self.branches_entered.load(Ordering::SeqCst),
        }
    }
}

/// Immutable snapshot of [`PipelineMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    pub items_processed: u64,
    pub items_dropped: u64,
    pub actions_invoked: u64,
    pub branches_entered: u64,
}

impl fmt::Display for PipelineMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, processed={}, dropped={}, actions={}, branches={}, elapsed={:?}",
            self.run_id,
            self.items_processed,
            self.items_dropped,
            self.actions_invoked,
            self.branches_entered,
            self.elapsed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineMetrics;
    use std::time::Duration;

    #[test]
    fn counters_survive_new_runs() {
        let m = PipelineMetrics::new();
        assert_eq!(m.begin_run(), 1);
        m.on_item_processed();
        m.on_item_dropped();
        m.end_run(Duration::from_millis(5));
        assert_eq!(m.begin_run(), 2);
        m.on_item_processed();

        let snap = m.snapshot();
        assert_eq!(snap.run_id, 2);
        assert_eq!(snap.items_processed, 2);
        assert_eq!(snap.items_dropped, 1);
        assert_eq!(snap.elapsed, None);
        assert!(snap.to_string().starts_with("run_id=2, processed=2, dropped=1"));
    }
}
