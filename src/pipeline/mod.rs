//! Pipeline executor.
//!
//! A pipeline is a list of [`Step`]s. Leaf steps are [`Action`]s (or importer methods looked
//! up by name); a [`Step::Branch`] holds a nested list run against copies of the current item
//! and context. Execution is single-threaded and depth-first:
//!
//! - the run starts with an empty item, so the first action is usually a producer;
//! - whatever an action emits continues through the remaining steps one item at a time, each
//!   with its own copy of the context;
//! - an item that gets past the last root step counts as processed;
//! - a drop signal (see [`PipelineError::is_drop`]) abandons only the current item and counts
//!   it as dropped; any other error aborts the run.
//!
//! ```rust
//! use item_pipeline::expression::field;
//! use item_pipeline::io::ListFeeder;
//! use item_pipeline::pipeline::{Pipeline, Step};
//! use item_pipeline::processor::{Assigner, Dropper, Selector};
//! use serde_json::json;
//!
//! let pipeline = Pipeline::new(vec![
//!     Step::action(ListFeeder::from_values(vec![json!({"symbol": "BHP"}), json!({"symbol": ""})]).unwrap()),
//!     Step::action(Dropper::new(Selector::item(), field("symbol").equals(""))),
//!     Step::action(Assigner::new(field("exchange"), "ASX")),
//! ]);
//! let summary = pipeline.run().unwrap();
//! assert_eq!((summary.processed, summary.dropped), (1, 1));
//! ```

mod observer;
mod options;
mod step;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use crate::error::{PipelineError, PipelineResult};
use crate::importer::Methods;
use crate::types::{Context, Item};

pub use observer::{PipelineEvent, PipelineMetrics, PipelineMetricsSnapshot, PipelineObserver, TracingObserver};
pub use options::PipelineOptions;
pub use step::{Action, Emit, FnAction, ItemStream, Step};

/// Final counts of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Items that went through the whole root sequence.
    pub processed: u64,
    /// Drop signals recovered anywhere in the tree.
    pub dropped: u64,
    /// Number of passes over the root producer (more than one in polling mode).
    pub runs: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={}, dropped={}, runs={}",
            self.processed, self.dropped, self.runs
        )
    }
}

/// An executable tree of steps.
pub struct Pipeline {
    steps: Vec<Step>,
    options: PipelineOptions,
    methods: Arc<Methods>,
    observer: Option<Arc<dyn PipelineObserver>>,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            options: PipelineOptions::default(),
            methods: Arc::new(Methods::default()),
            observer: None,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Table used to resolve [`Step::Method`] steps and importer value methods.
    pub fn with_methods(mut self, methods: Arc<Methods>) -> Self {
        self.methods = methods;
        self
    }

    /// Attach an observer for pipeline events (metrics/logging).
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get a handle to real-time metrics.
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run until the root producer is exhausted (or, in polling mode, until `max_restarts`).
    pub fn run(&self) -> PipelineResult<RunSummary> {
        let mut runs = 0u64;
        loop {
            let start = Instant::now();
            let run = self.metrics.begin_run();
            runs += 1;
            self.emit(PipelineEvent::RunStarted { run });
            debug!(run, "pipeline run started");

            let ctx = Context::with_methods(Arc::clone(&self.methods)).strict(self.options.strict_paths);
            if let Err(e) = self.run_steps(&self.steps, Item::new(), ctx, 0) {
                self.metrics.end_run(start.elapsed());
                let metrics = self.metrics.snapshot();
                error!(
                    run,
                    processed = metrics.items_processed,
                    dropped = metrics.items_dropped,
                    severity = ?e.severity(),
                    error = %e,
                    "pipeline aborted"
                );
                self.emit(PipelineEvent::RunAborted {
                    run,
                    error: e.to_string(),
                    metrics,
                });
                return Err(e);
            }

            self.metrics.end_run(start.elapsed());
            let metrics = self.metrics.snapshot();
            info!(
                run,
                processed = metrics.items_processed,
                dropped = metrics.items_dropped,
                "pipeline run finished"
            );
            self.emit(PipelineEvent::RunFinished {
                run,
                elapsed: start.elapsed(),
                metrics,
            });

            if self.options.close_when_idle {
                break;
            }
            if self.options.max_restarts.is_some_and(|max| runs > max) {
                debug!(runs, "restart limit reached");
                break;
            }
            self.emit(PipelineEvent::Idle {
                sleep: self.options.idle_sleep,
            });
            debug!(sleep = ?self.options.idle_sleep, "pipeline idle; restarting");
            std::thread::sleep(self.options.idle_sleep);
        }

        let metrics = self.metrics.snapshot();
        Ok(RunSummary {
            processed: metrics.items_processed,
            dropped: metrics.items_dropped,
            runs,
        })
    }

    /// Feed one item through `steps`. `depth` is 0 on the root sequence.
    fn run_steps(&self, steps: &[Step], item: Item, mut ctx: Context, depth: usize) -> PipelineResult<()> {
        let Some((step, rest)) = steps.split_first() else {
            if depth == 0 {
                self.metrics.on_item_processed();
                self.emit(PipelineEvent::ItemProcessed);
            }
            return Ok(());
        };

        match step {
            Step::Branch(sub) => {
                self.metrics.on_branch();
                self.emit(PipelineEvent::BranchEntered { depth: depth + 1 });
                self.run_steps(sub, item.clone(), ctx.clone(), depth + 1)?;
                self.run_steps(rest, item, ctx, depth)
            }
            Step::Action(action) => {
                self.metrics.on_action();
                let emitted = action.call(item, &mut ctx);
                self.forward(action.name(), emitted, rest, ctx, depth)
            }
            Step::Method(name) => {
                let method = ctx.method(name)?;
                self.metrics.on_action();
                let emitted = method(item, &mut ctx);
                self.forward(name, emitted, rest, ctx, depth)
            }
        }
    }

    /// Send whatever an action emitted on to the remaining steps.
    fn forward(
        &self,
        action: &str,
        emitted: PipelineResult<Emit<'_>>,
        rest: &[Step],
        ctx: Context,
        depth: usize,
    ) -> PipelineResult<()> {
        let emitted = match emitted {
            Ok(emitted) => emitted,
            Err(e) => return self.recover(action, e),
        };

        match emitted {
            Emit::Nothing => Ok(()),
            Emit::One(item) => self.run_steps(rest, item, ctx, depth),
            Emit::Many(items) => {
                for item in items {
                    self.run_steps(rest, item, ctx.clone(), depth)?;
                }
                Ok(())
            }
            Emit::Stream(stream) => {
                for next in stream {
                    match next {
                        Ok(Some(item)) => self.run_steps(rest, item, ctx.clone(), depth)?,
                        Ok(None) => {}
                        Err(e) => self.recover(action, e)?,
                    }
                }
                Ok(())
            }
        }
    }

    /// Count and log a drop signal; anything else is returned as fatal.
    fn recover(&self, action: &str, error: PipelineError) -> PipelineResult<()> {
        if !error.is_drop() {
            return Err(error);
        }
        self.metrics.on_item_dropped();
        info!(action, severity = ?error.severity(), reason = %error, "item dropped");
        self.emit(PipelineEvent::ItemDropped {
            action: action.to_string(),
            reason: error.to_string(),
        });
        Ok(())
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.steps)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
