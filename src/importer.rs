//! Importers: a named pipeline plus the methods its steps can refer to by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, info_span};

use crate::error::PipelineResult;
use crate::pipeline::{Emit, Pipeline, PipelineMetrics, PipelineObserver, PipelineOptions, RunSummary, Step};
use crate::types::{Context, Item};

/// A named pipeline method, invoked like any other action.
pub type ActionFn = Arc<dyn Fn(Item, &mut Context) -> PipelineResult<Emit<'static>> + Send + Sync>;

/// A named value method, used by value sources such as [`crate::processor::Assigner::method`].
pub type ValueFn = Arc<dyn Fn(&Item, &Context) -> PipelineResult<Value> + Send + Sync>;

/// Method table of an importer.
#[derive(Clone, Default)]
pub struct Methods {
    actions: HashMap<String, ActionFn>,
    values: HashMap<String, ValueFn>,
}

impl Methods {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method usable as [`Step::Method`].
    pub fn with_action(
        mut self,
        name: impl Into<String>,
        method: impl Fn(Item, &mut Context) -> PipelineResult<Emit<'static>> + Send + Sync + 'static,
    ) -> Self {
        self.actions.insert(name.into(), Arc::new(method));
        self
    }

    /// Register a method producing a value from the current item.
    pub fn with_value(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&Item, &Context) -> PipelineResult<Value> + Send + Sync + 'static,
    ) -> Self {
        self.values.insert(name.into(), Arc::new(method));
        self
    }

    pub fn action(&self, name: &str) -> Option<ActionFn> {
        self.actions.get(name).cloned()
    }

    pub fn value(&self, name: &str) -> Option<ValueFn> {
        self.values.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.actions.len() + self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Methods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<_> = self.actions.keys().collect();
        let mut values: Vec<_> = self.values.keys().collect();
        actions.sort();
        values.sort();
        f.debug_struct("Methods")
            .field("actions", &actions)
            .field("values", &values)
            .finish()
    }
}

/// A named import job.
#[derive(Debug)]
pub struct Importer {
    name: String,
    pipeline: Pipeline,
}

impl Importer {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            pipeline: Pipeline::new(steps),
        }
    }

    pub fn methods(mut self, methods: Methods) -> Self {
        self.pipeline = self.pipeline.with_methods(Arc::new(methods));
        self
    }

    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.pipeline = self.pipeline.with_options(options);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.pipeline = self.pipeline.with_observer(observer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.pipeline.metrics()
    }

    pub fn run(&self) -> PipelineResult<RunSummary> {
        let _span = info_span!("importer", name = %self.name).entered();
        info!("import started");
        let summary = self.pipeline.run()?;
        info!(%summary, "import finished");
        Ok(summary)
    }
}
