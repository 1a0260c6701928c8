use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value;
use tracing::debug;

use crate::dispatch::{cached, FieldCall, FieldOutcome, Registry, RegistryCell};
use crate::error::PipelineResult;
use crate::types::{Context, Item};

use super::{dispatch, Handlers, Processor, Selector};

/// Where an [`Assigner`] gets its value.
#[derive(Clone)]
pub enum ValueSource {
    Literal(Value),
    Computed(Arc<dyn Fn(&Item, &Context) -> PipelineResult<Value> + Send + Sync>),
    /// A value method registered on the owning importer, resolved at invocation time.
    Method(String),
}

impl fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
            Self::Method(name) => f.debug_tuple("Method").field(name).finish(),
        }
    }
}

/// Unconditionally writes a value at every selected field.
///
/// With [`Assigner::cached`] the value is computed for the first item only and reused for the
/// rest of the processor's lifetime (useful for lookups that are identical for every item).
#[derive(Debug)]
pub struct Assigner {
    selector: Selector,
    source: ValueSource,
    cache: bool,
    memo: OnceLock<Value>,
}

impl Assigner {
    pub fn new(selector: impl Into<Selector>, value: impl Into<Value>) -> Self {
        Self::from_source(selector, ValueSource::Literal(value.into()))
    }

    pub fn computed(
        selector: impl Into<Selector>,
        value: impl Fn(&Item, &Context) -> PipelineResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self::from_source(selector, ValueSource::Computed(Arc::new(value)))
    }

    /// Assign the result of the importer's value method `name`.
    pub fn method(selector: impl Into<Selector>, name: impl Into<String>) -> Self {
        Self::from_source(selector, ValueSource::Method(name.into()))
    }

    pub fn from_source(selector: impl Into<Selector>, source: ValueSource) -> Self {
        Self {
            selector: selector.into(),
            source,
            cache: false,
            memo: OnceLock::new(),
        }
    }

    /// Memoize the first computed value.
    pub fn cached(mut self) -> Self {
        self.cache = true;
        self
    }

    fn value_for(&self, item: &Item, ctx: &Context) -> PipelineResult<Value> {
        if self.cache {
            if let Some(v) = self.memo.get() {
                return Ok(v.clone());
            }
        }
        let value = match &self.source {
            ValueSource::Literal(v) => v.clone(),
            ValueSource::Computed(f) => f(item, ctx)?,
            ValueSource::Method(name) => ctx.value_method(name)?(item, ctx)?,
        };
        if self.cache {
            let _ = self.memo.set(value.clone());
        }
        Ok(value)
    }

    fn assign(&self, call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
        if call.exists {
            debug!(field = %call.field, previous = %call.value, "assigner overrides an existing value");
        }
        Ok(FieldOutcome::Value(self.value_for(call.item, call.ctx)?))
    }
}

impl Processor for Assigner {
    fn name(&self) -> &str {
        "assigner"
    }

    fn process(&self, item: Item, ctx: &mut Context) -> PipelineResult<Item> {
        dispatch(self, item, ctx)
    }
}

impl Handlers for Assigner {
    fn registry() -> PipelineResult<&'static Registry<Self>> {
        static REGISTRY: RegistryCell<Assigner> = OnceLock::new();
        cached(&REGISTRY, || Registry::builder().any_field("assign", Self::assign).build())
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }
}
