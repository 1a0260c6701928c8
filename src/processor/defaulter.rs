use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::{Map, Value};

use crate::dispatch::{cached, FieldCall, FieldOutcome, Registry, RegistryCell};
use crate::error::{PipelineError, PipelineResult};
use crate::types::{Context, Item, Shape};

use super::{dispatch, Handlers, Processor, Selector};

/// Where default values come from.
#[derive(Clone)]
pub enum DefaultSource {
    Static(Value),
    /// Resolved against the current item for every invocation.
    Computed(Arc<dyn Fn(&Item, &Context) -> Value + Send + Sync>),
}

impl fmt::Debug for DefaultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(v) => f.debug_tuple("Static").field(v).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Sets values only where the current value is missing or `null`.
///
/// - Item-scoped: the defaults must be an object; each of its keys is set on the item when
///   absent or `null`. Other falsy values (`false`, `0`, `""`) are kept.
/// - Dict field: missing keys are merged in (recursively with [`Defaulter::deep`]).
/// - Any other field: the default replaces a missing or `null` value.
#[derive(Debug, Clone)]
pub struct Defaulter {
    selector: Selector,
    source: DefaultSource,
    deep: bool,
}

impl Defaulter {
    pub fn new(selector: impl Into<Selector>, defaults: impl Into<Value>) -> Self {
        Self {
            selector: selector.into(),
            source: DefaultSource::Static(defaults.into()),
            deep: false,
        }
    }

    pub fn computed(
        selector: impl Into<Selector>,
        defaults: impl Fn(&Item, &Context) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            selector: selector.into(),
            source: DefaultSource::Computed(Arc::new(defaults)),
            deep: false,
        }
    }

    /// Merge nested objects key by key instead of only filling top-level gaps.
    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    fn defaults(&self, item: &Item, ctx: &Context) -> Value {
        match &self.source {
            DefaultSource::Static(v) => v.clone(),
            DefaultSource::Computed(f) => f(item, ctx),
        }
    }

    fn fill_item(&self, mut item: Item, ctx: &mut Context) -> PipelineResult<Item> {
        match self.defaults(&item, ctx) {
            Value::Object(defaults) => {
                merge_missing(item.as_map_mut(), &defaults, self.deep);
                Ok(item)
            }
            Value::Null => Ok(item),
            other => Err(PipelineError::config(format!(
                "cannot apply item defaults from a {} source; expected dict",
                Shape::of(&other)
            ))),
        }
    }

    fn fill_dict(&self, call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
        let Value::Object(defaults) = self.defaults(call.item, call.ctx) else {
            return Err(PipelineError::config(format!(
                "field '{}' is a dict; its defaults must also be a dict",
                call.field
            )));
        };
        let Value::Object(mut current) = call.value else {
            return Ok(FieldOutcome::Keep);
        };
        merge_missing(&mut current, &defaults, self.deep);
        Ok(FieldOutcome::Value(Value::Object(current)))
    }

    fn fill_none(&self, call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
        match self.defaults(call.item, call.ctx) {
            Value::Null => Ok(FieldOutcome::Keep),
            default => Ok(FieldOutcome::Value(default)),
        }
    }

    fn keep_present(&self, _call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
        Ok(FieldOutcome::Keep)
    }
}

fn merge_missing(target: &mut Map<String, Value>, defaults: &Map<String, Value>, deep: bool) {
    for (key, default) in defaults {
        match target.get_mut(key) {
            None | Some(Value::Null) => {
                target.insert(key.clone(), default.clone());
            }
            Some(Value::Object(inner)) if deep => {
                if let Value::Object(nested) = default {
                    merge_missing(inner, nested, deep);
                }
            }
            Some(_) => {}
        }
    }
}

impl Processor for Defaulter {
    fn name(&self) -> &str {
        "defaulter"
    }

    fn process(&self, item: Item, ctx: &mut Context) -> PipelineResult<Item> {
        dispatch(self, item, ctx)
    }
}

impl Handlers for Defaulter {
    fn registry() -> PipelineResult<&'static Registry<Self>> {
        static REGISTRY: RegistryCell<Defaulter> = OnceLock::new();
        cached(&REGISTRY, || {
            Registry::builder()
                .item("fill_item", Self::fill_item)
                .field("fill_dict", &[Shape::Dict], Self::fill_dict)
                .field("fill_none", &[Shape::None], Self::fill_none)
                .any_field("keep_present", Self::keep_present)
                .build()
        })
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }
}
