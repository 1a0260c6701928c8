use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value;
use tracing::debug;

use crate::dispatch::{cached, FieldCall, FieldOutcome, Registry, RegistryCell};
use crate::error::PipelineResult;
use crate::types::{Context, Item};

use super::{dispatch, Handlers, Processor, Selector};

type FilterFn = Arc<dyn Fn(Value, &Item) -> PipelineResult<Value> + Send + Sync>;

/// Replaces each selected field with `f(value, item)`.
///
/// Absent fields are left absent.
#[derive(Clone)]
pub struct Filter {
    selector: Selector,
    func: FilterFn,
}

impl Filter {
    pub fn new(
        selector: impl Into<Selector>,
        func: impl Fn(Value, &Item) -> PipelineResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            selector: selector.into(),
            func: Arc::new(func),
        }
    }

    fn filter_value(&self, call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
        if !call.exists {
            debug!(field = %call.field, "filter target is absent; leaving it unchanged");
            return Ok(FieldOutcome::Keep);
        }
        Ok(FieldOutcome::Value((self.func)(call.value, call.item)?))
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter").field("selector", &self.selector).finish_non_exhaustive()
    }
}

impl Processor for Filter {
    fn name(&self) -> &str {
        "filter"
    }

    fn process(&self, item: Item, ctx: &mut Context) -> PipelineResult<Item> {
        dispatch(self, item, ctx)
    }
}

impl Handlers for Filter {
    fn registry() -> PipelineResult<&'static Registry<Self>> {
        static REGISTRY: RegistryCell<Filter> = OnceLock::new();
        cached(&REGISTRY, || Registry::builder().any_field("filter_value", Self::filter_value).build())
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }
}

#[cfg(test)]
mod tests {
    use super::Filter;
    use crate::error::PipelineError;
    use crate::expression::field;
    use crate::processor::Processor;
    use crate::types::{Context, Item};
    use serde_json::{json, Value};

    fn greet() -> Filter {
        Filter::new(field("hello"), |value, _item| {
            Ok(Value::from(format!("hello {}", value.as_str().unwrap_or_default())))
        })
    }

    #[test]
    fn filters_present_values() {
        let item = Item::from_value(json!({"hello": "world"})).unwrap();
        let out = greet().invoke(item, &mut Context::new()).unwrap();
        assert_eq!(out.get("hello"), Some(&json!("hello world")));
    }

    #[test]
    fn absent_fields_stay_absent() {
        let out = greet().invoke(Item::new(), &mut Context::new()).unwrap();
        assert!(out.get("hello").is_none());
    }

    #[test]
    fn filter_sees_sibling_values_and_can_drop() {
        let p = Filter::new(field("price"), |value, item| {
            let rate = item.get("rate").and_then(Value::as_f64).unwrap_or(1.0);
            match value.as_f64() {
                Some(price) => Ok(json!(price * rate)),
                None => Err(PipelineError::drop_item("price is not numeric")),
            }
        });
        let item = Item::from_value(json!({"price": 10, "rate": 1.5})).unwrap();
        assert_eq!(p.invoke(item, &mut Context::new()).unwrap().get("price"), Some(&json!(15.0)));

        let bad = Item::from_value(json!({"price": "n/a"})).unwrap();
        assert!(p.invoke(bad, &mut Context::new()).unwrap_err().is_drop());
    }
}
