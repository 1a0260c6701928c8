use std::sync::OnceLock;

use serde_json::Map;
use tracing::debug;

use crate::dispatch::{cached, FieldCall, FieldOutcome, Registry, RegistryCell};
use crate::error::PipelineResult;
use crate::expression::Field;
use crate::path;
use crate::types::{Context, Item};

use super::{dispatch, Handlers, Processor, Selector};

/// Rebuilds the item from a fixed list of fields, dropping everything else.
///
/// Nested picks keep their structure: picking `address.city` yields `{"address": {"city": ..}}`.
#[derive(Debug, Clone)]
pub struct Picker {
    selector: Selector,
    fields: Vec<Field>,
}

impl Picker {
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
        Self {
            selector: Selector::item(),
            fields: fields.into_iter().collect(),
        }
    }

    fn pick(&self, item: Item, _ctx: &mut Context) -> PipelineResult<Item> {
        let mut picked = Map::new();
        for field in &self.fields {
            match item.get(field) {
                Some(value) => {
                    if !path::set_materialized(field.segments(), &mut picked, value.clone()) {
                        debug!(field = %field, "picked field could not be rebuilt");
                    }
                }
                None => debug!(field = %field, "picked field is absent"),
            }
        }
        Ok(Item::from(picked))
    }
}

impl Processor for Picker {
    fn name(&self) -> &str {
        "picker"
    }

    fn process(&self, item: Item, ctx: &mut Context) -> PipelineResult<Item> {
        dispatch(self, item, ctx)
    }
}

impl Handlers for Picker {
    fn registry() -> PipelineResult<&'static Registry<Self>> {
        static REGISTRY: RegistryCell<Picker> = OnceLock::new();
        cached(&REGISTRY, || Registry::builder().item("pick", Self::pick).build())
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }
}

/// Removes a fixed list of fields from the item.
#[derive(Debug, Clone)]
pub struct Omitter {
    selector: Selector,
    fields: Vec<Field>,
}

impl Omitter {
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
        Self {
            selector: Selector::item(),
            fields: fields.into_iter().collect(),
        }
    }

    fn omit(&self, mut item: Item, _ctx: &mut Context) -> PipelineResult<Item> {
        for field in &self.fields {
            item.delete(field);
        }
        Ok(item)
    }
}

impl Processor for Omitter {
    fn name(&self) -> &str {
        "omitter"
    }

    fn process(&self, item: Item, ctx: &mut Context) -> PipelineResult<Item> {
        dispatch(self, item, ctx)
    }
}

impl Handlers for Omitter {
    fn registry() -> PipelineResult<&'static Registry<Self>> {
        static REGISTRY: RegistryCell<Omitter> = OnceLock::new();
        cached(&REGISTRY, || Registry::builder().item("omit", Self::omit).build())
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }
}

/// Field-scoped removal: every selected field that exists is dropped.
#[derive(Debug, Clone)]
pub struct Remover {
    selector: Selector,
}

impl Remover {
    pub fn new(selector: impl Into<Selector>) -> Self {
        Self {
            selector: selector.into(),
        }
    }

    fn remove(&self, call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
        Ok(if call.exists {
            FieldOutcome::Drop
        } else {
            FieldOutcome::Keep
        })
    }
}

impl Processor for Remover {
    fn name(&self) -> &str {
        "remover"
    }

    fn process(&self, item: Item, ctx: &mut Context) -> PipelineResult<Item> {
        dispatch(self, item, ctx)
    }
}

impl Handlers for Remover {
    fn registry() -> PipelineResult<&'static Registry<Self>> {
        static REGISTRY: RegistryCell<Remover> = OnceLock::new();
        cached(&REGISTRY, || Registry::builder().any_field("remove", Self::remove).build())
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }
}

#[cfg(test)]
mod tests {
    use super::{Omitter, Picker, Remover};
    use crate::expression::field;
    use crate::processor::Processor;
    use crate::types::{Context, Item};
    use serde_json::{json, Value};

    fn apply(p: &dyn Processor, value: Value) -> Value {
        p.invoke(Item::from_value(value).unwrap(), &mut Context::new())
            .unwrap()
            .into_value()
    }

    #[test]
    fn picker_keeps_only_listed_fields() {
        let p = Picker::new([field("field1"), field("field2")]);
        let out = apply(&p, json!({"field1": "value", "field2": "value", "field3": "value"}));
        assert_eq!(out, json!({"field1": "value", "field2": "value"}));
    }

    #[test]
    fn picker_rebuilds_nested_paths() {
        let p = Picker::new([field("address.city"), field("friends[0]"), field("missing")]);
        let out = apply(
            &p,
            json!({"address": {"city": "Brisbane", "zip": "4000"}, "friends": ["Annie"], "x": 1}),
        );
        assert_eq!(out, json!({"address": {"city": "Brisbane"}}));
    }

    #[test]
    fn omitter_removes_listed_fields() {
        let p = Omitter::new([field("field1"), field("field2"), field("nested.a")]);
        let out = apply(
            &p,
            json!({"field1": "value", "field2": "value", "field3": "value", "nested": {"a": 1, "b": 2}}),
        );
        assert_eq!(out, json!({"field3": "value", "nested": {"b": 2}}));
    }

    #[test]
    fn remover_drops_existing_fields() {
        let p = Remover::new(vec![field("a"), field("b")]);
        assert_eq!(apply(&p, json!({"a": 1, "c": 3})), json!({"c": 3}));
    }
}
