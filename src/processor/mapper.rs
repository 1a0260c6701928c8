use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::{Map, Value};
use tracing::debug;

use crate::dispatch::{cached, FieldCall, FieldOutcome, Registry, RegistryCell};
use crate::error::{PipelineError, PipelineResult};
use crate::types::{Context, Item};

use super::{dispatch, Handlers, Processor, Selector};

/// What a [`Mapper`] rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapTarget {
    /// Replace values found in the table.
    #[default]
    Values,
    /// Rename keys found in the table.
    Keys,
}

type MappingFn = Arc<dyn Fn(&Item, &Context) -> PipelineResult<Map<String, Value>> + Send + Sync>;

/// The lookup table of a [`Mapper`].
#[derive(Clone)]
pub enum MappingSource {
    Static(Map<String, Value>),
    /// Produced per invocation.
    Computed(MappingFn),
}

impl fmt::Debug for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(m) => f.debug_tuple("Static").field(m).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Maps values (or keys) through a lookup table. A miss leaves the value or key unchanged.
///
/// Value lookups use the value's string form, so `1` and `true` look up `"1"` and `"true"`.
/// Only scalar values are looked up.
#[derive(Debug, Clone)]
pub struct Mapper {
    selector: Selector,
    source: MappingSource,
    target: MapTarget,
}

impl Mapper {
    /// Value mapper over a static table. The table must be a non-empty object.
    pub fn new(selector: impl Into<Selector>, mapping: impl Into<Value>) -> PipelineResult<Self> {
        match mapping.into() {
            Value::Object(table) if !table.is_empty() => Ok(Self {
                selector: selector.into(),
                source: MappingSource::Static(table),
                target: MapTarget::Values,
            }),
            _ => Err(PipelineError::config(
                "mapping must be a non-empty dict (key is the current value, value is the replacement)",
            )),
        }
    }

    /// Key mapper over a static table: every key found in the table is renamed.
    pub fn keys(selector: impl Into<Selector>, mapping: impl Into<Value>) -> PipelineResult<Self> {
        Ok(Self::new(selector, mapping)?.target(MapTarget::Keys))
    }

    pub fn computed(
        selector: impl Into<Selector>,
        mapping: impl Fn(&Item, &Context) -> PipelineResult<Map<String, Value>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            selector: selector.into(),
            source: MappingSource::Computed(Arc::new(mapping)),
            target: MapTarget::Values,
        }
    }

    pub fn target(mut self, target: MapTarget) -> Self {
        self.target = target;
        self
    }

    fn table(&self, item: &Item, ctx: &Context) -> PipelineResult<Map<String, Value>> {
        match &self.source {
            MappingSource::Static(table) => Ok(table.clone()),
            MappingSource::Computed(f) => f(item, ctx),
        }
    }

    fn map_item(&self, item: Item, ctx: &mut Context) -> PipelineResult<Item> {
        let table = self.table(&item, ctx)?;
        match self.target {
            MapTarget::Values => {
                let mut item = item;
                for value in item.as_map_mut().values_mut() {
                    if let Some(mapped) = lookup_key(value).and_then(|k| table.get(&k)) {
                        *value = mapped.clone();
                    }
                }
                Ok(item)
            }
            MapTarget::Keys => rename_keys(item, &table),
        }
    }

    fn map_field(&self, call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
        let table = self.table(call.item, call.ctx)?;
        match self.target {
            MapTarget::Values => {
                let mapped = lookup_key(&call.value).and_then(|k| table.get(&k));
                Ok(match mapped {
                    Some(v) if call.exists => FieldOutcome::Value(v.clone()),
                    _ => FieldOutcome::Keep,
                })
            }
            MapTarget::Keys => {
                let Some(renamed) = call.field.name().and_then(|name| table.get(name)) else {
                    return Ok(FieldOutcome::Keep);
                };
                if !call.exists {
                    return Ok(FieldOutcome::Keep);
                }
                Ok(FieldOutcome::Rename(new_key(renamed)?, call.value))
            }
        }
    }
}

fn lookup_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn new_key(renamed: &Value) -> PipelineResult<String> {
    renamed.as_str().map(str::to_owned).ok_or_else(|| {
        PipelineError::config(format!("key mapping targets must be strings, got {renamed}"))
    })
}

/// Rename every key found in `table`, in one pass over the item's current keys and keeping
/// their order. A renamed key replaces an unrenamed key of the same name.
fn rename_keys(item: Item, table: &Map<String, Value>) -> PipelineResult<Item> {
    let mut renames = Vec::with_capacity(item.len());
    let mut targets = HashSet::new();
    for key in item.keys() {
        let renamed = match table.get(key) {
            Some(v) => Some(new_key(v)?),
            None => None,
        };
        if let Some(new) = &renamed {
            targets.insert(new.clone());
        }
        renames.push(renamed);
    }

    let mut out = Map::with_capacity(item.len());
    for ((key, value), renamed) in item.into_map().into_iter().zip(renames) {
        match renamed {
            Some(new) => {
                debug!(from = %key, to = %new, "key renamed");
                out.insert(new, value);
            }
            None if targets.contains(&key) => {
                debug!(key = %key, "key replaced by a renamed key");
            }
            None => {
                out.insert(key, value);
            }
        }
    }
    Ok(Item::from(out))
}

impl Processor for Mapper {
    fn name(&self) -> &str {
        "mapper"
    }

    fn process(&self, item: Item, ctx: &mut Context) -> PipelineResult<Item> {
        dispatch(self, item, ctx)
    }
}

impl Handlers for Mapper {
    fn registry() -> PipelineResult<&'static Registry<Self>> {
        static REGISTRY: RegistryCell<Mapper> = OnceLock::new();
        cached(&REGISTRY, || {
            Registry::builder()
                .item("map_item", Self::map_item)
                .any_field("map_field", Self::map_field)
                .build()
        })
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }
}

#[cfg(test)]
mod tests {
    use super::{MapTarget, Mapper};
    use crate::expression::field;
    use crate::processor::{Processor, Selector};
    use crate::types::{Context, Item};
    use serde_json::{json, Value};

    fn apply(p: &Mapper, value: Value) -> Value {
        p.invoke(Item::from_value(value).unwrap(), &mut Context::new())
            .unwrap()
            .into_value()
    }

    #[test]
    fn maps_selected_values_only() {
        let mapping = json!({"hello": "world", "world": "hello"});
        let p = Mapper::new(field("field1"), mapping.clone()).unwrap();
        let out = apply(&p, json!({"field1": "hello", "field2": "hello"}));
        assert_eq!(out, json!({"field1": "world", "field2": "hello"}));

        let computed = Mapper::computed(field("field1"), move |_, _| {
            Ok(mapping.as_object().cloned().unwrap_or_default())
        });
        let out = apply(&computed, json!({"field1": "hello", "field2": "hello"}));
        assert_eq!(out["field1"], json!("world"));
    }

    #[test]
    fn misses_leave_values_unchanged() {
        let p = Mapper::new(field("code"), json!({"1": "one"})).unwrap();
        assert_eq!(apply(&p, json!({"code": 1}))["code"], json!("one"));
        assert_eq!(apply(&p, json!({"code": 2}))["code"], json!(2));
        assert_eq!(apply(&p, json!({})), json!({}));
    }

    #[test]
    fn key_mapping_renames_item_keys() {
        let p = Mapper::keys(
            Selector::item(),
            json!({"field1": "field2", "field3": "field4", "field5": "field6"}),
        )
        .unwrap();
        let out = apply(&p, json!({"field1": "value", "field3": "value", "field7": "value"}));
        assert_eq!(out, json!({"field2": "value", "field4": "value", "field7": "value"}));
    }

    #[test]
    fn key_mapping_moves_the_original_value() {
        let p = Mapper::keys(Selector::item(), json!({"field1": "field2"})).unwrap();
        assert_eq!(apply(&p, json!({"field1": "field3"})), json!({"field2": "field3"}));
    }

    #[test]
    fn key_mapping_does_not_chain_renames() {
        let p = Mapper::keys(Selector::item(), json!({"a": "b", "b": "c"})).unwrap();
        assert_eq!(apply(&p, json!({"a": 1, "b": 2})), json!({"b": 1, "c": 2}));
    }

    #[test]
    fn field_scoped_key_mapping_renames_in_place() {
        let p = Mapper::new(field("address.town"), json!({"town": "city"}))
            .unwrap()
            .target(MapTarget::Keys);
        let out = apply(&p, json!({"address": {"town": "Brisbane"}}));
        assert_eq!(out, json!({"address": {"city": "Brisbane"}}));
    }

    #[test]
    fn mapping_must_be_a_non_empty_dict() {
        assert!(Mapper::new(field("a"), json!({})).is_err());
        assert!(Mapper::new(field("a"), json!(["a"])).is_err());
    }
}
