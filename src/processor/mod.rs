//! Processors: the units of work that transform items.
//!
//! A processor runs four synchronous stages per item: [`Processor::should_process`] (guard),
//! [`Processor::before_process`], [`Processor::process`] and [`Processor::after_process`].
//! The standard `process` stage is [`dispatch`]: it routes the whole item through the
//! processor's item handlers and each selected field through the best-matching field handler
//! of its [`crate::dispatch::Registry`].
//!
//! Built-in processors:
//!
//! - [`Defaulter`]: fill missing/`null` values
//! - [`Assigner`]: unconditionally write a value
//! - [`Dropper`]: drop the item or a field when an expression holds
//! - [`Filter`]: pass a field value through a function
//! - [`Mapper`]: map values or keys through a lookup table
//! - [`Picker`] / [`Omitter`]: keep only / remove a fixed set of fields
//! - [`Remover`]: delete fields unconditionally
//! - [`Logger`]: log the item
//! - [`JsonLoader`] / [`CsvLoader`]: parse raw string fields
//!
//! ## Example
//!
//! ```rust
//! use item_pipeline::expression::field;
//! use item_pipeline::processor::{Assigner, Processor};
//! use item_pipeline::types::{Context, Item};
//! use serde_json::json;
//!
//! let assign = Assigner::new(field("exchange"), "ASX");
//! let item = Item::from_value(json!({"symbol": "BHP"})).unwrap();
//! let out = assign.invoke(item, &mut Context::new()).unwrap();
//! assert_eq!(out.into_value(), json!({"symbol": "BHP", "exchange": "ASX"}));
//! ```

mod assigner;
mod defaulter;
mod dropper;
mod filter;
mod loader;
mod logger;
mod mapper;
mod picker;

pub use assigner::{Assigner, ValueSource};
pub use defaulter::{DefaultSource, Defaulter};
pub use dropper::{DropCondition, Dropper};
pub use filter::Filter;
pub use loader::{CsvLoader, JsonLoader};
pub(crate) use loader::record_to_value;
pub use logger::Logger;
pub use mapper::{MapTarget, Mapper, MappingSource};
pub use picker::{Omitter, Picker, Remover};

use serde_json::Value;
use tracing::{debug, warn};

use crate::dispatch::{FieldCall, FieldOutcome, Registry};
use crate::error::PipelineResult;
use crate::expression::Field;
use crate::types::{Context, Item, Shape};

/// The targets a processor acts on: the whole item and/or a list of fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    whole_item: bool,
    fields: Vec<Field>,
}

impl Selector {
    /// Select the whole item.
    pub fn item() -> Self {
        Self {
            whole_item: true,
            fields: Vec::new(),
        }
    }

    pub fn field(field: Field) -> Self {
        Self {
            whole_item: false,
            fields: vec![field],
        }
    }

    pub fn fields(fields: impl IntoIterator<Item = Field>) -> Self {
        Self {
            whole_item: false,
            fields: fields.into_iter().collect(),
        }
    }

    /// Also select the whole item.
    pub fn and_item(mut self) -> Self {
        self.whole_item = true;
        self
    }

    pub fn includes_item(&self) -> bool {
        self.whole_item
    }

    pub fn selected_fields(&self) -> &[Field] {
        &self.fields
    }
}

impl From<Field> for Selector {
    fn from(field: Field) -> Self {
        Selector::field(field)
    }
}

impl From<&Field> for Selector {
    fn from(field: &Field) -> Self {
        Selector::field(field.clone())
    }
}

impl From<Vec<Field>> for Selector {
    fn from(fields: Vec<Field>) -> Self {
        Selector::fields(fields)
    }
}

/// A unit of item transformation.
pub trait Processor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Guard stage. Returning `false` passes the item through untouched.
    fn should_process(&self, _item: &Item, _ctx: &Context) -> bool {
        true
    }

    fn before_process(&self, item: Item, _ctx: &mut Context) -> PipelineResult<Item> {
        Ok(item)
    }

    /// The transformation itself.
    fn process(&self, item: Item, ctx: &mut Context) -> PipelineResult<Item>;

    fn after_process(&self, item: Item, _ctx: &mut Context) -> PipelineResult<Item> {
        Ok(item)
    }

    /// Run all four stages.
    fn invoke(&self, item: Item, ctx: &mut Context) -> PipelineResult<Item> {
        if !self.should_process(&item, ctx) {
            debug!(processor = self.name(), "guard declined item; passing through");
            return Ok(item);
        }
        let item = self.before_process(item, ctx)?;
        let item = self.process(item, ctx)?;
        self.after_process(item, ctx)
    }
}

/// Processors whose `process` stage is driven by a handler registry.
pub trait Handlers: Processor + Sized + 'static {
    /// The type's handler table, built once.
    fn registry() -> PipelineResult<&'static Registry<Self>>;

    fn selector(&self) -> &Selector;
}

/// Standard `process` stage: item handlers first, then every selected field.
pub fn dispatch<P: Handlers>(processor: &P, mut item: Item, ctx: &mut Context) -> PipelineResult<Item> {
    let registry = P::registry()?;
    let selector = processor.selector();

    if selector.includes_item() {
        if !registry.has_item_handlers() {
            warn!(processor = processor.name(), "processor cannot process whole items");
        }
        for (name, handler) in registry.item_handlers() {
            debug!(processor = processor.name(), handler = name, "item handler");
            item = handler(processor, item, ctx)?;
        }
    }

    for field in selector.selected_fields() {
        item = apply_field(processor, registry, field, item, ctx)?;
    }
    Ok(item)
}

fn apply_field<P: Handlers>(
    processor: &P,
    registry: &Registry<P>,
    field: &Field,
    mut item: Item,
    ctx: &Context,
) -> PipelineResult<Item> {
    let current = item.get(field).cloned();
    let exists = current.is_some();
    let value = current.unwrap_or(Value::Null);
    let shape = Shape::of(&value);

    let Some(entry) = registry.select(shape, processor.name()) else {
        warn!(
            processor = processor.name(),
            field = %field,
            %shape,
            "no handler for field shape; leaving field unchanged"
        );
        return Ok(item);
    };
    debug!(processor = processor.name(), handler = entry.name(), field = %field, %shape, "field handler");

    let outcome = entry.call(
        processor,
        FieldCall {
            field,
            value,
            exists,
            item: &item,
            ctx,
        },
    )?;

    match outcome {
        FieldOutcome::Keep => {}
        FieldOutcome::Value(v) => write_field(&mut item, field, v, ctx)?,
        FieldOutcome::Rename(key, v) => {
            item.delete(field);
            write_field(&mut item, &field.with_last(key), v, ctx)?;
        }
        FieldOutcome::Drop => {
            item.delete(field);
            debug!(processor = processor.name(), field = %field, "field dropped");
        }
    }
    Ok(item)
}

fn write_field(item: &mut Item, field: &Field, value: Value, ctx: &Context) -> PipelineResult<()> {
    if ctx.strict_paths() {
        return item.set_strict(field, value);
    }
    if !item.set(field, value) {
        debug!(field = %field, "field path unreachable; write skipped");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{cached, RegistryCell};
    use crate::error::PipelineError;
    use crate::expression::field;
    use serde_json::json;
    use std::sync::OnceLock;

    /// Tags each field with the handler that saw it.
    struct Tagger {
        selector: Selector,
    }

    impl Tagger {
        fn tag_string(&self, call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
            Ok(FieldOutcome::Value(json!(format!("string:{}", call.value.as_str().unwrap_or("")))))
        }

        fn tag_any(&self, _call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
            Ok(FieldOutcome::Value(json!("any")))
        }

        fn rename_list(&self, call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
            Ok(FieldOutcome::Rename("renamed".into(), call.value))
        }

        fn drop_bool(&self, call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
            if call.value == json!(true) {
                return Err(PipelineError::drop_item("flagged"));
            }
            Ok(FieldOutcome::Drop)
        }

        fn stamp(&self, mut item: Item, _ctx: &mut Context) -> PipelineResult<Item> {
            item.insert("stamped", true);
            Ok(item)
        }
    }

    impl Processor for Tagger {
        fn name(&self) -> &str {
            "tagger"
        }

        fn should_process(&self, item: &Item, _ctx: &Context) -> bool {
            !item.exists("skip")
        }

        fn process(&self, item: Item, ctx: &mut Context) -> PipelineResult<Item> {
            dispatch(self, item, ctx)
        }
    }

    impl Handlers for Tagger {
        fn registry() -> PipelineResult<&'static Registry<Self>> {
            static REGISTRY: RegistryCell<Tagger> = OnceLock::new();
            cached(&REGISTRY, || {
                Registry::builder()
                    .item("stamp", Self::stamp)
                    .field("tag_string", &[Shape::String], Self::tag_string)
                    .field("rename_list", &[Shape::List], Self::rename_list)
                    .field("drop_bool", &[Shape::Boolean], Self::drop_bool)
                    .any_field("tag_any", Self::tag_any)
                    .build()
            })
        }

        fn selector(&self) -> &Selector {
            &self.selector
        }
    }

    fn run(selector: Selector, value: serde_json::Value) -> PipelineResult<Item> {
        let tagger = Tagger { selector };
        tagger.invoke(Item::from_value(value).unwrap(), &mut Context::new())
    }

    #[test]
    fn specific_handler_beats_catch_all() {
        let out = run(
            Selector::fields([field("a"), field("b"), field("c")]),
            json!({"a": "x", "b": 1}),
        )
        .unwrap();
        assert_eq!(out.into_value(), json!({"a": "string:x", "b": "any", "c": "any"}));
    }

    #[test]
    fn item_handlers_run_before_fields() {
        let out = run(Selector::field(field("a")).and_item(), json!({"a": "x"})).unwrap();
        assert_eq!(out.get("stamped"), Some(&json!(true)));
        assert_eq!(out.get("a"), Some(&json!("string:x")));
    }

    #[test]
    fn rename_replaces_the_last_segment() {
        let out = run(Selector::field(field("nested.tags")), json!({"nested": {"tags": [1]}})).unwrap();
        assert_eq!(out.into_value(), json!({"nested": {"renamed": [1]}}));
    }

    #[test]
    fn field_drop_and_item_drop_have_different_scope() {
        let out = run(Selector::field(field("flag")), json!({"flag": false, "keep": 1})).unwrap();
        assert_eq!(out.into_value(), json!({"keep": 1}));

        let err = run(Selector::field(field("flag")), json!({"flag": true})).unwrap_err();
        assert!(matches!(err, PipelineError::DropItem { .. }));
    }

    #[test]
    fn guard_passes_item_through() {
        let out = run(Selector::field(field("a")), json!({"a": "x", "skip": 1})).unwrap();
        assert_eq!(out.get("a"), Some(&json!("x")));
    }

    #[test]
    fn strict_mode_rejects_unreachable_writes() {
        let tagger = Tagger {
            selector: Selector::field(field("missing.deep")),
        };
        let item = Item::new();
        let lenient = tagger.invoke(item.clone(), &mut Context::new()).unwrap();
        assert!(lenient.is_empty());

        let err = tagger
            .invoke(item, &mut Context::new().strict(true))
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnreachablePath { .. }));
    }
}
