use std::sync::OnceLock;

use serde_json::Value;

use crate::dispatch::{cached, FieldCall, FieldOutcome, Registry, RegistryCell};
use crate::error::{PipelineError, PipelineResult};
use crate::expression::Expression;
use crate::types::{Context, Item};

use super::{dispatch, Handlers, Processor, Selector};

/// When a [`Dropper`] fires.
#[derive(Debug, Clone, PartialEq)]
pub enum DropCondition {
    /// The expression evaluates to true against the item.
    Expression(Expression),
    /// The target is `null`, an empty string/list/dict, or a whitespace-only string.
    Empty,
}

/// Drops the item (item-scoped) or a single field (field-scoped) when its condition holds.
///
/// An item drop aborts the rest of the item's path through the pipeline; a field drop only
/// removes the field and lets the item continue.
#[derive(Debug, Clone)]
pub struct Dropper {
    selector: Selector,
    condition: DropCondition,
}

impl Dropper {
    pub fn new(selector: impl Into<Selector>, expression: Expression) -> Self {
        Self {
            selector: selector.into(),
            condition: DropCondition::Expression(expression),
        }
    }

    /// Drop empty targets.
    pub fn empty(selector: impl Into<Selector>) -> Self {
        Self {
            selector: selector.into(),
            condition: DropCondition::Empty,
        }
    }

    pub fn condition(&self) -> &DropCondition {
        &self.condition
    }

    fn drop_item(&self, item: Item, _ctx: &mut Context) -> PipelineResult<Item> {
        match &self.condition {
            DropCondition::Expression(expr) if item.eval(expr) => Err(PipelineError::drop_item(format!(
                "expression `{expr}` evaluated to true"
            ))),
            DropCondition::Empty if item.as_map().values().all(is_blank) => {
                Err(PipelineError::drop_item("item was empty"))
            }
            _ => Ok(item),
        }
    }

    fn drop_field(&self, call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
        let fires = match &self.condition {
            DropCondition::Expression(expr) => call.item.eval(expr),
            DropCondition::Empty => call.exists && is_blank(&call.value),
        };
        Ok(if fires { FieldOutcome::Drop } else { FieldOutcome::Keep })
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

impl Processor for Dropper {
    fn name(&self) -> &str {
        "dropper"
    }

    fn process(&self, item: Item, ctx: &mut Context) -> PipelineResult<Item> {
        dispatch(self, item, ctx)
    }
}

impl Handlers for Dropper {
    fn registry() -> PipelineResult<&'static Registry<Self>> {
        static REGISTRY: RegistryCell<Dropper> = OnceLock::new();
        cached(&REGISTRY, || {
            Registry::builder()
                .item("drop_item", Self::drop_item)
                .any_field("drop_field", Self::drop_field)
                .build()
        })
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }
}

#[cfg(test)]
mod tests {
    use super::Dropper;
    use crate::error::PipelineError;
    use crate::expression::field;
    use crate::processor::{Processor, Selector};
    use crate::types::{Context, Item};
    use serde_json::json;

    fn item(value: serde_json::Value) -> Item {
        Item::from_value(value).unwrap()
    }

    #[test]
    fn item_scoped_drop_signals_an_item_drop() {
        let p = Dropper::new(Selector::item(), field("hello").equals("world"));
        let err = p.invoke(item(json!({"hello": "world"})), &mut Context::new()).unwrap_err();
        assert!(err.is_drop());
        assert!(err.to_string().contains("hello == \"world\""));

        let kept = item(json!({"hello": "universe"}));
        assert_eq!(p.invoke(kept.clone(), &mut Context::new()).unwrap(), kept);
    }

    #[test]
    fn industry_placeholder_values_drop_the_item() {
        let p = Dropper::new(
            Selector::item(),
            field("industry").is_in(vec!["Not Applic", "Class Pend"]),
        );
        let err = p
            .invoke(item(json!({"industry": "Not Applic"})), &mut Context::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::DropItem { .. }));
    }

    #[test]
    fn field_scoped_drop_only_removes_the_field() {
        let p = Dropper::new(field("hello"), field("planet").is_in(vec!["earth", "mars"]));

        let out = p
            .invoke(item(json!({"planet": "earth", "hello": "earth"})), &mut Context::new())
            .unwrap();
        assert!(!out.exists("hello"));
        assert!(out.exists("planet"));

        let out = p
            .invoke(item(json!({"planet": "pluto", "hello": "pluto"})), &mut Context::new())
            .unwrap();
        assert!(out.exists("hello"));
    }

    #[test]
    fn empty_dropper_handles_blank_values() {
        let p = Dropper::empty(vec![field("a"), field("b"), field("c"), field("d")]);
        let out = p
            .invoke(
                item(json!({"a": "   ", "b": [], "c": 0, "d": "x", "e": ""})),
                &mut Context::new(),
            )
            .unwrap();
        assert_eq!(out.into_value(), json!({"c": 0, "d": "x", "e": ""}));

        let whole = Dropper::empty(Selector::item());
        assert!(whole.invoke(Item::new(), &mut Context::new()).unwrap_err().is_drop());
        assert!(whole.invoke(item(json!({"a": " "})), &mut Context::new()).is_err());
        assert!(whole.invoke(item(json!({"a": 1})), &mut Context::new()).is_ok());
    }
}
