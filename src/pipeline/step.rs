use std::fmt;

use crate::error::PipelineResult;
use crate::processor::Processor;
use crate::types::{Context, Item};

/// Lazily produced items. `Ok(None)` elements are skipped.
pub type ItemStream<'a> = Box<dyn Iterator<Item = PipelineResult<Option<Item>>> + 'a>;

/// What an action hands to the rest of the pipeline.
pub enum Emit<'a> {
    /// No item continues.
    Nothing,
    One(Item),
    /// Each item continues independently.
    Many(Vec<Item>),
    /// Items pulled one at a time, only when the previous one has gone through the rest of
    /// the pipeline.
    Stream(ItemStream<'a>),
}

impl<'a> Emit<'a> {
    pub fn stream(iter: impl Iterator<Item = PipelineResult<Option<Item>>> + 'a) -> Self {
        Emit::Stream(Box::new(iter))
    }

    /// Stream of items that cannot fail.
    pub fn items(iter: impl IntoIterator<Item = Item> + 'a) -> Self {
        Emit::Stream(Box::new(iter.into_iter().map(|item| Ok(Some(item)))))
    }
}

impl From<Item> for Emit<'_> {
    fn from(item: Item) -> Self {
        Emit::One(item)
    }
}

impl From<Option<Item>> for Emit<'_> {
    fn from(item: Option<Item>) -> Self {
        item.map_or(Emit::Nothing, Emit::One)
    }
}

impl From<Vec<Item>> for Emit<'_> {
    fn from(items: Vec<Item>) -> Self {
        Emit::Many(items)
    }
}

impl From<Vec<Option<Item>>> for Emit<'_> {
    fn from(items: Vec<Option<Item>>) -> Self {
        Emit::Many(items.into_iter().flatten().collect())
    }
}

impl fmt::Debug for Emit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Emit::Nothing => f.write_str("Nothing"),
            Emit::One(item) => f.debug_tuple("One").field(item).finish(),
            Emit::Many(items) => f.debug_tuple("Many").field(&items.len()).finish(),
            Emit::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A leaf step: producers, processors and exporters all look like this to the executor.
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    fn call(&self, item: Item, ctx: &mut Context) -> PipelineResult<Emit<'_>>;
}

impl<P: Processor> Action for P {
    fn name(&self) -> &str {
        Processor::name(self)
    }

    fn call(&self, item: Item, ctx: &mut Context) -> PipelineResult<Emit<'_>> {
        self.invoke(item, ctx).map(Emit::One)
    }
}

/// An [`Action`] backed by a closure.
pub struct FnAction<F> {
    name: String,
    func: F,
}

impl<F> FnAction<F>
where
    F: Fn(Item, &mut Context) -> PipelineResult<Emit<'static>> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Action for FnAction<F>
where
    F: Fn(Item, &mut Context) -> PipelineResult<Emit<'static>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, item: Item, ctx: &mut Context) -> PipelineResult<Emit<'_>> {
        (self.func)(item, ctx)
    }
}

/// One position in a pipeline.
pub enum Step {
    Action(Box<dyn Action>),
    /// A method of the owning importer, resolved when the step is reached.
    Method(String),
    /// A sub-pipeline run against copies of the current item and context. Its output does not
    /// feed back into the parent sequence.
    Branch(Vec<Step>),
}

impl Step {
    pub fn action(action: impl Action + 'static) -> Self {
        Step::Action(Box::new(action))
    }

    /// Closure step.
    pub fn func(
        name: impl Into<String>,
        func: impl Fn(Item, &mut Context) -> PipelineResult<Emit<'static>> + Send + Sync + 'static,
    ) -> Self {
        Step::action(FnAction::new(name, func))
    }

    pub fn method(name: impl Into<String>) -> Self {
        Step::Method(name.into())
    }

    pub fn branch(steps: impl IntoIterator<Item = Step>) -> Self {
        Step::Branch(steps.into_iter().collect())
    }

    /// Name used in logs.
    pub fn label(&self) -> &str {
        match self {
            Step::Action(action) => action.name(),
            Step::Method(name) => name,
            Step::Branch(_) => "branch",
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Action(action) => f.debug_tuple("Action").field(&action.name()).finish(),
            Step::Method(name) => f.debug_tuple("Method").field(name).finish(),
            Step::Branch(steps) => f.debug_tuple("Branch").field(steps).finish(),
        }
    }
}
