use std::sync::OnceLock;

use tracing::Level;

use crate::dispatch::{cached, FieldCall, FieldOutcome, Registry, RegistryCell};
use crate::error::PipelineResult;
use crate::types::{Context, Item};

use super::{dispatch, Handlers, Processor, Selector};

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            Level::TRACE => tracing::trace!($($arg)+),
            Level::DEBUG => tracing::debug!($($arg)+),
            Level::INFO => tracing::info!($($arg)+),
            Level::WARN => tracing::warn!($($arg)+),
            _ => tracing::error!($($arg)+),
        }
    };
}

/// Logs the item (or the selected fields) and passes it on unchanged.
#[derive(Debug, Clone)]
pub struct Logger {
    selector: Selector,
    level: Level,
    label: Option<String>,
}

impl Logger {
    /// Log whole items at `DEBUG`.
    pub fn new() -> Self {
        Self::with_selector(Selector::item())
    }

    pub fn with_selector(selector: impl Into<Selector>) -> Self {
        Self {
            selector: selector.into(),
            level: Level::DEBUG,
            label: None,
        }
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Prefix every line with `label` (e.g. the importer name).
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn log_item(&self, item: Item, _ctx: &mut Context) -> PipelineResult<Item> {
        let label = self.label.as_deref().unwrap_or("item");
        let body = serde_json::to_string_pretty(&item)?;
        log_at!(self.level, label, "{body}");
        Ok(item)
    }

    fn log_field(&self, call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
        let label = self.label.as_deref().unwrap_or("field");
        log_at!(self.level, label, field = %call.field, exists = call.exists, value = %call.value);
        Ok(FieldOutcome::Keep)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Logger {
    fn name(&self) -> &str {
        "logger"
    }

    fn process(&self, item: Item, ctx: &mut Context) -> PipelineResult<Item> {
        dispatch(self, item, ctx)
    }
}

impl Handlers for Logger {
    fn registry() -> PipelineResult<&'static Registry<Self>> {
        static REGISTRY: RegistryCell<Logger> = OnceLock::new();
        cached(&REGISTRY, || {
            Registry::builder()
                .item("log_item", Self::log_item)
                .any_field("log_field", Self::log_field)
                .build()
        })
    }

    fn selector(&self) -> &Selector {
        &self.selector
    }
}
