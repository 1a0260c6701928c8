//! Sinks. An [`Exporter`] takes one item and returns it, so exporters can sit anywhere in a
//! pipeline, typically at the end of a branch.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{Action, Emit, Step};
use crate::types::{Context, Item};

pub trait Exporter: Send + Sync {
    fn name(&self) -> &str {
        "exporter"
    }

    fn export(&self, item: Item) -> PipelineResult<Item>;
}

/// Adapts an [`Exporter`] into a pipeline [`Action`].
#[derive(Debug, Clone)]
pub struct Export<E>(pub E);

impl<E: Exporter> Action for Export<E> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn call(&self, item: Item, _ctx: &mut Context) -> PipelineResult<Emit<'_>> {
        self.0.export(item).map(Emit::One)
    }
}

impl Step {
    pub fn export(exporter: impl Exporter + 'static) -> Self {
        Step::action(Export(exporter))
    }
}

fn poisoned<T>(_: PoisonError<T>) -> PipelineError {
    PipelineError::Export {
        message: "exporter lock poisoned".to_string(),
    }
}

/// Keeps exported items in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct CollectExporter {
    items: Arc<Mutex<Vec<Item>>>,
}

impl CollectExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything exported so far.
    pub fn items(&self) -> Vec<Item> {
        self.items.lock().map(|items| items.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Exporter for CollectExporter {
    fn name(&self) -> &str {
        "collect"
    }

    fn export(&self, item: Item) -> PipelineResult<Item> {
        self.items.lock().map_err(poisoned)?.push(item.clone());
        Ok(item)
    }
}

/// Writes each item as one line of JSON.
#[derive(Debug)]
pub struct JsonLinesExporter<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesExporter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn flush(&self) -> PipelineResult<()> {
        self.writer.lock().map_err(poisoned)?.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> PipelineResult<W> {
        self.writer.into_inner().map_err(poisoned)
    }
}

impl JsonLinesExporter<BufWriter<File>> {
    /// Create (or truncate) a file to export into.
    pub fn create(path: impl AsRef<Path>) -> PipelineResult<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write + Send> Exporter for JsonLinesExporter<W> {
    fn name(&self) -> &str {
        "json_lines"
    }

    fn export(&self, item: Item) -> PipelineResult<Item> {
        let mut writer = self.writer.lock().map_err(poisoned)?;
        serde_json::to_writer(&mut *writer, &item)?;
        writer.write_all(b"\n")?;
        Ok(item)
    }
}
