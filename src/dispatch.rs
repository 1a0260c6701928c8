//! Shape-keyed handler registry for processors.
//!
//! Every processor type declares its handlers once, through a [`RegistryBuilder`]:
//!
//! - *item handlers* receive the whole record (shape [`Shape::Item`]) and run in registration
//!   order, each feeding the next;
//! - *field handlers* declare the value shapes they accept, or none at all to act as a
//!   catch-all for every field shape.
//!
//! For a field value the registry picks a single handler: the candidates that declare the exact
//! shape, most specific first (fewest declared shapes, then declaration order), and only if
//! there are none, the first catch-all.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use serde_json::Value;
use tracing::warn;

use crate::error::{PipelineError, PipelineResult};
use crate::expression::Field;
use crate::types::{Context, Item, Shape};

/// Handler invoked with the whole item.
pub type ItemHandler<P> = fn(&P, Item, &mut Context) -> PipelineResult<Item>;

/// Handler invoked with a single field's value.
pub type FieldHandler<P> = fn(&P, FieldCall<'_>) -> PipelineResult<FieldOutcome>;

/// Arguments passed to a [`FieldHandler`].
pub struct FieldCall<'a> {
    /// The selected field.
    pub field: &'a Field,
    /// Current value (`null` when the field is missing).
    pub value: Value,
    /// Whether the path resolved at all.
    pub exists: bool,
    /// The item the field belongs to, for handlers that need sibling values.
    pub item: &'a Item,
    pub ctx: &'a Context,
}

/// What a field handler wants done with the field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome {
    /// Leave the field exactly as it is (including absent).
    Keep,
    /// Write a replacement value.
    Value(Value),
    /// Move the value to a new key (the field's last segment is replaced).
    Rename(String, Value),
    /// Remove the field and skip any further handling of it.
    Drop,
}

struct ItemEntry<P> {
    name: &'static str,
    handler: ItemHandler<P>,
}

/// A registered field handler.
pub struct FieldEntry<P> {
    name: &'static str,
    shapes: Vec<Shape>,
    handler: FieldHandler<P>,
}

impl<P> FieldEntry<P> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared shapes; empty for a catch-all.
    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn call(&self, processor: &P, call: FieldCall<'_>) -> PipelineResult<FieldOutcome> {
        (self.handler)(processor, call)
    }
}

/// Lookup table from value shape to handlers, built once per processor type.
pub struct Registry<P> {
    items: Vec<ItemEntry<P>>,
    fields: Vec<FieldEntry<P>>,
    by_shape: HashMap<Shape, Vec<usize>>,
    catch_all: Vec<usize>,
}

impl<P> Registry<P> {
    pub fn builder() -> RegistryBuilder<P> {
        RegistryBuilder {
            items: Vec::new(),
            fields: Vec::new(),
            error: None,
        }
    }

    /// Item handlers in registration order.
    pub fn item_handlers(&self) -> impl Iterator<Item = (&'static str, ItemHandler<P>)> + '_ {
        self.items.iter().map(|e| (e.name, e.handler))
    }

    pub fn has_item_handlers(&self) -> bool {
        !self.items.is_empty()
    }

    /// Names of all field handlers able to take `shape`, in selection priority.
    pub fn candidates(&self, shape: Shape) -> Vec<&'static str> {
        self.by_shape
            .get(&shape)
            .into_iter()
            .flatten()
            .chain(self.catch_all.iter())
            .map(|&i| self.fields[i].name)
            .collect()
    }

    /// Pick the single handler for a value of `shape`.
    ///
    /// Several explicit candidates for the same shape is a declaration conflict: the first one
    /// wins and a warning names the others. `owner` is only used for logging.
    pub fn select(&self, shape: Shape, owner: &str) -> Option<&FieldEntry<P>> {
        let explicit = self.by_shape.get(&shape).map(Vec::as_slice).unwrap_or_default();
        let pool = if explicit.is_empty() {
            self.catch_all.as_slice()
        } else {
            explicit
        };

        let (&first, rest) = pool.split_first()?;
        if !rest.is_empty() {
            let chosen = self.fields[first].name;
            let ignored: Vec<_> = rest.iter().map(|&i| self.fields[i].name).collect();
            warn!(
                processor = owner,
                %shape,
                chosen,
                ?ignored,
                "multiple handlers registered for shape; using the most specific"
            );
        }
        Some(&self.fields[first])
    }
}

impl<P> fmt::Debug for Registry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("item_handlers", &self.items.iter().map(|e| e.name).collect::<Vec<_>>())
            .field("field_handlers", &self.fields.iter().map(|e| (e.name, &e.shapes)).collect::<Vec<_>>())
            .finish()
    }
}

/// Declares the handlers of one processor type.
pub struct RegistryBuilder<P> {
    items: Vec<ItemEntry<P>>,
    fields: Vec<FieldEntry<P>>,
    error: Option<PipelineError>,
}

impl<P> RegistryBuilder<P> {
    /// Register a whole-item handler.
    pub fn item(mut self, name: &'static str, handler: ItemHandler<P>) -> Self {
        self.items.push(ItemEntry { name, handler });
        self
    }

    /// Register a field handler for the given shapes.
    pub fn field(mut self, name: &'static str, shapes: &[Shape], handler: FieldHandler<P>) -> Self {
        if shapes.is_empty() {
            self.fail(format!("field handler '{name}' declares no shapes; use any_field for a catch-all"));
        } else if shapes.contains(&Shape::Item) {
            self.fail(format!("field handler '{name}' cannot accept shape 'item'"));
        }
        let mut shapes = shapes.to_vec();
        shapes.sort();
        shapes.dedup();
        self.fields.push(FieldEntry {
            name,
            shapes,
            handler,
        });
        self
    }

    /// Register a field handler from shape names such as `"dict"` or `"none"`.
    pub fn field_named(mut self, name: &'static str, shapes: &[&str], handler: FieldHandler<P>) -> Self {
        let mut parsed = Vec::with_capacity(shapes.len());
        for s in shapes {
            match s.parse::<Shape>() {
                Ok(shape) => parsed.push(shape),
                Err(e) => {
                    self.fail(format!("field handler '{name}': {e}"));
                    return self;
                }
            }
        }
        self.field(name, &parsed, handler)
    }

    /// Register a catch-all field handler (lowest priority for every field shape).
    pub fn any_field(mut self, name: &'static str, handler: FieldHandler<P>) -> Self {
        self.fields.push(FieldEntry {
            name,
            shapes: Vec::new(),
            handler,
        });
        self
    }

    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(PipelineError::config(message));
        }
    }

    pub fn build(self) -> PipelineResult<Registry<P>> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let mut by_shape: HashMap<Shape, Vec<usize>> = HashMap::new();
        let mut catch_all = Vec::new();
        for (idx, entry) in self.fields.iter().enumerate() {
            if entry.shapes.is_empty() {
                catch_all.push(idx);
            }
            for shape in &entry.shapes {
                by_shape.entry(*shape).or_default().push(idx);
            }
        }
        // Stable sort: fewer declared shapes first, declaration order otherwise.
        for candidates in by_shape.values_mut() {
            candidates.sort_by_key(|&i| self.fields[i].shapes.len());
        }

        Ok(Registry {
            items: self.items,
            fields: self.fields,
            by_shape,
            catch_all,
        })
    }
}

/// Storage for a processor type's registry, initialised on first use.
pub type RegistryCell<P> = OnceLock<Result<Registry<P>, String>>;

/// Build (once) and return the registry held in `cell`.
pub fn cached<P>(
    cell: &'static RegistryCell<P>,
    init: impl FnOnce() -> PipelineResult<Registry<P>>,
) -> PipelineResult<&'static Registry<P>> {
    cell.get_or_init(|| {
        init().map_err(|e| match e {
            PipelineError::Config { message } => message,
            other => other.to_string(),
        })
    })
    .as_ref()
    .map_err(|message| PipelineError::config(message.clone()))
}
