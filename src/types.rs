//! Core data model: [`Item`], [`Shape`] and the per-branch [`Context`].
//!
//! Item values are plain [`serde_json::Value`]s. The crate enables serde_json's
//! `preserve_order` feature, so an item keeps its keys in insertion order.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PipelineError, PipelineResult};
use crate::importer::{ActionFn, Methods, ValueFn};
use crate::path::{self, PathLike};

/// The record flowing through a pipeline: an ordered mapping of string keys to values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item(Map<String, Value>);

impl Item {
    /// Create an empty item.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Convert a JSON value into an item. Only objects qualify.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate top-level keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Insert a top-level key, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a top-level key, keeping the order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    /// Resolve a path. Unreachable paths yield `None`.
    pub fn get(&self, path: impl PathLike) -> Option<&Value> {
        path::get_in(&path.segments(), &self.0)
    }

    /// Resolve a path, falling back to `default`.
    pub fn get_or(&self, path: impl PathLike, default: Value) -> Value {
        self.get(path).cloned().unwrap_or(default)
    }

    /// Write a value at a path. Returns `false` if the parent is unreachable (nothing changes).
    pub fn set(&mut self, path: impl PathLike, value: impl Into<Value>) -> bool {
        path::set_in(&path.segments(), &mut self.0, value.into())
    }

    /// Like [`Item::set`], but an unreachable parent is an error.
    pub fn set_strict(&mut self, path: impl PathLike, value: impl Into<Value>) -> PipelineResult<()> {
        let segments = path.segments();
        if path::set_in(&segments, &mut self.0, value.into()) {
            Ok(())
        } else {
            Err(PipelineError::UnreachablePath {
                path: path::join(&segments),
            })
        }
    }

    /// Remove the value at a path, returning it. Unreachable paths are a silent no-op.
    pub fn delete(&mut self, path: impl PathLike) -> Option<Value> {
        path::delete_in(&path.segments(), &mut self.0)
    }

    /// Like [`Item::delete`], but an unreachable path is an error.
    pub fn delete_strict(&mut self, path: impl PathLike) -> PipelineResult<Value> {
        let segments = path.segments();
        path::delete_in(&segments, &mut self.0).ok_or_else(|| PipelineError::UnreachablePath {
            path: path::join(&segments),
        })
    }

    pub fn exists(&self, path: impl PathLike) -> bool {
        path::exists_in(&path.segments(), &self.0)
    }
}

impl From<Map<String, Value>> for Item {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Item> for Value {
    fn from(item: Item) -> Self {
        item.into_value()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Item {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

/// Coarse runtime category of a value, used to pick processor handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// The whole record rather than a single field.
    Item,
    Dict,
    List,
    String,
    /// Integers and floats alike.
    Number,
    Boolean,
    /// JSON `null`, and also the value of a missing field.
    None,
}

impl Shape {
    /// Every shape a single field value can have.
    pub const FIELD: [Shape; 6] = [
        Shape::Dict,
        Shape::List,
        Shape::String,
        Shape::Number,
        Shape::Boolean,
        Shape::None,
    ];

    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::None,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::List,
            Value::Object(_) => Self::Dict,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Dict => "dict",
            Self::List => "list",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Shape {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "item" => Ok(Self::Item),
            "dict" => Ok(Self::Dict),
            "list" => Ok(Self::List),
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "none" => Ok(Self::None),
            other => Err(PipelineError::config(format!(
                "unknown value shape '{other}' (expected one of item, dict, list, string, number, boolean, none)"
            ))),
        }
    }
}

/// Auxiliary data travelling alongside an item.
///
/// Cloning copies the meta map, so sibling branches never see each other's writes, while the
/// importer's method table is shared.
#[derive(Clone, Default)]
pub struct Context {
    meta: Map<String, Value>,
    methods: Arc<Methods>,
    strict_paths: bool,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that resolves importer-bound methods from `methods`.
    pub fn with_methods(methods: Arc<Methods>) -> Self {
        Self {
            methods,
            ..Self::default()
        }
    }

    pub fn strict(mut self, strict_paths: bool) -> Self {
        self.strict_paths = strict_paths;
        self
    }

    /// Whether unreachable field writes should fail instead of being skipped.
    pub fn strict_paths(&self) -> bool {
        self.strict_paths
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.meta.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.meta.shift_remove(key)
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    /// Look up an importer-bound pipeline method by name.
    pub fn method(&self, name: &str) -> PipelineResult<ActionFn> {
        self.methods.action(name).ok_or_else(|| {
            PipelineError::config(format!("importer has no method named '{name}'"))
        })
    }

    /// Look up an importer-bound value method (used by value sources) by name.
    pub fn value_method(&self, name: &str) -> PipelineResult<ValueFn> {
        self.methods.value(name).ok_or_else(|| {
            PipelineError::config(format!("importer has no value method named '{name}'"))
        })
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("meta", &self.meta)
            .field("methods_len", &self.methods.len())
            .field("strict_paths", &self.strict_paths)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Context, Item, Shape};
    use serde_json::json;

    fn item(value: serde_json::Value) -> Item {
        Item::from_value(value).expect("object")
    }

    #[test]
    fn shape_unifies_numbers_and_maps_null_to_none() {
        assert_eq!(Shape::of(&json!(1)), Shape::Number);
        assert_eq!(Shape::of(&json!(0.001)), Shape::Number);
        assert_eq!(Shape::of(&json!("test")), Shape::String);
        assert_eq!(Shape::of(&json!({})), Shape::Dict);
        assert_eq!(Shape::of(&json!([])), Shape::List);
        assert_eq!(Shape::of(&json!(false)), Shape::Boolean);
        assert_eq!(Shape::of(&json!(null)), Shape::None);
    }

    #[test]
    fn shape_parsing_rejects_unknown_names() {
        assert_eq!("dict".parse::<Shape>().unwrap(), Shape::Dict);
        let err = "tuple".parse::<Shape>().unwrap_err();
        assert!(err.to_string().contains("unknown value shape 'tuple'"));
    }

    #[test]
    fn item_path_accessors() {
        let mut it = item(json!({"users": [{"address": {"city": "Brisbane"}}]}));
        assert_eq!(it.get("users[0].address.city"), Some(&json!("Brisbane")));
        assert!(it.set("users[0].address.city", "Sydney"));
        assert_eq!(it.get("users[0].address.city"), Some(&json!("Sydney")));
        assert!(!it.set("users[3].address.city", "Perth"));
        assert!(it.set_strict("users[3].address.city", "Perth").is_err());
        assert_eq!(it.delete("users[0].address.city"), Some(json!("Sydney")));
        assert!(!it.exists("users[0].address.city"));
        assert!(it.exists(""));
    }

    #[test]
    fn item_remove_keeps_key_order() {
        let mut it = item(json!({"a": 1, "b": 2, "c": 3}));
        it.remove("a");
        assert_eq!(it.keys().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn context_clones_diverge() {
        let mut parent = Context::new();
        parent.insert("source", "asx");
        let mut child = parent.clone();
        child.insert("branch", 1);
        assert_eq!(child.get("source"), Some(&json!("asx")));
        assert!(parent.get("branch").is_none());
    }

    #[test]
    fn missing_method_is_a_configuration_error() {
        let ctx = Context::new();
        let err = ctx.method("lookup_company").err().expect("missing");
        assert!(err.to_string().contains("no method named 'lookup_company'"));
    }
}
