//! Path addressing into nested item values.
//!
//! A path such as `users[0].address.city` is split into [`Segment`]s: keys are separated by `.`
//! and a list index is written as `[N]` directly after the preceding segment.
//!
//! Reads never fail: an unreachable path yields `None`. Writes and deletes are best-effort: if
//! an intermediate segment is missing (or has the wrong shape) nothing happens and the function
//! reports `false`/`None` instead of materializing containers. Callers that want typos in
//! configured paths to surface can check the return value (see
//! [`crate::pipeline::PipelineOptions::strict_paths`]).

use std::borrow::Cow;
use std::fmt;

use serde_json::{Map, Value};

/// A single step in a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Object key.
    Key(String),
    /// List index.
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => f.write_str(k),
            Segment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Segment::Key(key.to_owned())
    }
}

impl From<String> for Segment {
    fn from(key: String) -> Self {
        Segment::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

/// Anything that can be viewed as a list of segments.
///
/// Implemented for path strings (parsed on demand), segment slices and
/// [`crate::expression::Field`] (already parsed).
pub trait PathLike {
    fn segments(&self) -> Cow<'_, [Segment]>;
}

impl PathLike for str {
    fn segments(&self) -> Cow<'_, [Segment]> {
        Cow::Owned(split(self))
    }
}

impl PathLike for String {
    fn segments(&self) -> Cow<'_, [Segment]> {
        Cow::Owned(split(self))
    }
}

impl PathLike for [Segment] {
    fn segments(&self) -> Cow<'_, [Segment]> {
        Cow::Borrowed(self)
    }
}

impl PathLike for Vec<Segment> {
    fn segments(&self) -> Cow<'_, [Segment]> {
        Cow::Borrowed(self.as_slice())
    }
}

impl<T: PathLike + ?Sized> PathLike for &T {
    fn segments(&self) -> Cow<'_, [Segment]> {
        (**self).segments()
    }
}

/// Split a path string into segments.
///
/// - Empty input yields an empty list.
/// - A path without `.` or `[` is a single key (no parsing).
/// - `[N]` groups become [`Segment::Index`]; a bracket group that is not all digits stays part
///   of the surrounding key.
pub fn split(path: &str) -> Vec<Segment> {
    if path.is_empty() {
        return Vec::new();
    }
    if !path.contains(['.', '[']) {
        return vec![Segment::Key(path.to_owned())];
    }

    let mut out = Vec::new();
    let mut key = String::new();
    let mut rest = path;

    while let Some(c) = rest.chars().next() {
        match c {
            '.' => {
                flush_key(&mut key, &mut out);
                rest = &rest[1..];
            }
            '[' => match parse_index(rest) {
                Some((index, consumed)) => {
                    flush_key(&mut key, &mut out);
                    out.push(Segment::Index(index));
                    rest = &rest[consumed..];
                }
                None => {
                    key.push('[');
                    rest = &rest[1..];
                }
            },
            _ => {
                key.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    flush_key(&mut key, &mut out);
    out
}

fn flush_key(key: &mut String, out: &mut Vec<Segment>) {
    if !key.is_empty() {
        out.push(Segment::Key(std::mem::take(key)));
    }
}

/// Parse `[digits]` at the start of `s`, returning the index and the consumed byte length.
fn parse_index(s: &str) -> Option<(usize, usize)> {
    let close = s.find(']')?;
    let digits = &s[1..close];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((digits.parse().ok()?, close + 1))
}

/// Render segments back into path syntax.
pub fn join(segments: &[Segment]) -> String {
    let mut out = String::new();
    for seg in segments {
        match seg {
            Segment::Key(k) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(k);
            }
            Segment::Index(i) => out.push_str(&format!("[{i}]")),
        }
    }
    out
}

fn child<'a>(node: &'a Value, seg: &Segment) -> Option<&'a Value> {
    match (node, seg) {
        (Value::Object(map), Segment::Key(k)) => map.get(k),
        (Value::Array(list), Segment::Index(i)) => list.get(*i),
        _ => None,
    }
}

fn child_mut<'a>(node: &'a mut Value, seg: &Segment) -> Option<&'a mut Value> {
    match (node, seg) {
        (Value::Object(map), Segment::Key(k)) => map.get_mut(k),
        (Value::Array(list), Segment::Index(i)) => list.get_mut(*i),
        _ => None,
    }
}

fn write(parent: &mut Value, seg: &Segment, value: Value) -> bool {
    match (parent, seg) {
        (Value::Object(map), Segment::Key(k)) => {
            map.insert(k.clone(), value);
            true
        }
        (Value::Array(list), Segment::Index(i)) => match list.get_mut(*i) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        },
        _ => false,
    }
}

fn remove(parent: &mut Value, seg: &Segment) -> Option<Value> {
    match (parent, seg) {
        (Value::Object(map), Segment::Key(k)) => map.shift_remove(k),
        (Value::Array(list), Segment::Index(i)) if *i < list.len() => Some(list.remove(*i)),
        _ => None,
    }
}

/// Resolve `segments` inside `root`. An empty path resolves to `root` itself.
pub fn get<'a>(segments: &[Segment], root: &'a Value) -> Option<&'a Value> {
    segments.iter().try_fold(root, child)
}

/// Resolve `segments` inside `root`, falling back to `default` on any lookup failure.
pub fn get_or(segments: &[Segment], root: &Value, default: Value) -> Value {
    get(segments, root).cloned().unwrap_or(default)
}

pub fn get_mut<'a>(segments: &[Segment], root: &'a mut Value) -> Option<&'a mut Value> {
    segments.iter().try_fold(root, child_mut)
}

/// Write `value` at `segments`. Returns `false` (and changes nothing) if the parent of the last
/// segment is unreachable or an index is out of range.
pub fn set(segments: &[Segment], root: &mut Value, value: Value) -> bool {
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };
    match get_mut(parents, root) {
        Some(parent) => write(parent, last, value),
        None => false,
    }
}

/// Remove the value at `segments`, returning it. Unreachable paths are a silent no-op.
pub fn delete(segments: &[Segment], root: &mut Value) -> Option<Value> {
    let (last, parents) = segments.split_last()?;
    remove(get_mut(parents, root)?, last)
}

/// Whether every segment is reachable. The empty path is vacuously reachable.
pub fn exists(segments: &[Segment], root: &Value) -> bool {
    get(segments, root).is_some()
}

/// [`get`] rooted at an object map. The empty path has no value here.
pub fn get_in<'a>(segments: &[Segment], map: &'a Map<String, Value>) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    match first {
        Segment::Key(k) => get(rest, map.get(k)?),
        Segment::Index(_) => None,
    }
}

/// [`set`] rooted at an object map.
pub fn set_in(segments: &[Segment], map: &mut Map<String, Value>, value: Value) -> bool {
    match segments.split_first() {
        Some((Segment::Key(k), [])) => {
            map.insert(k.clone(), value);
            true
        }
        Some((Segment::Key(k), rest)) => match map.get_mut(k) {
            Some(node) => set(rest, node, value),
            None => false,
        },
        _ => false,
    }
}

/// [`delete`] rooted at an object map.
pub fn delete_in(segments: &[Segment], map: &mut Map<String, Value>) -> Option<Value> {
    match segments.split_first()? {
        (Segment::Key(k), []) => map.shift_remove(k),
        (Segment::Key(k), rest) => delete(rest, map.get_mut(k)?),
        (Segment::Index(_), _) => None,
    }
}

/// [`exists`] rooted at an object map.
pub fn exists_in(segments: &[Segment], map: &Map<String, Value>) -> bool {
    segments.is_empty() || get_in(segments, map).is_some()
}

/// Write `value` at `segments`, creating empty objects for missing key segments.
///
/// Index segments are never materialized: a missing list element still makes the write a
/// no-op.
pub fn set_materialized(segments: &[Segment], map: &mut Map<String, Value>, value: Value) -> bool {
    // Refuse up front so a failed write leaves no half-built containers behind.
    let reachable = (1..segments.len())
        .take_while(|&n| get_in(&segments[..n], map).is_some())
        .count();
    if reachable + 1 < segments.len()
        && segments[reachable..]
            .iter()
            .any(|s| matches!(s, Segment::Index(_)))
    {
        return false;
    }
    match segments.split_first() {
        Some((Segment::Key(k), [])) => {
            map.insert(k.clone(), value);
            true
        }
        Some((Segment::Key(k), rest)) => {
            let node = map
                .entry(k.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            materialize(rest, node, value)
        }
        _ => false,
    }
}

fn materialize(segments: &[Segment], node: &mut Value, value: Value) -> bool {
    let Some((seg, rest)) = segments.split_first() else {
        return false;
    };
    if rest.is_empty() {
        return write(node, seg, value);
    }
    match (node, seg) {
        (Value::Object(map), Segment::Key(k)) => {
            let next = map
                .entry(k.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            materialize(rest, next, value)
        }
        (Value::Array(list), Segment::Index(i)) => match list.get_mut(*i) {
            Some(next) => materialize(rest, next, value),
            None => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users() -> Value {
        json!({
            "users": [
                {"name": "Jeff", "age": 32},
                {"name": "Annie", "age": 23}
            ]
        })
    }

    fn key(k: &str) -> Segment {
        Segment::Key(k.to_string())
    }

    #[test]
    fn split_handles_keys_and_indices() {
        assert_eq!(split(""), Vec::<Segment>::new());
        assert_eq!(split("users"), vec![key("users")]);
        assert_eq!(split("users[0]"), vec![key("users"), Segment::Index(0)]);
        assert_eq!(split("users.0"), vec![key("users"), key("0")]);
        assert_eq!(
            split("users.0.0[0]"),
            vec![key("users"), key("0"), key("0"), Segment::Index(0)]
        );
        assert_eq!(
            split("users[0].address.city"),
            vec![key("users"), Segment::Index(0), key("address"), key("city")]
        );
        assert_eq!(
            split("users[0][1][2].name"),
            vec![
                key("users"),
                Segment::Index(0),
                Segment::Index(1),
                Segment::Index(2),
                key("name")
            ]
        );
    }

    #[test]
    fn split_keeps_non_numeric_brackets_in_the_key() {
        assert_eq!(split("tags[x]"), vec![key("tags[x]")]);
        assert_eq!(split("a[]"), vec![key("a[]")]);
    }

    #[test]
    fn join_renders_path_syntax() {
        let path = "users[0].address.city";
        assert_eq!(join(&split(path)), path);
        assert_eq!(join(&split("a[1][2].b")), "a[1][2].b");
    }

    #[test]
    fn get_walks_objects_and_lists() {
        let root = users();
        assert_eq!(get(&split("users[0].name"), &root), Some(&json!("Jeff")));
        assert_eq!(get(&split("this.is.a.bad.path"), &root), None);
        assert_eq!(
            get_or(&split("this.is.a.bad.path"), &root, json!("Jeff")),
            json!("Jeff")
        );
        assert_eq!(get(&split("users[5]"), &root), None);
        assert_eq!(get(&split("users.0"), &root), None);
    }

    #[test]
    fn set_writes_at_reachable_paths() {
        let mut root = users();
        assert!(set(&split("users[0].name"), &mut root, json!("Jeff Winger")));
        assert_eq!(root["users"][0]["name"], json!("Jeff Winger"));

        let mut root = users();
        assert!(set(&split("users[0]"), &mut root, json!("Jeff Winger")));
        assert_eq!(root["users"][0], json!("Jeff Winger"));

        let mut root = users();
        assert!(set(&split("users"), &mut root, Value::Null));
        assert_eq!(root["users"], Value::Null);
    }

    #[test]
    fn set_and_delete_are_silent_on_unreachable_paths() {
        let mut root = users();
        let before = root.clone();
        assert!(!set(&split("missing.deep.key"), &mut root, json!(1)));
        assert!(!set(&split("users[9].name"), &mut root, json!(1)));
        assert!(!set(&split("users[0].name.first"), &mut root, json!(1)));
        assert_eq!(delete(&split("missing.key"), &mut root), None);
        assert_eq!(delete(&split("users[0].nickname"), &mut root), None);
        assert_eq!(root, before);
    }

    #[test]
    fn delete_removes_keys_and_list_elements() {
        let mut root = users();
        assert_eq!(delete(&split("users[0].name"), &mut root), Some(json!("Jeff")));
        assert!(root["users"][0].get("name").is_none());

        let mut root = users();
        delete(&split("users[1]"), &mut root);
        assert_eq!(root["users"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn exists_reports_reachability() {
        let root = users();
        assert!(exists(&split(""), &root));
        assert!(exists(&split("users"), &root));
        assert!(exists(&split("users[1].name"), &root));
        assert!(!exists(&split("users.0"), &root));
        assert!(!exists(&split("users[2]"), &root));
    }

    #[test]
    fn map_rooted_variants_match_value_rooted_ones() {
        let Value::Object(mut map) = users() else {
            panic!("fixture is an object");
        };
        assert_eq!(get_in(&split("users[1].age"), &map), Some(&json!(23)));
        assert!(exists_in(&[], &map));
        assert!(set_in(&split("country"), &mut map, json!("AU")));
        assert!(!set_in(&split("nope.city"), &mut map, json!("x")));
        assert_eq!(delete_in(&split("country"), &mut map), Some(json!("AU")));
        assert_eq!(delete_in(&split("country"), &mut map), None);
    }

    #[test]
    fn set_round_trips_existing_values() {
        let mut root = users();
        let before = root.clone();
        for path in ["users", "users[0]", "users[1].name", "users[0].age"] {
            let segs = split(path);
            let current = get(&segs, &root).cloned().expect("path exists");
            assert!(set(&segs, &mut root, current));
        }
        assert_eq!(root, before);
    }

    #[test]
    fn set_materialized_creates_missing_objects_only() {
        let mut map = Map::new();
        assert!(set_materialized(&split("job.company.name"), &mut map, json!("Acme")));
        assert_eq!(Value::Object(map.clone()), json!({"job": {"company": {"name": "Acme"}}}));
        assert!(!set_materialized(&split("friends[0].name"), &mut map, json!("Annie")));
        assert!(!map.contains_key("friends"));
    }
}
