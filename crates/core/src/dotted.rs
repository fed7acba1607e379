//! Dotted-path addressing over [`Record`]s.
//!
//! `a.b.c` names the key `c` inside the object at `b` inside the object at
//! `a`. Lists are leaves: paths never index into them. A literal key that
//! itself contains a dot is matched before the path is split.

use serde_json::{Map, Value};

use crate::record::Record;

pub const SEPARATOR: char = '.';

pub fn is_dotted(key: &str) -> bool {
    key.contains(SEPARATOR)
}

pub fn get_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    if let Some(value) = record.get(path) {
        return Some(value);
    }
    let (head, rest) = path.split_once(SEPARATOR)?;
    match record.get(head)? {
        Value::Object(child) => get_path(child, rest),
        _ => None,
    }
}

/// Set `value` at `path`, creating intermediate objects. A non-object value
/// in the way is replaced.
pub fn set_path(record: &mut Record, path: &str, value: Value) {
    match path.split_once(SEPARATOR) {
        None => {
            record.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = record
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}

pub fn remove_path(record: &mut Record, path: &str) -> Option<Value> {
    if let Some(value) = record.remove(path) {
        return Some(value);
    }
    let (head, rest) = path.split_once(SEPARATOR)?;
    match record.get_mut(head)? {
        Value::Object(child) => remove_path(child, rest),
        _ => None,
    }
}

/// Copy the listed paths into a new record, keeping their nesting. Missing
/// paths are skipped.
pub fn extract<S: AsRef<str>>(record: &Record, fields: &[S]) -> Record {
    let mut out = Record::new();
    for field in fields {
        let field = field.as_ref();
        if let Some(value) = get_path(record, field) {
            set_path(&mut out, field, value.clone());
        }
    }
    out
}

/// Collapse nested objects into dotted keys. Lists and empty objects are
/// kept as leaves.
pub fn flatten(record: &Record) -> Record {
    let mut out = Record::new();
    flatten_into(&mut out, None, record);
    out
}

fn flatten_into(out: &mut Record, prefix: Option<&str>, record: &Record) {
    for (key, value) in record {
        let path = match prefix {
            Some(prefix) => format!("{prefix}{SEPARATOR}{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(child) if !child.is_empty() => flatten_into(out, Some(&path), child),
            _ => {
                out.insert(path, value.clone());
            }
        }
    }
}

pub fn unflatten(flat: &Record) -> Record {
    let mut out = Record::new();
    for (key, value) in flat {
        set_path(&mut out, key, value.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn get_nested_and_literal() {
        let r = record(json!({"a": {"b": {"c": 1}}, "x.y": 2}));
        assert_eq!(get_path(&r, "a.b.c"), Some(&json!(1)));
        assert_eq!(get_path(&r, "a.b"), Some(&json!({"c": 1})));
        assert_eq!(get_path(&r, "x.y"), Some(&json!(2)));
        assert_eq!(get_path(&r, "a.z"), None);
        assert_eq!(get_path(&r, "a.b.c.d"), None);
    }

    #[test]
    fn set_creates_and_replaces_intermediates() {
        let mut r = record(json!({"a": 5}));
        set_path(&mut r, "a.b", json!(1));
        set_path(&mut r, "c.d.e", json!("x"));
        assert_eq!(Value::Object(r), json!({"a": {"b": 1}, "c": {"d": {"e": "x"}}}));
    }

    #[test]
    fn remove_nested() {
        let mut r = record(json!({"a": {"b": 1, "c": 2}}));
        assert_eq!(remove_path(&mut r, "a.b"), Some(json!(1)));
        assert_eq!(remove_path(&mut r, "a.b"), None);
        assert_eq!(Value::Object(r), json!({"a": {"c": 2}}));
    }

    #[test]
    fn extract_keeps_nesting() {
        let r = record(json!({"a": {"b": 1, "c": 2}, "d": 3, "e": 4}));
        let out = extract(&r, &["a.b", "d", "missing"]);
        assert_eq!(Value::Object(out), json!({"a": {"b": 1}, "d": 3}));
    }

    #[test]
    fn flatten_and_back() {
        let r = record(json!({
            "a": {"b": {"c": 1}, "l": [1, {"x": 1}]},
            "empty": {},
            "s": "v"
        }));
        let flat = flatten(&r);
        assert_eq!(
            Value::Object(flat.clone()),
            json!({"a.b.c": 1, "a.l": [1, {"x": 1}], "empty": {}, "s": "v"})
        );
        assert_eq!(unflatten(&flat), r);
    }
}
