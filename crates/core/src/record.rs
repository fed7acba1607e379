use serde_json::{Map, Value};

use crate::error::CoreError;

/// A hierarchical key/value document. Nested objects are addressed with
/// dotted paths, see [`crate::dotted`].
pub type Record = Map<String, Value>;

/// Reserved key holding prior log entries, most recent first.
pub const LOGS_KEY: &str = "logs";
/// Reserved key holding the incoming operation's log entry.
pub const LOG_KEY: &str = "log";
/// Reserved key holding provenance metadata.
pub const SOURCE_KEY: &str = "source";
/// Key under which backends expose record identity.
pub const ID_KEY: &str = "id";
/// Key an external `id` is moved to on create.
pub const ORIGINAL_ID_KEY: &str = "original_id";

/// `""`, `null` and `[]` count as blank.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Like [`is_blank`], but an empty object is blank too.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        other => is_blank(other),
    }
}

/// View any value as a sequence: lists as-is, blanks as empty, scalars as a
/// single element.
pub fn as_sequence(value: Option<&Value>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    }
}

/// Take an object-valued field out of a record, treating anything else as empty.
pub fn take_object(record: &mut Record, key: &str) -> Record {
    match record.remove(key) {
        Some(Value::Object(map)) => map,
        _ => Record::new(),
    }
}

/// Parse a JSON object into a record.
pub fn from_json_str(text: &str) -> Result<Record, CoreError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        other => Err(CoreError::InvalidData(format!(
            "expected a JSON object, got {}",
            type_name(&other)
        ))),
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_values() {
        assert!(is_blank(&json!(null)));
        assert!(is_blank(&json!("")));
        assert!(is_blank(&json!([])));
        assert!(!is_blank(&json!({})));
        assert!(!is_blank(&json!(0)));
        assert!(!is_blank(&json!(false)));
        assert!(is_empty_value(&json!({})));
    }

    #[test]
    fn sequence_view() {
        assert_eq!(as_sequence(None), Vec::<Value>::new());
        assert_eq!(as_sequence(Some(&json!(3))), vec![json!(3)]);
        assert_eq!(as_sequence(Some(&json!([1, 2]))), vec![json!(1), json!(2)]);
    }

    #[test]
    fn rejects_non_object_json() {
        assert!(from_json_str("[1, 2]").is_err());
        let record = from_json_str(r#"{"a": 1}"#).unwrap();
        assert_eq!(record.get("a"), Some(&json!(1)));
    }
}
