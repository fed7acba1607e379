//! Log rendering for payloads, queries and field diffs.

use std::fmt::Display;

use serde_json::Value;
use tracing::info;

use reconcile_core::{
    dotted::{extract, get_path},
    record::{Record, ID_KEY, LOGS_KEY},
};

use crate::params::OperationConfig;

/// Renders queries and records for log output, bounded by `log_size`.
#[derive(Debug, Clone)]
pub struct LogFormat {
    size: usize,
    fields: Vec<String>,
    pretty: bool,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self {
            size: OperationConfig::DEFAULT_LOG_SIZE as usize,
            fields: Vec::new(),
            pretty: false,
        }
    }
}

impl LogFormat {
    pub fn new(size: usize, fields: Vec<String>, pretty: bool) -> Self {
        Self { size, fields, pretty }
    }

    pub fn from_config(config: &OperationConfig) -> Self {
        Self::new(config.log_size, config.log_fields.clone(), config.log_pretty)
    }

    /// The record, restricted to `log_fields` when set, truncated.
    pub fn data(&self, data: &Record) -> String {
        let shown = if self.fields.is_empty() {
            data.clone()
        } else {
            extract(data, &self.fields)
        };
        let value = Value::Object(shown);
        let text = if self.pretty {
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
        } else {
            value.to_string()
        };
        truncate(&text, self.size)
    }

    pub fn query(&self, query: impl Display) -> String {
        format!("QUERY: `{query}`")
    }

    /// Key list and (restricted, truncated) body of a record.
    pub fn record(&self, data: &Record) -> String {
        let keys: Vec<&str> = data.keys().map(String::as_str).collect();
        let mut lines = vec![format!("DATA keys: `{keys:?}`")];
        if !self.fields.is_empty() {
            lines.push(format!("LOG KEYS: `{:?}`", self.fields));
        }
        lines.push(format!("DATA dict: {}", self.data(data)));
        lines.join("\n")
    }

    pub fn render(&self, query: impl Display, data: &Record) -> String {
        format!("{}\n{}", self.query(query), self.record(data))
    }
}

fn truncate(text: &str, size: usize) -> String {
    match text.char_indices().nth(size) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// One field where the incoming record and the stored one disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiff {
    pub field: String,
    pub incoming: Option<Value>,
    pub existing: Option<Value>,
}

/// Compare `incoming` with `existing` over `fields` (every incoming field
/// when empty). `id` and `logs` are never compared.
pub fn diff(incoming: &Record, existing: &Record, fields: &[String]) -> Vec<FieldDiff> {
    let fields: Vec<&str> = if fields.is_empty() {
        incoming.keys().map(String::as_str).collect()
    } else {
        fields.iter().map(String::as_str).collect()
    };

    fields
        .into_iter()
        .filter(|field| *field != ID_KEY && *field != LOGS_KEY)
        .filter_map(|field| {
            let theirs = get_path(incoming, field)?;
            let ours = get_path(existing, field);
            (ours != Some(theirs)).then(|| FieldDiff {
                field: field.to_string(),
                incoming: Some(theirs.clone()),
                existing: ours.cloned(),
            })
        })
        .collect()
}

pub fn log_diff(diffs: &[FieldDiff]) {
    if diffs.is_empty() {
        info!("DIFF: target contains source data");
        return;
    }
    for d in diffs {
        let show = |value: &Option<Value>| value.as_ref().map_or("<missing>".to_string(), Value::to_string);
        info!(
            field = %d.field,
            "DIFF: incoming {} != existing {}",
            show(&d.incoming),
            show(&d.existing)
        );
    }
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
    fn truncates_on_char_boundaries() {
        let format = LogFormat::new(3, Vec::new(), false);
        assert_eq!(format.data(&record(json!({"k": "æøå"}))), "{\"k");
        assert_eq!(truncate("æøå", 2), "æø");
        assert_eq!(truncate("ab", 5), "ab");
    }

    #[test]
    fn restricts_to_log_fields() {
        let format = LogFormat::new(256, vec!["email".into()], false);
        let rendered = format.render("{}", &record(json!({"email": "a@b", "name": "Ann"})));
        assert!(rendered.starts_with("QUERY: `{}`\nDATA keys: `[\"email\", \"name\"]`"));
        assert!(rendered.contains("DATA dict: {\"email\":\"a@b\"}"));
        assert!(rendered.contains("LOG KEYS"));
    }

    #[test]
    fn diff_reports_changed_and_missing() {
        let incoming = record(json!({"id": "x", "name": "Bob", "age": 30, "logs": []}));
        let existing = record(json!({"id": "y", "name": "Alice", "age": 30}));
        assert_eq!(
            diff(&incoming, &existing, &[]),
            vec![FieldDiff {
                field: "name".into(),
                incoming: Some(json!("Bob")),
                existing: Some(json!("Alice")),
            }]
        );

        let nested = diff(
            &record(json!({"a": {"b": 1}})),
            &record(json!({})),
            &["a.b".to_string(), "missing".to_string()],
        );
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].existing, None);
    }
}
