//! Pluggable record transformers and normalizers used by the save pipeline.

use serde_json::Value;

use reconcile_core::{dotted::get_path, record::Record};

/// Turns one record into zero or more records. Only the first one is kept
/// by the save pipeline.
pub trait Transformer {
    fn transform(&self, data: Record) -> Vec<Record>;
}

impl<F> Transformer for F
where
    F: Fn(Record) -> Vec<Record>,
{
    fn transform(&self, data: Record) -> Vec<Record> {
        self(data)
    }
}

/// Computes the value stored under `n` from the listed fields.
pub trait Normalizer {
    fn normalize(&self, data: &Record, fields: &[String]) -> Value;
}

/// Lowercases each field, keeps alphanumerics and single spaces, and joins
/// the fields with a space.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextNormalizer;

impl TextNormalizer {
    fn text_of(value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Array(items) => items.iter().map(Self::text_of).collect::<Vec<_>>().join(" "),
            other => other.to_string(),
        }
    }

    fn clean(text: &str) -> String {
        let kept: String = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        kept.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl Normalizer for TextNormalizer {
    fn normalize(&self, data: &Record, fields: &[String]) -> Value {
        let parts: Vec<String> = fields
            .iter()
            .filter_map(|field| get_path(data, field))
            .map(|value| Self::clean(&Self::text_of(value)))
            .filter(|part| !part.is_empty())
            .collect();
        Value::String(parts.join(" "))
    }
}
