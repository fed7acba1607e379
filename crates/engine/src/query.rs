//! Lookup queries built from an incoming record's own key fields.

use serde_json::Value;

use reconcile_core::{
    cast::Scalar,
    dotted::{extract, flatten, is_dotted},
    query::MatchQuery,
    record::Record,
};

use crate::diagnostics::LogFormat;
use crate::error::EngineError;

/// Build an unlimited equality query from `keys` of `record`. Dotted keys
/// contribute every leaf under that path; blank values are skipped.
pub fn build_query(record: &Record, keys: &[String], format: &LogFormat) -> Result<MatchQuery, EngineError> {
    let mut query = MatchQuery::new();
    for key in keys {
        if is_dotted(key) {
            for (path, value) in flatten(&extract(record, &[key])) {
                push_criterion(&mut query, path, &value);
            }
        } else if let Some(value) = record.get(key) {
            push_criterion(&mut query, key.clone(), value);
        }
    }

    if query.is_empty() {
        if keys.is_empty() {
            return Err(EngineError::EmptyQuery("empty op params".to_string()));
        }
        return Err(EngineError::EmptyQuery(format!(
            "update query is empty for:\n{}",
            format.render(format!("{keys:?}"), record)
        )));
    }
    Ok(query.unlimited())
}

/// Cast the configured static filter into criteria.
pub fn static_query(filter: &Record) -> MatchQuery {
    let mut query = MatchQuery::new();
    for (path, value) in flatten(filter) {
        query.insert(path, Scalar::from_value(&value));
    }
    query
}

fn push_criterion(query: &mut MatchQuery, field: String, value: &Value) {
    let scalar = Scalar::from_value(value);
    if !scalar.is_blank() {
        query.insert(field, scalar);
    }
}
