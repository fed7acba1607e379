//! Injection of computed and static fields from the `extra` option.

use chrono::Utc;
use serde_json::Value;

use reconcile_core::{
    dotted::{extract, flatten, unflatten},
    ids::GlobalId,
    record::Record,
};

use crate::merge::{merge_keys, MergeOptions};

/// Extra key naming incoming fields to lift into the extra set.
pub const TRANSFORMER_KEY: &str = "_transformer";
pub const GID_SENTINEL: &str = "__gid__";
pub const TODAY_SENTINEL: &str = "__today__";

type Resolver = fn() -> Value;

const SENTINELS: &[(&str, Resolver)] = &[(GID_SENTINEL, new_gid as Resolver), (TODAY_SENTINEL, today as Resolver)];

fn new_gid() -> Value {
    Value::String(GlobalId::new().to_string())
}

fn today() -> Value {
    Value::String(Utc::now().to_rfc3339())
}

/// The value a sentinel stands for, or `None` if `value` is not one.
pub fn resolve_sentinel(value: &Value) -> Option<Value> {
    let Value::String(text) = value else {
        return None;
    };
    SENTINELS
        .iter()
        .find(|(sentinel, _)| *sentinel == text.as_str())
        .map(|(_, resolve)| resolve())
}

/// Merge the configured extras onto `data`, path by path.
pub fn add_extra(data: Record, extra: &Record, options: &MergeOptions) -> Record {
    if extra.is_empty() {
        return data;
    }

    let mut extras = flatten(extra);
    if let Some(lifted) = extras.remove(TRANSFORMER_KEY) {
        let fields: Vec<String> = match lifted {
            Value::String(field) => vec![field],
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(field) => Some(field),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        extras.extend(flatten(&extract(&data, &fields)));
    }

    for value in extras.values_mut() {
        if let Some(resolved) = resolve_sentinel(value) {
            *value = resolved;
        }
    }

    unflatten(&merge_keys(flatten(&data), &extras, options))
}
