//! Field-level merge policies.

use serde_json::Value;

use reconcile_core::{
    dotted::{flatten, unflatten},
    record::{as_sequence, Record},
};

use crate::error::EngineError;
use crate::params::{cast_bool, cast_list, OperationConfig};

/// How incoming fields are folded into a target record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    pub overwrite: bool,
    pub append_to: Vec<String>,
    pub append_to_set: Vec<String>,
    pub flatten: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            append_to: Vec::new(),
            append_to_set: Vec::new(),
            flatten: false,
        }
    }
}

impl MergeOptions {
    pub const KEYS: &'static [&'static str] = &["overwrite", "append_to", "append_to_set", "flatten"];

    pub fn from_config(config: &OperationConfig) -> Self {
        Self {
            overwrite: config.overwrite,
            append_to: config.append_to.clone(),
            append_to_set: config.append_to_set.clone(),
            flatten: config.flatten,
        }
    }

    /// Parse a nested options mapping such as `extra_options`.
    pub fn from_record(raw: &Record) -> Result<Self, EngineError> {
        let mut options = Self::default();
        for (key, value) in raw {
            match key.as_str() {
                "overwrite" => options.overwrite = cast_bool(key, value)?,
                "flatten" => options.flatten = cast_bool(key, value)?,
                "append_to" => options.append_to = cast_list(key, value)?,
                "append_to_set" => options.append_to_set = cast_list(key, value)?,
                other => {
                    return Err(EngineError::invalid(
                        other,
                        format!("not a merge option, expected one of: {}", Self::KEYS.join(", ")),
                    ));
                }
            }
        }
        Ok(options)
    }
}

/// Merge `source` into a copy of `target`.
pub fn update_with(target: &Record, source: &Record, options: &MergeOptions) -> Record {
    if options.flatten {
        unflatten(&merge_keys(flatten(target), &flatten(source), options))
    } else {
        merge_keys(target.clone(), source, options)
    }
}

/// Key-by-key merge without any path handling.
pub(crate) fn merge_keys(mut target: Record, source: &Record, options: &MergeOptions) -> Record {
    for (key, incoming) in source {
        if options.append_to.contains(key) {
            let mut items = as_sequence(target.get(key));
            items.extend(as_sequence(Some(incoming)));
            target.insert(key.clone(), Value::Array(items));
        } else if options.append_to_set.contains(key) {
            let mut items: Vec<Value> = Vec::new();
            for item in as_sequence(target.get(key)).into_iter().chain(as_sequence(Some(incoming))) {
                if !items.contains(&item) {
                    items.push(item);
                }
            }
            target.insert(key.clone(), Value::Array(items));
        } else if options.overwrite || !target.contains_key(key) {
            target.insert(key.clone(), incoming.clone());
        }
    }
    target
}
