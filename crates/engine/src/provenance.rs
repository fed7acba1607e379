//! Consolidation of `source` (provenance) metadata across merges.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use reconcile_core::record::{is_empty_value, Record};

use crate::error::EngineError;

/// Combines the stored `source` with the incoming one under a named mode.
pub trait SourceConsolidator {
    /// Mode names accepted by [`SourceConsolidator::consolidate`].
    fn modes(&self) -> &[&'static str];

    /// `None` (or an empty value) leaves the stored source unchanged.
    fn consolidate(&self, existing: &Value, incoming: &Value, mode: &str) -> Result<Option<Value>, EngineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsolidationMode {
    Replace,
    PreferExisting,
    PreferIncoming,
    Union,
}

impl ConsolidationMode {
    pub const NAMES: &'static [&'static str] = &["replace", "prefer_existing", "prefer_incoming", "union"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::PreferExisting => "prefer_existing",
            Self::PreferIncoming => "prefer_incoming",
            Self::Union => "union",
        }
    }
}

impl FromStr for ConsolidationMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "replace" => Ok(Self::Replace),
            "prefer_existing" => Ok(Self::PreferExisting),
            "prefer_incoming" => Ok(Self::PreferIncoming),
            "union" => Ok(Self::Union),
            other => Err(EngineError::invalid(
                "source_consolidation_mode",
                format!("unknown mode `{other}`, choices are: {}", Self::NAMES.join(", ")),
            )),
        }
    }
}

impl fmt::Display for ConsolidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The built-in consolidation strategies.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyTable;

impl SourceConsolidator for StrategyTable {
    fn modes(&self) -> &[&'static str] {
        ConsolidationMode::NAMES
    }

    fn consolidate(&self, existing: &Value, incoming: &Value, mode: &str) -> Result<Option<Value>, EngineError> {
        let merged = match mode.parse::<ConsolidationMode>()? {
            ConsolidationMode::Replace => incoming.clone(),
            ConsolidationMode::PreferExisting => deep_merge(incoming, existing, false),
            ConsolidationMode::PreferIncoming => deep_merge(existing, incoming, false),
            ConsolidationMode::Union => deep_merge(existing, incoming, true),
        };
        Ok((!is_empty_value(&merged)).then_some(merged))
    }
}

/// Merge `over` onto `base`: objects recurse, `over` wins on conflicting
/// leaves. With `union_lists`, two lists are set-unioned instead.
fn deep_merge(base: &Value, over: &Value, union_lists: bool) -> Value {
    match (base, over) {
        (Value::Object(base), Value::Object(over)) => {
            let mut out: Record = base.clone();
            for (key, value) in over {
                let merged = match base.get(key) {
                    Some(existing) => deep_merge(existing, value, union_lists),
                    None => value.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::Object(out)
        }
        (Value::Array(base), Value::Array(over)) if union_lists => {
            let mut items = base.clone();
            for item in over {
                if !items.contains(item) {
                    items.push(item.clone());
                }
            }
            Value::Array(items)
        }
        (base, Value::Null) => base.clone(),
        (_, over) => over.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run(mode: &str, existing: Value, incoming: Value) -> Option<Value> {
        StrategyTable.consolidate(&existing, &incoming, mode).unwrap()
    }

    #[test]
    fn replace_takes_incoming() {
        assert_eq!(
            run("replace", json!({"a": 1, "b": 2}), json!({"a": 3})),
            Some(json!({"a": 3}))
        );
        assert_eq!(run("replace", json!({"a": 1}), json!({})), None);
    }

    #[test]
    fn preference_decides_conflicts() {
        let existing = json!({"feed": "crm", "meta": {"rank": 1, "seen": "mon"}});
        let incoming = json!({"feed": "erp", "meta": {"rank": 2}, "new": true});

        assert_eq!(
            run("prefer_existing", existing.clone(), incoming.clone()),
            Some(json!({"feed": "crm", "meta": {"rank": 1, "seen": "mon"}, "new": true}))
        );
        assert_eq!(
            run("prefer_incoming", existing, incoming),
            Some(json!({"feed": "erp", "meta": {"rank": 2, "seen": "mon"}, "new": true}))
        );
    }

    #[test]
    fn union_merges_lists() {
        assert_eq!(
            run("union", json!({"feeds": ["crm", "erp"], "v": 1}), json!({"feeds": ["erp", "web"], "v": 2})),
            Some(json!({"feeds": ["crm", "erp", "web"], "v": 2}))
        );
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = StrategyTable.consolidate(&json!({}), &json!({}), "newest").unwrap_err();
        assert!(err.is_configuration());
        assert_eq!("union".parse::<ConsolidationMode>().unwrap(), ConsolidationMode::Union);
    }
}
