//! Typed operation parameters.
//!
//! A run is configured by a flat mapping. Every recognised option is declared
//! once in an [`OptionSchema`] with its caster and presence rule; the raw
//! mapping is cast against the schema and any key outside it is rejected.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use tracing::warn;

use reconcile_core::{
    dotted::is_dotted,
    record::{is_empty_value, type_name, Record},
};
use reconcile_storage::{registry::split_qualified, settings::DEFAULT_NAMESPACE, BackendKind};

use crate::error::EngineError;
use crate::merge::MergeOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caster {
    Str,
    Bool,
    Int,
    List,
    Dict,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Bool(bool),
    Int(i64),
    List(Vec<String>),
    Dict(Record),
}

impl Caster {
    pub fn cast(self, name: &str, value: &Value) -> Result<ParamValue, EngineError> {
        match self {
            Caster::Str => match value {
                Value::String(s) => Ok(ParamValue::Str(s.clone())),
                Value::Number(n) => Ok(ParamValue::Str(n.to_string())),
                Value::Bool(b) => Ok(ParamValue::Str(b.to_string())),
                other => Err(wrong_shape(name, "a string", other)),
            },
            Caster::Bool => cast_bool(name, value).map(ParamValue::Bool),
            Caster::Int => match value {
                Value::Number(n) => n
                    .as_i64()
                    .map(ParamValue::Int)
                    .ok_or_else(|| EngineError::invalid(name, format!("`{n}` is not an integer"))),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(ParamValue::Int)
                    .map_err(|_| EngineError::invalid(name, format!("`{s}` is not an integer"))),
                other => Err(wrong_shape(name, "an integer", other)),
            },
            Caster::List => cast_list(name, value).map(ParamValue::List),
            Caster::Dict => match value {
                Value::Object(map) => Ok(ParamValue::Dict(map.clone())),
                Value::String(s) if s.trim().is_empty() => Ok(ParamValue::Dict(Record::new())),
                Value::String(s) => match serde_json::from_str::<Value>(s) {
                    Ok(Value::Object(map)) => Ok(ParamValue::Dict(map)),
                    _ => Err(EngineError::invalid(name, "expected a mapping")),
                },
                other => Err(wrong_shape(name, "a mapping", other)),
            },
        }
    }
}

fn wrong_shape(name: &str, expected: &str, got: &Value) -> EngineError {
    EngineError::invalid(name, format!("expected {expected}, got {}", type_name(got)))
}

pub(crate) fn cast_bool(name: &str, value: &Value) -> Result<bool, EngineError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" | "" => Ok(false),
            _ => Err(EngineError::invalid(name, format!("`{s}` is not a boolean"))),
        },
        other => Err(wrong_shape(name, "a boolean", other)),
    }
}

pub(crate) fn cast_list(name: &str, value: &Value) -> Result<Vec<String>, EngineError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()),
        Value::String(s) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()),
        other => Err(wrong_shape(name, "a list", other)),
    }
}

#[derive(Debug, Clone)]
enum Presence {
    Default(ParamValue),
    Required,
    Optional,
}

#[derive(Debug, Clone)]
struct OptionDef {
    name: &'static str,
    caster: Caster,
    presence: Presence,
}

/// Declared options, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct OptionSchema {
    defs: Vec<OptionDef>,
}

impl OptionSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, name: &'static str, caster: Caster, default: ParamValue) -> Self {
        self.defs.push(OptionDef { name, caster, presence: Presence::Default(default) });
        self
    }

    /// The option must be present and non-empty.
    pub fn required(mut self, name: &'static str, caster: Caster) -> Self {
        self.defs.push(OptionDef { name, caster, presence: Presence::Required });
        self
    }

    /// The option may be absent; it then has no value at all.
    pub fn optional(mut self, name: &'static str, caster: Caster) -> Self {
        self.defs.push(OptionDef { name, caster, presence: Presence::Optional });
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.defs.iter().map(|def| def.name)
    }

    /// Cast `raw` against the declarations, then reject undeclared keys.
    pub fn parse(&self, raw: &Record) -> Result<ParamSet, EngineError> {
        let mut values = BTreeMap::new();
        for def in &self.defs {
            let given = raw.get(def.name).filter(|value| !value.is_null());
            match (given, &def.presence) {
                (Some(value), Presence::Required) if is_empty_value(value) => {
                    return Err(EngineError::MissingOption(def.name.to_string()));
                }
                (Some(value), _) => {
                    values.insert(def.name, def.caster.cast(def.name, value)?);
                }
                (None, Presence::Default(default)) => {
                    values.insert(def.name, default.clone());
                }
                (None, Presence::Required) => {
                    return Err(EngineError::MissingOption(def.name.to_string()));
                }
                (None, Presence::Optional) => {}
            }
        }

        let declared: BTreeSet<&str> = self.names().collect();
        let unknown: Vec<String> = raw
            .keys()
            .filter(|key| !declared.contains(key.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(EngineError::InvalidOperation(unknown));
        }

        Ok(ParamSet { values })
    }
}

/// Cast option values keyed by option name.
#[derive(Debug, Clone, Default)]
pub struct ParamSet {
    values: BTreeMap<&'static str, ParamValue>,
}

impl ParamSet {
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ParamValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(ParamValue::Bool(true)))
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ParamValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        match self.values.get(name) {
            Some(ParamValue::List(items)) => Some(items),
            _ => None,
        }
    }

    pub fn dict(&self, name: &str) -> Option<&Record> {
        match self.values.get(name) {
            Some(ParamValue::Dict(map)) => Some(map),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Upsert,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }

    /// Whether the operation looks records up by key fields.
    pub fn requires_keys(&self) -> bool {
        !matches!(self, Self::Create)
    }
}

impl FromStr for Operation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "upsert" => Ok(Self::Upsert),
            "delete" => Ok(Self::Delete),
            other => Err(EngineError::UnknownOperation(other.to_string())),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `transformer` option: `name` or `name__as__alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformerRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TransformerRef {
    pub const ALIAS_SEPARATOR: &'static str = "__as__";

    pub fn parse(raw: &str) -> Self {
        match raw.split_once(Self::ALIAS_SEPARATOR) {
            Some((name, alias)) if !alias.is_empty() => Self {
                name: name.to_string(),
                alias: Some(alias.to_string()),
            },
            Some((name, _)) => Self { name: name.to_string(), alias: None },
            None => Self { name: raw.to_string(), alias: None },
        }
    }
}

/// Validated configuration of one run. Built once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct OperationConfig {
    pub name: String,
    pub keep_ids: bool,
    pub overwrite: bool,
    pub flatten: bool,
    pub append_to: Vec<String>,
    pub append_to_set: Vec<String>,
    pub normalize: Vec<String>,
    pub fields: Option<Vec<String>>,
    pub pop_empty: Vec<String>,
    pub keep_source_logs: bool,
    pub dry_run: bool,
    pub log_size: usize,
    pub log_fields: Vec<String>,
    pub log_pretty: bool,
    pub fail_on_error: bool,
    pub show_diff: Option<Vec<String>>,
    pub op: Operation,
    pub op_params: Vec<String>,
    pub skip_by: Option<Vec<String>>,
    pub transformer: Option<TransformerRef>,
    pub source_consolidation_mode: Option<String>,
    pub backend: BackendKind,
    pub ns: Option<String>,
    pub query: Record,
    pub extra: Record,
    pub extra_options: MergeOptions,
}

impl OperationConfig {
    pub const DEFAULT_LOG_SIZE: i64 = 256;

    pub fn schema() -> OptionSchema {
        use Caster::*;

        let empty_list = || ParamValue::List(Vec::new());
        let empty_dict = || ParamValue::Dict(Record::new());

        OptionSchema::new()
            .required("name", Str)
            .with_default("keep_ids", Bool, ParamValue::Bool(false))
            .with_default("overwrite", Bool, ParamValue::Bool(true))
            .with_default("flatten", Bool, ParamValue::Bool(false))
            .with_default("append_to", List, empty_list())
            .with_default("append_to_set", List, empty_list())
            .with_default("normalize", List, empty_list())
            .optional("fields", List)
            .with_default("pop_empty", List, empty_list())
            .with_default("keep_source_logs", Bool, ParamValue::Bool(false))
            .with_default("dry_run", Bool, ParamValue::Bool(false))
            .with_default("log_size", Int, ParamValue::Int(Self::DEFAULT_LOG_SIZE))
            .with_default("log_fields", List, empty_list())
            .with_default("log_pretty", Bool, ParamValue::Bool(false))
            .with_default("fail_on_error", Bool, ParamValue::Bool(true))
            .optional("show_diff", List)
            .required("op", Str)
            .optional("skip_by", List)
            .optional("transformer", Str)
            .optional("source_consolidation_mode", Str)
            .optional("backend", Str)
            .optional("ns", Str)
            .with_default("query", Dict, empty_dict())
            .with_default("extra", Dict, empty_dict())
            .with_default("extra_options", Dict, empty_dict())
    }

    pub fn from_map(raw: &Record) -> Result<Self, EngineError> {
        let params = Self::schema().parse(raw).map_err(|e| match e {
            EngineError::MissingOption(name) if name == "op" => EngineError::MissingOperation,
            other => other,
        })?;
        Self::from_params(&params)
    }

    pub fn from_json_str(text: &str) -> Result<Self, EngineError> {
        let raw = reconcile_core::record::from_json_str(text)?;
        Self::from_map(&raw)
    }

    fn from_params(params: &ParamSet) -> Result<Self, EngineError> {
        let list = |name: &str| params.list(name).map(<[String]>::to_vec).unwrap_or_default();
        let dict = |name: &str| params.dict(name).cloned().unwrap_or_default();

        let (op, op_params) = parse_op(params.str("op").unwrap_or_default())?;

        let log_size = params.int("log_size").unwrap_or(Self::DEFAULT_LOG_SIZE);
        let log_size = usize::try_from(log_size)
            .map_err(|_| EngineError::invalid("log_size", format!("`{log_size}` is negative")))?;

        let backend = match params.str("backend") {
            Some(raw) => raw
                .parse::<BackendKind>()
                .map_err(|e| EngineError::invalid("backend", e.to_string()))?,
            None => BackendKind::default(),
        };

        let config = Self {
            name: params.str("name").unwrap_or_default().to_string(),
            keep_ids: params.bool("keep_ids"),
            overwrite: params.bool("overwrite"),
            flatten: params.bool("flatten"),
            append_to: list("append_to"),
            append_to_set: list("append_to_set"),
            normalize: list("normalize"),
            fields: params.list("fields").map(<[String]>::to_vec),
            pop_empty: list("pop_empty"),
            keep_source_logs: params.bool("keep_source_logs"),
            dry_run: params.bool("dry_run"),
            log_size,
            log_fields: list("log_fields"),
            log_pretty: params.bool("log_pretty"),
            fail_on_error: params.bool("fail_on_error"),
            show_diff: params.list("show_diff").map(<[String]>::to_vec),
            op,
            op_params,
            skip_by: params.list("skip_by").map(<[String]>::to_vec),
            transformer: params
                .str("transformer")
                .filter(|raw| !raw.is_empty())
                .map(TransformerRef::parse),
            source_consolidation_mode: params
                .str("source_consolidation_mode")
                .filter(|mode| !mode.is_empty())
                .map(str::to_string),
            backend,
            ns: params.str("ns").filter(|ns| !ns.is_empty()).map(str::to_string),
            query: dict("query"),
            extra: dict("extra"),
            extra_options: MergeOptions::from_record(&dict("extra_options"))?,
        };
        config.warn_dotted_keys();
        Ok(config)
    }

    fn warn_dotted_keys(&self) {
        if self.flatten {
            return;
        }
        for key in self.append_to.iter().chain(&self.append_to_set) {
            if is_dotted(key) {
                warn!(key = %key, "nested key in append options while `flatten` is off");
            }
        }
        for key in &self.op_params {
            if is_dotted(key) {
                warn!(key = %key, "nested key in op params while `flatten` is off");
            }
        }
    }

    /// `(namespace, collection)` the run targets. A document collection
    /// named `ns.name` carries its own namespace when `ns` is not set.
    pub fn collection(&self) -> (String, String) {
        if let Some(ns) = &self.ns {
            return (ns.clone(), self.name.clone());
        }
        if self.backend == BackendKind::Documents {
            if let (Some(ns), name) = split_qualified(&self.name) {
                if !ns.is_empty() {
                    return (ns.to_string(), name.to_string());
                }
            }
        }
        (DEFAULT_NAMESPACE.to_string(), self.name.clone())
    }
}

/// Split `update:key1,key2` into the operation and its key fields.
fn parse_op(raw: &str) -> Result<(Operation, Vec<String>), EngineError> {
    let (head, tail) = raw.split_once(':').unwrap_or((raw, ""));
    if head.trim().is_empty() {
        return Err(EngineError::MissingOperation);
    }
    let op: Operation = head.parse()?;
    let keys: Vec<String> = tail
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect();
    if op.requires_keys() && keys.is_empty() {
        return Err(EngineError::MissingOpParams(op.to_string()));
    }
    Ok((op, keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn raw(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn defaults_apply() -> Result<(), EngineError> {
        let config = OperationConfig::from_map(&raw(json!({"name": "users", "op": "create"})))?;
        assert_eq!(config.op, Operation::Create);
        assert!(config.op_params.is_empty());
        assert!(config.overwrite);
        assert!(config.fail_on_error);
        assert!(!config.keep_ids);
        assert_eq!(config.log_size, 256);
        assert_eq!(config.fields, None);
        assert_eq!(config.show_diff, None);
        assert_eq!(config.backend, BackendKind::Documents);
        assert_eq!(config.extra_options, MergeOptions::default());
        Ok(())
    }

    #[test]
    fn unknown_keys_are_listed() {
        let err = OperationConfig::from_map(&raw(json!({
            "name": "users", "op": "create", "colour": "red", "size": 3
        })))
        .unwrap_err();
        match err {
            EngineError::InvalidOperation(keys) => assert_eq!(keys, vec!["colour", "size"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn op_parsing() -> Result<(), EngineError> {
        let config =
            OperationConfig::from_map(&raw(json!({"name": "users", "op": "update:email, name"})))?;
        assert_eq!(config.op, Operation::Update);
        assert_eq!(config.op_params, vec!["email", "name"]);

        let missing = OperationConfig::from_map(&raw(json!({"name": "users"}))).unwrap_err();
        assert!(matches!(missing, EngineError::MissingOperation));

        let unknown =
            OperationConfig::from_map(&raw(json!({"name": "users", "op": "merge:a"}))).unwrap_err();
        assert!(matches!(unknown, EngineError::UnknownOperation(op) if op == "merge"));

        let keyless =
            OperationConfig::from_map(&raw(json!({"name": "users", "op": "delete"}))).unwrap_err();
        assert!(matches!(keyless, EngineError::MissingOpParams(op) if op == "delete"));
        Ok(())
    }

    #[test]
    fn name_is_required() {
        let err = OperationConfig::from_map(&raw(json!({"name": "", "op": "create"}))).unwrap_err();
        assert!(matches!(err, EngineError::MissingOption(name) if name == "name"));
    }

    #[test]
    fn casters_accept_loose_input() -> Result<(), EngineError> {
        let config = OperationConfig::from_map(&raw(json!({
            "name": "users",
            "op": "upsert:sku",
            "dry_run": "yes",
            "overwrite": 0,
            "log_size": "64",
            "append_to": "tags, labels,",
            "skip_by": ["email"],
            "transformer": "mod.fn__as__meta",
            "extra_options": {"overwrite": "false", "append_to": "tags"},
        })))?;
        assert!(config.dry_run);
        assert!(!config.overwrite);
        assert_eq!(config.log_size, 64);
        assert_eq!(config.append_to, vec!["tags", "labels"]);
        assert_eq!(config.skip_by, Some(vec!["email".to_string()]));
        assert_eq!(
            config.transformer,
            Some(TransformerRef { name: "mod.fn".into(), alias: Some("meta".into()) })
        );
        assert!(!config.extra_options.overwrite);
        assert_eq!(config.extra_options.append_to, vec!["tags"]);
        Ok(())
    }

    #[test]
    fn rejects_wrong_shapes() {
        let bad_bool =
            OperationConfig::from_map(&raw(json!({"name": "u", "op": "create", "dry_run": "maybe"})));
        assert!(matches!(bad_bool, Err(EngineError::InvalidOption { name, .. }) if name == "dry_run"));

        let negative =
            OperationConfig::from_map(&raw(json!({"name": "u", "op": "create", "log_size": -1})));
        assert!(matches!(negative, Err(EngineError::InvalidOption { name, .. }) if name == "log_size"));

        let backend =
            OperationConfig::from_map(&raw(json!({"name": "u", "op": "create", "backend": "es"})));
        assert!(matches!(backend, Err(EngineError::InvalidOption { name, .. }) if name == "backend"));

        let extra_options = OperationConfig::from_map(&raw(json!({
            "name": "u", "op": "create", "extra_options": {"upsert": true}
        })));
        assert!(matches!(extra_options, Err(EngineError::InvalidOption { .. })));
    }

    #[test]
    fn collection_names() -> Result<(), EngineError> {
        let plain = OperationConfig::from_map(&raw(json!({"name": "users", "op": "create"})))?;
        assert_eq!(plain.collection(), ("default".to_string(), "users".to_string()));

        let qualified = OperationConfig::from_map(&raw(json!({"name": "crm.users", "op": "create"})))?;
        assert_eq!(qualified.collection(), ("crm".to_string(), "users".to_string()));

        let csv = OperationConfig::from_map(&raw(json!({
            "name": "out.csv", "op": "create", "backend": "csv", "ns": "exports"
        })))?;
        assert_eq!(csv.collection(), ("exports".to_string(), "out.csv".to_string()));
        Ok(())
    }

    #[test]
    fn configuration_errors_are_classified() {
        assert!(EngineError::MissingOperation.is_configuration());
        assert!(EngineError::InvalidOperation(vec!["x".into()]).is_configuration());
        assert!(!EngineError::EmptyQuery("empty op params".into()).is_configuration());
    }
}
