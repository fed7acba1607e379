use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::cast::Scalar;
use crate::dotted::get_path;
use crate::record::Record;

/// Reserved key used when a query is rendered for logs.
pub const LIMIT_KEY: &str = "_limit";

/// Backend-neutral equality lookup.
///
/// `limit == None` is the unlimited marker: backends must return every match
/// instead of a default page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchQuery {
    criteria: BTreeMap<String, Scalar>,
    limit: Option<usize>,
}

impl MatchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Scalar) {
        self.criteria.insert(field.into(), value);
    }

    /// Merge another query's criteria over this one.
    pub fn extend(&mut self, other: MatchQuery) {
        self.criteria.extend(other.criteria);
    }

    pub fn get(&self, field: &str) -> Option<&Scalar> {
        self.criteria.get(field)
    }

    pub fn criteria(&self) -> &BTreeMap<String, Scalar> {
        &self.criteria
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn unlimited(mut self) -> Self {
        self.limit = None;
        self
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit.is_none()
    }

    /// True when every criterion matches the record. A missing field only
    /// matches a null criterion.
    pub fn matches(&self, record: &Record) -> bool {
        self.criteria
            .iter()
            .all(|(field, wanted)| match get_path(record, field) {
                Some(stored) => wanted.matches(stored),
                None => wanted.is_null(),
            })
    }

    pub fn to_record(&self) -> Record {
        let mut out: Record = self
            .criteria
            .iter()
            .map(|(field, value)| (field.clone(), value.to_value()))
            .collect();
        let limit = match self.limit {
            Some(n) => Value::from(n),
            None => Value::from(-1),
        };
        out.insert(LIMIT_KEY.to_string(), limit);
        out
    }
}

impl fmt::Display for MatchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.to_record()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn matches_all_criteria() {
        let mut query = MatchQuery::new();
        query.insert("email", Scalar::Text("a@b.com".into()));
        query.insert("profile.age", Scalar::Int(30));

        assert!(query.matches(&record(json!({"email": "a@b.com", "profile": {"age": "30"}}))));
        assert!(!query.matches(&record(json!({"email": "a@b.com", "profile": {"age": 31}}))));
        assert!(!query.matches(&record(json!({"email": "a@b.com"}))));
    }

    #[test]
    fn renders_limit_marker() {
        let mut query = MatchQuery::new();
        query.insert("sku", Scalar::Text("X1".into()));
        assert!(query.is_unlimited());
        assert_eq!(query.to_string(), r#"{"_limit":-1,"sku":"X1"}"#);
        assert_eq!(query.clone().with_limit(1).limit(), Some(1));
    }
}
