//! Leaf value casting.
//!
//! Records arrive from feeds where almost everything is text. Lookups need
//! typed values so that `"30"` in one source and `30` in another compare
//! equal; [`Scalar`] is that typed form.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Number, Value};

use crate::record::Record;

#[derive(Debug, Clone)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(DateTime<Utc>),
    Text(String),
    List(Vec<Scalar>),
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b).is_eq(),
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => {
                (*a as f64).total_cmp(b).is_eq()
            }
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Null, empty text and empty lists carry no lookup information.
    pub fn is_blank(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Text(s) => s.is_empty(),
            Scalar::List(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => cast_str(s),
            Value::Array(items) => Scalar::List(items.iter().map(Scalar::from_value).collect()),
            Value::Object(_) => Scalar::Text(value.to_string()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::Number((*i).into()),
            Scalar::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Scalar::Date(dt) => Value::String(dt.to_rfc3339()),
            Scalar::Text(s) => Value::String(s.clone()),
            Scalar::List(items) => Value::Array(items.iter().map(Scalar::to_value).collect()),
        }
    }

    /// Equality lookup against a stored value. The stored side is cast the
    /// same way, so text cells match typed criteria. Lists on either side
    /// match on any shared element.
    pub fn matches(&self, stored: &Value) -> bool {
        let stored = Scalar::from_value(stored);
        match (self, &stored) {
            (Scalar::List(wanted), Scalar::List(have)) => {
                wanted.iter().any(|w| have.iter().any(|h| w == h))
            }
            (Scalar::List(wanted), have) => wanted.iter().any(|w| w == have),
            (want, Scalar::List(have)) => have.iter().any(|h| h == want),
            (want, have) => want == have,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

/// Cast a text leaf: booleans, nulls, integers, floats and dates are
/// recognised; anything else stays text.
pub fn cast_str(raw: &str) -> Scalar {
    let text = raw.trim();
    match text.to_ascii_lowercase().as_str() {
        "true" => return Scalar::Bool(true),
        "false" => return Scalar::Bool(false),
        "null" | "none" => return Scalar::Null,
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return Scalar::Int(i);
    }
    if let Ok(f) = text.parse::<f64>() {
        if f.is_finite() {
            return Scalar::Float(f);
        }
    }
    if let Some(dt) = parse_date(text) {
        return Scalar::Date(dt);
    }
    Scalar::Text(raw.to_string())
}

pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Cast text leaves of a value in place of their string form. Dates stay
/// text here: they only become typed inside a lookup.
pub fn typecast_value(value: Value) -> Value {
    match value {
        Value::String(s) => match cast_str(&s) {
            Scalar::Date(_) | Scalar::Text(_) => Value::String(s),
            other => other.to_value(),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(typecast_value).collect()),
        Value::Object(map) => Value::Object(typecast_record(map)),
        other => other,
    }
}

pub fn typecast_record(record: Record) -> Record {
    record
        .into_iter()
        .map(|(key, value)| (key, typecast_value(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn casts_text_leaves() {
        assert_eq!(cast_str("true"), Scalar::Bool(true));
        assert_eq!(cast_str("FALSE"), Scalar::Bool(false));
        assert_eq!(cast_str("null"), Scalar::Null);
        assert_eq!(cast_str(" 42 "), Scalar::Int(42));
        assert_eq!(cast_str("-1.5"), Scalar::Float(-1.5));
        assert_eq!(cast_str("nan"), Scalar::Text("nan".into()));
        assert_eq!(cast_str("a@b.com"), Scalar::Text("a@b.com".into()));
        assert!(matches!(cast_str("2024-03-01"), Scalar::Date(_)));
        assert!(matches!(cast_str("2024-03-01T10:00:00Z"), Scalar::Date(_)));
    }

    #[test]
    fn numeric_cross_equality() {
        assert_eq!(Scalar::Int(3), Scalar::Float(3.0));
        assert_ne!(Scalar::Int(3), Scalar::Text("3".into()));
    }

    #[test]
    fn matches_casts_stored_side() {
        assert!(Scalar::Int(30).matches(&json!("30")));
        assert!(Scalar::Int(30).matches(&json!(30)));
        assert!(!Scalar::Int(30).matches(&json!("31")));
        let date = cast_str("2024-03-01");
        assert!(date.matches(&json!("2024-03-01T00:00:00+00:00")));
    }

    #[test]
    fn list_membership() {
        let wanted = Scalar::List(vec![Scalar::Text("a".into()), Scalar::Text("b".into())]);
        assert!(wanted.matches(&json!("b")));
        assert!(wanted.matches(&json!(["x", "a"])));
        assert!(!wanted.matches(&json!("c")));
        assert!(Scalar::Text("x".into()).matches(&json!(["x", "y"])));
    }

    #[test]
    fn typecast_keeps_dates_and_text() {
        let out = typecast_value(json!({
            "n": "5", "f": "1.25", "b": "true", "d": "2024-01-01", "t": "hello", "l": ["1", "x"]
        }));
        assert_eq!(
            out,
            json!({"n": 5, "f": 1.25, "b": true, "d": "2024-01-01", "t": "hello", "l": [1, "x"]})
        );
    }
}
