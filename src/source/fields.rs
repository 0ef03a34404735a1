//! Field decoding for loosely-typed source records.
//!
//! Source fields may be missing, `null`, empty strings, numbers sent as
//! strings or single ids where a list is expected. Every helper here maps
//! "nothing meaningful" to `None` (or an empty list) instead of failing;
//! only structurally wrong values are errors.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// Trimmed string; empty becomes `None`. Numbers and booleans are
/// stringified.
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| value_to_string(&v)))
}

pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Integer from a number or numeric string. Fractional numbers are
/// truncated (the platform stores ordering fields as floats).
pub fn opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .or_else(|_| s.parse::<f64>().map(|f| f as i64))
                .map(Some)
                .map_err(|_| de::Error::custom(format!("expected an integer, got {:?}", s)))
        }
        Some(other) => Err(de::Error::custom(format!("expected an integer, got {}", other))),
    }
}

/// Float from a number or numeric string (comma decimal separators accepted).
pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => Ok(parse_number(&s)),
        Some(other) => Err(de::Error::custom(format!("expected a number, got {}", other))),
    }
}

pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>()
        .ok()
        .or_else(|| s.replace(',', ".").parse::<f64>().ok())
}

/// Boolean from a bool, `yes`/`no`, `true`/`false` or `1`/`0`.
pub fn opt_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| value_to_bool(&v)))
}

pub fn value_to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "yes" | "true" | "1" => Some(true),
            "no" | "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// List of ids. Accepts an array, a single id, or nothing. Blank entries
/// are dropped and duplicates removed (first occurrence wins).
pub fn id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(single) => vec![single],
    };
    let mut ids: Vec<String> = Vec::with_capacity(items.len());
    for item in &items {
        if let Some(id) = value_to_string(item)
            && !ids.contains(&id)
        {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Timestamp as RFC 3339 text or epoch milliseconds.
pub fn opt_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| de::Error::custom(format!("invalid timestamp {:?}: {}", s, e))),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid epoch timestamp {}", n))),
        Some(other) => Err(de::Error::custom(format!("expected a timestamp, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize, Debug)]
    struct Probe {
        #[serde(default, deserialize_with = "opt_string")]
        name: Option<String>,
        #[serde(default, deserialize_with = "opt_i64")]
        order: Option<i64>,
        #[serde(default, deserialize_with = "opt_f64")]
        amount: Option<f64>,
        #[serde(default, deserialize_with = "opt_bool")]
        flag: Option<bool>,
        #[serde(default, deserialize_with = "id_list")]
        tags: Vec<String>,
        #[serde(default, deserialize_with = "opt_datetime")]
        at: Option<DateTime<Utc>>,
    }

    fn probe(value: Value) -> Probe {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn empty_values_normalize_to_none() {
        let p = probe(json!({"name": "   ", "order": "", "amount": null, "tags": [], "at": ""}));
        assert!(p.name.is_none());
        assert!(p.order.is_none());
        assert!(p.amount.is_none());
        assert!(p.flag.is_none());
        assert!(p.tags.is_empty());
        assert!(p.at.is_none());
    }

    #[test]
    fn missing_fields_normalize_to_none() {
        let p = probe(json!({}));
        assert!(p.name.is_none());
        assert!(p.tags.is_empty());
    }

    #[test]
    fn loose_scalars_are_coerced() {
        let p = probe(json!({
            "name": " Acme ",
            "order": "3.0",
            "amount": "12,5",
            "flag": "yes",
            "tags": "t1",
            "at": 1700000000000_i64
        }));
        assert_eq!(p.name.as_deref(), Some("Acme"));
        assert_eq!(p.order, Some(3));
        assert_eq!(p.amount, Some(12.5));
        assert_eq!(p.flag, Some(true));
        assert_eq!(p.tags, vec!["t1"]);
        assert_eq!(p.at.unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn id_lists_drop_blanks_and_duplicates() {
        let p = probe(json!({"tags": ["a", "", "b", "a", null]}));
        assert_eq!(p.tags, vec!["a", "b"]);
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(serde_json::from_value::<Probe>(json!({"order": "first"})).is_err());
        assert!(serde_json::from_value::<Probe>(json!({"at": "yesterday"})).is_err());
    }
}
