use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// A CRM record as returned by the gateway
pub type Record = Map<String, Value>;

/// Read a positive integer id from a JSON value
///
/// Accepts numbers and numeric strings. Anything else, including zero and
/// negative numbers, is treated as "no id".
pub fn value_as_id(value: &Value) -> Option<i64> {
    let id = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    (id > 0).then_some(id)
}

/// The `id` field of a record
pub fn record_id(record: &Record) -> Option<i64> {
    record.get("id").and_then(value_as_id)
}

/// Loose equality between a stored value and a filter value
///
/// Numbers compare equal to their string form, and an array matches when
/// any element matches.
pub fn loose_eq(stored: &Value, wanted: &Value) -> bool {
    match (stored, wanted) {
        (Value::Array(items), _) if !wanted.is_array() => items.iter().any(|item| loose_eq(item, wanted)),
        (Value::Number(a), Value::String(b)) | (Value::String(b), Value::Number(a)) => {
            b.trim().parse::<f64>().ok() == a.as_f64()
        }
        (Value::Bool(a), Value::Number(b)) | (Value::Number(b), Value::Bool(a)) => {
            b.as_i64() == Some(i64::from(*a))
        }
        _ => stored == wanted,
    }
}

/// A storage-agnostic reference to a file that should become a CRM attachment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentHandle {
    /// Stable identifier for this hand-off
    pub handle_id: uuid::Uuid,
    /// Where the bytes currently live
    pub path: PathBuf,
    /// File name presented to the CRM
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl AttachmentHandle {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            handle_id: uuid::Uuid::new_v4(),
            path: path.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_as_id() {
        assert_eq!(value_as_id(&json!(12)), Some(12));
        assert_eq!(value_as_id(&json!(" 7 ")), Some(7));
        assert_eq!(value_as_id(&json!(0)), None);
        assert_eq!(value_as_id(&json!("abc")), None);
        assert_eq!(value_as_id(&json!(false)), None);
    }

    #[test]
    fn test_loose_eq() {
        assert!(loose_eq(&json!(3), &json!("3")));
        assert!(loose_eq(&json!([1, 4]), &json!(4)));
        assert!(loose_eq(&json!(true), &json!(1)));
        assert!(!loose_eq(&json!("a"), &json!("b")));
    }
}
