//! Conditional gates around optional operations
//!
//! A gate is a mapped "conditional reference" field. With no source mapped
//! the gate is absent and the operation always runs. With a source mapped,
//! the operation only runs when the resolved value is non-empty.

use super::mapper::{FieldMapper, Source};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No conditional reference configured
    Absent,
    /// Configured, resolved to a non-empty value
    Open,
    /// Configured, resolved empty: skip without error
    Closed,
}

impl GateState {
    pub fn allows(self) -> bool {
        !matches!(self, Self::Closed)
    }
}

/// Evaluate an optional conditional reference
pub fn evaluate(source: Option<&Source>, mapper: &FieldMapper<'_>) -> GateState {
    match source {
        None | Some(Source::Empty) => GateState::Absent,
        Some(source) => {
            let value = mapper.resolve(source);
            if is_falsy(&value) {
                log::debug!("Gate {:?} resolved empty, skipping", source);
                GateState::Closed
            } else {
                GateState::Open
            }
        }
    }
}

/// Empty in the loose sense form builders use: null, false, "", "0", 0 and
/// empty collections
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => {
            let s = s.trim();
            s.is_empty() || s == "0"
        }
        Value::Array(items) => items.iter().all(is_falsy),
        Value::Object(map) => map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::submission::Submission;
    use serde_json::json;

    #[test]
    fn test_absent_gate_always_allows() {
        let submission = Submission::new();
        let mapper = FieldMapper::new(&submission);

        assert_eq!(evaluate(None, &mapper), GateState::Absent);
        assert_eq!(evaluate(Some(&Source::Empty), &mapper), GateState::Absent);
        assert!(GateState::Absent.allows());
    }

    #[test]
    fn test_gate_follows_resolved_value() {
        let submission = Submission::new()
            .with_value("yes", "1")
            .with_value("no", "0")
            .with_value("blank", "")
            .with_value("boxes", json!([]));
        let mapper = FieldMapper::new(&submission);

        assert_eq!(evaluate(Some(&Source::parse("%yes%")), &mapper), GateState::Open);
        assert_eq!(evaluate(Some(&Source::parse("%no%")), &mapper), GateState::Closed);
        assert_eq!(evaluate(Some(&Source::parse("%blank%")), &mapper), GateState::Closed);
        assert_eq!(evaluate(Some(&Source::parse("%boxes%")), &mapper), GateState::Closed);
        assert_eq!(evaluate(Some(&Source::parse("%missing%")), &mapper), GateState::Closed);
        assert!(!GateState::Closed.allows());
    }

    #[test]
    fn test_is_falsy() {
        assert!(is_falsy(&json!(0)));
        assert!(is_falsy(&json!(false)));
        assert!(is_falsy(&json!(["", "0"])));
        assert!(!is_falsy(&json!("no")));
        assert!(!is_falsy(&json!([0, 3])));
    }
}
