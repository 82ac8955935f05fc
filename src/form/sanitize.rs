//! Clean-up applied to entity data just before it is written

use crate::api::models::Record;
use serde_json::Value;

/// Whether a value carries no data
///
/// Unlike gate emptiness, `"0"`, `0` and `false` are meaningful here.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_blank),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Remove blank fields and decode HTML entities in what is left
pub fn prepare(record: &mut Record) {
    strip_blank(record);
    for value in record.values_mut() {
        decode_value(value);
    }
}

pub fn strip_blank(record: &mut Record) {
    record.retain(|_, value| !is_blank(value));
}

/// Decode HTML entities in every string inside a value
pub fn decode_value(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.contains('&') {
                *s = decode_entities(s);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(decode_value),
        Value::Object(map) => map.values_mut().for_each(decode_value),
        _ => {}
    }
}

/// Decode named and numeric HTML entities
pub fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        match candidate.find(';').filter(|end| *end <= 10) {
            Some(end) => match decode_entity(&candidate[1..end]) {
                Some(decoded) => {
                    out.push(decoded);
                    rest = &candidate[end + 1..];
                }
                None => {
                    out.push('&');
                    rest = &candidate[1..];
                }
            },
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(numeric) = entity.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }

    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        "ndash" => Some('–'),
        "mdash" => Some('—'),
        "hellip" => Some('…'),
        "lsquo" => Some('‘'),
        "rsquo" => Some('’'),
        "ldquo" => Some('“'),
        "rdquo" => Some('”'),
        "euro" => Some('€'),
        "pound" => Some('£'),
        "copy" => Some('©'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prepare_strips_blanks_but_keeps_zero() {
        let mut record: Record = serde_json::from_value(json!({
            "first_name": "Jo",
            "middle_name": "",
            "nick_name": null,
            "do_not_email": "0",
            "is_deceased": 0,
            "is_opt_out": false,
            "tags": [],
        }))
        .unwrap();

        prepare(&mut record);

        assert_eq!(record.len(), 4);
        assert_eq!(record.get("do_not_email"), Some(&json!("0")));
        assert_eq!(record.get("is_deceased"), Some(&json!(0)));
        assert_eq!(record.get("is_opt_out"), Some(&json!(false)));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("Fish &amp; Chips"), "Fish & Chips");
        assert_eq!(decode_entities("O&#39;Neil &lt;b&gt;"), "O'Neil <b>");
        assert_eq!(decode_entities("&#x41;&#66;"), "AB");
        assert_eq!(decode_entities("AT&T & co"), "AT&T & co");
        assert_eq!(decode_entities("&unknown;"), "&unknown;");
    }

    #[test]
    fn test_decode_nested_values() {
        let mut value = json!({"a": ["x &amp; y"], "b": {"c": "&quot;q&quot;"}});
        decode_value(&mut value);
        assert_eq!(value, json!({"a": ["x & y"], "b": {"c": "\"q\""}}));
    }
}
