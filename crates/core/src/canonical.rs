//! Canonical JSON serialization for hash material.
//!
//! The hash-chain formula and the evidence hash are both defined over a
//! canonical textual form: UTF-8, object keys sorted lexicographically at
//! every nesting level, no inter-token whitespace, numbers in shortest
//! decimal form. `serde_json::Map` is backed by `BTreeMap` (the
//! `preserve_order` feature is not enabled), but the writer sorts keys
//! itself so the output does not depend on feature unification in a
//! downstream build.

use serde_json::Value;

/// Serialize a JSON value to its canonical form.
///
/// The same function runs at append time (hash input), inside
/// `verify_chain`, and for the evidence and risk-map hashes. Re-serializing
/// a parsed canonical payload reproduces it byte for byte.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        // serde_json's Number display uses itoa/ryu shortest-form output.
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

/// JSON string escaping: quote, backslash, and control characters only.
fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_sorted_at_every_level() {
        let value = json!({
            "zeta": {"b": 1, "a": 2},
            "alpha": [{"y": true, "x": false}],
        });
        assert_eq!(
            canonical_json(&value),
            r#"{"alpha":[{"x":false,"y":true}],"zeta":{"a":2,"b":1}}"#
        );
    }

    #[test]
    fn no_whitespace_between_tokens() {
        let value = json!({"a": [1, 2, 3], "b": "text"});
        assert_eq!(canonical_json(&value), r#"{"a":[1,2,3],"b":"text"}"#);
    }

    #[test]
    fn numbers_shortest_form() {
        let value = json!({"float": 0.6, "int": 42, "whole": 1.0});
        assert_eq!(
            canonical_json(&value),
            r#"{"float":0.6,"int":42,"whole":1.0}"#
        );
    }

    #[test]
    fn string_escapes() {
        let value = json!({"s": "line\nquote\"back\\slash\ttab"});
        assert_eq!(
            canonical_json(&value),
            r#"{"s":"line\nquote\"back\\slash\ttab"}"#
        );
    }

    #[test]
    fn control_characters_escaped_as_unicode() {
        let value = Value::String("\u{01}".to_string());
        assert_eq!(canonical_json(&value), "\"\\u0001\"");
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let value = json!({
            "decision": "ESCALATED",
            "risk_score": 0.6,
            "violations": [{"rule": "\u{00a7}II", "description": "curl"}],
            "nested": {"z": null, "a": [true, 1.5]},
        });
        let canonical = canonical_json(&value);
        let reparsed: Value = serde_json::from_str(&canonical).unwrap();
        assert_eq!(canonical_json(&reparsed), canonical);
    }
}
