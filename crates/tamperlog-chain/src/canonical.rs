//! Canonical byte encoding of structured payloads.

use serde_json::Value;

/// Encodes `value` into its canonical byte form.
///
/// Two values that compare equal as JSON data encode to the same bytes,
/// regardless of the order in which object keys were inserted.
///
/// Written out by hand rather than via `serde_json::to_vec` because key order
/// must hold even if another crate in the build enables `preserve_order`.
pub fn canonical_encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push(b'{');
            for (i, (key, item)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(out, key);
                out.push(b':');
                write_value(out, item);
            }
            out.push(b'}');
        }
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            '\u{08}' => out.extend_from_slice(b"\\b"),
            '\u{0c}' => out.extend_from_slice(b"\\f"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode_str(value: &Value) -> String {
        String::from_utf8(canonical_encode(value)).expect("canonical form is utf-8")
    }

    #[test]
    fn object_keys_are_sorted_at_every_depth() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"z":true,"y":null}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"y":null,"z":true},"b":1}"#).unwrap();

        assert_eq!(canonical_encode(&a), canonical_encode(&b));
        assert_eq!(encode_str(&a), r#"{"a":{"y":null,"z":true},"b":1}"#);
    }

    #[test]
    fn array_order_is_significant() {
        assert_ne!(
            canonical_encode(&json!([1, 2, 3])),
            canonical_encode(&json!([3, 2, 1]))
        );
        assert_eq!(encode_str(&json!([1, "two", [3]])), r#"[1,"two",[3]]"#);
    }

    #[test]
    fn integers_and_floats_stay_distinct() {
        let int: Value = serde_json::from_str("1").unwrap();
        let float: Value = serde_json::from_str("1.0").unwrap();

        assert_eq!(encode_str(&int), "1");
        assert_eq!(encode_str(&float), "1.0");
        assert_eq!(encode_str(&json!(-42)), "-42");
    }

    #[test]
    fn strings_use_minimal_escapes() {
        let value = json!("quote\" back\\ nl\n tab\t bell\u{07} é");
        assert_eq!(
            encode_str(&value),
            r#""quote\" back\\ nl\n tab\t bell\u0007 é""#
        );
    }

    #[test]
    fn canonical_form_parses_back_to_the_same_value() {
        let value = json!({
            "user": { "id": 7, "roles": ["admin", "ops"] },
            "ok": false,
            "ratio": 0.25,
            "note": "line\nbreak",
        });

        let reparsed: Value =
            serde_json::from_slice(&canonical_encode(&value)).expect("canonical form is json");
        assert_eq!(reparsed, value);
    }

    #[test]
    fn key_ordering_uses_bytes_not_case_folding() {
        assert_eq!(
            encode_str(&json!({ "b": 1, "B": 2, "a": 3 })),
            r#"{"B":2,"a":3,"b":1}"#
        );
    }
}
