//! Deterministic canonical encoding of [`Props`](crate::props::Props) into a
//! memoization/cache key.

use serde_json::Value;
use smol_str::SmolStr;
use std::fmt;

use crate::props::Props;

/// Recursion depth at which [`sign`] gives up.
///
/// `serde_json::Value` is a strict tree — it cannot contain cycles the way
/// the source's object graphs could — so there is no cycle to guard
/// against here. This cap exists purely to bound pathological, hand-built
/// nesting from ever recursing unbounded.
const MAX_SIGN_DEPTH: usize = 64;

/// Produces the canonical sign of a props object.
///
/// Keys are sorted lexicographically at every level; primitives are
/// rendered with their natural `Display`/JSON form and percent-encoded;
/// nested objects and arrays recurse. Two props values that are deeply
/// equal after [`clean_undefined`](crate::props::clean_undefined) always
/// produce the same sign, independent of the original field insertion
/// order (`serde_json`'s `preserve_order` feature keeps objects ordered as
/// inserted; `sign` re-sorts explicitly so this holds regardless).
pub fn sign(props: &Props) -> String {
    sign_value(&props.to_value(), 0)
}

fn sign_value(value: &Value, depth: usize) -> String {
    if depth >= MAX_SIGN_DEPTH {
        return "…".to_string();
    }
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = String::new();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push('&');
                }
                out.push_str(&encode_component(key));
                out.push('=');
                out.push_str(&sign_value(&map[*key], depth + 1));
            }
            out
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(|v| sign_value(v, depth + 1)).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => encode_component(s),
    }
}

/// Minimal URL-component encoding: enough to keep `;`, `&`, `=` and spaces
/// from corrupting the key's field separators, without pulling in a full
/// percent-encoding crate for a handful of reserved bytes.
fn encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b';' => out.push_str("%3B"),
            b'&' => out.push_str("%26"),
            b'=' => out.push_str("%3D"),
            b' ' => out.push_str("%20"),
            b'%' => out.push_str("%25"),
            _ => out.push(b as char),
        }
    }
    out
}

/// A memoization/cache key: `"{display_name};{sign(props)}"`.
///
/// Cheap to clone ([`SmolStr`] avoids a heap allocation for short keys).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key(SmolStr);

impl Key {
    /// Build a key for a model invocation.
    pub fn new(display_name: &str, props: &Props) -> Self {
        Key(SmolStr::new(format!("{display_name};{}", sign(props))))
    }

    /// Borrow the key as a string, e.g. for use as a cache backend key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::PropsBuilder;
    use serde_json::json;

    #[test]
    fn sign_is_stable_for_structurally_equal_props() {
        let a = Props::from_value(json!({"b": 2, "a": 1}));
        let b = Props::from_value(json!({"a": 1, "b": 2}));
        assert_eq!(sign(&a), sign(&b));
    }

    #[test]
    fn sign_distinguishes_different_values() {
        let a = Props::from_value(json!({"a": 1}));
        let b = Props::from_value(json!({"a": 2}));
        assert_ne!(sign(&a), sign(&b));
    }

    #[test]
    fn empty_props_sign_is_stable_and_short() {
        let empty = sign(&Props::empty());
        assert_eq!(empty, sign(&Props::from_value(json!({}))));
    }

    #[test]
    fn key_format_matches_spec() {
        let props = PropsBuilder::new().field("id", Some(1)).build();
        let key = Key::new("GetUser", &props);
        assert_eq!(key.as_str(), format!("GetUser;{}", sign(&props)));
    }

    #[test]
    fn undefined_field_does_not_affect_sign() {
        let with_undefined = PropsBuilder::new()
            .field("id", Some(1))
            .field("ignored", None::<String>)
            .build();
        let without = PropsBuilder::new().field("id", Some(1)).build();
        assert_eq!(sign(&with_undefined), sign(&without));
    }
}
