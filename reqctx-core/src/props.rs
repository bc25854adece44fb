//! Request-scoped model arguments and the undefined-stripping discipline
//! that gives props their canonical, signable shape.

use serde::Serialize;
use serde_json::{Map, Value};

/// A model's arguments: a JSON object.
///
/// `Props` is always backed by a JSON object at the top level, per the
/// data model. Building one through [`PropsBuilder`] enforces the
/// "undefined is absence" rule at construction time: a field set to
/// `None` is never inserted into the underlying map, so later code can
/// tell "explicitly null" (`Value::Null`, preserved) apart from
/// "never set" (absent key) exactly like the source semantics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Props(Map<String, Value>);

impl Props {
    /// The empty props object. `request(M)` and `request(M, Props::empty())`
    /// are equivalent.
    pub fn empty() -> Self {
        Props(Map::new())
    }

    /// Wrap an existing JSON object as props.
    ///
    /// Runs [`clean_undefined`] over the value first so props built from
    /// arbitrary external JSON (e.g. deserialized from a request body)
    /// observe the same stripping discipline as [`PropsBuilder`].
    pub fn from_value(value: Value) -> Self {
        match clean_undefined(&value) {
            Value::Object(map) => Props(map),
            _ => Props(Map::new()),
        }
    }

    /// Build props from any `Serialize` type. The type must serialize to a
    /// JSON object.
    pub fn from_serializable<T: Serialize>(value: &T) -> Self {
        let v = serde_json::to_value(value).unwrap_or(Value::Null);
        Props::from_value(v)
    }

    /// Look up a field. A field that was never set (the "undefined" case)
    /// and a field that does not exist are indistinguishable, by design.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// True exactly when `key` is present, mirroring the `"key" in props`
    /// test from the source semantics.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// View props as a plain JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into a plain JSON object.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// View props as a `Value` (always `Value::Object`).
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for Props {
    fn from(map: Map<String, Value>) -> Self {
        match clean_undefined(&Value::Object(map)) {
            Value::Object(map) => Props(map),
            _ => Props(Map::new()),
        }
    }
}

/// Incrementally builds a [`Props`] object, skipping fields whose value is
/// `None` rather than encoding them as JSON null.
///
/// ```
/// use reqctx_core::props::PropsBuilder;
///
/// let props = PropsBuilder::new()
///     .field("id", Some(1))
///     .field("name", None::<String>)
///     .build();
///
/// assert!(props.contains_key("id"));
/// assert!(!props.contains_key("name"));
/// ```
#[derive(Default)]
pub struct PropsBuilder(Map<String, Value>);

impl PropsBuilder {
    /// Start an empty builder.
    pub fn new() -> Self {
        PropsBuilder(Map::new())
    }

    /// Set a field. `None` omits the key entirely (undefined); `Some(v)`
    /// inserts `v` even when `v` serializes to `null`.
    pub fn field<T: Serialize>(mut self, key: impl Into<String>, value: Option<T>) -> Self {
        if let Some(v) = value {
            self.0.insert(key.into(), serde_json::to_value(v).unwrap_or(Value::Null));
        }
        self
    }

    /// Set a field unconditionally, including explicit `null`.
    pub fn raw(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Finish building.
    pub fn build(self) -> Props {
        Props(self.0)
    }
}

/// Deep-copies `value`, recursing through objects and arrays.
///
/// `serde_json::Value` has no representation of JavaScript's `undefined`,
/// so by the time a tree reaches this function there is nothing left to
/// strip — any "undefined" field was already omitted when the tree was
/// built (see [`PropsBuilder`]). This function exists to (a) give external
/// JSON a single normalization pass before it becomes [`Props`], and (b)
/// document the invariant precisely: `null`, `false`, `0`, `""` and NaN-like
/// values are never removed, only genuinely absent keys are.
pub fn clean_undefined(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), clean_undefined(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(clean_undefined).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_omits_none_fields() {
        let props = PropsBuilder::new()
            .field("id", Some(1))
            .field("missing", None::<String>)
            .build();
        assert!(props.contains_key("id"));
        assert!(!props.contains_key("missing"));
        assert!(props.get("missing").is_none());
    }

    #[test]
    fn null_false_zero_empty_are_preserved() {
        let props = PropsBuilder::new()
            .raw("a", Value::Null)
            .field("b", Some(false))
            .field("c", Some(0))
            .field("d", Some(""))
            .build();
        assert_eq!(props.get("a"), Some(&Value::Null));
        assert_eq!(props.get("b"), Some(&json!(false)));
        assert_eq!(props.get("c"), Some(&json!(0)));
        assert_eq!(props.get("d"), Some(&json!("")));
    }

    #[test]
    fn clean_undefined_recurses_through_nesting() {
        let nested = json!({
            "outer": {"inner": [1, 2, {"x": null}]}
        });
        let cleaned = clean_undefined(&nested);
        assert_eq!(cleaned, nested);
    }

    #[test]
    fn empty_equals_no_props() {
        assert_eq!(Props::empty(), Props::from_value(json!({})));
    }
}
