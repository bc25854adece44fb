//! The model shape: the plain, context-independent description of "how to
//! compute a value" that every layer dispatches against.

use futures::future::BoxFuture;
use serde_json::Value;
use smol_str::SmolStr;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ContextError;
use crate::props::Props;

/// A value produced asynchronously by a model body.
pub type ModelFuture = BoxFuture<'static, Result<Value, ContextError>>;

/// Which read/write pattern the cache layer uses for a model invocation.
///
/// A model with no [`ModelCacheConfig`] at all bypasses the cache layer
/// entirely, regardless of which strategy is listed here — this enum only
/// governs behavior once a model has opted in via
/// [`Model::with_cache_strategy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStrategy {
    /// Only ever read the cache; a miss returns absent rather than running
    /// the model.
    CacheOnly,
    /// Never read or write the cache; always run the model.
    NetworkOnly,
    /// Read the cache; on a miss or expired entry, run the model and
    /// write the result before returning.
    CacheFirst,
    /// Read the cache; a fresh hit returns immediately, a stale-but-live
    /// hit returns immediately *and* triggers a background refresh, a
    /// miss or expired entry runs the model inline.
    StaleWhileRevalidate,
}

impl CacheStrategy {
    /// The name recorded on `cache.*` telemetry events and debug logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStrategy::CacheOnly => "cache-only",
            CacheStrategy::NetworkOnly => "network-only",
            CacheStrategy::CacheFirst => "cache-first",
            CacheStrategy::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model's cache opt-in: its strategy, plus TTL overrides the cache
/// layer merges over its own layer-wide defaults.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelCacheConfig {
    pub strategy: CacheStrategy,
    /// Overrides the cache layer's default TTL when set.
    pub ttl: Option<Duration>,
    /// Overrides the cache layer's default stale TTL when set.
    pub stale_ttl: Option<Duration>,
}

impl ModelCacheConfig {
    pub fn new(strategy: CacheStrategy) -> Self {
        ModelCacheConfig { strategy, ttl: None, stale_ttl: None }
    }
}

/// A scalar attribute value attached to a telemetry event or span.
///
/// Deliberately smaller than [`serde_json::Value`] — telemetry backends
/// (OpenTelemetry in particular) only accept scalars and arrays of
/// scalars as attribute values, never nested objects.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}
impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}
impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}
impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}
impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

/// A named set of telemetry attributes, in declaration order.
pub type Tags = Vec<(SmolStr, AttrValue)>;

/// Converts a JSON value at a named field into zero or more attributes.
///
/// `All` forwards every scalar top-level field (objects/arrays are
/// skipped — there is no lossless scalar encoding for them). `Fields`
/// only forwards the named fields, optionally renaming or deriving the
/// attribute through a projection function.
#[derive(Clone, Debug)]
pub enum PropsFilter {
    /// Forward every top-level scalar field, keyed by its own name.
    All,
    /// Forward only the listed fields.
    Fields(Arc<[FieldProjection]>),
    /// Forward nothing. The default for models that did not opt in.
    None,
}

impl Default for PropsFilter {
    fn default() -> Self {
        PropsFilter::None
    }
}

/// One entry of a [`PropsFilter::Fields`] or [`ResultFilter::Fields`] list:
/// which source field to read, and what attribute name to emit it under.
#[derive(Clone, Debug)]
pub struct FieldProjection {
    pub source: SmolStr,
    pub attr: SmolStr,
}

impl FieldProjection {
    pub fn new(source: impl Into<SmolStr>, attr: impl Into<SmolStr>) -> Self {
        FieldProjection { source: source.into(), attr: attr.into() }
    }

    /// Project from `source` unchanged onto an attribute of the same name.
    pub fn same(name: impl Into<SmolStr>) -> Self {
        let name = name.into();
        FieldProjection { source: name.clone(), attr: name }
    }
}

/// Projects a model's result value into span/event attributes.
///
/// Unlike [`PropsFilter`], a result is not necessarily an object — `Scalar`
/// covers models whose result is itself the interesting value (a count, a
/// flag) rather than a record with named fields.
#[derive(Clone, Debug)]
pub enum ResultFilter {
    /// Forward every top-level scalar field of an object result.
    All,
    /// Forward only the listed fields of an object result.
    Fields(Arc<[FieldProjection]>),
    /// Forward the whole result as a single scalar attribute under this
    /// name, when the result itself is a scalar.
    Scalar(SmolStr),
    /// Forward nothing. The default for models that did not opt in.
    None,
}

impl Default for ResultFilter {
    fn default() -> Self {
        ResultFilter::None
    }
}

/// Applies a filter to a JSON value, producing telemetry tags.
///
/// Shared by both [`PropsFilter`] and [`ResultFilter::Fields`]/`All` since
/// both reduce to "pick scalar fields off an object". Non-object values
/// under `All`/`Fields` yield no tags; use [`ResultFilter::Scalar`] for
/// models whose result is not an object.
pub fn project_fields(value: &Value, fields: Option<&[FieldProjection]>) -> Tags {
    let Value::Object(map) = value else {
        return Vec::new();
    };
    let mut tags = Tags::new();
    match fields {
        None => {
            for (key, v) in map {
                if let Some(attr) = scalar_attr(v) {
                    tags.push((SmolStr::new(key), attr));
                }
            }
        }
        Some(fields) => {
            for field in fields {
                if let Some(v) = map.get(field.source.as_str()) {
                    if let Some(attr) = scalar_attr(v) {
                        tags.push((field.attr.clone(), attr));
                    }
                }
            }
        }
    }
    tags
}

/// Converts a scalar JSON value into an [`AttrValue`]; `None` for
/// objects/arrays/null, which have no lossless scalar encoding.
pub fn scalar_attr(value: &Value) -> Option<AttrValue> {
    match value {
        Value::Bool(b) => Some(AttrValue::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(AttrValue::Int(i))
            } else {
                n.as_f64().map(AttrValue::Float)
            }
        }
        Value::String(s) => Some(AttrValue::Str(s.clone())),
        _ => None,
    }
}

/// The callable shape of a model body.
///
/// Two variants cover both "plain function" and "needs a child context to
/// issue nested requests, emit events, or check liveness" bodies. There is
/// deliberately no generator/coroutine variant: every body that would have
/// suspended across nested work is expressed as ordinary `async`, with
/// liveness re-checked at each `.await` boundary by the context that drives
/// it, rather than as a hand-rolled coroutine type.
#[derive(Clone)]
pub enum ModelBody {
    /// A body with no need for a context: pure function of props.
    Sync(Arc<dyn Fn(&Props) -> Result<Value, ContextError> + Send + Sync>),
    /// A body that receives its own child context, able to call other
    /// models, emit events, and observe liveness.
    Async(Arc<dyn Fn(Props, crate::context::Ctx) -> ModelFuture + Send + Sync>),
}

impl fmt::Debug for ModelBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelBody::Sync(_) => f.write_str("ModelBody::Sync(..)"),
            ModelBody::Async(_) => f.write_str("ModelBody::Async(..)"),
        }
    }
}

/// A plain, context-independent description of a unit of work.
///
/// Models are cheap to clone and are typically constructed once and shared
/// across many requests; `display_name` feeds both the memoization key and
/// the span name, so it must be stable for a given computation.
#[derive(Clone, Debug)]
pub struct Model {
    display_name: SmolStr,
    body: ModelBody,
    props_filter: PropsFilter,
    result_filter: ResultFilter,
    cache_strategy: Option<ModelCacheConfig>,
}

impl Model {
    /// Declare a synchronous model: a pure function of its props.
    pub fn sync(
        display_name: impl Into<SmolStr>,
        body: impl Fn(&Props) -> Result<Value, ContextError> + Send + Sync + 'static,
    ) -> Self {
        Model {
            display_name: display_name.into(),
            body: ModelBody::Sync(Arc::new(body)),
            props_filter: PropsFilter::default(),
            result_filter: ResultFilter::default(),
            cache_strategy: None,
        }
    }

    /// Declare an asynchronous model whose body receives a child context.
    pub fn asynchronous(
        display_name: impl Into<SmolStr>,
        body: impl Fn(Props, crate::context::Ctx) -> ModelFuture + Send + Sync + 'static,
    ) -> Self {
        Model {
            display_name: display_name.into(),
            body: ModelBody::Async(Arc::new(body)),
            props_filter: PropsFilter::default(),
            result_filter: ResultFilter::default(),
            cache_strategy: None,
        }
    }

    /// Attach a props projection used by the telemetry layer.
    pub fn with_props_filter(mut self, filter: PropsFilter) -> Self {
        self.props_filter = filter;
        self
    }

    /// Attach a result projection used by the telemetry layer.
    pub fn with_result_filter(mut self, filter: ResultFilter) -> Self {
        self.result_filter = filter;
        self
    }

    /// Opt this model into the cache layer under `strategy`. Models with
    /// no cache strategy bypass the cache layer entirely.
    pub fn with_cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.cache_strategy = Some(ModelCacheConfig::new(strategy));
        self
    }

    /// Overrides the cache layer's default TTL for this model. No-op if
    /// [`Model::with_cache_strategy`] has not been called yet.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        if let Some(cache) = self.cache_strategy.as_mut() {
            cache.ttl = Some(ttl);
        }
        self
    }

    /// Overrides the cache layer's default stale TTL for this model. No-op
    /// if [`Model::with_cache_strategy`] has not been called yet.
    pub fn with_cache_stale_ttl(mut self, stale_ttl: Duration) -> Self {
        if let Some(cache) = self.cache_strategy.as_mut() {
            cache.stale_ttl = Some(stale_ttl);
        }
        self
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn body(&self) -> &ModelBody {
        &self.body
    }

    pub fn props_filter(&self) -> &PropsFilter {
        &self.props_filter
    }

    pub fn result_filter(&self) -> &ResultFilter {
        &self.result_filter
    }

    /// This model's cache opt-in, if any. `None` means the cache layer
    /// must delegate straight to the inner `request`.
    pub fn cache_strategy(&self) -> Option<&ModelCacheConfig> {
        self.cache_strategy.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sync_model_carries_display_name_and_defaults() {
        let model = Model::sync("GetUser", |_props| Ok(json!({"id": 1})));
        assert_eq!(model.display_name(), "GetUser");
        assert!(matches!(model.props_filter(), PropsFilter::None));
        assert!(matches!(model.result_filter(), ResultFilter::None));
    }

    #[test]
    fn project_fields_all_skips_non_scalars() {
        let value = json!({"id": 1, "name": "ada", "nested": {"a": 1}});
        let tags = project_fields(&value, None);
        assert_eq!(tags.len(), 2);
        assert!(tags.iter().any(|(k, _)| k == "id"));
        assert!(tags.iter().any(|(k, _)| k == "name"));
    }

    #[test]
    fn project_fields_with_projection_renames() {
        let value = json!({"id": 7});
        let fields = [FieldProjection::new("id", "user.id")];
        let tags = project_fields(&value, Some(&fields));
        assert_eq!(tags, vec![(SmolStr::new("user.id"), AttrValue::Int(7))]);
    }
}
