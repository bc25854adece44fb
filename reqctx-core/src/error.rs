//! Error taxonomy shared by every layer of the context framework.

use std::sync::Arc;
use thiserror::Error;

/// The single error currency of the crate.
///
/// Every public fallible operation returns `Result<T, ContextError>`, or a
/// layer-specific error that converts into it via `From`. Model body errors
/// are wrapped in `Arc` rather than `Box` so `ContextError` stays `Clone` —
/// the in-request registry hands the same settled `Result` to every caller
/// that memoized on the same key, which requires a cloneable error type.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    /// `request`/`set` was called with a model that has no `display_name`.
    #[error("model is missing a display_name")]
    MissingDisplayName,

    /// A model's body could not be resolved to a callable shape.
    #[error("unexpected model type for `{display_name}`")]
    UnexpectedModelType {
        /// The model's declared display name.
        display_name: String,
    },

    /// A model body resolved to no value at all.
    #[error("unexpected model result for `{display_name}`")]
    UnexpectedModelResult {
        /// The model's declared display name.
        display_name: String,
    },

    /// `set` was called for a key that already has a registry entry.
    #[error("value already exists in registry for key `{key}`")]
    RegistryConflict {
        /// The conflicting registry key.
        key: String,
    },

    /// Execution was attempted or continued after the context chain died,
    /// whether from an explicit `kill()` or a deadline expiring.
    #[error("context was interrupted")]
    Interrupted,

    /// A cache strategy could not resolve a usable configuration (e.g. no
    /// TTL configured, or a non-positive TTL).
    #[error("cache configuration error: {0}")]
    Config(String),

    /// An override chain exceeded the maximum substitution depth, which
    /// means it almost certainly contains a cycle.
    #[error("override chain for `{display_name}` did not terminate")]
    OverrideCycle {
        /// The model display name whose override chain failed to terminate.
        display_name: String,
    },

    /// The model body itself failed. The inner error is preserved so
    /// callers can downcast to their own error types.
    #[error("model `{display_name}` failed: {source}")]
    Model {
        /// The model's declared display name.
        display_name: String,
        /// The underlying error raised by the model body.
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// The cache backend rejected or failed an operation.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ContextError {
    /// True if this error is (or wraps) an interruption.
    ///
    /// Used by the cache layer to decide whether a write is safe to skip,
    /// per the "interrupted executions never write to the cache" invariant.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, ContextError::Interrupted)
    }

    /// Construct a [`ContextError::Model`] from any std error.
    pub fn model(display_name: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        ContextError::Model {
            display_name: display_name.into(),
            source: Arc::new(source),
        }
    }
}

/// Error type for cache backend operations.
///
/// Mirrors the two-operation backend contract in the spec: reads that fail
/// are treated as misses by callers, writes that fail are swallowed
/// (fire-and-forget), but the error is still typed so backends can report
/// something diagnosable through telemetry.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Internal backend error unrelated to network interaction (e.g. a
    /// poisoned lock, a malformed stored entry).
    #[error(transparent)]
    InternalError(Arc<dyn std::error::Error + Send + Sync>),

    /// Network/transport failure talking to a remote backend.
    #[error(transparent)]
    ConnectionError(Arc<dyn std::error::Error + Send + Sync>),

    /// The value could not be serialized/deserialized for storage.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Serialization(err.to_string())
    }
}
