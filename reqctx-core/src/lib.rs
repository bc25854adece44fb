//! Core data model for `reqctx`: the per-request execution context that
//! every capability layer (deadline, overrides, cache, telemetry) wraps.
//!
//! This crate owns the four things that do not vary by which layers are
//! stacked on top: the [`context`] lifecycle and decorator interface, the
//! [`model`] callable shape, the [`props`] argument discipline, and the
//! [`key`] signing scheme that turns a model invocation into a
//! memoization/cache key. The [`registry`] ties `context` and `key`
//! together into the in-request memoization table.

pub mod context;
pub mod error;
pub mod key;
pub mod model;
pub mod props;
pub mod registry;

pub use context::{Action, Ctx, ContextOps};
pub use error::{BackendError, ContextError};
pub use key::Key;
pub use model::{
    AttrValue, CacheStrategy, FieldProjection, Model, ModelBody, ModelCacheConfig, ModelFuture, PropsFilter,
    ResultFilter, Tags, project_fields, scalar_attr,
};
pub use props::{Props, PropsBuilder};
pub use registry::{Registry, SharedOutcome};
