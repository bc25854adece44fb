#![doc = include_str!("../README.md")]

pub mod cache;
pub mod compose;
pub mod config;
pub mod deadline;
pub mod overrides;
#[cfg(feature = "test-support")]
pub mod testing;

pub use cache::{CacheCtx, CacheConfig, CacheStrategy};
pub use compose::{compose, Layer};
pub use config::ContextConfig;
pub use deadline::DeadlineCtx;
pub use overrides::{OverrideMap, OverridesCtx};
