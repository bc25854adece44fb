#![doc = include_str!("../README.md")]

pub mod backend;

pub use backend::{CacheBackend, CachedEntry};
pub use reqctx_core::BackendError;
