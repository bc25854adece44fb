#![doc = include_str!("../README.md")]

mod backend;
mod builder;
pub mod metrics;

pub use backend::MapBackend;
pub use builder::MapBackendBuilder;
