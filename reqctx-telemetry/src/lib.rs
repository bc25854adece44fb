#![doc = include_str!("../README.md")]

mod init;
mod span;

pub use init::{init, TelemetryConfig};
pub use span::TelemetryCtx;
