//! # Durable MCP Server
//!
//! HTTP service for long-running MCP tool calls. A request flows through an
//! ordered stage chain (shutdown, logging, throttling, authorization,
//! metrics, tracing) into an api-version-aware dispatcher; handlers load and
//! persist tool calls through the store under ETag optimistic concurrency;
//! server-driven tools progress in the background via the phase manager.

pub mod app;
pub mod config;
pub mod operations;
pub mod phase;
pub mod pipeline;
pub mod reqres;
pub mod router;
pub mod stages;
pub mod tools;

pub use app::{build, build_with, run, App, LATEST_VERSION};
pub use config::{ConfigError, ServerConfig};
pub use pipeline::{Pipeline, ServerError, ServerResult, Stage};
