//! Shared utilities for tradegraph
//!
//! This crate provides common functionality used across the tradegraph workspace,
//! including logging setup and environment-variable configuration helpers.

pub mod config;
pub mod logging;

pub use config::{EnvError, env_flag, env_positive, parse_positive};
pub use logging::{init_tracing, init_tracing_json};
