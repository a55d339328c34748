//! # steadfast-core
//!
//! Core library for Steadfast providing:
//! - Retry execution for blocking and async operations
//! - Exponential and fixed backoff with clamping
//! - Correlated lifecycle logging through `tracing`
//! - Policy configuration (YAML) with hierarchical loading

pub mod config;
pub mod error;
pub mod retry;
pub mod telemetry;
pub mod types;

pub use config::PolicyLoader;
pub use error::{Error, Result};
pub use retry::{
    compose, conn_retry, continuous_retry, func_retry, Backoff, Composed, Outcome, Retry,
    RetryError,
};
pub use types::{RetryPoliciesConfig, RetryPolicy};
