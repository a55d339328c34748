//! Retry policy configuration types
//!
//! These types are the serializable form of a retry policy. They are consumed
//! at wrap-construction time by [`compose`](crate::retry::compose) and the
//! builders in [`retry`](crate::retry).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::retry::Backoff;

/// Name of the built-in bounded, propagating policy
pub const CONNECTION_POLICY: &str = "connection";
/// Name of the built-in bounded, absorbing policy
pub const FUNCTION_POLICY: &str = "function";
/// Name of the built-in unbounded policy
pub const CONTINUOUS_POLICY: &str = "continuous";

/// Named retry policies plus the service label shared by all of them
///
/// The built-in table (`connection`, `function`, `continuous`) ships as
/// embedded YAML; see [`PolicyLoader`](crate::config::PolicyLoader).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPoliciesConfig {
    /// Service label attached to every log event
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Policy used when no name is requested
    #[serde(default)]
    pub default: RetryPolicy,

    /// Named policies
    #[serde(default)]
    pub policies: BTreeMap<String, RetryPolicy>,
}

impl RetryPoliciesConfig {
    /// Look up a named policy
    pub fn get(&self, name: &str) -> Result<&RetryPolicy> {
        self.policies
            .get(name)
            .ok_or_else(|| Error::unknown_policy(name))
    }

    /// Resolve a named policy, or the default policy when no name is given
    pub fn resolve(&self, name: Option<&str>) -> Result<&RetryPolicy> {
        match name {
            Some(name) => self.get(name),
            None => Ok(&self.default),
        }
    }

    /// Validate the default and every named policy
    pub fn validate(&self) -> Result<()> {
        self.default.validate()?;
        for (name, policy) in &self.policies {
            policy.validate().map_err(|e| match e {
                Error::InvalidPolicy { field, reason } => {
                    Error::invalid_policy(format!("{}.{}", name, field), reason)
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

/// Retry policy for one wrapped operation
///
/// Waits are expressed in seconds. Omitting `max-attempts` selects the
/// unbounded variant, which waits a fixed `retry-delay` between attempts and
/// ignores the exponential parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Label identifying the protected resource
    #[serde(default = "default_resource_name")]
    pub resource_name: String,

    /// Label identifying the operation
    #[serde(default = "default_action_name")]
    pub action_name: String,

    /// Bound on attempts; `None` retries until success or cancellation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Exponential backoff scale, in seconds
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Lower clamp for the exponential wait, in seconds
    #[serde(default = "default_min_wait")]
    pub min_wait: f64,

    /// Upper clamp for the exponential wait, in seconds
    #[serde(default = "default_max_wait")]
    pub max_wait: f64,

    /// Fixed wait for the unbounded variant, in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,

    /// Whether a failure surviving every attempt reaches the caller
    #[serde(default = "default_propagate")]
    pub propagate_on_exhaustion: bool,

    /// Correlation identifier lifetime
    #[serde(default)]
    pub correlation: CorrelationMode,
}

/// Lifetime of the correlation identifier attached to log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CorrelationMode {
    /// A fresh identifier for every call of the wrapped operation (default)
    #[default]
    PerCall,

    /// One identifier generated when the operation is wrapped and reused by
    /// every call; concurrent calls become indistinguishable in the logs
    PerWrap,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::connection(default_resource_name(), default_action_name())
    }
}

impl RetryPolicy {
    /// Bounded, propagating policy: 5 retries (6 attempts), waits of 1s to 30s
    pub fn connection(resource_name: impl Into<String>, action_name: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            action_name: action_name.into(),
            max_attempts: Some(6),
            multiplier: default_multiplier(),
            min_wait: default_min_wait(),
            max_wait: default_max_wait(),
            retry_delay: default_retry_delay(),
            propagate_on_exhaustion: true,
            correlation: CorrelationMode::PerCall,
        }
    }

    /// Bounded, absorbing policy: 5 attempts, waits of 1s to 30s
    ///
    /// Exhaustion under this policy yields no value and no error.
    pub fn function() -> Self {
        Self {
            resource_name: default_resource_name(),
            action_name: "function".to_string(),
            max_attempts: Some(5),
            propagate_on_exhaustion: false,
            ..Self::connection(default_resource_name(), default_action_name())
        }
    }

    /// Unbounded policy with a fixed delay between attempts
    pub fn continuous(retry_delay: f64) -> Self {
        Self {
            action_name: "loop".to_string(),
            max_attempts: None,
            retry_delay,
            ..Self::connection(default_resource_name(), default_action_name())
        }
    }

    /// Whether the policy bounds the number of attempts
    pub fn is_bounded(&self) -> bool {
        self.max_attempts.is_some()
    }

    /// Check every field against its constraints
    pub fn validate(&self) -> Result<()> {
        match self.max_attempts {
            Some(0) => {
                return Err(Error::invalid_policy("max-attempts", "must be at least 1"));
            }
            Some(_) => {
                if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
                    return Err(Error::invalid_policy(
                        "multiplier",
                        "must be a finite number greater than 0",
                    ));
                }
                if !fits_duration(self.min_wait) {
                    return Err(Error::invalid_policy(
                        "min-wait",
                        "must be a representable number of seconds >= 0",
                    ));
                }
                if !fits_duration(self.max_wait) || self.max_wait < self.min_wait {
                    return Err(Error::invalid_policy(
                        "max-wait",
                        "must be representable and not less than min-wait",
                    ));
                }
            }
            None => {
                if !fits_duration(self.retry_delay) || self.retry_delay <= 0.0 {
                    return Err(Error::invalid_policy(
                        "retry-delay",
                        "must be a representable number of seconds greater than 0",
                    ));
                }
                if !self.propagate_on_exhaustion {
                    return Err(Error::invalid_policy(
                        "propagate-on-exhaustion",
                        "cannot be false for an unbounded policy",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Backoff described by this policy
    ///
    /// Call [`validate`](Self::validate) first; out-of-range values are
    /// clamped rather than rejected here, with waits too long for a
    /// `Duration` saturating to `Duration::MAX`.
    pub fn backoff(&self) -> Backoff {
        if self.is_bounded() {
            Backoff::exponential(
                self.multiplier,
                secs(self.min_wait),
                secs(self.max_wait),
            )
        } else {
            Backoff::fixed(secs(self.retry_delay))
        }
    }
}

/// Whether `value` seconds is a non-negative wait a `Duration` can hold
fn fits_duration(value: f64) -> bool {
    Duration::try_from_secs_f64(value).is_ok()
}

fn secs(value: f64) -> Duration {
    if value > 0.0 {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

fn default_service_name() -> String {
    crate::retry::process_name()
}
fn default_resource_name() -> String {
    "resource".to_string()
}
fn default_action_name() -> String {
    "operation".to_string()
}
fn default_multiplier() -> f64 {
    1.0
}
fn default_min_wait() -> f64 {
    1.0
}
fn default_max_wait() -> f64 {
    30.0
}
fn default_retry_delay() -> f64 {
    1.0
}
fn default_propagate() -> bool {
    true
}
