//! CLI command implementations

pub mod policy;
pub mod run;

use anyhow::Result;
use camino::Utf8Path;
use steadfast_core::{PolicyLoader, RetryPoliciesConfig};

/// Load policies through the full configuration hierarchy
fn load_policies(config: Option<&Utf8Path>) -> Result<RetryPoliciesConfig> {
    Ok(PolicyLoader::new()?.load(config)?)
}
