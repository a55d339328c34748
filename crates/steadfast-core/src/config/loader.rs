//! Hierarchical retry policy loader
//!
//! Loads policies from multiple sources with the following precedence (low to high):
//! 1. Embedded defaults (built into binary)
//! 2. Global policies (~/.steadfast/policies.yaml)
//! 3. Explicit file (--config)
//! 4. Environment variables (STEADFAST_* prefix, applied to the default policy)
//! 5. CLI flags (handled by caller)

use crate::error::{Error, Result};
use crate::types::{RetryPoliciesConfig, RetryPolicy};
use camino::{Utf8Path, Utf8PathBuf};
use rust_embed::RustEmbed;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;

/// File name of the global policy file inside the config directory
pub const POLICY_FILE: &str = "policies.yaml";

const EMBEDDED_DEFAULTS: &str = "policy-defaults.yaml";

/// Embedded policy files
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/embedded/"]
#[prefix = ""]
struct EmbeddedPolicies;

/// Policy hierarchy loader
pub struct PolicyLoader {
    /// Directory holding the global policy file
    config_dir: Utf8PathBuf,
}

impl PolicyLoader {
    /// Create a loader rooted at ~/.steadfast
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_dir: Self::default_config_dir()?,
        })
    }

    /// Create a loader with a custom config directory
    pub fn with_dir(config_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// HOME wins over the passwd entry so container overrides are respected
    fn default_config_dir() -> Result<Utf8PathBuf> {
        let home = env::var("HOME")
            .ok()
            .map(Utf8PathBuf::from)
            .or_else(|| dirs::home_dir().and_then(|p| Utf8PathBuf::from_path_buf(p).ok()))
            .ok_or_else(|| Error::invalid_config("Could not determine home directory"))?;

        Ok(home.join(".steadfast"))
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Load policies with hierarchical precedence
    ///
    /// A missing global file is skipped; a missing explicit file is an error.
    /// The result is validated before it is returned.
    pub fn load(&self, explicit: Option<&Utf8Path>) -> Result<RetryPoliciesConfig> {
        let mut config = Self::load_embedded_defaults()?;

        let global_path = self.config_dir.join(POLICY_FILE);
        if global_path.exists() {
            tracing::debug!(path = %global_path, "Loading global retry policies");
            config = Self::merge(config, Self::load_yaml_file(&global_path)?);
        }

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::config_not_found(path.as_str()));
            }
            tracing::debug!(path = %path, "Loading retry policies");
            config = Self::merge(config, Self::load_yaml_file(path)?);
        }

        let config = Self::apply_env_overrides(config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the embedded defaults
    pub fn load_embedded_defaults() -> Result<RetryPoliciesConfig> {
        let embedded_file = EmbeddedPolicies::get(EMBEDDED_DEFAULTS).ok_or_else(|| {
            Error::config_not_found(format!("Embedded config not found: {}", EMBEDDED_DEFAULTS))
        })?;

        let content = std::str::from_utf8(&embedded_file.data).map_err(|_| {
            Error::invalid_config(format!(
                "Invalid UTF-8 in embedded config: {}",
                EMBEDDED_DEFAULTS
            ))
        })?;

        serde_yaml_ng::from_str(content).map_err(|e| Error::yaml_parse(EMBEDDED_DEFAULTS, e))
    }

    /// Load a YAML file and parse it
    fn load_yaml_file(path: &Utf8Path) -> Result<PolicyOverlay> {
        let content = fs::read_to_string(path)?;
        serde_yaml_ng::from_str(&content).map_err(|e| Error::yaml_parse(path.as_str(), e))
    }

    /// Merge an overlay file into the base (overlay wins per named policy)
    fn merge(mut base: RetryPoliciesConfig, overlay: PolicyOverlay) -> RetryPoliciesConfig {
        if let Some(service_name) = overlay.service_name {
            base.service_name = service_name;
        }
        if let Some(default) = overlay.default {
            base.default = default;
        }
        for (name, policy) in overlay.policies {
            base.policies.insert(name, policy);
        }
        base
    }

    /// Apply environment variable overrides to the default policy
    fn apply_env_overrides(mut config: RetryPoliciesConfig) -> Result<RetryPoliciesConfig> {
        if let Ok(val) = env::var("STEADFAST_SERVICE_NAME") {
            config.service_name = val;
        }

        if let Ok(val) = env::var("STEADFAST_MAX_ATTEMPTS") {
            config.default.max_attempts = match val.trim() {
                "" | "unbounded" => None,
                n => Some(n.parse().map_err(|_| {
                    Error::invalid_config(
                        "STEADFAST_MAX_ATTEMPTS must be a valid number or 'unbounded'",
                    )
                })?),
            };
        }

        if let Ok(val) = env::var("STEADFAST_MULTIPLIER") {
            config.default.multiplier = val.parse().map_err(|_| {
                Error::invalid_config("STEADFAST_MULTIPLIER must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("STEADFAST_MIN_WAIT") {
            config.default.min_wait = val
                .parse()
                .map_err(|_| Error::invalid_config("STEADFAST_MIN_WAIT must be a valid number"))?;
        }

        if let Ok(val) = env::var("STEADFAST_MAX_WAIT") {
            config.default.max_wait = val
                .parse()
                .map_err(|_| Error::invalid_config("STEADFAST_MAX_WAIT must be a valid number"))?;
        }

        if let Ok(val) = env::var("STEADFAST_RETRY_DELAY") {
            config.default.retry_delay = val.parse().map_err(|_| {
                Error::invalid_config("STEADFAST_RETRY_DELAY must be a valid number")
            })?;
        }

        Ok(config)
    }
}

/// Policy file contents; absent sections leave the base untouched
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PolicyOverlay {
    #[serde(default)]
    service_name: Option<String>,
    #[serde(default)]
    default: Option<RetryPolicy>,
    #[serde(default)]
    policies: BTreeMap<String, RetryPolicy>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CONNECTION_POLICY, CONTINUOUS_POLICY, FUNCTION_POLICY};
    use serial_test::serial;
    use tempfile::TempDir;

    fn create_temp_loader() -> (PolicyLoader, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_dir =
            Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf()).expect("Invalid UTF-8 path");
        (PolicyLoader::with_dir(config_dir), temp_dir)
    }

    #[test]
    fn test_embedded_defaults_match_presets() {
        let embedded = PolicyLoader::load_embedded_defaults().unwrap();

        assert!(!embedded.service_name.is_empty());
        assert_eq!(embedded.default, RetryPolicy::default());
        assert_eq!(
            embedded.get(CONNECTION_POLICY).unwrap(),
            &RetryPolicy::connection("connection", "connect")
        );
        assert_eq!(embedded.get(FUNCTION_POLICY).unwrap(), &RetryPolicy::function());
        assert_eq!(
            embedded.get(CONTINUOUS_POLICY).unwrap(),
            &RetryPolicy::continuous(1.0)
        );
        assert!(embedded.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_defaults() {
        let (loader, _temp) = create_temp_loader();
        let config = loader.load(None).unwrap();

        assert_eq!(config.default.max_attempts, Some(6));
        assert_eq!(config.get(FUNCTION_POLICY).unwrap().max_attempts, Some(5));
        assert!(!config.get(CONTINUOUS_POLICY).unwrap().is_bounded());
    }

    #[test]
    #[serial]
    fn test_global_file_overrides_named_policy() {
        let (loader, _temp) = create_temp_loader();
        let content = r#"
policies:
  connection:
    resource-name: postgres
    action-name: connect
    max-attempts: 3
  webhook:
    resource-name: webhook
    action-name: deliver
    max-attempts: 4
    propagate-on-exhaustion: false
"#;
        fs::write(loader.config_dir().join(POLICY_FILE), content).unwrap();

        let config = loader.load(None).unwrap();

        let connection = config.get(CONNECTION_POLICY).unwrap();
        assert_eq!(connection.resource_name, "postgres");
        assert_eq!(connection.max_attempts, Some(3));
        assert!(!config.get("webhook").unwrap().propagate_on_exhaustion);
        // untouched presets survive the merge
        assert!(config.get(FUNCTION_POLICY).is_ok());
    }

    #[test]
    #[serial]
    fn test_explicit_file_wins_over_global() {
        let (loader, temp) = create_temp_loader();
        fs::write(
            loader.config_dir().join(POLICY_FILE),
            "service-name: global\n",
        )
        .unwrap();

        let explicit = Utf8PathBuf::from_path_buf(temp.path().join("ci.yaml")).unwrap();
        fs::write(&explicit, "service-name: ci-runner\n").unwrap();

        let config = loader.load(Some(&explicit)).unwrap();
        assert_eq!(config.service_name, "ci-runner");
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file() {
        let (loader, temp) = create_temp_loader();
        let missing = Utf8PathBuf::from_path_buf(temp.path().join("absent.yaml")).unwrap();

        let err = loader.load(Some(&missing)).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    #[serial]
    fn test_invalid_file_is_rejected() {
        let (loader, _temp) = create_temp_loader();
        fs::write(
            loader.config_dir().join(POLICY_FILE),
            "policies:\n  broken:\n    max-attempts: 0\n",
        )
        .unwrap();

        let err = loader.load(None).unwrap_err();
        assert!(err.to_string().contains("broken.max-attempts"));
    }

    #[test]
    #[serial]
    fn test_malformed_file_names_the_file() {
        let (loader, _temp) = create_temp_loader();
        let global_path = loader.config_dir().join(POLICY_FILE);
        fs::write(&global_path, "policies: [connection, function\n").unwrap();

        match loader.load(None).unwrap_err() {
            Error::YamlParse { path, .. } => assert_eq!(path, global_path.as_str()),
            other => panic!("expected a YAML parse error, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        let (loader, _temp) = create_temp_loader();

        env::set_var("STEADFAST_SERVICE_NAME", "billing");
        env::set_var("STEADFAST_MAX_ATTEMPTS", "9");
        env::set_var("STEADFAST_MULTIPLIER", "0.5");
        env::set_var("STEADFAST_MAX_WAIT", "10");

        let config = loader.load(None);

        env::remove_var("STEADFAST_SERVICE_NAME");
        env::remove_var("STEADFAST_MAX_ATTEMPTS");
        env::remove_var("STEADFAST_MULTIPLIER");
        env::remove_var("STEADFAST_MAX_WAIT");

        let config = config.unwrap();
        assert_eq!(config.service_name, "billing");
        assert_eq!(config.default.max_attempts, Some(9));
        assert_eq!(config.default.multiplier, 0.5);
        assert_eq!(config.default.max_wait, 10.0);
    }

    #[test]
    #[serial]
    fn test_env_unbounded_default() {
        let (loader, _temp) = create_temp_loader();

        env::set_var("STEADFAST_MAX_ATTEMPTS", "unbounded");
        env::set_var("STEADFAST_RETRY_DELAY", "2.5");
        let config = loader.load(None);
        env::remove_var("STEADFAST_MAX_ATTEMPTS");
        env::remove_var("STEADFAST_RETRY_DELAY");

        let config = config.unwrap();
        assert!(!config.default.is_bounded());
        assert_eq!(config.default.retry_delay, 2.5);
    }

    #[test]
    #[serial]
    fn test_env_override_not_a_number() {
        let (loader, _temp) = create_temp_loader();

        env::set_var("STEADFAST_MIN_WAIT", "soon");
        let result = loader.load(None);
        env::remove_var("STEADFAST_MIN_WAIT");

        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_config_dir() {
        let loader = PolicyLoader::with_dir("/tmp/steadfast-test");
        assert_eq!(loader.config_dir(), Utf8Path::new("/tmp/steadfast-test"));
    }
}
