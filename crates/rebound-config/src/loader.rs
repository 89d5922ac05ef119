//! Configuration file loading and validation.

use crate::types::ClientConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Relative location of the config file inside a project directory.
pub const CONFIG_FILE: &str = ".rebound/config.yaml";

static ENV_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("env reference pattern is valid")
});

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid YAML at line {}: {message}", line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ParseError { line: Option<usize>, message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("environment variable not found: {var}")]
    EnvVarNotFound { var: String },
}

/// Configuration loader.
pub struct ConfigLoader {
    base_path: PathBuf,
}

impl ConfigLoader {
    /// Create a loader for the given project directory.
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            base_path: project_dir.as_ref().to_path_buf(),
        }
    }

    /// Full path of the config file this loader reads.
    pub fn config_path(&self) -> PathBuf {
        self.base_path.join(CONFIG_FILE)
    }

    /// Load configuration from `.rebound/config.yaml`.
    ///
    /// A missing file is not an error: the defaults are returned.
    pub fn load(&self) -> Result<ClientConfig, ConfigError> {
        let config_path = self.config_path();

        if !config_path.exists() {
            tracing::debug!("No config at {}, using defaults", config_path.display());
            return Ok(ClientConfig::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let config = Self::parse(&contents)?;
        tracing::debug!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate a YAML document.
    pub fn parse(contents: &str) -> Result<ClientConfig, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        let config: ClientConfig =
            serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(config: &ClientConfig) -> Result<(), ConfigError> {
        let retry = &config.retry;

        if !(0.0..=1.0).contains(&retry.jitter) {
            return Err(ConfigError::ValidationError {
                message: "retry.jitter must be between 0.0 and 1.0".to_string(),
            });
        }

        if retry.max_delay_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "retry.max_delay_ms must be greater than 0".to_string(),
            });
        }

        if retry.initial_delay_ms > retry.max_delay_ms {
            tracing::warn!(
                initial_delay_ms = retry.initial_delay_ms,
                max_delay_ms = retry.max_delay_ms,
                "initial delay exceeds max delay; every backoff will be capped"
            );
        }

        if config.timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError {
                message: "timeout_ms must be greater than 0 when set".to_string(),
            });
        }

        for (name, value) in &config.headers {
            if name.trim().is_empty() {
                return Err(ConfigError::ValidationError {
                    message: "header names must not be empty".to_string(),
                });
            }
            if value.is_empty() {
                return Err(ConfigError::ValidationError {
                    message: format!("header {} has an empty value", name),
                });
            }
        }

        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, config: &ClientConfig) -> Result<(), ConfigError> {
        let config_path = self.config_path();
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let yaml = serde_yaml::to_string(config).map_err(|e| ConfigError::ParseError {
            line: None,
            message: e.to_string(),
        })?;

        std::fs::write(config_path, yaml)?;
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_default())
    }
}

/// Expand environment variables in the form `${VAR}` or `${VAR:-default}`.
pub fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(content.len());
    let mut last = 0;

    for cap in ENV_REF.captures_iter(content) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let var_name = &cap[1];
        let default = cap.get(2).map(|m| m.as_str());

        let value = match std::env::var(var_name) {
            Ok(v) => v,
            Err(_) => match default {
                Some(d) => d.to_string(),
                None => {
                    return Err(ConfigError::EnvVarNotFound {
                        var: var_name.to_string(),
                    })
                }
            },
        };

        result.push_str(&content[last..full_match.start()]);
        result.push_str(&value);
        last = full_match.end();
    }

    result.push_str(&content[last..]);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_defaults_when_no_file() {
        let dir = tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path());
        let config = loader.load().unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_load_config_from_yaml_file() {
        let dir = tempdir().unwrap();
        let rebound_dir = dir.path().join(".rebound");
        fs::create_dir_all(&rebound_dir).unwrap();

        let config_content = r#"
base_url: https://api.example.com
headers:
  x-api-key: secret
timeout_ms: 5000
retry:
  max_retries: 2
  jitter: 0.25
  retryable_statuses: [503]
"#;

        fs::write(rebound_dir.join("config.yaml"), config_content).unwrap();

        let loader = ConfigLoader::new(dir.path());
        let config = loader.load().unwrap();

        assert_eq!(config.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.headers["x-api-key"], "secret");
        assert_eq!(config.timeout_ms, Some(5000));
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.jitter, 0.25);
        assert_eq!(config.retry.retryable_statuses, vec![503]);

        // Unspecified values use defaults
        assert_eq!(config.retry.initial_delay_ms, 100);
        assert_eq!(config.retry.max_delay_ms, 1000);
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("REBOUND_LOADER_TEST_VAR", "test_value");
        let result = expand_env_vars("key: ${REBOUND_LOADER_TEST_VAR}").unwrap();
        assert_eq!(result, "key: test_value");
        std::env::remove_var("REBOUND_LOADER_TEST_VAR");
    }

    #[test]
    fn test_env_var_default_value() {
        let result = expand_env_vars("key: ${REBOUND_LOADER_UNSET_VAR:-fallback} tail").unwrap();
        assert_eq!(result, "key: fallback tail");
    }

    #[test]
    fn test_missing_env_var_is_an_error() {
        let err = expand_env_vars("key: ${REBOUND_LOADER_MISSING_VAR}").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarNotFound { var } if var == "REBOUND_LOADER_MISSING_VAR"));
    }

    #[test]
    fn test_jitter_out_of_range_rejected() {
        let err = ConfigLoader::parse("retry:\n  jitter: 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
        assert!(err.to_string().contains("jitter"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = ConfigLoader::parse("timeout_ms: 0\n").unwrap_err();
        assert!(err.to_string().contains("timeout_ms"));
    }

    #[test]
    fn test_zero_max_delay_rejected() {
        let err = ConfigLoader::parse("retry:\n  max_delay_ms: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
        assert!(err.to_string().contains("max_delay_ms"));
    }

    #[test]
    fn test_empty_header_name_rejected() {
        let err = ConfigLoader::parse("headers:\n  \"\": value\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
        assert!(err.to_string().contains("header names must not be empty"));
    }

    #[test]
    fn test_empty_header_value_rejected() {
        let err = ConfigLoader::parse("headers:\n  x-api-key: \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
        assert!(err.to_string().contains("x-api-key"));
    }

    #[test]
    fn test_initial_delay_above_max_is_accepted() {
        let config = ConfigLoader::parse("retry:\n  initial_delay_ms: 5000\n  max_delay_ms: 100\n").unwrap();
        assert_eq!(config.retry.initial_delay_ms, 5000);
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = ConfigLoader::parse("retry:\n  max_retries: [oops\n").unwrap_err();
        match err {
            ConfigError::ParseError { line, .. } => assert!(line.is_some()),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path());

        let config = ClientConfig::default().with_header("accept", "application/json");
        loader.save(&config).unwrap();

        assert!(loader.config_path().exists());
        assert_eq!(loader.load().unwrap(), config);
    }
}
