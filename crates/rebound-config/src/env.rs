//! Environment variable handling.

use crate::types::ClientConfig;
use std::env;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Environment variable errors.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("failed to load .env file: {0}")]
    DotenvError(#[from] dotenvy::Error),
}

/// Environment variable names.
pub mod vars {
    pub const REBOUND_BASE_URL: &str = "REBOUND_BASE_URL";
    pub const REBOUND_TIMEOUT_MS: &str = "REBOUND_TIMEOUT_MS";
    pub const REBOUND_MAX_RETRIES: &str = "REBOUND_MAX_RETRIES";
    pub const REBOUND_INITIAL_DELAY_MS: &str = "REBOUND_INITIAL_DELAY_MS";
    pub const REBOUND_MAX_DELAY_MS: &str = "REBOUND_MAX_DELAY_MS";
    pub const REBOUND_JITTER: &str = "REBOUND_JITTER";
    pub const REBOUND_ENV: &str = "REBOUND_ENV";
}

/// Environment access.
pub struct Environment {
    _guard: (),
}

impl Environment {
    /// Initialize environment from .env files.
    ///
    /// Missing files are skipped; unreadable or malformed ones are errors.
    pub fn init() -> Result<Self, EnvError> {
        // Later files override earlier ones
        Self::load_file(".env")?;
        Self::load_file(".env.local")?;

        if let Ok(name) = env::var(vars::REBOUND_ENV) {
            Self::load_file(format!(".env.{}", name))?;
        }

        Ok(Self { _guard: () })
    }

    /// Load one dotenv file if it exists.
    pub fn load_file(path: impl AsRef<Path>) -> Result<(), EnvError> {
        match dotenvy::from_filename(path.as_ref()) {
            Ok(_) => Ok(()),
            Err(e) if e.not_found() => Ok(()),
            Err(e) => Err(EnvError::DotenvError(e)),
        }
    }

    /// Get an optional string variable.
    pub fn get(var: &str) -> Option<String> {
        env::var(var).ok()
    }

    /// Get and parse an optional variable.
    pub fn get_parsed<T: FromStr>(var: &str) -> Result<Option<T>, EnvError> {
        match env::var(var) {
            Ok(v) => v.trim().parse().map(Some).map_err(|_| EnvError::InvalidValue {
                var: var.to_string(),
                message: format!("cannot parse {:?}", v),
            }),
            Err(_) => Ok(None),
        }
    }
}

/// Override `config` with any `REBOUND_*` variables that are set.
pub fn apply_env_overrides(config: &mut ClientConfig) -> Result<(), EnvError> {
    if let Some(base_url) = Environment::get(vars::REBOUND_BASE_URL) {
        config.base_url = Some(base_url);
    }
    if let Some(timeout) = Environment::get_parsed::<u64>(vars::REBOUND_TIMEOUT_MS)? {
        config.timeout_ms = Some(timeout);
    }
    if let Some(max_retries) = Environment::get_parsed(vars::REBOUND_MAX_RETRIES)? {
        config.retry.max_retries = max_retries;
    }
    if let Some(delay) = Environment::get_parsed(vars::REBOUND_INITIAL_DELAY_MS)? {
        config.retry.initial_delay_ms = delay;
    }
    if let Some(delay) = Environment::get_parsed(vars::REBOUND_MAX_DELAY_MS)? {
        config.retry.max_delay_ms = delay;
    }
    if let Some(jitter) = Environment::get_parsed::<f64>(vars::REBOUND_JITTER)? {
        if !(0.0..=1.0).contains(&jitter) {
            return Err(EnvError::InvalidValue {
                var: vars::REBOUND_JITTER.to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        config.retry.jitter = jitter;
    }
    Ok(())
}
