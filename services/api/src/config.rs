//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

const GEMINI_OPENAI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings for the optional reinforcement-suggestion generator.
#[derive(Clone, Debug)]
pub struct SuggestionConfig {
    pub api_key: String,
    pub api_base: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub max_attempts: u32,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub log_level: Level,
    pub cors_origin: String,
    /// `None` disables suggestions; requests for them report them unavailable.
    pub suggestions: Option<SuggestionConfig>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Load Server and Database Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", &lookup, 5u32)?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Load the Suggestion Generator (optional) ---
        let gemini_api_key = lookup("GEMINI_API_KEY");
        let openai_api_key = lookup("OPENAI_API_KEY");
        let default_base = gemini_api_key.as_ref().map(|_| GEMINI_OPENAI_BASE.to_string());
        let suggestions = match gemini_api_key.or(openai_api_key) {
            Some(api_key) => {
                let timeout_secs = parse_or("SUGGESTION_TIMEOUT_SECS", &lookup, 20u64)?;
                let max_attempts = parse_or("SUGGESTION_MAX_ATTEMPTS", &lookup, 2u32)?;
                if max_attempts == 0 {
                    return Err(ConfigError::InvalidValue(
                        "SUGGESTION_MAX_ATTEMPTS".to_string(),
                        "must be at least 1".to_string(),
                    ));
                }
                Some(SuggestionConfig {
                    api_key,
                    api_base: lookup("SUGGESTION_API_BASE").or(default_base),
                    model: lookup("SUGGESTION_MODEL")
                        .unwrap_or_else(|| "gemini-2.5-flash".to_string()),
                    timeout: Duration::from_secs(timeout_secs),
                    max_attempts,
                })
            }
            None => None,
        };

        Ok(Self {
            bind_address,
            database_url,
            database_max_connections,
            log_level,
            cors_origin,
            suggestions,
        })
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn database_url_is_required() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(var) if var == "DATABASE_URL"));
    }

    #[test]
    fn defaults_apply_without_suggestion_keys() {
        let config =
            Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/school")]))
                .unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.log_level, Level::INFO);
        assert!(config.suggestions.is_none());
    }

    #[test]
    fn gemini_key_enables_suggestions_with_its_endpoint() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/school"),
            ("GEMINI_API_KEY", "secret"),
            ("SUGGESTION_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        let suggestions = config.suggestions.unwrap();
        assert_eq!(suggestions.api_base.as_deref(), Some(GEMINI_OPENAI_BASE));
        assert_eq!(suggestions.timeout, Duration::from_secs(5));
        assert_eq!(suggestions.model, "gemini-2.5-flash");
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/school"),
            ("DATABASE_MAX_CONNECTIONS", "many"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "DATABASE_MAX_CONNECTIONS"));
    }
}
