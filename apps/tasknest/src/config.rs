//! # Settings
//!
//! Server settings read from `TASKNEST_*` environment variables.
//!
//! Loading goes through a lookup function, so tests pass a map instead of
//! mutating the process environment.

use std::collections::HashMap;
use std::path::PathBuf;
use tasknest_core::NestConfig;
use tasknest_core::password::MIN_ITERATIONS;
use thiserror::Error;

/// Minimum length of the token signing secret.
pub const MIN_SECRET_LEN: usize = 32;

/// Longest accepted access-token lifetime: one day.
pub const MAX_ACCESS_TOKEN_MINUTES: u32 = 1_440;

/// Longest accepted refresh-token lifetime: ten years.
pub const MAX_REFRESH_TOKEN_DAYS: u32 = 3_650;

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

// =============================================================================
// ERRORS
// =============================================================================

/// Invalid or missing configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            _ => Err("expected development, staging or production".to_string()),
        }
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Everything the server needs to start.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub database: PathBuf,
    pub jwt_secret: String,
    pub access_token_minutes: u32,
    pub refresh_token_days: u32,
    pub cors_origins: Vec<String>,
    /// Auth requests allowed per minute across all clients. Zero disables.
    pub auth_rate_limit: u32,
    pub password_iterations: u32,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("environment", &self.environment)
            .field("database", &self.database)
            .field("jwt_secret", &"<redacted>")
            .field("access_token_minutes", &self.access_token_minutes)
            .field("refresh_token_days", &self.refresh_token_days)
            .field("cors_origins", &self.cors_origins)
            .field("auth_rate_limit", &self.auth_rate_limit)
            .field("password_iterations", &self.password_iterations)
            .finish()
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings from a map. Used by tests.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Read settings through `lookup`, applying defaults and validation.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("TASKNEST_JWT_SECRET").ok_or(ConfigError::Missing("TASKNEST_JWT_SECRET"))?;
        if jwt_secret.chars().count() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: "TASKNEST_JWT_SECRET",
                value: "<redacted>".into(),
                reason: format!("must be at least {} characters", MIN_SECRET_LEN),
            });
        }

        let environment = parse(get("TASKNEST_ENVIRONMENT"), "TASKNEST_ENVIRONMENT", Environment::default())?;

        let access_token_minutes = parse(get("TASKNEST_ACCESS_TOKEN_MINUTES"), "TASKNEST_ACCESS_TOKEN_MINUTES", 15u32)?;
        bounded("TASKNEST_ACCESS_TOKEN_MINUTES", access_token_minutes, MAX_ACCESS_TOKEN_MINUTES)?;
        let refresh_token_days = parse(get("TASKNEST_REFRESH_TOKEN_DAYS"), "TASKNEST_REFRESH_TOKEN_DAYS", 7u32)?;
        bounded("TASKNEST_REFRESH_TOKEN_DAYS", refresh_token_days, MAX_REFRESH_TOKEN_DAYS)?;

        let password_iterations = parse(
            get("TASKNEST_PASSWORD_ITERATIONS"),
            "TASKNEST_PASSWORD_ITERATIONS",
            tasknest_core::password::DEFAULT_ITERATIONS,
        )?;
        if password_iterations < MIN_ITERATIONS {
            return Err(ConfigError::Invalid {
                name: "TASKNEST_PASSWORD_ITERATIONS",
                value: password_iterations.to_string(),
                reason: format!("must be at least {}", MIN_ITERATIONS),
            });
        }

        Ok(Self {
            host: get("TASKNEST_HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port: parse(get("TASKNEST_PORT"), "TASKNEST_PORT", 8000u16)?,
            environment,
            database: get("TASKNEST_DATABASE")
                .map_or_else(|| PathBuf::from("tasknest.redb"), PathBuf::from),
            jwt_secret,
            access_token_minutes,
            refresh_token_days,
            cors_origins: split_origins(
                &get("TASKNEST_CORS_ORIGINS").unwrap_or_else(|| DEFAULT_CORS_ORIGINS.into()),
            ),
            auth_rate_limit: parse(get("TASKNEST_AUTH_RATE_LIMIT"), "TASKNEST_AUTH_RATE_LIMIT", 30u32)?,
            password_iterations,
        })
    }

    /// Settings suitable for tests: fast hashing, no rate limit.
    pub fn for_tests(secret: &str) -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            environment: Environment::Development,
            database: PathBuf::from("tasknest.redb"),
            jwt_secret: secret.to_string(),
            access_token_minutes: 15,
            refresh_token_days: 7,
            cors_origins: split_origins(DEFAULT_CORS_ORIGINS),
            auth_rate_limit: 0,
            password_iterations: MIN_ITERATIONS,
        }
    }

    /// Verbose behaviour is only for local development.
    pub fn debug(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Engine tunables derived from these settings.
    pub fn nest_config(&self) -> NestConfig {
        NestConfig {
            access_ttl: chrono::Duration::minutes(i64::from(self.access_token_minutes)),
            refresh_ttl: chrono::Duration::days(i64::from(self.refresh_token_days)),
            password_iterations: self.password_iterations,
        }
    }
}

fn parse<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse() {
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value: raw,
        }),
    }
}

fn bounded(name: &'static str, value: u32, max: u32) -> Result<(), ConfigError> {
    if !(1..=max).contains(&value) {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: format!("must be between 1 and {}", max),
        });
    }
    Ok(())
}

/// Split a comma-separated origin list, dropping blanks.
pub fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
