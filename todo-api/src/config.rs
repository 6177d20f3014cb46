/// Configuration management for the API server
///
/// Configuration is read once at startup from environment variables (a
/// `.env` file is loaded first when present).
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `RUN_MIGRATIONS`: Apply migrations on startup (default: true)
/// - `BETTER_AUTH_URL`: Auth server base URL (default: http://localhost:3000)
/// - `JWT_ALGORITHM`: Accepted signing algorithm (default: EdDSA)
/// - `JWT_AUDIENCE`: Expected `aud` claim (default: the auth server URL)
/// - `JWKS_CACHE_TTL_SECONDS`: Key set cache lifetime (default: 300)
/// - `CORS_ORIGINS`: JSON list, comma list or single origin; `*` allows any
/// - `RATE_LIMIT_PER_MINUTE`: Requests per user per minute, 0 disables (default: 120)
/// - `LOG_FORMAT`: `json` or `text` (default: text)
/// - `RUST_LOG`: Log filter
///
/// # Example
///
/// ```no_run
/// use todo_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use todo_shared::auth::jwt::Algorithm;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub log_format: LogFormat,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `*` means any
    pub cors_origins: Vec<String>,

    /// Requests per user per minute; 0 disables rate limiting
    pub rate_limit_per_minute: u32,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

/// Token verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the auth server; the key set lives below it
    pub better_auth_url: String,
    pub jwt_algorithm: Algorithm,
    pub jwt_audience: String,
    pub jwks_cache_ttl_seconds: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" | "" => Ok(LogFormat::Text),
            other => anyhow::bail!("unknown log format '{}'", other),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or any variable has an
    /// invalid value.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url =
            get("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let better_auth_url = get("BETTER_AUTH_URL")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        let jwt_algorithm = match get("JWT_ALGORITHM") {
            Some(raw) => Algorithm::from_str(raw.trim())
                .map_err(|_| anyhow::anyhow!("JWT_ALGORITHM '{}' is not a supported algorithm", raw))?,
            None => Algorithm::EdDSA,
        };

        let cors_origins = match get("CORS_ORIGINS") {
            Some(raw) => parse_cors_origins(&raw),
            None => vec!["http://localhost:3000".to_string()],
        };

        let log_format = match get("LOG_FORMAT") {
            Some(raw) => raw.parse().context("LOG_FORMAT must be 'json' or 'text'")?,
            None => LogFormat::default(),
        };

        Ok(Self {
            api: ApiConfig {
                host: get("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&get, "API_PORT", 8080)?,
                cors_origins,
                rate_limit_per_minute: parse_or(&get, "RATE_LIMIT_PER_MINUTE", 120)?,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
                run_migrations: match get("RUN_MIGRATIONS") {
                    Some(raw) => parse_bool(&raw).context("RUN_MIGRATIONS must be a boolean")?,
                    None => true,
                },
            },
            auth: AuthConfig {
                jwt_audience: get("JWT_AUDIENCE").unwrap_or_else(|| better_auth_url.clone()),
                better_auth_url,
                jwt_algorithm,
                jwks_cache_ttl_seconds: parse_or(&get, "JWKS_CACHE_TTL_SECONDS", 300)?,
            },
            log_format,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether any origin may call the API
    pub fn cors_allows_any(&self) -> bool {
        self.api.cors_origins.iter().any(|o| o == "*")
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("'{}' is not a boolean", other),
    }
}

/// Parses `CORS_ORIGINS`
///
/// Accepts a JSON array (`["https://a.example","https://b.example"]`), a
/// comma separated list, or a single origin.
pub fn parse_cors_origins(raw: &str) -> Vec<String> {
    let raw = raw.trim();

    if raw.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(raw) {
            return list
                .into_iter()
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
    }

    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}
