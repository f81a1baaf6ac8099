//! Application configuration loaded from environment variables.
//!
//! `Config` drives the profile API server; `SessionConfig` drives the
//! session client embedded in a UI process.

use std::env;
use std::time::Duration;

/// Key under which the session blob is cached in local storage.
pub const DEFAULT_CACHE_KEY: &str = "supabase.auth.token";

/// Substrings identifying auth keys in local/session storage.
pub const DEFAULT_PURGE_PATTERNS: [&str; 2] = ["supabase", "sb-"];

/// Server configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the hosted backend (auth + REST)
    pub supabase_url: String,
    /// Public API key sent as `apikey`
    pub supabase_anon_key: String,
    /// Service key for the REST store; `None` runs with an in-memory store
    pub supabase_service_key: Option<String>,
    /// HS256 secret the auth service signs access tokens with (raw bytes)
    pub jwt_secret: Vec<u8>,
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Timeout applied to outbound HTTP calls
    pub http_timeout: Duration,
}

impl Config {
    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test_anon_key".to_string(),
            supabase_service_key: None,
            jwt_secret: b"test_jwt_secret_32_bytes_minimum!".to_vec(),
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            http_timeout: Duration::from_secs(10),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            supabase_url: env::var("SUPABASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?,
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_ANON_KEY"))?,
            supabase_service_key: env::var("SUPABASE_SERVICE_KEY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .map_err(|_| ConfigError::Missing("SUPABASE_JWT_SECRET"))?
                .into_bytes(),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            http_timeout: Duration::from_secs(
                env::var("HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
        })
    }

    /// Auth service base (`{url}/auth/v1`).
    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.supabase_url)
    }

    /// REST store base (`{url}/rest/v1`).
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url)
    }
}

/// Session client configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Origin serving `/api/profile`
    pub api_base_url: String,
    /// Where logout sends the user
    pub login_route: String,
    /// Upper bound on the initial loading state
    pub bootstrap_timeout: Duration,
    /// Local storage key holding the cached session blob
    pub cache_key: String,
    /// Storage keys containing any of these are removed on sign-out
    pub purge_patterns: Vec<String>,
    /// Timeout for the profile request
    pub http_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            login_route: "/login".to_string(),
            bootstrap_timeout: Duration::from_secs(2),
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            purge_patterns: DEFAULT_PURGE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Ok(url) = env::var("API_BASE_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(route) = env::var("SESSION_LOGIN_ROUTE") {
            config.login_route = route;
        }
        if let Some(ms) = env::var("SESSION_BOOTSTRAP_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.bootstrap_timeout = Duration::from_millis(ms);
        }
        config
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
