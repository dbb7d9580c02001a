use std::time::Duration;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `60`).
    pub request_timeout_secs: u64,
    /// Time allowed for background jobs to stop after shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Maximum database connections (default: `10`).
    pub db_max_connections: u32,
    /// How often due version transitions are applied (default: `60`).
    pub scheduler_interval_secs: u64,
    pub auth: AuthConfig,
    pub catalog: CatalogConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `HOST`                     | `0.0.0.0`               |
    /// | `PORT`                     | `3000`                  |
    /// | `CORS_ORIGINS`             | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`     | `60`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`                    |
    /// | `DB_MAX_CONNECTIONS`       | `10`                    |
    /// | `SCHEDULER_INTERVAL_SECS`  | `60`                    |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let db_max_connections: u32 = std::env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("DB_MAX_CONNECTIONS must be a valid u32");

        let scheduler_interval_secs: u64 = std::env::var("SCHEDULER_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("SCHEDULER_INTERVAL_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            db_max_connections,
            scheduler_interval_secs,
            auth: AuthConfig::from_env(),
            catalog: CatalogConfig::from_env(),
        }
    }
}

/// Credentials accepted on render endpoints.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// `(client, key)` pairs for internal callers.
    pub api_keys: Vec<(String, String)>,
    /// HS256 secret for end-user tokens. End-user auth is off when unset.
    pub jwt_secret: Option<String>,
    /// Let requests without credentials through as anonymous callers.
    pub allow_anonymous: bool,
}

impl AuthConfig {
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `RENDER_API_KEYS`         | (none, comma-separated `client:key`) |
    /// | `JWT_SECRET`              | (none)  |
    /// | `RENDER_ALLOW_ANONYMOUS`  | `false` |
    ///
    /// # Panics
    ///
    /// Panics if an entry of `RENDER_API_KEYS` is not `client:key`.
    pub fn from_env() -> Self {
        let api_keys = std::env::var("RENDER_API_KEYS")
            .map(|v| parse_api_keys(&v))
            .unwrap_or_default();

        let jwt_secret = std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty());

        let allow_anonymous: bool = std::env::var("RENDER_ALLOW_ANONYMOUS")
            .unwrap_or_else(|_| "false".into())
            .parse()
            .expect("RENDER_ALLOW_ANONYMOUS must be true or false");

        Self {
            api_keys,
            jwt_secret,
            allow_anonymous,
        }
    }
}

fn parse_api_keys(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (client, key) = entry
                .split_once(':')
                .unwrap_or_else(|| panic!("RENDER_API_KEYS entry '{entry}' must be client:key"));
            (client.trim().to_string(), key.trim().to_string())
        })
        .collect()
}

/// External questionnaire catalog and case service.
///
/// The workspace provider is only wired when both URLs are set.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: Option<String>,
    pub case_service_url: Option<String>,
    pub environment: String,
    pub timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            case_service_url: None,
            environment: "production".into(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl CatalogConfig {
    /// | Env Var                 | Default      |
    /// |-------------------------|--------------|
    /// | `CATALOG_BASE_URL`      | (none)       |
    /// | `CASE_SERVICE_URL`      | (none)       |
    /// | `CATALOG_ENVIRONMENT`   | `production` |
    /// | `CATALOG_TIMEOUT_SECS`  | `5`          |
    pub fn from_env() -> Self {
        let d = Self::default();
        let timeout_secs: u64 = std::env::var("CATALOG_TIMEOUT_SECS")
            .unwrap_or_else(|_| d.timeout.as_secs().to_string())
            .parse()
            .expect("CATALOG_TIMEOUT_SECS must be a valid u64");

        Self {
            base_url: std::env::var("CATALOG_BASE_URL").ok().filter(|s| !s.is_empty()),
            case_service_url: std::env::var("CASE_SERVICE_URL").ok().filter(|s| !s.is_empty()),
            environment: std::env::var("CATALOG_ENVIRONMENT").unwrap_or(d.environment),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}
