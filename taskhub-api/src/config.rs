/// Configuration management for the API server
///
/// Configuration is read once at startup from environment variables (and a
/// `.env` file when present), validated, and passed to handlers through
/// `AppState`. Nothing reads the environment after startup.
///
/// # Environment Variables
///
/// - `API_HOST` (default `0.0.0.0`), `API_PORT` (default `8080`)
/// - `APP_ENV`: `development` (default) or `production` (enables HSTS)
/// - `LOG_FORMAT`: `text` (default) or `json`
/// - `DATABASE_URL` (required), `DATABASE_MAX_CONNECTIONS` (default 10)
/// - `JWT_SECRET` (required, at least 32 characters), `JWT_ISSUER` (default `taskhub`),
///   `JWT_ACCESS_EXPIRY_HOURS` (default 24), `JWT_REFRESH_EXPIRY_DAYS` (default 30)
/// - `CORS_ALLOWED_ORIGINS`: comma-separated origins, `*` for any (default `*`)
/// - `PAGINATION_DEFAULT_LIMIT` (20), `PAGINATION_MIN_LIMIT` (1), `PAGINATION_MAX_LIMIT` (100)
/// - `UPLOAD_DIR` (`./uploads`), `UPLOAD_MAX_SIZE` in bytes (10 MiB),
///   `UPLOAD_ALLOWED_EXTENSIONS` (comma-separated)
/// - `RUST_LOG`: log filter
///
/// # Example
///
/// ```no_run
/// use taskhub_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use anyhow::{bail, Context};
use chrono::Duration;
use std::{env, fmt, path::PathBuf, str::FromStr};
use taskhub_shared::{auth::jwt::TokenSettings, db::pool, pagination::PaginationLimits};

pub const DEFAULT_UPLOAD_EXTENSIONS: &str = "jpg,jpeg,png,gif,pdf,doc,docx,xls,xlsx,txt,zip";
pub const DEFAULT_UPLOAD_MAX_SIZE: usize = 10 * 1024 * 1024;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub pagination: PaginationConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub log_format: LogFormat,
    /// Allowed CORS origins; a single `*` allows any origin
    pub cors_origins: Vec<String>,
}

impl ApiConfig {
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn cors_is_permissive(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn pool_config(&self) -> pool::DatabaseConfig {
        pool::DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            ..Default::default()
        }
    }
}

#[derive(Clone)]
pub struct JwtConfig {
    /// HS256 signing secret
    ///
    /// Must be at least 32 characters. Generate with `openssl rand -hex 32`.
    pub secret: String,
    pub issuer: String,
    pub access_expiry_hours: i64,
    pub refresh_expiry_days: i64,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("access_expiry_hours", &self.access_expiry_hours)
            .field("refresh_expiry_days", &self.refresh_expiry_days)
            .finish()
    }
}

impl JwtConfig {
    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings::new(self.secret.clone(), self.issuer.clone()).with_lifetimes(
            Duration::hours(self.access_expiry_hours),
            Duration::days(self.refresh_expiry_days),
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PaginationConfig {
    pub default_limit: i64,
    pub min_limit: i64,
    pub max_limit: i64,
}

impl PaginationConfig {
    pub fn limits(&self) -> PaginationLimits {
        PaginationLimits {
            default_limit: self.default_limit,
            min_limit: self.min_limit,
            max_limit: self.max_limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub dir: PathBuf,
    /// Largest accepted file, in bytes
    pub max_size: usize,
    /// Lowercase extensions without the dot
    pub allowed_extensions: Vec<String>,
}

/// Splits a comma-separated list, trimming and dropping empty items
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Loads `.env` (if present) and then the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, a value does not
    /// parse, or the values are inconsistent (e.g. `min > max` limits).
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        fn parse<T>(key: &str, value: String) -> anyhow::Result<T>
        where
            T: FromStr,
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("{key} has an invalid value: {value:?}"))
        }

        let environment = match get("APP_ENV", "development").to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "development" | "dev" | "test" => Environment::Development,
            other => bail!("APP_ENV must be 'development' or 'production', got {other:?}"),
        };

        let log_format = match get("LOG_FORMAT", "text").to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "text" | "pretty" => LogFormat::Text,
            other => bail!("LOG_FORMAT must be 'text' or 'json', got {other:?}"),
        };

        let api = ApiConfig {
            host: get("API_HOST", "0.0.0.0"),
            port: parse("API_PORT", get("API_PORT", "8080"))?,
            environment,
            log_format,
            cors_origins: split_list(&get("CORS_ALLOWED_ORIGINS", "*")),
        };

        let database = DatabaseConfig {
            url: lookup("DATABASE_URL").context("DATABASE_URL environment variable is required")?,
            max_connections: parse("DATABASE_MAX_CONNECTIONS", get("DATABASE_MAX_CONNECTIONS", "10"))?,
        };

        let secret = lookup("JWT_SECRET").context("JWT_SECRET environment variable is required")?;
        if secret.chars().count() < 32 {
            bail!("JWT_SECRET must be at least 32 characters long");
        }

        let jwt = JwtConfig {
            secret,
            issuer: get("JWT_ISSUER", "taskhub"),
            access_expiry_hours: parse("JWT_ACCESS_EXPIRY_HOURS", get("JWT_ACCESS_EXPIRY_HOURS", "24"))?,
            refresh_expiry_days: parse("JWT_REFRESH_EXPIRY_DAYS", get("JWT_REFRESH_EXPIRY_DAYS", "30"))?,
        };
        if jwt.access_expiry_hours <= 0 || jwt.refresh_expiry_days <= 0 {
            bail!("JWT expiry settings must be positive");
        }

        let pagination = PaginationConfig {
            default_limit: parse("PAGINATION_DEFAULT_LIMIT", get("PAGINATION_DEFAULT_LIMIT", "20"))?,
            min_limit: parse("PAGINATION_MIN_LIMIT", get("PAGINATION_MIN_LIMIT", "1"))?,
            max_limit: parse("PAGINATION_MAX_LIMIT", get("PAGINATION_MAX_LIMIT", "100"))?,
        };
        if pagination.min_limit < 1 || pagination.min_limit > pagination.max_limit {
            bail!("PAGINATION_MIN_LIMIT must be between 1 and PAGINATION_MAX_LIMIT");
        }
        if !(pagination.min_limit..=pagination.max_limit).contains(&pagination.default_limit) {
            bail!("PAGINATION_DEFAULT_LIMIT must be within the min/max limits");
        }

        let upload = UploadConfig {
            dir: PathBuf::from(get("UPLOAD_DIR", "./uploads")),
            max_size: parse("UPLOAD_MAX_SIZE", get("UPLOAD_MAX_SIZE", &DEFAULT_UPLOAD_MAX_SIZE.to_string()))?,
            allowed_extensions: split_list(&get("UPLOAD_ALLOWED_EXTENSIONS", DEFAULT_UPLOAD_EXTENSIONS))
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        };
        if upload.max_size == 0 {
            bail!("UPLOAD_MAX_SIZE must be greater than zero");
        }

        Ok(Self {
            api,
            database,
            jwt,
            pagination,
            upload,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}
