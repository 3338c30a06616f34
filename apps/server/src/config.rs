use std::env;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub quota: QuotaConfig,
    pub weaver: WeaverConfig,
    pub cache: CacheConfig,
    pub security: SecurityConfig,
}

/// Database connection pool configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    /// Server-side cap on a single statement
    pub statement_timeout: Duration,
}

/// Security configuration for production deployments
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// True if server is behind a proxy that terminates SSL (nginx, Cloudflare, etc.)
    /// When true: cookie_secure=true is enabled
    pub ssl_proxy: bool,
    /// Session encryption key (64 hex chars). Required when ssl_proxy=true
    pub session_secret_key: Option<String>,
}

/// How the daily weaving window is laid out in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaWindowPolicy {
    /// Resets at midnight in a fixed UTC offset
    CalendarDay { reset_offset: FixedOffset },
    /// Trailing 24 hours ending at "now"
    Rolling,
}

impl Default for QuotaWindowPolicy {
    fn default() -> Self {
        QuotaWindowPolicy::CalendarDay {
            reset_offset: Utc.fix(),
        }
    }
}

/// Daily weaving quota configuration
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Successful generations allowed per window, shared by all users
    pub daily_limit: i64,
    pub window: QuotaWindowPolicy,
    /// Record generations with an atomic count-and-insert instead of a plain append
    pub strict: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_LIMIT,
            window: QuotaWindowPolicy::default(),
            strict: false,
        }
    }
}

/// Default number of weavings per day
pub const DEFAULT_DAILY_LIMIT: i64 = 2;

/// Largest accepted reset offset (UTC+14:00 / UTC-14:00)
const MAX_RESET_OFFSET_MINUTES: i32 = 14 * 60;

/// External story weaver (AI generation service)
#[derive(Debug, Clone)]
pub struct WeaverConfig {
    pub url: String,
    pub api_key: Option<String>,
    /// Shared secret for HMAC request signatures
    pub signing_secret: Option<String>,
    pub timeout: Duration,
}

/// In-process cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub profile_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            database: DatabaseConfig::from_env()?,
            quota: QuotaConfig::from_env()?,
            weaver: WeaverConfig::from_env()?,
            cache: CacheConfig::from_env(),
            security: SecurityConfig::from_env()?,
        })
    }
}

impl QuotaConfig {
    /// Load quota configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let daily_limit = match env::var("DAILY_WEAVE_LIMIT") {
            Ok(v) => v
                .parse::<i64>()
                .ok()
                .filter(|v| *v >= 0)
                .ok_or(ConfigError::InvalidDailyLimit)?,
            Err(_) => DEFAULT_DAILY_LIMIT,
        };

        let offset_minutes: i32 = env::var("QUOTA_RESET_UTC_OFFSET_MINUTES")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidResetOffset)?;
        if offset_minutes.abs() > MAX_RESET_OFFSET_MINUTES {
            return Err(ConfigError::InvalidResetOffset);
        }
        let reset_offset =
            FixedOffset::east_opt(offset_minutes * 60).ok_or(ConfigError::InvalidResetOffset)?;

        let window = match env::var("QUOTA_WINDOW")
            .unwrap_or_else(|_| "calendar".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "calendar" | "calendar_day" => QuotaWindowPolicy::CalendarDay { reset_offset },
            "rolling" => QuotaWindowPolicy::Rolling,
            _ => return Err(ConfigError::InvalidQuotaWindow),
        };

        let strict = env::var("QUOTA_STRICT")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            daily_limit,
            window,
            strict,
        })
    }
}

impl WeaverConfig {
    /// Load weaver configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = env::var("WEAVER_URL").map_err(|_| ConfigError::MissingWeaverUrl)?;

        let parsed = url::Url::parse(&url).map_err(|_| ConfigError::InvalidWeaverUrl)?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::InvalidWeaverUrl);
        }

        Ok(Self {
            url,
            api_key: env::var("WEAVER_API_KEY").ok().filter(|v| !v.is_empty()),
            signing_secret: env::var("WEAVER_SIGNING_SECRET")
                .ok()
                .filter(|v| !v.is_empty()),
            timeout: Duration::from_secs(
                env::var("WEAVER_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
            ),
        })
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            profile_ttl: Duration::from_secs(
                env::var("PROFILE_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
            ),
        }
    }
}

impl DatabaseConfig {
    /// Load database configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        Ok(Self {
            url,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),
            acquire_timeout: Duration::from_secs(
                env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            ),
            idle_timeout: Duration::from_secs(
                env::var("DATABASE_IDLE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()
                    .unwrap_or(600),
            ),
            max_lifetime: Duration::from_secs(
                env::var("DATABASE_MAX_LIFETIME_SECS")
                    .unwrap_or_else(|_| "1800".to_string())
                    .parse()
                    .unwrap_or(1800),
            ),
            statement_timeout: Duration::from_millis(
                env::var("DATABASE_STATEMENT_TIMEOUT_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .unwrap_or(5000),
            ),
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    InvalidPort,
    MissingDatabaseUrl,
    MissingSessionSecret,
    MissingWeaverUrl,
    InvalidWeaverUrl,
    InvalidDailyLimit,
    InvalidQuotaWindow,
    InvalidResetOffset,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "PORT must be a valid number"),
            ConfigError::MissingDatabaseUrl => {
                write!(f, "DATABASE_URL environment variable is required")
            }
            ConfigError::MissingSessionSecret => {
                write!(
                    f,
                    "SESSION_SECRET_KEY is required when SSL_PROXY is enabled"
                )
            }
            ConfigError::MissingWeaverUrl => {
                write!(f, "WEAVER_URL environment variable is required")
            }
            ConfigError::InvalidWeaverUrl => {
                write!(f, "WEAVER_URL must be a valid http or https URL")
            }
            ConfigError::InvalidDailyLimit => {
                write!(f, "DAILY_WEAVE_LIMIT must be a non-negative integer")
            }
            ConfigError::InvalidQuotaWindow => {
                write!(f, "QUOTA_WINDOW must be either 'calendar' or 'rolling'")
            }
            ConfigError::InvalidResetOffset => write!(
                f,
                "QUOTA_RESET_UTC_OFFSET_MINUTES must be an integer between -840 and 840"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl SecurityConfig {
    /// Load security configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let session_secret_key = env::var("SESSION_SECRET_KEY").ok();

        let ssl_proxy = env::var("SSL_PROXY")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        // When SSL_PROXY is enabled, SESSION_SECRET_KEY is required
        if ssl_proxy && session_secret_key.is_none() {
            return Err(ConfigError::MissingSessionSecret);
        }

        Ok(Self {
            ssl_proxy,
            session_secret_key,
        })
    }
}
