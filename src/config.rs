/// Configuration management for Hearth
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::IpAddr;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub email: Option<EmailConfig>,
    pub otp: OtpConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Lifetime of an issued token, in seconds
    pub token_ttl: i64,
    /// Name of the cookie carrying the token
    pub cookie_name: String,
    pub cookie_secure: bool,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// One-time password configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpConfig {
    /// Validity window of a code, in seconds
    pub ttl: i64,
    /// How often expired codes are purged, in seconds
    pub cleanup_interval: u64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst_size: u32,
    /// One OTP send per client address per this many seconds
    pub otp_window: u64,
    /// Peers whose `X-Forwarded-For` header is believed
    pub trusted_proxies: Vec<IpAddr>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Comma-separated proxy addresses, e.g. `127.0.0.1, 10.0.0.2`
fn parse_trusted_proxies(list: &str) -> AppResult<Vec<IpAddr>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| AppError::Validation(format!("Invalid trusted proxy address: {}", s)))
        })
        .collect()
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("HEARTH_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("HEARTH_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| AppError::Validation("Invalid port number".to_string()))?;
        let version = env::var("HEARTH_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let data_directory: PathBuf = env::var("HEARTH_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("HEARTH_DATABASE_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("hearth.sqlite"));

        let jwt_secret = env::var("HEARTH_JWT_SECRET")
            .map_err(|_| AppError::Validation("JWT secret required".to_string()))?;

        let email = if let Ok(smtp_url) = env::var("HEARTH_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("HEARTH_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let trusted_proxies = match env::var("HEARTH_TRUSTED_PROXIES") {
            Ok(list) => parse_trusted_proxies(&list)?,
            Err(_) => Vec::new(),
        };

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            authentication: AuthConfig {
                jwt_secret,
                token_ttl: env_or("HEARTH_TOKEN_TTL", 86400),
                cookie_name: env::var("HEARTH_COOKIE_NAME").unwrap_or_else(|_| "token".to_string()),
                cookie_secure: env_or("HEARTH_COOKIE_SECURE", false),
            },
            email,
            otp: OtpConfig {
                ttl: env_or("HEARTH_OTP_TTL", 120),
                cleanup_interval: env_or("HEARTH_OTP_CLEANUP_INTERVAL", 60),
            },
            rate_limit: RateLimitConfig {
                enabled: env_or("HEARTH_RATE_LIMITS_ENABLED", true),
                requests_per_second: env_or("HEARTH_RATE_LIMIT_RPS", 50),
                burst_size: env_or("HEARTH_RATE_LIMIT_BURST", 100),
                otp_window: env_or("HEARTH_OTP_RATE_WINDOW", 120),
                trusted_proxies,
            },
            logging: LoggingConfig {
                level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
                json: env::var("HEARTH_LOG_FORMAT")
                    .map(|f| f.eq_ignore_ascii_case("json"))
                    .unwrap_or(false),
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(AppError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.token_ttl <= 0 || self.otp.ttl <= 0 {
            return Err(AppError::Validation(
                "Token and OTP lifetimes must be positive".to_string(),
            ));
        }

        if self.authentication.cookie_name.is_empty() {
            return Err(AppError::Validation("Cookie name cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Configuration used by unit tests
    #[cfg(test)]
    pub fn for_tests() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 3000,
                version: "0.1.0".to_string(),
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                database: PathBuf::from(":memory:"),
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-key-for-testing-only".to_string(),
                token_ttl: 3600,
                cookie_name: "token".to_string(),
                cookie_secure: false,
            },
            email: None,
            otp: OtpConfig {
                ttl: 120,
                cleanup_interval: 60,
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                requests_per_second: 1000,
                burst_size: 1000,
                otp_window: 120,
                trusted_proxies: Vec::new(),
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
        }
    }
}
