/// Configuration management for social-api
///
/// Loads configuration from environment variables (after `dotenvy` has
/// populated them from a `.env` file, if any). Development defaults are
/// provided where safe; production refuses permissive or in-memory settings.
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// Store configuration
    pub store: StoreConfig,
    /// Bearer token configuration
    pub jwt: JwtConfig,
    /// Media host configuration
    pub media: MediaConfig,
    /// User directory behavior
    pub users: UsersConfig,
    /// Log output format
    pub log: LogConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated list of allowed origins
    pub allowed_origins: String,
}

impl CorsConfig {
    pub fn origins(&self) -> impl Iterator<Item = &str> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
    }

    pub fn allows_any(&self) -> bool {
        self.origins().any(|o| o == "*")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database URL
    pub database_url: String,
    /// Max connections in pool
    pub max_connections: u32,
}

/// Bearer token configuration; either a shared secret or an RSA key pair.
#[derive(Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: Option<String>,
    pub public_key_pem: Option<String>,
    pub private_key_pem: Option<String>,
    pub access_ttl_secs: i64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("public_key_pem", &self.public_key_pem.is_some())
            .field("private_key_pem", &self.private_key_pem.as_ref().map(|_| "<redacted>"))
            .field("access_ttl_secs", &self.access_ttl_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaBackend {
    Cloudinary,
    Memory,
}

/// Media host configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub backend: MediaBackend,
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub max_upload_bytes: usize,
}

impl std::fmt::Debug for MediaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaConfig")
            .field("backend", &self.backend)
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

/// User directory behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersConfig {
    /// Leave the requesting user out of the user directory
    pub directory_excludes_viewer: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub json: bool,
}

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_ACCESS_TTL_SECS: i64 = 30 * 24 * 3600;

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let production = app_env.eq_ignore_ascii_case("production");

        Ok(Config {
            app: AppConfig {
                env: app_env.clone(),
                host: std::env::var("SOCIAL_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or_default("SOCIAL_API_PORT", 8080)?,
            },
            cors: {
                let allowed_origins = match std::env::var("CORS_ALLOWED_ORIGINS") {
                    Ok(value) => value,
                    Err(_) if production => {
                        return Err("CORS_ALLOWED_ORIGINS must be set in production".to_string())
                    }
                    Err(_) => "http://localhost:3000".to_string(),
                };
                let cors = CorsConfig { allowed_origins };

                if production && cors.allows_any() {
                    return Err("CORS_ALLOWED_ORIGINS cannot be '*' in production".to_string());
                }
                cors
            },
            store: {
                let backend = match std::env::var("STORE_BACKEND")
                    .unwrap_or_else(|_| "postgres".to_string())
                    .to_ascii_lowercase()
                    .as_str()
                {
                    "postgres" => StoreBackend::Postgres,
                    "memory" => StoreBackend::Memory,
                    other => return Err(format!("Unknown STORE_BACKEND '{other}'")),
                };
                if production && backend == StoreBackend::Memory {
                    return Err("STORE_BACKEND=memory is not allowed in production".to_string());
                }

                StoreConfig {
                    backend,
                    database_url: std::env::var("DATABASE_URL")
                        .unwrap_or_else(|_| "postgresql://localhost/murmur".to_string()),
                    max_connections: parse_env_or_default("DATABASE_MAX_CONNECTIONS", 10)?,
                }
            },
            jwt: {
                let jwt = JwtConfig {
                    secret: non_empty_env("JWT_SECRET"),
                    public_key_pem: non_empty_env("JWT_PUBLIC_KEY_PEM"),
                    private_key_pem: non_empty_env("JWT_PRIVATE_KEY_PEM"),
                    access_ttl_secs: parse_env_or_default(
                        "JWT_ACCESS_TTL_SECS",
                        DEFAULT_ACCESS_TTL_SECS,
                    )?,
                };
                if jwt.secret.is_none() && jwt.public_key_pem.is_none() {
                    return Err(
                        "Either JWT_SECRET or JWT_PUBLIC_KEY_PEM must be set".to_string()
                    );
                }
                if jwt.access_ttl_secs <= 0 {
                    return Err("JWT_ACCESS_TTL_SECS must be positive".to_string());
                }
                jwt
            },
            media: {
                let backend = match std::env::var("MEDIA_BACKEND")
                    .unwrap_or_else(|_| "cloudinary".to_string())
                    .to_ascii_lowercase()
                    .as_str()
                {
                    "cloudinary" => MediaBackend::Cloudinary,
                    "memory" => MediaBackend::Memory,
                    other => return Err(format!("Unknown MEDIA_BACKEND '{other}'")),
                };
                if production && backend == MediaBackend::Memory {
                    return Err("MEDIA_BACKEND=memory is not allowed in production".to_string());
                }

                let media = MediaConfig {
                    backend,
                    cloud_name: std::env::var("CN_NAME").unwrap_or_default(),
                    api_key: std::env::var("CN_API_KEY").unwrap_or_default(),
                    api_secret: std::env::var("CN_API_KEY_SECRET").unwrap_or_default(),
                    max_upload_bytes: parse_env_or_default(
                        "MEDIA_MAX_UPLOAD_BYTES",
                        DEFAULT_MAX_UPLOAD_BYTES,
                    )?,
                };
                if media.backend == MediaBackend::Cloudinary
                    && (media.cloud_name.is_empty()
                        || media.api_key.is_empty()
                        || media.api_secret.is_empty())
                {
                    return Err(
                        "CN_NAME, CN_API_KEY and CN_API_KEY_SECRET must be set for MEDIA_BACKEND=cloudinary"
                            .to_string(),
                    );
                }
                media
            },
            users: UsersConfig {
                directory_excludes_viewer: parse_env_or_default(
                    "USERS_DIRECTORY_EXCLUDE_VIEWER",
                    true,
                )?,
            },
            log: LogConfig {
                json: std::env::var("LOG_FORMAT")
                    .map(|v| v.eq_ignore_ascii_case("json"))
                    .unwrap_or(false),
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.app.env.eq_ignore_ascii_case("production")
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| format!("Invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "APP_ENV",
        "SOCIAL_API_HOST",
        "SOCIAL_API_PORT",
        "CORS_ALLOWED_ORIGINS",
        "STORE_BACKEND",
        "DATABASE_URL",
        "DATABASE_MAX_CONNECTIONS",
        "JWT_SECRET",
        "JWT_PUBLIC_KEY_PEM",
        "JWT_PRIVATE_KEY_PEM",
        "JWT_ACCESS_TTL_SECS",
        "MEDIA_BACKEND",
        "CN_NAME",
        "CN_API_KEY",
        "CN_API_KEY_SECRET",
        "MEDIA_MAX_UPLOAD_BYTES",
        "USERS_DIRECTORY_EXCLUDE_VIEWER",
        "LOG_FORMAT",
    ];

    fn reset_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
        std::env::set_var("JWT_SECRET", "test-secret-that-is-long-enough-123456");
        std::env::set_var("MEDIA_BACKEND", "memory");
    }

    #[test]
    #[serial]
    fn test_default_values() {
        reset_env();

        let config = Config::from_env().unwrap();

        assert_eq!(config.app.env, "development");
        assert_eq!(config.app.host, "0.0.0.0");
        assert_eq!(config.app.port, 8080);
        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert_eq!(config.store.max_connections, 10);
        assert_eq!(config.media.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert!(config.users.directory_excludes_viewer);
        assert!(!config.log.json);
        assert_eq!(config.jwt.access_ttl_secs, DEFAULT_ACCESS_TTL_SECS);
    }

    #[test]
    #[serial]
    fn test_directory_policy_can_be_disabled() {
        reset_env();
        std::env::set_var("USERS_DIRECTORY_EXCLUDE_VIEWER", "false");

        let config = Config::from_env().unwrap();
        assert!(!config.users.directory_excludes_viewer);

        std::env::set_var("USERS_DIRECTORY_EXCLUDE_VIEWER", "maybe");
        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_jwt_key_is_required() {
        reset_env();
        std::env::remove_var("JWT_SECRET");

        let err = Config::from_env().unwrap_err();
        assert!(err.contains("JWT_SECRET"));
    }

    #[test]
    #[serial]
    fn test_production_rejects_wildcard_cors() {
        reset_env();
        std::env::set_var("APP_ENV", "production");
        std::env::set_var("CORS_ALLOWED_ORIGINS", "https://murmur.app, *");
        std::env::set_var("MEDIA_BACKEND", "cloudinary");
        std::env::set_var("CN_NAME", "murmur");
        std::env::set_var("CN_API_KEY", "key");
        std::env::set_var("CN_API_KEY_SECRET", "secret");

        let err = Config::from_env().unwrap_err();
        assert!(err.contains("cannot be '*'"));
    }

    #[test]
    #[serial]
    fn test_production_rejects_memory_backends() {
        reset_env();
        std::env::set_var("APP_ENV", "production");
        std::env::set_var("CORS_ALLOWED_ORIGINS", "https://murmur.app");
        std::env::set_var("STORE_BACKEND", "memory");

        let err = Config::from_env().unwrap_err();
        assert!(err.contains("STORE_BACKEND=memory"));

        std::env::set_var("STORE_BACKEND", "postgres");
        let err = Config::from_env().unwrap_err();
        assert!(err.contains("MEDIA_BACKEND=memory"));
    }

    #[test]
    #[serial]
    fn test_cloudinary_requires_credentials() {
        reset_env();
        std::env::set_var("MEDIA_BACKEND", "cloudinary");

        let err = Config::from_env().unwrap_err();
        assert!(err.contains("CN_NAME"));
    }

    #[test]
    fn test_cors_origin_parsing() {
        let cors = CorsConfig {
            allowed_origins: "https://a.example, https://b.example ,".to_string(),
        };
        assert_eq!(
            cors.origins().collect::<Vec<_>>(),
            vec!["https://a.example", "https://b.example"]
        );
        assert!(!cors.allows_any());
    }
}
