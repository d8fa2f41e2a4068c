use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Bootstrap administrator credentials.
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
}

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: PathBuf,
    pub session_ttl: Duration,
    pub notify_webhook: Option<String>,
    pub admin: Option<AdminBootstrap>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_addr = var("AVTALE_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("AVTALE_LISTEN_ADDR", "must be a valid socket address")
            })?;

        let db_path = var("AVTALE_DB_PATH")
            .unwrap_or_else(|| "./avtale.redb".to_string())
            .into();

        let ttl_secs: u64 = var("AVTALE_SESSION_TTL_SECS")
            .unwrap_or_else(|| "3600".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("AVTALE_SESSION_TTL_SECS", "must be a number of seconds")
            })?;
        if ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "AVTALE_SESSION_TTL_SECS",
                "must be greater than zero",
            ));
        }

        let notify_webhook = var("AVTALE_NOTIFY_WEBHOOK").filter(|s| !s.is_empty());

        let admin = match (
            var("AVTALE_ADMIN_USER").filter(|s| !s.is_empty()),
            var("AVTALE_ADMIN_PASSWORD").filter(|s| !s.is_empty()),
        ) {
            (Some(username), Some(password)) => Some(AdminBootstrap { username, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("AVTALE_ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("AVTALE_ADMIN_USER")),
        };

        Ok(Config {
            listen_addr,
            db_path,
            session_ttl: Duration::from_secs(ttl_secs),
            notify_webhook,
            admin,
        })
    }

    /// Create a test configuration.
    pub fn for_testing(db_path: impl Into<PathBuf>) -> Self {
        Config {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            db_path: db_path.into(),
            session_ttl: Duration::from_secs(3600),
            notify_webhook: None,
            admin: Some(AdminBootstrap {
                username: "admin".to_string(),
                password: "admin-secret".to_string(),
            }),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, &'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(var) => {
                write!(f, "Missing required environment variable: {}", var)
            }
            ConfigError::Invalid(var, msg) => write!(f, "Invalid value for {}: {}", var, msg),
        }
    }
}

impl std::error::Error for ConfigError {}
