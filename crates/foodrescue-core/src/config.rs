use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;
use crate::util::hex_decode;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_OTP_TTL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_RESET_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PASSWORD_ITERATIONS: u32 = 100_000;

/// Everything the core needs, passed explicitly to each component.
#[derive(Clone)]
pub struct CoreConfig {
    pub database_url: String,
    /// HMAC key for session tokens.
    pub signing_key: Vec<u8>,
    pub session_ttl: Duration,
    pub otp_ttl: Duration,
    pub reset_ttl: Duration,
    /// Upper bound for one store transaction, including pool acquisition.
    pub store_timeout: Duration,
    /// How long an issue call waits on the notifier before giving up on delivery.
    pub notify_timeout: Duration,
    pub password_iterations: u32,
    pub max_connections: u32,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_url", &self.database_url)
            .field("signing_key", &"<redacted>")
            .field("session_ttl", &self.session_ttl)
            .field("otp_ttl", &self.otp_ttl)
            .field("reset_ttl", &self.reset_ttl)
            .field("store_timeout", &self.store_timeout)
            .field("notify_timeout", &self.notify_timeout)
            .field("password_iterations", &self.password_iterations)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl CoreConfig {
    pub const MIN_SIGNING_KEY_LEN: usize = 32;

    pub fn new(
        database_url: impl Into<String>,
        signing_key: impl Into<Vec<u8>>,
    ) -> Result<Self, ConfigError> {
        let signing_key = signing_key.into();
        if signing_key.len() < Self::MIN_SIGNING_KEY_LEN {
            return Err(ConfigError::SigningKeyTooShort {
                len: signing_key.len(),
                min: Self::MIN_SIGNING_KEY_LEN,
            });
        }

        Ok(Self {
            database_url: database_url.into(),
            signing_key,
            session_ttl: DEFAULT_SESSION_TTL,
            otp_ttl: DEFAULT_OTP_TTL,
            reset_ttl: DEFAULT_RESET_TTL,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            password_iterations: DEFAULT_PASSWORD_ITERATIONS,
            max_connections: 1,
        })
    }

    /// Load from `FOODRESCUE_*` process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(normalize_env_value).filter(|s| !s.is_empty());

        let database_url =
            get("FOODRESCUE_DATABASE_URL").ok_or(ConfigError::Missing("FOODRESCUE_DATABASE_URL"))?;
        let raw_key =
            get("FOODRESCUE_SIGNING_KEY").ok_or(ConfigError::Missing("FOODRESCUE_SIGNING_KEY"))?;

        // Hex keys are decoded; anything else is used as raw bytes.
        let signing_key = hex_decode(&raw_key).unwrap_or_else(|| raw_key.into_bytes());

        let mut config = Self::new(database_url, signing_key)?;

        if let Some(v) = get("FOODRESCUE_SESSION_TTL_SECS") {
            config.session_ttl = parse_secs("FOODRESCUE_SESSION_TTL_SECS", &v)?;
        }
        if let Some(v) = get("FOODRESCUE_OTP_TTL_SECS") {
            config.otp_ttl = parse_secs("FOODRESCUE_OTP_TTL_SECS", &v)?;
        }
        if let Some(v) = get("FOODRESCUE_RESET_TTL_SECS") {
            config.reset_ttl = parse_secs("FOODRESCUE_RESET_TTL_SECS", &v)?;
        }
        if let Some(v) = get("FOODRESCUE_STORE_TIMEOUT_SECS") {
            config.store_timeout = parse_secs("FOODRESCUE_STORE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("FOODRESCUE_NOTIFY_TIMEOUT_SECS") {
            config.notify_timeout = parse_secs("FOODRESCUE_NOTIFY_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("FOODRESCUE_PASSWORD_ITERATIONS") {
            config.password_iterations = parse_positive("FOODRESCUE_PASSWORD_ITERATIONS", &v)?;
        }
        if let Some(v) = get("FOODRESCUE_DB_MAX_CONNECTIONS") {
            config.max_connections = parse_positive("FOODRESCUE_DB_MAX_CONNECTIONS", &v)?;
        }

        Ok(config)
    }
}

pub fn normalize_env_value(raw: String) -> String {
    let trimmed = raw.trim();

    if let Some(inner) = trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return inner.trim().to_string();
    }

    trimmed.to_string()
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u32, ConfigError> {
    match raw.parse::<u32>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
    }
}

fn parse_secs(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    parse_positive(key, raw).map(|n| Duration::from_secs(u64::from(n)))
}
