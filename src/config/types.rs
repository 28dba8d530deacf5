//! The configuration structs used to build the AppConfig, and their impls.
use axum::http::HeaderValue;
use lazy_regex::regex_captures;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::{
    postgres::{PgConnectOptions, PgSslMode},
    ConnectOptions,
};
use strum_macros::AsRefStr;

use crate::config::{ConfigError, ConfigResult};

/// Largest page the listing endpoint will ever return.
pub const LISTING_HARD_MAX: u32 = 1000;

// ###################################
// ->   STRUCTS
// ###################################
#[derive(AsRefStr, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Production,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AppConfig {
    pub net_config: NetConfig,
    pub db_config: DbConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    pub listing: ListingConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NetConfig {
    pub host: [u8; 4],
    pub app_port: u16,
    /// Comma separated list of allowed origins. Empty means any origin.
    #[serde(default)]
    pub cors_origin: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DbConfig {
    pub username: String,
    pub password: SecretString,
    pub port: u16,
    pub host: String,
    pub db_name: String,
    #[serde(default)]
    pub require_ssl: SslRequire,
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SslRequire {
    #[default]
    Prefer,
    Require,
    Disable,
}

/// Credentials guarding the privileged and the optionally gated routes.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct SecurityConfig {
    /// Bearer token required by `GET /emails`. Without it the listing is closed to everyone.
    pub admin_token: Option<SecretString>,
    /// Shared secret required by `POST /emails` when set.
    pub signup_secret: Option<SecretString>,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListingConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_secs: u64,
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

// ###################################
// ->   IMPLs
// ###################################
impl AppConfig {
    /// Checks the invariants serde can't express.
    pub fn validate(&self) -> ConfigResult<()> {
        self.listing.validate()?;
        self.rate_limit.validate()?;
        self.net_config.allowed_origins()?;
        Ok(())
    }
}

impl NetConfig {
    /// Parses `cors_origin` into header values. An empty list means any origin is allowed.
    pub fn allowed_origins(&self) -> ConfigResult<Vec<HeaderValue>> {
        self.cors_origin
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|_| ConfigError::InvalidCorsOrigin(origin.to_string()))
            })
            .collect()
    }
}

impl SecurityConfig {
    /// An empty secret counts as not configured, it would otherwise match a missing header.
    pub fn drop_empty_secrets(&mut self) {
        for secret in [&mut self.admin_token, &mut self.signup_secret] {
            if secret
                .as_ref()
                .is_some_and(|s| s.expose_secret().trim().is_empty())
            {
                *secret = None;
            }
        }
    }
}

impl ListingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let Self {
            default_limit,
            max_limit,
        } = *self;

        if max_limit == 0
            || max_limit > LISTING_HARD_MAX
            || default_limit == 0
            || default_limit > max_limit
        {
            return Err(ConfigError::InvalidListingLimits {
                default_limit,
                max_limit,
            });
        }

        Ok(())
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        ListingConfig {
            default_limit: 100,
            max_limit: LISTING_HARD_MAX,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.window_secs == 0 {
            return Err(ConfigError::InvalidRateLimitWindow);
        }
        Ok(())
    }

    pub fn window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.window_secs)
    }
}

impl DbConfig {
    pub fn connection_options(&self) -> PgConnectOptions {
        self.connection_options_without_db().database(&self.db_name)
    }
    pub fn connection_options_without_db(&self) -> PgConnectOptions {
        // Create new PgConnectOptions struct but don't try to use the '$HOME/.pgpass' file.
        PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .username(&self.username)
            .password(self.password.expose_secret())
            .port(self.port)
            .ssl_mode(self.require_ssl.into())
            .log_statements(tracing::log::LevelFilter::Trace)
    }
}

impl From<SslRequire> for PgSslMode {
    fn from(value: SslRequire) -> Self {
        match value {
            SslRequire::Require => PgSslMode::Require,
            SslRequire::Disable => PgSslMode::Disable,
            SslRequire::Prefer => PgSslMode::Prefer,
        }
    }
}

// ###################################
// ->   TRY FROMs
// ###################################

impl TryFrom<String> for Environment {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            _ => Err(Self::Error::StringToEnvironmentFail(value)),
        }
    }
}

impl TryFrom<&str> for DbConfig {
    type Error = ConfigError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // postgres://{username}:{password}@{hostname}:{port}/{database}?{options}
        let (_whole, username, password, host, port, db_name, options) = regex_captures!(
            r#"^postgres(?:ql)?:\/\/([^:]+):([^@]+)@([^:\/]+):(\d+)\/([^\s\/?]+)(\?[^\s]*)?$"#,
            value
        )
        .ok_or(Self::Error::StringToDbConfigFail)?;

        let (username, db_name, host) =
            (username.to_string(), db_name.to_string(), host.to_string());
        let password = SecretString::from(password.to_string());
        let port = port
            .parse()
            .map_err(|_| Self::Error::StringToDbConfigFail)?;

        let mut require_ssl = SslRequire::default();
        if let Some(options) = options.strip_prefix('?') {
            for option in options.split(['&', ',']) {
                if let Some(("sslmode", val)) = option.split_once('=') {
                    match val {
                        "disable" => require_ssl = SslRequire::Disable,
                        "require" => require_ssl = SslRequire::Require,
                        _ => {}
                    }
                }
            }
        }

        Ok(DbConfig {
            username,
            password,
            port,
            host,
            db_name,
            require_ssl,
        })
    }
}

// ###################################
// ->   TESTS
// ###################################
