//! Tries to create an `AppConfig` from config files and the environment.
//! `config/base.toml` is layered under `config/{environment}.toml`, which is in turn
//! overridden by `APP_{SECTION}__{KEY}` variables and the plain deployment variables
//! (`PORT`, `CORS_ORIGIN`, `ADMIN_TOKEN`, `SIGNUP_SECRET`, `DATABASE_URL`).

mod error;
mod types;

use std::{path::Path, sync::OnceLock};

use figment::{
    providers::{Env, Format, Toml},
    value::{Uncased, UncasedStr},
    Figment,
};
use tracing::info;

// Re-export config structs
pub use error::{ConfigError, ConfigResult};
pub use types::{
    AppConfig, DbConfig, Environment, ListingConfig, NetConfig, RateLimitConfig, SecurityConfig,
    SslRequire, LISTING_HARD_MAX,
};

/// Allocates a static `OnceLock` containing `AppConfig`.
/// This ensures configuration only gets initialized the first time we call this function.
/// Every other caller gets a &'static ref to AppConfig.
/// Panics if anything goes wrong, use `load_config` to handle the error instead.
pub fn get_or_init_config() -> &'static AppConfig {
    static CONFIG_INIT: OnceLock<AppConfig> = OnceLock::new();
    CONFIG_INIT.get_or_init(|| {
        load_config().unwrap_or_else(|er| panic!("Fatal Error: Building config: {er}"))
    })
}

/// Reads the configuration for the environment named by `APP_ENVIRONMENT` (defaults to `local`).
pub fn load_config() -> ConfigResult<AppConfig> {
    info!("{:<20} - Initializing the configuration", "load_config");
    let config_dir = std::env::current_dir()?.join("config");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()?;

    let database_url = std::env::var("DATABASE_URL").ok();

    load_config_from(&config_dir, environment, database_url.as_deref())
}

/// Builds the configuration from the files in `config_dir` plus the process environment.
pub fn load_config_from(
    config_dir: &Path,
    environment: Environment,
    database_url: Option<&str>,
) -> ConfigResult<AppConfig> {
    let environment_filename = format!("{}.toml", environment.as_ref().to_lowercase());

    let mut config: AppConfig = Figment::new()
        .merge(Toml::file(config_dir.join("base.toml")))
        .merge(Toml::file(config_dir.join(environment_filename)))
        .merge(Env::prefixed("APP_").split("__"))
        .merge(Env::raw().filter_map(deployment_key))
        .extract()?;

    match database_url {
        Some(url) => config.db_config = DbConfig::try_from(url)?,
        None if environment == Environment::Production => {
            return Err(ConfigError::MissingDatabaseUrl)
        }
        None => {}
    }

    config.security.drop_empty_secrets();
    config.validate()?;

    if config.security.admin_token.is_none() {
        tracing::warn!("no admin token configured, GET /emails will reject every request");
    }

    Ok(config)
}

/// Maps the deployment variables onto their place in `AppConfig`.
fn deployment_key(key: &UncasedStr) -> Option<Uncased<'_>> {
    let target = match key.as_str().to_ascii_uppercase().as_str() {
        "PORT" => "net_config.app_port",
        "CORS_ORIGIN" => "net_config.cors_origin",
        "ADMIN_TOKEN" => "security.admin_token",
        "SIGNUP_SECRET" => "security.signup_secret",
        _ => return None,
    };
    Some(target.into())
}
