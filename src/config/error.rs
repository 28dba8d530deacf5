pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to build the 'Environment' from the provided string: {0}")]
    StringToEnvironmentFail(String),
    #[error("failed to parse 'DbConfig' from the provided string.")]
    StringToDbConfigFail,
    #[error("DATABASE_URL must be set in production")]
    MissingDatabaseUrl,
    #[error("invalid listing limits: default {default_limit}, max {max_limit}")]
    InvalidListingLimits { default_limit: u32, max_limit: u32 },
    #[error("rate limit window must be longer than zero seconds")]
    InvalidRateLimitWindow,
    #[error("invalid CORS origin: {0}")]
    InvalidCorsOrigin(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("figment error: {0}")]
    Figment(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(value: figment::Error) -> Self {
        ConfigError::Figment(Box::new(value))
    }
}
