use std::{net::SocketAddr, sync::Arc};

use derive_more::Deref;
use tokio::net::TcpListener;
use tracing::info;

use crate::{
    config::AppConfig,
    database::DbManager,
    web::rate_limit::RateLimiter,
    Result,
};

// ###################################
// ->  Structs
// ###################################
pub struct App {
    pub app_state: AppState,
    pub listener: TcpListener,
}
impl App {
    pub fn new(app_state: AppState, listener: TcpListener) -> Self {
        App {
            app_state,
            listener,
        }
    }

    /// Connects to the database, makes sure the signup table exists and binds the listener.
    /// Any failure here is fatal, the service never starts in a degraded mode.
    pub async fn build_from_config(config: AppConfig) -> Result<Self> {
        let dm = DbManager::init(&config.db_config).await?;
        dm.ensure_schema().await?;

        let addr = SocketAddr::from((config.net_config.host, config.net_config.app_port));
        Self::build_with_db(config, dm, addr).await
    }

    /// Binds the listener to `addr` around an already initialized `DbManager`.
    pub async fn build_with_db(config: AppConfig, dm: DbManager, addr: SocketAddr) -> Result<Self> {
        let app_state = AppState::new(dm, &config);

        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        info!("{:<20} - {}", "Listening on:", addr);

        Ok(App::new(app_state, listener))
    }
}

pub struct InternalState {
    pub database_mgr: DbManager,
    pub rate_limiter: RateLimiter,
    pub config: AppConfig,
}

/// Application state containing all global data.
/// It implements `Deref` to easily access the fields on `InternalState`
/// Uses an `Arc` so it can be cloned around.
#[derive(Clone, Deref)]
pub struct AppState(Arc<InternalState>);

impl AppState {
    pub fn new(database_mgr: DbManager, config: &AppConfig) -> Self {
        AppState(Arc::new(InternalState {
            database_mgr,
            rate_limiter: RateLimiter::new(config.rate_limit),
            config: config.clone(),
        }))
    }
}
