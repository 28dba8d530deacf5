use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::Result;
use beeline::{
    config::{get_or_init_config, AppConfig},
    database::{create_test_database, DbManager},
    App,
};
use reqwest::Response;
use secrecy::SecretString;
use serde_json::Value;
use uuid::Uuid;

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Trying to bind port 0 will trigger an OS scan for an available port
/// which will then be bound to the application.
const TEST_SOCK_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 0);

pub struct TestApp {
    pub addr: SocketAddr,
    pub http_client: reqwest::Client,
    pub dm: DbManager,
}

impl TestApp {
    /// Spawns the app on top of a freshly created database.
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with(customize: impl FnOnce(&mut AppConfig)) -> Result<Self> {
        let mut config = test_config();
        config.db_config.db_name = Uuid::new_v4().to_string();
        customize(&mut config);

        create_test_database(&config.db_config).await?;
        let dm = DbManager::init(&config.db_config).await?;
        dm.ensure_schema().await?;

        Self::start(config, dm).await
    }

    /// Spawns the app on a pool that never connects unless a query runs.
    /// Good for everything that is decided before storage is touched.
    pub async fn spawn_without_db() -> Result<Self> {
        Self::spawn_without_db_with(|_| {}).await
    }

    pub async fn spawn_without_db_with(customize: impl FnOnce(&mut AppConfig)) -> Result<Self> {
        let mut config = test_config();
        customize(&mut config);

        let dm = DbManager::init_lazy(&config.db_config);

        Self::start(config, dm).await
    }

    async fn start(config: AppConfig, dm: DbManager) -> Result<Self> {
        let app = App::build_with_db(config, dm.clone(), TEST_SOCK_ADDR).await?;
        let addr = app.listener.local_addr()?;

        tokio::spawn(beeline::serve(app));

        Ok(TestApp {
            addr,
            http_client: reqwest::Client::new(),
            dm,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub async fn post_emails(&self, body: &Value) -> Result<Response> {
        let res = self
            .http_client
            .post(self.url("/emails"))
            .json(body)
            .send()
            .await?;
        Ok(res)
    }

    pub async fn post_emails_with_secret(&self, body: &Value, secret: &str) -> Result<Response> {
        let res = self
            .http_client
            .post(self.url("/emails"))
            .header("x-signup-secret", secret)
            .json(body)
            .send()
            .await?;
        Ok(res)
    }

    /// `GET /emails` with the admin token.
    pub async fn get_emails(&self, limit: Option<&str>) -> Result<Response> {
        self.get_emails_with_token(limit, Some(ADMIN_TOKEN)).await
    }

    pub async fn get_emails_with_token(
        &self,
        limit: Option<&str>,
        token: Option<&str>,
    ) -> Result<Response> {
        let mut req = self.http_client.get(self.url("/emails"));
        if let Some(limit) = limit {
            req = req.query(&[("limit", limit)]);
        }
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        Ok(req.send().await?)
    }
}

/// Local configuration with an admin token, no signup secret and rate limiting switched off.
pub fn test_config() -> AppConfig {
    let mut config = get_or_init_config().clone();
    config.security.admin_token = Some(SecretString::from(ADMIN_TOKEN.to_string()));
    config.security.signup_secret = None;
    config.rate_limit.enabled = false;
    config.net_config.cors_origin = String::new();
    config
}
