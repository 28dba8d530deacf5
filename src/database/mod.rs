mod signups;

pub use signups::Signup;

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, Connection, PgConnection, PgPool};
use tracing::info;

use crate::config::DbConfig;

/// Owns the Postgres connection pool for the lifetime of the process.
/// Cheap to clone, every clone shares the same pool.
#[derive(Clone, Debug)]
pub struct DbManager {
    db: PgPool,
}

impl DbManager {
    pub async fn init(db_config: &DbConfig) -> Result<Self> {
        info!("{:<20} - Initializing the DB pool", "init_db");

        let db_pool = pool_options()
            .connect_with(db_config.connection_options())
            .await
            .map_err(Error::FailToCreatePool)?;

        Ok(Self { db: db_pool })
    }

    /// Builds a pool that only connects once a query needs a connection.
    pub fn init_lazy(db_config: &DbConfig) -> Self {
        info!("{:<20} - Initializing the lazy DB pool", "init_db");
        let db_pool = pool_options().connect_lazy_with(db_config.connection_options());

        Self { db: db_pool }
    }

    pub fn db(&self) -> &PgPool {
        &self.db
    }

    /// Creates the `email_signups` table if it doesn't exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        info!("{:<20} - Ensuring the signup table exists", "ensure_schema");

        sqlx::query(
            r#"
        CREATE TABLE IF NOT EXISTS email_signups (
            id SERIAL PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            source TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
    "#,
        )
        .execute(&self.db)
        .await
        .map_err(Error::Bootstrap)?;

        sqlx::query(
            r#"
        CREATE INDEX IF NOT EXISTS email_signups_created_at_idx
        ON email_signups (created_at DESC)
    "#,
        )
        .execute(&self.db)
        .await
        .map_err(Error::Bootstrap)?;

        Ok(())
    }

    /// Waits for checked out connections to be returned and closes the pool.
    pub async fn close(&self) {
        info!("{:<20} - Closing the DB pool", "close_db");
        self.db.close().await;
    }
}

fn pool_options() -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_millis(500))
}

/// Creates a fresh database named `db_config.db_name`, used to isolate integration tests.
pub async fn create_test_database(db_config: &DbConfig) -> Result<()> {
    let mut connection =
        PgConnection::connect_with(&db_config.connection_options_without_db()).await?;

    let sql = format!(r#"CREATE DATABASE "{}";"#, db_config.db_name);
    sqlx::query(&sql).execute(&mut connection).await?;
    connection.close().await?;

    Ok(())
}

// ###################################
// ->   ERROR
// ###################################
pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create db pool: {0}")]
    FailToCreatePool(#[source] sqlx::Error),
    #[error("failed to bootstrap the signup table: {0}")]
    Bootstrap(#[source] sqlx::Error),
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}
