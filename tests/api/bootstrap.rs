//! Startup must fail outright when the signup table can't be made available.

use anyhow::Result;
use beeline::{
    database::{self, create_test_database, DbManager},
    App, Error,
};
use uuid::Uuid;

use crate::helpers::test_config;

#[tokio::test]
async fn startup_fails_when_the_database_is_unreachable() {
    let mut config = test_config();
    // Nothing listens on port 1.
    config.db_config.port = 1;

    let result = App::build_from_config(config).await;

    assert!(
        matches!(result, Err(Error::Database(database::Error::FailToCreatePool(_)))),
        "startup did not fail on an unreachable database"
    );
}

#[tokio::test]
async fn startup_fails_when_the_table_cannot_be_bootstrapped() -> Result<()> {
    let mut config = test_config();
    config.db_config.db_name = Uuid::new_v4().to_string();
    create_test_database(&config.db_config).await?;

    // A foreign table under the same name, the `created_at` index can't be built on it.
    let dm = DbManager::init(&config.db_config).await?;
    sqlx::query("CREATE TABLE email_signups (id INT)")
        .execute(dm.db())
        .await?;

    let bootstrap = dm.ensure_schema().await;
    assert!(
        matches!(bootstrap, Err(database::Error::Bootstrap(_))),
        "ensure_schema succeeded on a broken table: {bootstrap:?}"
    );

    let result = App::build_from_config(config).await;
    assert!(
        matches!(result, Err(Error::Database(database::Error::Bootstrap(_)))),
        "startup did not fail on a broken table"
    );

    Ok(())
}
