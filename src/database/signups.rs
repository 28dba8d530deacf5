//! Queries against the `email_signups` table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use super::{DbManager, Result};
use crate::web::types::NewSignup;

/// A stored signup row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Signup {
    pub id: i32,
    pub email: String,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DbManager {
    /// Inserts the signup or, if the email is already known, overwrites its `source`
    /// and refreshes `created_at`. A single statement, so a failure leaves the previous row intact.
    #[instrument(
        name = "Upserting signup",
        skip_all,
        fields(email = %signup.email.redacted(), source = ?signup.source)
    )]
    pub async fn upsert_signup(&self, signup: &NewSignup) -> Result<()> {
        sqlx::query(
            r#"
        INSERT INTO email_signups (email, source)
        VALUES ($1, $2)
        ON CONFLICT (email) DO UPDATE
        SET source = EXCLUDED.source, created_at = NOW()
    "#,
        )
        .bind(signup.email.as_ref())
        .bind(signup.source.as_deref())
        .execute(self.db())
        .await?;

        Ok(())
    }

    /// The `limit` most recent signups, newest first.
    #[instrument(name = "Listing recent signups", skip(self))]
    pub async fn recent_signups(&self, limit: u32) -> Result<Vec<Signup>> {
        let signups = sqlx::query_as::<_, Signup>(
            r#"
        SELECT id, email, source, created_at FROM email_signups
        ORDER BY created_at DESC, id DESC
        LIMIT $1
    "#,
        )
        .bind(i64::from(limit))
        .fetch_all(self.db())
        .await?;

        Ok(signups)
    }
}
