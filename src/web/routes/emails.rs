use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::{error, info};

use super::MAX_BODY_BYTES;
use crate::{
    web::{
        auth::AdminAuth,
        types::{ListLimit, ListQuery, NewSignup, SignupList, Violation},
        Error, WebResult,
    },
    AppState,
};

/// `POST /emails` - records a signup, or refreshes the existing one for the same email.
#[tracing::instrument(name = "Saving signup", skip_all)]
pub async fn signup(
    State(app_state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> WebResult<(StatusCode, Json<Value>)> {
    let Json(body) = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Error::PayloadTooLarge {
                limit: MAX_BODY_BYTES,
            }
        } else {
            Error::InvalidPayload(vec![Violation::invalid_json(rejection.body_text())])
        }
    })?;
    let signup = NewSignup::parse(&body).map_err(Error::InvalidPayload)?;

    if let Err(er) = app_state.database_mgr.upsert_signup(&signup).await {
        error!(
            email = %signup.email.redacted(),
            error = %er,
            "Failed to save signup"
        );
        return Err(er.into());
    }

    info!(email = %signup.email.redacted(), "Signup saved");
    Ok((StatusCode::CREATED, Json(json!({ "success": true }))))
}

/// `GET /emails` - the most recent signups, newest first. Admin only.
#[tracing::instrument(name = "Listing signups", skip_all)]
pub async fn list(
    _admin: AdminAuth,
    State(app_state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> WebResult<Json<SignupList>> {
    let Query(query) = query.map_err(|rejection| {
        Error::InvalidQuery(vec![Violation::invalid_query(rejection.body_text())])
    })?;
    let limit = ListLimit::parse(query.limit.as_deref(), &app_state.config.listing)
        .map_err(|violation| Error::InvalidQuery(vec![violation]))?;

    let signups = app_state.database_mgr.recent_signups(*limit).await?;

    Ok(Json(SignupList::from(signups)))
}
