//! Bearer-token gate for the admin-only routes.
//! `AdminAuth` can be extracted in a handler, extraction fails unless the request carries
//! `Authorization: Bearer <admin_token>`.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use secrecy::{ExposeSecret, SecretString};
use tracing::instrument;

use crate::{utils::constant_time_eq, web, AppState};

pub type Result<T> = core::result::Result<T, AuthError>;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no admin token is configured")]
    AdminTokenNotConfigured,
    #[error("header 'Authorization' is missing from the request")]
    MissingAuthHeader,
    #[error("got invalid utf-8 in 'Authorization' header")]
    InvalidUtf,
    #[error("received the wrong authentication schema. expected: {schema}")]
    WrongAuthSchema { schema: &'static str },
    #[error("bearer token does not match the admin token")]
    TokenInvalid,
}

/// Proof that the request was made by an admin.
#[derive(Debug)]
pub struct AdminAuth;

impl AdminAuth {
    /// Checks the bearer token in `headers` against `expected`.
    pub fn verify(headers: &HeaderMap, expected: Option<&SecretString>) -> Result<Self> {
        let expected = expected.ok_or(AuthError::AdminTokenNotConfigured)?;

        let token = bearer_token(headers)?;
        if !constant_time_eq(token.as_bytes(), expected.expose_secret().as_bytes()) {
            return Err(AuthError::TokenInvalid);
        }

        Ok(AdminAuth)
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let header_val = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidUtf)?;

    header_val
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthError::WrongAuthSchema { schema: "Bearer" })
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = web::Error;

    #[instrument(skip_all, name = "AdminAuth from_request_parts")]
    async fn from_request_parts(
        parts: &mut Parts,
        app_state: &AppState,
    ) -> core::result::Result<Self, Self::Rejection> {
        let admin_token = app_state.config.security.admin_token.as_ref();
        AdminAuth::verify(&parts.headers, admin_token).map_err(|er| {
            tracing::warn!("{:<12} - admin auth rejected: {er}", "AUTH");
            er.into()
        })
    }
}
