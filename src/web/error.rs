use std::{sync::Arc, time::Duration};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use strum_macros::AsRefStr;

use super::{auth::AuthError, types::Violation};
use crate::database;

pub type WebResult<T> = core::result::Result<T, Error>;

#[derive(Debug, AsRefStr, thiserror::Error)]
pub enum Error {
    #[error("invalid payload: {} violation(s)", .0.len())]
    InvalidPayload(Vec<Violation>),
    #[error("invalid query: {} violation(s)", .0.len())]
    InvalidQuery(Vec<Violation>),
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("rate limit exceeded, retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("signup secret header missing or wrong")]
    SignupSecretRejected,

    #[error("database error: {0}")]
    Database(#[from] database::Error),
}

impl Error {
    pub fn status_code_and_client_error(&self) -> (StatusCode, ClientError) {
        use ClientError::*;

        match self {
            Error::InvalidPayload(violations) => {
                (StatusCode::BAD_REQUEST, InvalidPayload(violations.clone()))
            }
            Error::InvalidQuery(violations) => {
                (StatusCode::BAD_REQUEST, InvalidQuery(violations.clone()))
            }
            Error::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, PayloadTooLarge),
            Error::Auth(_) => (StatusCode::UNAUTHORIZED, Unauthorized),
            Error::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                TooManyRequests {
                    retry_after: Some(*retry_after),
                },
            ),
            // Same answer as rate limiting so the guard doesn't advertise itself.
            Error::SignupSecretRejected => (
                StatusCode::TOO_MANY_REQUESTS,
                TooManyRequests { retry_after: None },
            ),
            Error::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, ServiceError),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        tracing::debug!("{:<12} - into_response(Error: {self:?})", "INTO_RESP");

        // Construct a response
        let mut res = StatusCode::INTERNAL_SERVER_ERROR.into_response();

        // Insert the Error into response so that it can be retrieved later.
        res.extensions_mut().insert(Arc::new(self));

        res
    }
}

/// What the caller gets to see about an error.
#[derive(Debug, AsRefStr, derive_more::Display)]
pub enum ClientError {
    #[display("Invalid payload")]
    InvalidPayload(Vec<Violation>),
    #[display("Invalid query")]
    InvalidQuery(Vec<Violation>),
    #[display("Payload too large")]
    PayloadTooLarge,
    #[display("Unauthorized")]
    Unauthorized,
    #[display("Too many requests")]
    TooManyRequests { retry_after: Option<Duration> },
    #[display("Internal server error")]
    ServiceError,
}

impl ClientError {
    /// JSON body sent to the caller: `{ "error": .. }` plus `details` for validation failures.
    pub fn body(&self) -> Value {
        match self {
            ClientError::InvalidPayload(details) | ClientError::InvalidQuery(details) => {
                json!({ "error": self.to_string(), "details": details })
            }
            _ => json!({ "error": self.to_string() }),
        }
    }

    /// Whole seconds to put in a `Retry-After` header, rounded up.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ClientError::TooManyRequests {
                retry_after: Some(retry_after),
            } => Some(retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0)),
            _ => None,
        }
    }
}
