use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, Method, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use secrecy::ExposeSecret;

use crate::{
    utils::constant_time_eq,
    web::{log, rate_limit::Decision, Error, WebResult, REQUEST_ID_HEADER, SIGNUP_SECRET_HEADER},
    AppState,
};

/// Turns a `web::Error` stored in the response extensions into the JSON body the client sees,
/// and logs the request.
pub async fn response_mapper(
    req_method: Method,
    uri: Uri,
    req_headers: HeaderMap,
    resp: Response,
) -> Response {
    let req_id = req_headers
        .get(REQUEST_ID_HEADER)
        .and_then(|id| id.to_str().ok())
        .map(str::to_string);

    let web_error = resp.extensions().get::<Arc<Error>>().map(Arc::as_ref);
    let client_status_and_error = web_error.map(Error::status_code_and_client_error);

    if let Some(er) = web_error {
        if matches!(er, Error::Database(_)) {
            tracing::error!("SERVER ERROR: {er} ID: {req_id:?}");
        }
    }

    let err_resp = client_status_and_error.as_ref().map(|(status, cl_err)| {
        let mut res = (*status, Json(cl_err.body())).into_response();
        if let Some(secs) = cl_err.retry_after_secs() {
            res.headers_mut().insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        res
    });

    log::log_request(
        req_id,
        req_method,
        uri,
        resp.status(),
        web_error,
        client_status_and_error.as_ref(),
    );

    err_resp.unwrap_or(resp)
}

/// Rejects callers that used up their request budget for the current window.
pub async fn rate_limit(
    State(app_state): State<AppState>,
    req: Request,
    next: Next,
) -> WebResult<Response> {
    let limiter = &app_state.rate_limiter;
    let key = caller_key(&req, limiter.config().trust_forwarded_for);

    match limiter.check(&key) {
        Decision::Allowed { .. } => Ok(next.run(req).await),
        Decision::Limited { retry_after } => {
            tracing::warn!("{:<12} - rate limited caller: {key}", "RATE_LIMIT");
            Err(Error::RateLimited { retry_after })
        }
    }
}

/// When a signup secret is configured, only requests carrying it in `x-signup-secret` get through.
pub async fn signup_secret_guard(
    State(app_state): State<AppState>,
    req: Request,
    next: Next,
) -> WebResult<Response> {
    let Some(expected) = app_state.config.security.signup_secret.as_ref() else {
        return Ok(next.run(req).await);
    };

    let provided = req
        .headers()
        .get(SIGNUP_SECRET_HEADER)
        .map(HeaderValue::as_bytes)
        .unwrap_or_default();

    if constant_time_eq(provided, expected.expose_secret().as_bytes()) {
        Ok(next.run(req).await)
    } else {
        Err(Error::SignupSecretRejected)
    }
}

/// Identifies the caller by peer IP, or behind a trusted proxy by the last `x-forwarded-for`
/// entry. The proxy appends the address it saw, everything left of it is client supplied.
fn caller_key(req: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = req
            .headers()
            .get_all("x-forwarded-for")
            .iter()
            .next_back()
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.rsplit(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
