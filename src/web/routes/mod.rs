//! Contains all the routes that this application can handle.

mod emails;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::{web::midware, AppState};

/// Largest JSON body accepted by `POST /emails`.
const MAX_BODY_BYTES: usize = 16 * 1024;

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// All the routes of the server
pub fn routes(app_state: AppState) -> Router {
    Router::new()
        .merge(email_routes(app_state))
        .route("/health", get(health_check))
}

/// EMAILS - both methods share the rate limit, only intake is behind the signup secret.
fn email_routes(app_state: AppState) -> Router {
    let intake = post(emails::signup).route_layer(middleware::from_fn_with_state(
        app_state.clone(),
        midware::signup_secret_guard,
    ));

    Router::new()
        .route("/emails", intake.get(emails::list))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            midware::rate_limit,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(app_state)
}
