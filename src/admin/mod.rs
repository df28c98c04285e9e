//! Operator endpoints.
//!
//! `POST /admin/cleanup` forces a full memory cleanup. When `admin.api_key`
//! is set the routes require `Authorization: Bearer <key>`.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::post, Router};

use self::auth::admin_auth_middleware;
use self::handlers::cleanup_handler;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/cleanup", post(cleanup_handler))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
