pub mod auth;
pub mod fetch_task;
pub mod middleware;
pub mod profile;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::web::state::AppState;

// Re-export the handlers the binary and tests reach for directly.
pub use middleware::{require_session, resolve_session};
pub use ws_handler::ws_handler;

/// Builds the complete API router over `app_state`.
///
/// Every request first has its session resolved. Owner-only views sit behind
/// `require_session`; owner-only writes on shared paths are refused by the
/// listing form itself before any store call.
pub fn router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(app_state.config.allowed_origin.clone())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // Public routes (no session required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route(
            "/equipment",
            get(rest::browse_handler).post(rest::create_listing_handler),
        )
        .route(
            "/equipment/{id}",
            get(rest::detail_handler)
                .put(rest::update_listing_handler)
                .delete(rest::delete_listing_handler),
        )
        .route("/equipment/{id}/contact", post(rest::contact_seller_handler))
        .route("/ws/browse", get(ws_handler));

    // Owner-only views (session required)
    let owner_routes = Router::new()
        .route("/equipment/{id}/edit", get(rest::edit_form_handler))
        .route("/dashboard", get(rest::dashboard_handler))
        .route(
            "/profile",
            get(profile::get_profile_handler).put(profile::update_profile_handler),
        )
        .route_layer(axum_middleware::from_fn(require_session));

    Router::new()
        .merge(public_routes)
        .merge(owner_routes)
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            resolve_session,
        ))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .with_state(app_state)
}
