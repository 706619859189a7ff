pub mod auth;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod tracking;

pub use middleware::require_auth;
pub use rest::ApiDoc;
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ConfigError;
use crate::error::ApiError;

/// Builds the complete application router: operator routes behind
/// `require_auth`, public login and viewer routes, and the Swagger UI.
pub fn build_router(app_state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = app_state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string()))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Protected routes (operator token required)
    let operator_routes = Router::new()
        .route(
            "/v1/documents",
            post(rest::upload_document_handler).get(rest::list_documents_handler),
        )
        .route(
            "/v1/documents/{document_id}/analytics",
            get(rest::document_analytics_handler),
        )
        .route("/v1/share/email", post(rest::share_by_email_handler))
        .route("/v1/share/link", post(rest::share_by_link_handler))
        .route("/v1/share/{share_link_id}", patch(rest::patch_share_link_handler))
        .route("/v1/auth/logout", post(auth::logout_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Public routes (operator login, viewer tracking pings)
    let public_routes = Router::new()
        .route("/v1/auth/login", post(auth::login_handler))
        .route("/v1/open/preview", post(tracking::preview_handler))
        .route("/v1/open/update-scroll", post(tracking::update_scroll_handler))
        .route("/v1/open/track-event", post(tracking::track_event_handler))
        .route("/v1/open/update-view-time", post(tracking::update_view_time_handler))
        .route("/v1/open/track-click", post(tracking::track_click_handler));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(operator_routes)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    Ok(Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())))
}
