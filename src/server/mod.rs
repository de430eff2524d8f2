//! HTTP surface
//!
//! Thin axum handlers over [`crate::inspection::InspectionServer`]. Every
//! handler translates one registry or session operation; no inspection logic
//! lives here.

mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::inspection::InspectionServer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub server: Arc<InspectionServer>,
    /// Viewer mode rejects mutations; the frontend only browses artifacts.
    pub viewer_mode: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/inspection/types", get(handlers::list_types))
        .route(
            "/api/inspection/types/{type_id}",
            post(handlers::create_inspection),
        )
        .route(
            "/api/inspection/tasks/{id}/features",
            get(handlers::list_features)
                .put(handlers::replace_features)
                .patch(handlers::patch_features),
        )
        .route(
            "/api/inspection/tasks/{id}/dryrun",
            post(handlers::dry_run),
        )
        .route("/api/inspection/tasks/{id}/run", post(handlers::run))
        .route("/api/inspection/tasks/{id}/cancel", post(handlers::cancel))
        .route(
            "/api/inspection/tasks/{id}/metadata",
            get(handlers::metadata),
        )
        .route("/api/inspection/tasks/{id}/data", get(handlers::data))
        .route("/api/upload", post(handlers::upload))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
