// libs/therapist-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn therapist_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", get(handlers::list_therapists))
        .route("/available-slots", get(handlers::get_available_slots))
        .route("/working-hours", get(handlers::get_working_hours))
        .route("/working-hours", put(handlers::upsert_working_hours))
        .route("/stats", get(handlers::get_therapist_stats))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
