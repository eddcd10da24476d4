//! Request API: JSON over HTTP for session inspection and event push.

pub mod error;
pub mod handlers;

use axum::Router;
use axum::routing::get;

use crate::server::AppState;

/// Routes under `/api`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route(
            "/api/sessions/{id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route(
            "/api/sessions/{id}/events",
            get(handlers::get_events).post(handlers::push_event),
        )
        .route("/api/sessions/{id}/metrics", get(handlers::get_metrics))
        .route("/api/events", get(handlers::global_events))
}
