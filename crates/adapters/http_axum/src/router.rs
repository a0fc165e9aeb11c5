//! Axum router assembly.

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use capbridge_app::ports::{AuthorizationHandler, EventSink};

use crate::state::AppState;

/// Build the top-level axum [`Router`].
///
/// Includes a [`TraceLayer`] that logs each HTTP request/response at the
/// `DEBUG` level using the `tracing` ecosystem.
pub fn build<A, E>(state: AppState<A, E>) -> Router
where
    A: AuthorizationHandler + 'static,
    E: EventSink + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .route("/oauth/callback", get(crate::oauth::callback::<A, E>))
        .route("/events", post(crate::webhook::receive::<A, E>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
