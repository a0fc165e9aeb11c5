//! Shared application state for axum handlers.

use std::sync::Arc;

/// Application state shared across all axum handlers.
///
/// `Clone` is implemented manually so the handler types themselves do not
/// need to be `Clone`; only the `Arc` wrappers are cloned.
pub struct AppState<A, E> {
    /// Completes the OAuth authorization-code flow.
    pub authorization: Arc<A>,
    /// Receives pushed device events.
    pub events: Arc<E>,
}

impl<A, E> Clone for AppState<A, E> {
    fn clone(&self) -> Self {
        Self {
            authorization: Arc::clone(&self.authorization),
            events: Arc::clone(&self.events),
        }
    }
}

impl<A, E> AppState<A, E> {
    /// Create a new state from pre-wrapped handlers.
    ///
    /// The event sink is usually shared with the discovery task that
    /// registers devices after the server is already listening.
    pub fn new(authorization: Arc<A>, events: Arc<E>) -> Self {
        Self {
            authorization,
            events,
        }
    }
}
