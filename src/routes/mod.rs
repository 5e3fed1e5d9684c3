/// Application routes configuration
use crate::handlers::{
    create_bundle, get_handoff, get_journeys, get_link_budget, get_sequencer, get_state,
    get_station_queue, get_station_uptime, get_throughput, health, transmit, AppState,
};
use axum::{
    routing::{get, post},
    Router,
};

/// Build the application router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Canonical snapshot and derived views
        .route("/state", get(get_state))
        .route("/state/handoff", get(get_handoff))
        .route("/state/journeys", get(get_journeys))
        .route("/state/stations/:id/queue", get(get_station_queue))
        .route("/state/stations/:id/uptime", get(get_station_uptime))
        .route("/state/throughput", get(get_throughput))
        .route("/state/link-budget", get(get_link_budget))
        .route("/state/sequencer", get(get_sequencer))
        // Commands
        .route("/bundles", post(create_bundle))
        .route("/transmit", post(transmit))
        .with_state(state)
}
