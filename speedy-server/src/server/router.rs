use super::handlers::{self, AppState};
use super::metrics_handler::metrics_handler;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the Axum router with all endpoints
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        // Cache REST API endpoints
        .route("/cache/stats", get(handlers::cache_stats))
        .route(
            "/cache/{key}",
            get(handlers::cache_get).put(handlers::cache_put),
        )
        // Cluster REST API endpoints
        .route("/cluster/nodes", get(handlers::cluster_nodes))
        .route("/cluster/leader", get(handlers::cluster_leader))
        // Command endpoint (node-to-node and client RPC)
        .route("/api/v1/command", post(handlers::command_handler))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
