pub mod projection;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{config::Settings, graphql::GraphQlClient, graphql::QueryTransport, DashboardError, Result};

#[derive(Clone)]
pub struct AppState {
    pub transport: Arc<dyn QueryTransport>,
    pub max_buckets: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/projection/timeseries", post(projection::timeseries))
        .route("/projection/grouped-series", post(projection::grouped_series))
        .route("/projection/grouped-timeseries", post(projection::grouped_timeseries))
        .route("/explore/timeseries", post(projection::explore_timeseries))
        .route("/entities/values", post(projection::entity_values))
        .route("/topology", post(projection::topology))
        .route("/metrics", get(projection::prometheus_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(settings: &Settings) -> Result<()> {
    let client = GraphQlClient::new(settings.graphql_url.clone(), settings.request_timeout())?;
    let state = AppState {
        transport: Arc::new(client),
        max_buckets: settings.max_buckets,
    };

    let app = router(state);
    info!(
        "Starting trace explorer on {} (backend {})",
        settings.listen_addr, settings.graphql_url
    );

    let listener = TcpListener::bind(&settings.listen_addr).await.map_err(|e| {
        DashboardError::Internal(format!("Failed to bind to address: {}", e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| DashboardError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
