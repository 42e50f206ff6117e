use axum::{
    Json, Router,
    http::{HeaderValue, Method},
    routing::get,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::runtime::Handle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::cluster::ClusterClient;
use crate::server::scheduler::ScheduledTask;
use crate::web::routes::*;

pub use error::AppError;

pub mod error;
pub mod models;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabaseConnection,
    pub cluster: Arc<dyn ClusterClient>,
    /// Reconciliation job, triggered on demand by `POST /infrastructure/sync`.
    pub sync_task: ScheduledTask,
    /// Runtime that owns background jobs; on-demand runs are spawned here, not on the API runtime.
    pub worker: Handle,
}

async fn health_check_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin, error = %e, "Ignoring invalid CORS origin.");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

pub fn create_axum_router(app_state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let api = Router::new()
        .nest("/infrastructure", infrastructure_routes::create_infrastructure_router())
        .nest("/services", service_routes::create_service_router())
        .nest("/metrics", metrics_routes::create_metrics_router())
        .nest("/alerts", alert_routes::create_alert_router());

    Router::new()
        .route("/health", get(health_check_handler))
        .nest("/api/v1", api)
        .layer(cors_layer(cors_origins))
        .with_state(app_state)
}
