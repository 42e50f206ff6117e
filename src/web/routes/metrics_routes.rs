use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::services::metric_service::{self, ResourceOverview};
use crate::web::models::ApiEnvelope;
use crate::web::models::metrics_models::{MetricSeries, MetricsQuery, group_into_series};
use crate::web::{AppError, AppState};

pub fn create_metrics_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/overview", get(get_overview))
        .route("/{source_id}", get(get_source_metrics))
}

async fn get_overview(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<ApiEnvelope<ResourceOverview>>, AppError> {
    let overview = metric_service::get_overview(&app_state.db_pool).await?;
    Ok(Json(ApiEnvelope::single(overview)))
}

async fn get_source_metrics(
    State(app_state): State<Arc<AppState>>,
    Path(source_id): Path<Uuid>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<ApiEnvelope<Vec<MetricSeries>>>, AppError> {
    let samples =
        metric_service::get_metrics_for_source(&app_state.db_pool, source_id, query.range, Utc::now())
            .await?;
    Ok(Json(ApiEnvelope::list(group_into_series(samples))))
}
