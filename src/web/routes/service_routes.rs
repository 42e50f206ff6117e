use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::entities::service;
use crate::db::services::service_catalog_service;
use crate::web::models::ApiEnvelope;
use crate::web::models::service_models::{CreateService, UpdateService};
use crate::web::{AppError, AppState};

pub fn create_service_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_services).post(create_service))
        .route(
            "/{id}",
            get(get_service).put(update_service).delete(delete_service),
        )
}

async fn list_services(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<ApiEnvelope<Vec<service::Model>>>, AppError> {
    let services = service_catalog_service::list_services(&app_state.db_pool).await?;
    Ok(Json(ApiEnvelope::list(services)))
}

async fn get_service(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiEnvelope<service::Model>>, AppError> {
    let service = service_catalog_service::get_service(&app_state.db_pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Service not found".to_string()))?;
    Ok(Json(ApiEnvelope::single(service)))
}

async fn create_service(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateService>,
) -> Result<(StatusCode, Json<ApiEnvelope<service::Model>>), AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::InvalidInput("Service name must not be empty".to_string()));
    }
    payload.validate()?;
    let created = service_catalog_service::create_service(&app_state.db_pool, payload).await?;
    Ok((StatusCode::CREATED, Json(ApiEnvelope::single(created))))
}

async fn update_service(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateService>,
) -> Result<Json<ApiEnvelope<service::Model>>, AppError> {
    if payload.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::InvalidInput("Service name must not be empty".to_string()));
    }
    payload.validate()?;
    let updated = service_catalog_service::update_service(&app_state.db_pool, id, payload)
        .await?
        .ok_or_else(|| AppError::NotFound("Service not found".to_string()))?;
    Ok(Json(ApiEnvelope::single(updated)))
}

async fn delete_service(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let result = service_catalog_service::delete_service(&app_state.db_pool, id).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Service not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
