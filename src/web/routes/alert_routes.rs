use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::entities::{alert, alert_rule};
use crate::db::services::alert_service;
use crate::web::models::ApiEnvelope;
use crate::web::models::alert_models::{AlertListQuery, CreateAlertRule, UpdateAlertRule};
use crate::web::{AppError, AppState};

pub fn create_alert_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_alerts))
        .route("/rules", get(list_rules).post(create_rule))
        .route("/rules/{id}", put(update_rule).delete(delete_rule))
}

async fn list_alerts(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<AlertListQuery>,
) -> Result<Json<ApiEnvelope<Vec<alert::Model>>>, AppError> {
    let alerts = alert_service::list_alerts(&app_state.db_pool, query.status).await?;
    Ok(Json(ApiEnvelope::list(alerts)))
}

async fn list_rules(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<ApiEnvelope<Vec<alert_rule::Model>>>, AppError> {
    let rules = alert_service::list_rules(&app_state.db_pool).await?;
    Ok(Json(ApiEnvelope::list(rules)))
}

fn check_threshold(threshold: f64) -> Result<(), AppError> {
    if threshold.is_finite() {
        Ok(())
    } else {
        Err(AppError::InvalidInput("threshold must be a finite number".to_string()))
    }
}

async fn create_rule(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateAlertRule>,
) -> Result<(StatusCode, Json<ApiEnvelope<alert_rule::Model>>), AppError> {
    check_threshold(payload.threshold)?;
    if payload.duration_seconds < 0 {
        return Err(AppError::InvalidInput("duration_seconds must not be negative".to_string()));
    }
    let rule = alert_service::create_rule(&app_state.db_pool, payload).await?;
    Ok((StatusCode::CREATED, Json(ApiEnvelope::single(rule))))
}

async fn update_rule(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAlertRule>,
) -> Result<Json<ApiEnvelope<alert_rule::Model>>, AppError> {
    if let Some(threshold) = payload.threshold {
        check_threshold(threshold)?;
    }
    if payload.duration_seconds.is_some_and(|d| d < 0) {
        return Err(AppError::InvalidInput("duration_seconds must not be negative".to_string()));
    }
    let rule = alert_service::update_rule(&app_state.db_pool, id, payload)
        .await?
        .ok_or_else(|| AppError::NotFound("Alert rule not found".to_string()))?;
    Ok(Json(ApiEnvelope::single(rule)))
}

async fn delete_rule(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let result = alert_service::delete_rule(&app_state.db_pool, id).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Alert rule not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use serde_json::json;

    use crate::test_support::{FakeClusterClient, test_db};
    use crate::web::test_app::{router, send};

    #[tokio::test]
    async fn rule_crud_and_alert_filter() {
        let db = test_db().await;
        let app = router(&db, Arc::new(FakeClusterClient::new()));

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/alerts/rules",
            Some(json!({
                "name": "disk nearly full",
                "metric_name": "disk_usage",
                "condition": "gte",
                "threshold": 90.0,
                "notification_channels": ["ops-email"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["severity"], "warning");
        assert_eq!(body["data"]["enabled"], true);
        assert_eq!(body["data"]["notification_channels"], json!(["ops-email"]));
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let uri = format!("/api/v1/alerts/rules/{id}");
        let (status, body) = send(
            &app,
            "PUT",
            &uri,
            Some(json!({"severity": "critical", "enabled": false})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["severity"], "critical");
        assert_eq!(body["data"]["enabled"], false);
        assert_eq!(body["data"]["threshold"], 90.0);

        let (status, body) = send(&app, "GET", "/api/v1/alerts?status=firing", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["total"], 0);

        let (status, _) = send(&app, "GET", "/api/v1/alerts?status=exploded", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "PUT", &uri, Some(json!({"enabled": true}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
