use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::entities::{node, vm};
use crate::db::services::infrastructure_service;
use crate::telemetry::VmMetrics;
use crate::web::models::ApiEnvelope;
use crate::web::models::infrastructure_models::{
    SyncAccepted, VmAction, VmActionResponse, VmListQuery,
};
use crate::web::{AppError, AppState};

pub fn create_infrastructure_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/nodes", get(list_nodes))
        .route("/vms", get(list_vms))
        .route("/vms/{id}", get(get_vm))
        .route("/vms/{id}/metrics", get(get_vm_live_metrics))
        .route("/vms/{id}/{action}", post(run_vm_action))
        .route("/sync", post(trigger_sync))
}

async fn list_nodes(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<ApiEnvelope<Vec<node::Model>>>, AppError> {
    let nodes = infrastructure_service::list_nodes(&app_state.db_pool).await?;
    Ok(Json(ApiEnvelope::list(nodes)))
}

async fn list_vms(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<VmListQuery>,
) -> Result<Json<ApiEnvelope<Vec<vm::Model>>>, AppError> {
    let vms = infrastructure_service::list_vms(&app_state.db_pool, query.node_id).await?;
    Ok(Json(ApiEnvelope::list(vms)))
}

async fn get_vm(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiEnvelope<vm::Model>>, AppError> {
    let vm = infrastructure_service::get_vm(&app_state.db_pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("VM not found".to_string()))?;
    Ok(Json(ApiEnvelope::single(vm)))
}

/// Resolves a VM and the cluster-side name of the node that hosts it.
async fn locate_vm(app_state: &AppState, id: Uuid) -> Result<(vm::Model, String), AppError> {
    let (vm, node) = infrastructure_service::get_vm_with_node(&app_state.db_pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("VM not found".to_string()))?;
    let node_name = node
        .and_then(|n| n.proxmox_node_name)
        .ok_or_else(|| {
            AppError::InternalServerError(format!("VM {} has no addressable node", vm.id))
        })?;
    Ok((vm, node_name))
}

async fn get_vm_live_metrics(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiEnvelope<VmMetrics>>, AppError> {
    let (vm, node_name) = locate_vm(&app_state, id).await?;
    let status = app_state
        .cluster
        .get_vm_status(&node_name, vm.vmid)
        .await
        .ok_or_else(|| AppError::ServiceUnavailable("Unable to fetch VM metrics".to_string()))?;
    Ok(Json(ApiEnvelope::single(VmMetrics::from_status(
        vm.vmid, &status,
    ))))
}

async fn run_vm_action(
    State(app_state): State<Arc<AppState>>,
    Path((id, action)): Path<(Uuid, VmAction)>,
) -> Result<Json<ApiEnvelope<VmActionResponse>>, AppError> {
    let (vm, node_name) = locate_vm(&app_state, id).await?;
    let cluster = &app_state.cluster;
    let task = match action {
        VmAction::Start => cluster.start_vm(&node_name, vm.vmid).await,
        VmAction::Stop => cluster.stop_vm(&node_name, vm.vmid).await,
        VmAction::Restart => cluster.restart_vm(&node_name, vm.vmid).await,
    };
    let Some(task) = task else {
        warn!(vm_id = %vm.id, node = %node_name, ?action, "Cluster did not accept VM action.");
        return Err(AppError::ServiceUnavailable(format!(
            "Failed to {} VM",
            action.verb()
        )));
    };
    info!(vm_id = %vm.id, node = %node_name, ?action, task = %task, "VM action submitted.");
    Ok(Json(ApiEnvelope::single(VmActionResponse {
        status: action.progress_label().to_string(),
        task,
    })))
}

async fn trigger_sync(
    State(app_state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiEnvelope<SyncAccepted>>) {
    app_state.sync_task.trigger(&app_state.worker);
    (
        StatusCode::ACCEPTED,
        Json(ApiEnvelope::single(SyncAccepted {
            status: "sync_triggered".to_string(),
        })),
    )
}
