//! CRUD over the service catalog.
//!
//! Health status columns are owned by the prober; the only way a request changes `status` is an
//! explicit override in [`UpdateService`].

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DbErr, DeleteResult, EntityTrait, IntoActiveModel,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::db::entities::{prelude::*, service};
use crate::db::enums::ServiceStatus;
use crate::web::models::service_models::{CreateService, UpdateService};

pub async fn list_services<C: ConnectionTrait>(db: &C) -> Result<Vec<service::Model>, DbErr> {
    Service::find()
        .order_by_asc(ServiceColumn::Name)
        .all(db)
        .await
}

pub async fn get_service<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> Result<Option<service::Model>, DbErr> {
    Service::find_by_id(id).one(db).await
}

pub async fn create_service<C: ConnectionTrait>(
    db: &C,
    data: CreateService,
) -> Result<service::Model, DbErr> {
    let now = Utc::now();
    service::ActiveModel {
        id: Set(Uuid::now_v7()),
        name: Set(data.name),
        description: Set(data.description),
        service_type: Set(data.service_type),
        status: Set(ServiceStatus::Unknown),
        health_check_url: Set(data.health_check_url),
        vm_id: Set(data.vm_id),
        namespace: Set(data.namespace),
        metadata: Set(data.metadata),
        last_health_check: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
}

/// Applies a partial update. Returns `None` when the service does not exist.
pub async fn update_service<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    data: UpdateService,
) -> Result<Option<service::Model>, DbErr> {
    let Some(existing) = Service::find_by_id(id).one(db).await? else {
        return Ok(None);
    };
    let mut active = existing.into_active_model();

    if let Some(name) = data.name {
        active.name = Set(name);
    }
    if let Some(description) = data.description {
        active.description = Set(description);
    }
    if let Some(service_type) = data.service_type {
        active.service_type = Set(service_type);
    }
    if let Some(status) = data.status {
        active.status = Set(status);
    }
    if let Some(url) = data.health_check_url {
        active.health_check_url = Set(url);
    }
    if let Some(vm_id) = data.vm_id {
        active.vm_id = Set(vm_id);
    }
    if let Some(namespace) = data.namespace {
        active.namespace = Set(namespace);
    }
    if let Some(metadata) = data.metadata {
        active.metadata = Set(metadata);
    }
    active.updated_at = Set(Utc::now());

    active.update(db).await.map(Some)
}

pub async fn delete_service<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<DeleteResult, DbErr> {
    Service::delete_by_id(id).exec(db).await
}
