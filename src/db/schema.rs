//! Idempotent schema bootstrap derived from the entity definitions.

use sea_orm::sea_query::{Index, IndexCreateStatement, TableCreateStatement};
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Schema};
use tracing::info;

use crate::db::entities::prelude::*;

/// Creates every table and index that does not already exist.
///
/// Tables are created parents first so foreign keys resolve on backends that check them eagerly.
pub async fn ensure_schema<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let tables: Vec<TableCreateStatement> = vec![
        table_for(&schema, Node),
        table_for(&schema, Vm),
        table_for(&schema, Service),
        table_for(&schema, Metric),
        table_for(&schema, AlertRule),
        table_for(&schema, Alert),
    ];
    for stmt in &tables {
        db.execute(backend.build(stmt)).await?;
    }

    for stmt in &indexes() {
        db.execute(backend.build(stmt)).await?;
    }

    info!("Database schema is up to date.");
    Ok(())
}

fn table_for<E: EntityTrait>(schema: &Schema, entity: E) -> TableCreateStatement {
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    stmt
}

fn indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name("ux_vms_node_vmid")
            .table(Vm)
            .col(VmColumn::NodeId)
            .col(VmColumn::Vmid)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("ix_metrics_source_time")
            .table(Metric)
            .col(MetricColumn::SourceType)
            .col(MetricColumn::SourceId)
            .col(MetricColumn::MetricName)
            .col(MetricColumn::Timestamp)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("ix_alerts_status_fired_at")
            .table(Alert)
            .col(AlertColumn::Status)
            .col(AlertColumn::FiredAt)
            .if_not_exists()
            .to_owned(),
    ]
}
