//! Time-series reads and the aggregate overview.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::entities::{metric, prelude::*};
use crate::db::enums::AlertStatus;
use crate::units::round2;

/// Lookback windows accepted by the metrics query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MetricRange {
    #[default]
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
}

impl MetricRange {
    pub fn lookback(&self) -> Duration {
        match self {
            MetricRange::OneHour => Duration::hours(1),
            MetricRange::SixHours => Duration::hours(6),
            MetricRange::OneDay => Duration::hours(24),
            MetricRange::SevenDays => Duration::days(7),
        }
    }
}

/// Samples for one source inside `[now - range, now]`, oldest first.
pub async fn get_metrics_for_source<C: ConnectionTrait>(
    db: &C,
    source_id: Uuid,
    range: MetricRange,
    now: DateTime<Utc>,
) -> Result<Vec<metric::Model>, DbErr> {
    let since = now - range.lookback();
    Metric::find()
        .filter(MetricColumn::SourceId.eq(source_id))
        .filter(MetricColumn::Timestamp.gte(since))
        .filter(MetricColumn::Timestamp.lte(now))
        .order_by_asc(MetricColumn::Timestamp)
        .all(db)
        .await
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOverview {
    pub total_nodes: u64,
    pub total_vms: u64,
    pub running_vms: u64,
    pub active_alerts: u64,
    pub avg_cpu_usage: f64,
    pub avg_memory_usage: f64,
    pub avg_disk_usage: f64,
}

/// Aggregates counts and averages the usage snapshots reconciliation stored on each node.
///
/// Nodes without a snapshot count as zero usage.
pub async fn get_overview<C: ConnectionTrait>(db: &C) -> Result<ResourceOverview, DbErr> {
    let nodes = Node::find().all(db).await?;
    let total_vms = Vm::find().count(db).await?;
    let running_vms = Vm::find()
        .filter(VmColumn::Status.eq("running"))
        .count(db)
        .await?;
    let active_alerts = Alert::find()
        .filter(AlertColumn::Status.eq(AlertStatus::Firing))
        .count(db)
        .await?;

    let (mut cpu, mut memory, mut disk) = (0.0, 0.0, 0.0);
    for node in &nodes {
        let snapshot = node.metadata.as_ref();
        let read = |key: &str| {
            snapshot
                .and_then(|m| m.get(key))
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0)
        };
        cpu += read("cpu_usage");
        memory += read("memory_usage");
        disk += read("disk_usage");
    }
    let divisor = nodes.len().max(1) as f64;

    Ok(ResourceOverview {
        total_nodes: nodes.len() as u64,
        total_vms,
        running_vms,
        active_alerts,
        avg_cpu_usage: round2(cpu / divisor),
        avg_memory_usage: round2(memory / divisor),
        avg_disk_usage: round2(disk / divisor),
    })
}
