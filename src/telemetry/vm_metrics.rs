use chrono::{DateTime, Utc};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cluster::models::GuestStatus;
use crate::db::entities::metric;
use crate::db::enums::SourceType;
use crate::units::{fraction_to_percent, usage_percent};

pub const UNIT_PERCENT: &str = "percent";
pub const UNIT_BYTES: &str = "bytes";

/// Normalized usage derived from one `status/current` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmMetrics {
    pub vmid: i32,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub network_in: f64,
    pub network_out: f64,
    pub uptime: u64,
}

impl VmMetrics {
    pub fn from_status(vmid: i32, status: &GuestStatus) -> Self {
        Self {
            vmid,
            cpu_usage: fraction_to_percent(status.cpu.unwrap_or(0.0)),
            memory_usage: usage_percent(status.mem.unwrap_or(0), status.maxmem.unwrap_or(0)),
            disk_usage: usage_percent(status.disk.unwrap_or(0), status.maxdisk.unwrap_or(0)),
            network_in: status.netin.unwrap_or(0) as f64,
            network_out: status.netout.unwrap_or(0) as f64,
            uptime: status.uptime.unwrap_or(0),
        }
    }

    /// The five samples stored per VM per collection run, all stamped with `at`.
    pub fn to_metric_rows(&self, vm_id: Uuid, at: DateTime<Utc>) -> Vec<metric::ActiveModel> {
        [
            ("cpu_usage", self.cpu_usage, UNIT_PERCENT),
            ("memory_usage", self.memory_usage, UNIT_PERCENT),
            ("disk_usage", self.disk_usage, UNIT_PERCENT),
            ("network_in", self.network_in, UNIT_BYTES),
            ("network_out", self.network_out, UNIT_BYTES),
        ]
        .into_iter()
        .map(|(name, value, unit)| metric::ActiveModel {
            id: Set(Uuid::now_v7()),
            source_type: Set(SourceType::Vm),
            source_id: Set(vm_id),
            metric_name: Set(name.to_string()),
            value: Set(value),
            unit: Set(unit.to_string()),
            timestamp: Set(at),
        })
        .collect()
    }
}
