//! Pure derivations from raw cluster payloads to the values stored on Node and VM rows.

use serde_json::json;

use crate::cluster::models::{
    ClusterNode, GuestConfig, GuestSummary, NetworkInterface, NodeStatusDetail, StoragePool,
};
use crate::db::entities::vm::TagSet;
use crate::db::enums::{NodeStatus, VmType};
use crate::units::{
    bytes_to_gb, bytes_to_gb_rounded, bytes_to_mb, fraction_to_percent, usage_percent,
};

pub const UNKNOWN_IP: &str = "unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub hostname: String,
    pub ip_address: String,
    pub status: NodeStatus,
    pub cpu_cores: i32,
    pub memory_total_mb: i64,
    pub disk_total_gb: i64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
}

impl NodeSnapshot {
    /// The JSON stored in `nodes.metadata`.
    pub fn usage_metadata(&self) -> serde_json::Value {
        json!({
            "cpu_usage": self.cpu_usage,
            "memory_usage": self.memory_usage,
            "disk_usage": self.disk_usage,
        })
    }
}

pub fn derive_node_snapshot(
    listing: &ClusterNode,
    status: &NodeStatusDetail,
    interfaces: &[NetworkInterface],
    storage: &[StoragePool],
) -> NodeSnapshot {
    let ip_address = interfaces
        .iter()
        .filter_map(|iface| iface.address.as_deref())
        .find(|addr| !addr.is_empty())
        .unwrap_or(UNKNOWN_IP)
        .to_string();

    let cpuinfo = status.cpuinfo.clone().unwrap_or_default();
    let cpu_cores = cpuinfo
        .cores
        .or(cpuinfo.cpus)
        .or(listing.maxcpu)
        .unwrap_or(0);

    let memory = status.memory.clone().unwrap_or_default();
    let memory_total = memory.total.or(listing.maxmem).unwrap_or(0);
    let memory_used = memory.used.or(listing.mem).unwrap_or(0);

    let (disk_total, disk_used) = disk_totals(listing, status, storage);

    NodeSnapshot {
        hostname: listing.node.clone(),
        ip_address,
        status: if listing.status.as_deref() == Some("online") {
            NodeStatus::Online
        } else {
            NodeStatus::Offline
        },
        cpu_cores: i32::try_from(cpu_cores).unwrap_or(i32::MAX),
        memory_total_mb: bytes_to_mb(memory_total),
        disk_total_gb: bytes_to_gb(disk_total),
        cpu_usage: fraction_to_percent(listing.cpu.unwrap_or(0.0)),
        memory_usage: usage_percent(memory_used, memory_total),
        disk_usage: usage_percent(disk_used, disk_total),
    }
}

/// Sums all storage pools; falls back to rootfs, then to the listing, when that yields nothing.
fn disk_totals(
    listing: &ClusterNode,
    status: &NodeStatusDetail,
    storage: &[StoragePool],
) -> (u64, u64) {
    let (total, used) = storage.iter().fold((0u64, 0u64), |(t, u), pool| {
        (
            t.saturating_add(pool.total.unwrap_or(0)),
            u.saturating_add(pool.used.unwrap_or(0)),
        )
    });
    if total > 0 {
        return (total, used);
    }
    let rootfs = status.rootfs.clone().unwrap_or_default();
    (
        rootfs.total.or(listing.maxdisk).unwrap_or(0),
        rootfs.used.or(listing.disk).unwrap_or(0),
    )
}

/// Normalized VM/container row values.
#[derive(Debug, Clone, PartialEq)]
pub struct GuestRecord {
    pub vmid: i32,
    pub name: String,
    pub status: String,
    pub vm_type: VmType,
    pub cpu_cores: i32,
    pub memory_mb: i64,
    pub disk_gb: f64,
    pub tags: Option<TagSet>,
    pub config: Option<serde_json::Value>,
}

/// `config` is only consulted for qemu guests; pass `None` for containers.
pub fn build_guest_record(
    guest: &GuestSummary,
    vm_type: VmType,
    config: Option<GuestConfig>,
) -> GuestRecord {
    let vmid = guest.vmid();
    let name = guest
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("{}-{vmid}", vm_type.default_name_prefix()));
    let cpu_cores = guest.maxcpu.or(guest.cpus).unwrap_or(1);

    GuestRecord {
        vmid,
        name,
        status: guest.status.clone().unwrap_or_else(|| "unknown".to_string()),
        vm_type,
        cpu_cores: i32::try_from(cpu_cores).unwrap_or(i32::MAX),
        memory_mb: bytes_to_mb(guest.maxmem.unwrap_or(0)),
        disk_gb: bytes_to_gb_rounded(guest.maxdisk.unwrap_or(0)),
        tags: parse_tags(guest.tags.as_deref()),
        config: match (vm_type, config) {
            (VmType::Qemu, Some(map)) if !map.is_empty() => Some(serde_json::Value::Object(map)),
            _ => None,
        },
    }
}

/// Splits Proxmox's `;`-delimited tag string. Empty pieces are dropped; no tags yields `None`.
pub fn parse_tags(raw: Option<&str>) -> Option<TagSet> {
    let tags: TagSet = raw?
        .split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    (!tags.is_empty()).then_some(tags)
}
