//! In-memory doubles shared by the unit tests.

use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, DbErr, Set};
use serde_json::json;
use uuid::Uuid;

use crate::cluster::ClusterClient;
use crate::cluster::models::{
    ClusterNode, GuestConfig, GuestStatus, GuestSummary, NetworkInterface, NodeStatusDetail,
    StoragePool,
};
use crate::db::entities::{node, vm};
use crate::db::enums::{NodeStatus, VmType};
use crate::db::schema::ensure_schema;
use crate::health::url_guard::HostResolver;

/// Fresh in-memory SQLite with the full schema. A single pooled connection keeps the database alive.
pub async fn test_db() -> DatabaseConnection {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(opts).await.expect("in-memory sqlite");
    ensure_schema(&db).await.expect("schema bootstrap");
    db
}

pub async fn insert_node(db: &DatabaseConnection, name: &str) -> node::Model {
    insert_node_with_snapshot(db, name, 0.0, 0.0, 0.0).await
}

pub async fn insert_node_with_snapshot(
    db: &DatabaseConnection,
    name: &str,
    cpu: f64,
    memory: f64,
    disk: f64,
) -> node::Model {
    let now = Utc::now();
    node::ActiveModel {
        id: Set(Uuid::now_v7()),
        hostname: Set(name.to_string()),
        ip_address: Set("203.0.113.10".to_string()),
        provider: Set("proxmox".to_string()),
        status: Set(NodeStatus::Online),
        cpu_cores: Set(8),
        memory_total_mb: Set(16384),
        disk_total_gb: Set(500),
        proxmox_node_name: Set(Some(name.to_string())),
        metadata: Set(Some(json!({
            "cpu_usage": cpu,
            "memory_usage": memory,
            "disk_usage": disk,
        }))),
        last_seen_at: Set(Some(now)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert node")
}

pub async fn try_insert_vm(
    db: &DatabaseConnection,
    node_id: Uuid,
    vmid: i32,
    vm_type: VmType,
    status: &str,
) -> Result<vm::Model, DbErr> {
    let now = Utc::now();
    vm::ActiveModel {
        id: Set(Uuid::now_v7()),
        node_id: Set(node_id),
        vmid: Set(vmid),
        name: Set(format!("{}-{vmid}", vm_type.default_name_prefix())),
        status: Set(status.to_string()),
        vm_type: Set(vm_type),
        cpu_cores: Set(2),
        memory_mb: Set(2048),
        disk_gb: Set(32.0),
        ip_address: Set(None),
        os_type: Set(None),
        tags: Set(None),
        config: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
}

pub async fn insert_vm(
    db: &DatabaseConnection,
    node_id: Uuid,
    vmid: i32,
    vm_type: VmType,
    status: &str,
) -> vm::Model {
    try_insert_vm(db, node_id, vmid, vm_type, status)
        .await
        .expect("insert vm")
}

pub fn cluster_node(name: &str) -> ClusterNode {
    ClusterNode {
        node: name.to_string(),
        status: Some("online".to_string()),
        cpu: Some(0.25),
        maxcpu: Some(8),
        mem: Some(4 << 30),
        maxmem: Some(16 << 30),
        disk: Some(50 << 30),
        maxdisk: Some(200 << 30),
    }
}

pub fn guest(vmid: u64, name: &str) -> GuestSummary {
    GuestSummary {
        vmid: Some(vmid),
        name: Some(name.to_string()),
        status: Some("running".to_string()),
        maxcpu: Some(2),
        cpus: None,
        maxmem: Some(2 << 30),
        maxdisk: Some(32 << 30),
        tags: None,
    }
}

#[derive(Default)]
struct FakeState {
    nodes: Vec<ClusterNode>,
    statuses: HashMap<String, NodeStatusDetail>,
    interfaces: HashMap<String, Vec<NetworkInterface>>,
    storage: HashMap<String, Vec<StoragePool>>,
    qemu: HashMap<String, Vec<GuestSummary>>,
    lxc: HashMap<String, Vec<GuestSummary>>,
    guest_status: HashMap<(String, i32), GuestStatus>,
    configs: HashMap<(String, i32), GuestConfig>,
    config_fetches: Vec<(String, i32)>,
    action_task: Option<String>,
    actions: Vec<(String, i32, &'static str)>,
}

/// Scriptable [`ClusterClient`]. Anything not configured comes back empty, like a degraded call.
#[derive(Default)]
pub struct FakeClusterClient {
    state: Mutex<FakeState>,
}

impl FakeClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut guard = self.state.lock().expect("fake cluster state");
        f(&mut guard)
    }

    pub fn set_nodes(&self, nodes: Vec<ClusterNode>) {
        self.with_state(|s| s.nodes = nodes);
    }

    pub fn set_node_status(&self, node: &str, status: NodeStatusDetail) {
        self.with_state(|s| {
            s.statuses.insert(node.to_string(), status);
        });
    }

    pub fn set_interfaces(&self, node: &str, interfaces: Vec<NetworkInterface>) {
        self.with_state(|s| {
            s.interfaces.insert(node.to_string(), interfaces);
        });
    }

    pub fn set_storage(&self, node: &str, pools: Vec<StoragePool>) {
        self.with_state(|s| {
            s.storage.insert(node.to_string(), pools);
        });
    }

    pub fn set_qemu(&self, node: &str, guests: Vec<GuestSummary>) {
        self.with_state(|s| {
            s.qemu.insert(node.to_string(), guests);
        });
    }

    pub fn set_lxc(&self, node: &str, guests: Vec<GuestSummary>) {
        self.with_state(|s| {
            s.lxc.insert(node.to_string(), guests);
        });
    }

    pub fn set_guest_status(&self, node: &str, vmid: i32, status: GuestStatus) {
        self.with_state(|s| {
            s.guest_status.insert((node.to_string(), vmid), status);
        });
    }

    pub fn set_config(&self, node: &str, vmid: i32, config: GuestConfig) {
        self.with_state(|s| {
            s.configs.insert((node.to_string(), vmid), config);
        });
    }

    pub fn set_action_task(&self, task: Option<&str>) {
        self.with_state(|s| s.action_task = task.map(str::to_string));
    }

    pub fn config_fetches(&self) -> Vec<(String, i32)> {
        self.with_state(|s| s.config_fetches.clone())
    }

    pub fn actions(&self) -> Vec<(String, i32, &'static str)> {
        self.with_state(|s| s.actions.clone())
    }

    fn record_action(&self, node: &str, vmid: i32, action: &'static str) -> Option<String> {
        self.with_state(|s| {
            s.actions.push((node.to_string(), vmid, action));
            s.action_task.clone()
        })
    }
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    async fn list_nodes(&self) -> Vec<ClusterNode> {
        self.with_state(|s| s.nodes.clone())
    }

    async fn get_node_status(&self, node: &str) -> NodeStatusDetail {
        self.with_state(|s| s.statuses.get(node).cloned().unwrap_or_default())
    }

    async fn list_network_interfaces(&self, node: &str) -> Vec<NetworkInterface> {
        self.with_state(|s| s.interfaces.get(node).cloned().unwrap_or_default())
    }

    async fn list_storage(&self, node: &str) -> Vec<StoragePool> {
        self.with_state(|s| s.storage.get(node).cloned().unwrap_or_default())
    }

    async fn list_vms(&self, node: &str) -> Vec<GuestSummary> {
        self.with_state(|s| s.qemu.get(node).cloned().unwrap_or_default())
    }

    async fn list_containers(&self, node: &str) -> Vec<GuestSummary> {
        self.with_state(|s| s.lxc.get(node).cloned().unwrap_or_default())
    }

    async fn get_vm_status(&self, node: &str, vmid: i32) -> Option<GuestStatus> {
        self.with_state(|s| s.guest_status.get(&(node.to_string(), vmid)).cloned())
    }

    async fn get_vm_config(&self, node: &str, vmid: i32) -> GuestConfig {
        self.with_state(|s| {
            s.config_fetches.push((node.to_string(), vmid));
            s.configs
                .get(&(node.to_string(), vmid))
                .cloned()
                .unwrap_or_default()
        })
    }

    async fn start_vm(&self, node: &str, vmid: i32) -> Option<String> {
        self.record_action(node, vmid, "start")
    }

    async fn stop_vm(&self, node: &str, vmid: i32) -> Option<String> {
        self.record_action(node, vmid, "stop")
    }

    async fn restart_vm(&self, node: &str, vmid: i32) -> Option<String> {
        self.record_action(node, vmid, "reboot")
    }
}

/// DNS double: answers from a fixed table, fails for anything else.
#[derive(Default, Clone)]
pub struct StaticResolver {
    table: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, addrs: &[&str]) -> Self {
        let parsed = addrs
            .iter()
            .map(|a| a.parse().expect("test address"))
            .collect();
        self.table.insert(host.to_string(), parsed);
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        self.table
            .get(host)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no entry for {host}")))
    }
}
