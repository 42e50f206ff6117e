use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, IntoActiveModel, QueryFilter, Set, TransactionTrait,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::node_snapshot::{GuestRecord, NodeSnapshot, build_guest_record, derive_node_snapshot};
use crate::cluster::ClusterClient;
use crate::db::entities::{node, prelude::*, vm};
use crate::db::enums::{NodeStatus, VmType};

pub const PROVIDER: &str = "proxmox";

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error during reconciliation: {0}")]
    Database(#[from] DbErr),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub nodes_seen: usize,
    pub nodes_created: usize,
    pub nodes_marked_offline: u64,
    pub vms_created: usize,
    pub vms_updated: usize,
    pub vms_deleted: u64,
}

/// Pulls nodes and guests from the cluster and mirrors them into the store.
pub struct InfrastructureSyncService {
    db: DatabaseConnection,
    cluster: Arc<dyn ClusterClient>,
}

impl InfrastructureSyncService {
    pub fn new(db: DatabaseConnection, cluster: Arc<dyn ClusterClient>) -> Self {
        Self { db, cluster }
    }

    /// One full reconciliation pass, committed as a single transaction.
    ///
    /// A listing with no named nodes is treated as "no data" and changes nothing.
    pub async fn reconcile(&self) -> Result<SyncReport, SyncError> {
        let (listing, nameless): (Vec<_>, Vec<_>) = self
            .cluster
            .list_nodes()
            .await
            .into_iter()
            .partition(|entry| !entry.node.is_empty());
        if !nameless.is_empty() {
            warn!(count = nameless.len(), "Ignoring cluster node entries without a name.");
        }
        if listing.is_empty() {
            warn!("Cluster reported no nodes; skipping reconciliation.");
            return Ok(SyncReport::default());
        }

        let started_at = Utc::now();
        let mut report = SyncReport::default();
        let mut seen_nodes: HashSet<String> = HashSet::new();

        let txn = self.db.begin().await?;
        for entry in &listing {
            let node_name = entry.node.as_str();
            if !seen_nodes.insert(node_name.to_string()) {
                warn!(node = node_name, "Duplicate node in cluster listing; ignoring repeat.");
                continue;
            }

            let status = self.cluster.get_node_status(node_name).await;
            let interfaces = self.cluster.list_network_interfaces(node_name).await;
            let storage = self.cluster.list_storage(node_name).await;
            let snapshot = derive_node_snapshot(entry, &status, &interfaces, &storage);

            let node = upsert_node(&txn, node_name, &snapshot, started_at, &mut report).await?;
            self.sync_guests(&txn, &node, node_name, started_at, &mut report)
                .await?;
        }
        report.nodes_seen = seen_nodes.len();
        report.nodes_marked_offline = mark_unreported_offline(&txn, &seen_nodes, started_at).await?;
        txn.commit().await?;

        info!(
            nodes_seen = report.nodes_seen,
            nodes_created = report.nodes_created,
            nodes_marked_offline = report.nodes_marked_offline,
            vms_created = report.vms_created,
            vms_updated = report.vms_updated,
            vms_deleted = report.vms_deleted,
            "Infrastructure sync complete."
        );
        Ok(report)
    }

    async fn sync_guests(
        &self,
        txn: &DatabaseTransaction,
        node: &node::Model,
        node_name: &str,
        now: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> Result<(), DbErr> {
        let qemu = self.cluster.list_vms(node_name).await;
        let lxc = self.cluster.list_containers(node_name).await;

        let before: Vec<vm::Model> = Vm::find()
            .filter(VmColumn::NodeId.eq(node.id))
            .all(txn)
            .await?;
        let mut by_vmid: HashMap<i32, vm::Model> =
            before.iter().map(|v| (v.vmid, v.clone())).collect();
        let mut seen: HashSet<i32> = HashSet::new();

        for guest in &qemu {
            let config = self.cluster.get_vm_config(node_name, guest.vmid()).await;
            let record = build_guest_record(guest, VmType::Qemu, Some(config));
            seen.insert(record.vmid);
            upsert_guest(txn, node.id, &mut by_vmid, record, now, report).await?;
        }
        // Containers go second: on a vmid clash with a qemu guest they win.
        for guest in &lxc {
            let record = build_guest_record(guest, VmType::Lxc, None);
            seen.insert(record.vmid);
            upsert_guest(txn, node.id, &mut by_vmid, record, now, report).await?;
        }

        let stale: Vec<Uuid> = before
            .iter()
            .filter(|v| !seen.contains(&v.vmid))
            .map(|v| v.id)
            .collect();
        if !stale.is_empty() {
            let deleted = Vm::delete_many()
                .filter(VmColumn::NodeId.eq(node.id))
                .filter(VmColumn::Id.is_in(stale))
                .exec(txn)
                .await?;
            debug!(node = node_name, count = deleted.rows_affected, "Deleted stale guests.");
            report.vms_deleted += deleted.rows_affected;
        }
        Ok(())
    }
}

async fn upsert_node<C: ConnectionTrait>(
    db: &C,
    node_name: &str,
    snapshot: &NodeSnapshot,
    seen_at: DateTime<Utc>,
    report: &mut SyncReport,
) -> Result<node::Model, DbErr> {
    let existing = match Node::find()
        .filter(NodeColumn::ProxmoxNodeName.eq(node_name))
        .one(db)
        .await?
    {
        Some(found) => Some(found),
        // Rows created before the cluster name was tracked are adopted by hostname.
        None => {
            Node::find()
                .filter(NodeColumn::Hostname.eq(snapshot.hostname.as_str()))
                .one(db)
                .await?
        }
    };

    let is_new = existing.is_none();
    let mut active = match existing {
        Some(found) => found.into_active_model(),
        None => {
            report.nodes_created += 1;
            node::ActiveModel {
                id: Set(Uuid::now_v7()),
                created_at: Set(seen_at),
                ..Default::default()
            }
        }
    };
    active.hostname = Set(snapshot.hostname.clone());
    active.ip_address = Set(snapshot.ip_address.clone());
    active.provider = Set(PROVIDER.to_string());
    active.status = Set(snapshot.status);
    active.cpu_cores = Set(snapshot.cpu_cores);
    active.memory_total_mb = Set(snapshot.memory_total_mb);
    active.disk_total_gb = Set(snapshot.disk_total_gb);
    active.proxmox_node_name = Set(Some(node_name.to_string()));
    active.metadata = Set(Some(snapshot.usage_metadata()));
    active.last_seen_at = Set(Some(seen_at));
    active.updated_at = Set(seen_at);

    if is_new {
        active.insert(db).await
    } else {
        active.update(db).await
    }
}

async fn upsert_guest<C: ConnectionTrait>(
    db: &C,
    node_id: Uuid,
    by_vmid: &mut HashMap<i32, vm::Model>,
    record: GuestRecord,
    now: DateTime<Utc>,
    report: &mut SyncReport,
) -> Result<(), DbErr> {
    let vmid = record.vmid;
    let is_new = !by_vmid.contains_key(&vmid);
    let mut active = match by_vmid.get(&vmid) {
        Some(current) => {
            report.vms_updated += 1;
            current.clone().into_active_model()
        }
        None => {
            report.vms_created += 1;
            vm::ActiveModel {
                id: Set(Uuid::now_v7()),
                node_id: Set(node_id),
                vmid: Set(vmid),
                ip_address: Set(None),
                os_type: Set(None),
                created_at: Set(now),
                ..Default::default()
            }
        }
    };
    active.name = Set(record.name);
    active.status = Set(record.status);
    active.vm_type = Set(record.vm_type);
    active.cpu_cores = Set(record.cpu_cores);
    active.memory_mb = Set(record.memory_mb);
    active.disk_gb = Set(record.disk_gb);
    active.tags = Set(record.tags);
    active.config = Set(record.config);
    active.updated_at = Set(now);

    let saved = if is_new {
        active.insert(db).await?
    } else {
        active.update(db).await?
    };
    by_vmid.insert(vmid, saved);
    Ok(())
}

/// Nodes the listing no longer reports go offline. Their rows and guests are kept.
async fn mark_unreported_offline<C: ConnectionTrait>(
    db: &C,
    reported: &HashSet<String>,
    now: DateTime<Utc>,
) -> Result<u64, DbErr> {
    let result = Node::update_many()
        .col_expr(NodeColumn::Status, Expr::value(NodeStatus::Offline))
        .col_expr(NodeColumn::UpdatedAt, Expr::value(now))
        .filter(NodeColumn::ProxmoxNodeName.is_not_null())
        .filter(NodeColumn::ProxmoxNodeName.is_not_in(reported.iter().cloned()))
        .filter(NodeColumn::Status.ne(NodeStatus::Offline))
        .exec(db)
        .await?;
    if result.rows_affected > 0 {
        warn!(count = result.rows_affected, "Marked unreported nodes offline.");
    }
    Ok(result.rows_affected)
}
