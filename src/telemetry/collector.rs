use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, TransactionTrait,
};
use tracing::{debug, info};
use uuid::Uuid;

use super::vm_metrics::VmMetrics;
use crate::cluster::ClusterClient;
use crate::db::entities::{metric, node, prelude::*};

/// Samples every running VM and appends the derived usage metrics.
pub struct MetricsCollector {
    db: DatabaseConnection,
    cluster: Arc<dyn ClusterClient>,
}

impl MetricsCollector {
    pub fn new(db: DatabaseConnection, cluster: Arc<dyn ClusterClient>) -> Self {
        Self { db, cluster }
    }

    /// Returns the number of VMs that produced a sample.
    pub async fn collect_metrics(&self) -> Result<usize, DbErr> {
        let running = Vm::find()
            .filter(VmColumn::Status.eq("running"))
            .all(&self.db)
            .await?;
        if running.is_empty() {
            debug!("No running VMs to sample.");
            return Ok(0);
        }

        let node_ids: Vec<Uuid> = running.iter().map(|v| v.node_id).collect();
        let nodes: HashMap<Uuid, node::Model> = Node::find()
            .filter(NodeColumn::Id.is_in(node_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|n| (n.id, n))
            .collect();

        let sampled_at = Utc::now();
        let mut rows: Vec<metric::ActiveModel> = Vec::with_capacity(running.len() * 5);
        let mut sampled = 0usize;

        for vm in &running {
            let Some(node_name) = nodes
                .get(&vm.node_id)
                .and_then(|n| n.proxmox_node_name.as_deref())
            else {
                debug!(vm_id = %vm.id, vmid = vm.vmid, "Owning node unknown or unaddressable; skipping.");
                continue;
            };
            let Some(status) = self.cluster.get_vm_status(node_name, vm.vmid).await else {
                debug!(node = node_name, vmid = vm.vmid, "No live status; skipping.");
                continue;
            };
            rows.extend(VmMetrics::from_status(vm.vmid, &status).to_metric_rows(vm.id, sampled_at));
            sampled += 1;
        }

        if !rows.is_empty() {
            let txn = self.db.begin().await?;
            Metric::insert_many(rows).exec(&txn).await?;
            txn.commit().await?;
        }

        info!(running = running.len(), sampled, "Collected VM metrics.");
        Ok(sampled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::models::GuestStatus;
    use crate::db::enums::{SourceType, VmType};
    use crate::test_support::{FakeClusterClient, insert_node, insert_vm, test_db};
    use sea_orm::{ActiveModelTrait, IntoActiveModel, QueryOrder, Set};

    fn live(cpu: f64) -> GuestStatus {
        GuestStatus {
            status: Some("running".to_string()),
            cpu: Some(cpu),
            mem: Some(512 << 20),
            maxmem: Some(2048 << 20),
            disk: Some(8 << 30),
            maxdisk: Some(32 << 30),
            netin: Some(10_000),
            netout: Some(20_000),
            uptime: Some(42),
        }
    }

    #[tokio::test]
    async fn appends_five_samples_per_running_vm() {
        let db = test_db().await;
        let fake = Arc::new(FakeClusterClient::new());
        let node = insert_node(&db, "pve1").await;
        let running = insert_vm(&db, node.id, 101, VmType::Qemu, "running").await;
        insert_vm(&db, node.id, 102, VmType::Qemu, "stopped").await;
        let silent = insert_vm(&db, node.id, 103, VmType::Qemu, "running").await;
        fake.set_guest_status("pve1", 101, live(0.125));
        fake.set_guest_status("pve1", 102, live(0.9));

        let collector = MetricsCollector::new(db.clone(), fake.clone());
        assert_eq!(collector.collect_metrics().await.unwrap(), 1);

        let samples = Metric::find()
            .order_by_asc(MetricColumn::MetricName)
            .all(&db)
            .await
            .unwrap();
        assert_eq!(samples.len(), 5);
        assert!(samples.iter().all(|m| m.source_id == running.id));
        assert!(samples.iter().all(|m| m.source_type == SourceType::Vm));
        assert!(samples.iter().all(|m| m.timestamp == samples[0].timestamp));
        assert!(samples.iter().all(|m| m.source_id != silent.id));

        let by_name: HashMap<_, _> = samples
            .iter()
            .map(|m| (m.metric_name.as_str(), (m.value, m.unit.as_str())))
            .collect();
        assert_eq!(by_name["cpu_usage"], (12.5, "percent"));
        assert_eq!(by_name["memory_usage"], (25.0, "percent"));
        assert_eq!(by_name["disk_usage"], (25.0, "percent"));
        assert_eq!(by_name["network_in"], (10_000.0, "bytes"));
        assert_eq!(by_name["network_out"], (20_000.0, "bytes"));

        // A second run appends rather than overwriting.
        collector.collect_metrics().await.unwrap();
        assert_eq!(Metric::find().all(&db).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn skips_vms_without_addressable_node() {
        let db = test_db().await;
        let fake = Arc::new(FakeClusterClient::new());
        let node = insert_node(&db, "pve1").await;
        insert_vm(&db, node.id, 101, VmType::Qemu, "running").await;
        fake.set_guest_status("pve1", 101, live(0.1));

        let mut unnamed = node.into_active_model();
        unnamed.proxmox_node_name = Set(None);
        unnamed.update(&db).await.unwrap();

        let collector = MetricsCollector::new(db.clone(), fake);
        assert_eq!(collector.collect_metrics().await.unwrap(), 0);
        assert!(Metric::find().all(&db).await.unwrap().is_empty());
    }
}
