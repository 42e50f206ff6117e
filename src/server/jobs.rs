//! Binds the background services to the scheduler.

use async_trait::async_trait;

use super::scheduler::{JobError, PeriodicJob};
use crate::health::HealthChecker;
use crate::reconciliation::InfrastructureSyncService;
use crate::telemetry::MetricsCollector;

#[async_trait]
impl PeriodicJob for InfrastructureSyncService {
    fn name(&self) -> &'static str {
        "sync_infrastructure"
    }

    async fn run(&self) -> Result<(), JobError> {
        self.reconcile().await?;
        Ok(())
    }
}

#[async_trait]
impl PeriodicJob for MetricsCollector {
    fn name(&self) -> &'static str {
        "collect_metrics"
    }

    async fn run(&self) -> Result<(), JobError> {
        self.collect_metrics().await?;
        Ok(())
    }
}

#[async_trait]
impl PeriodicJob for HealthChecker {
    fn name(&self) -> &'static str {
        "check_health"
    }

    async fn run(&self) -> Result<(), JobError> {
        self.check_health().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::server::scheduler::{RunOutcome, ScheduledTask, TaskSchedule};
    use crate::test_support::{FakeClusterClient, cluster_node, test_db};

    #[tokio::test]
    async fn sync_job_runs_reconciliation() {
        let db = test_db().await;
        let cluster = Arc::new(FakeClusterClient::default());
        cluster.set_nodes(vec![cluster_node("pve1")]);
        let service = Arc::new(InfrastructureSyncService::new(db.clone(), cluster));
        assert_eq!(service.name(), "sync_infrastructure");

        let task = ScheduledTask::new(
            service,
            TaskSchedule {
                interval: Duration::from_secs(30),
                retry: Default::default(),
                budget: Default::default(),
            },
        );
        assert_eq!(task.run_once().await, RunOutcome::Succeeded { attempts: 1 });

        let nodes = crate::db::services::infrastructure_service::list_nodes(&db)
            .await
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].hostname, "pve1");
    }
}
