use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{StreamExt, stream};
use reqwest::redirect::Policy;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::url_guard::{PublicOnlyResolver, UrlGuard};
use crate::db::entities::prelude::*;
use crate::db::enums::ServiceStatus;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CONCURRENT_PROBES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeOutcome {
    Healthy,
    Unhealthy,
    Blocked,
}

impl ProbeOutcome {
    fn status(self) -> ServiceStatus {
        match self {
            ProbeOutcome::Healthy => ServiceStatus::Healthy,
            ProbeOutcome::Unhealthy | ProbeOutcome::Blocked => ServiceStatus::Unhealthy,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthSweepSummary {
    pub checked: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    /// Subset of `unhealthy` refused by the URL guard without sending a request.
    pub blocked: usize,
}

pub struct HealthChecker {
    db: DatabaseConnection,
    guard: UrlGuard,
    client: reqwest::Client,
}

impl HealthChecker {
    /// Builds the shared probe client. Redirects are not followed and DNS answers are filtered
    /// through the guard's resolver.
    pub fn new(db: DatabaseConnection, guard: UrlGuard) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .redirect(Policy::none())
            .dns_resolver(Arc::new(PublicOnlyResolver::new(guard.resolver())))
            .build()?;
        Ok(Self::with_client(db, guard, client))
    }

    pub fn with_client(db: DatabaseConnection, guard: UrlGuard, client: reqwest::Client) -> Self {
        Self { db, guard, client }
    }

    /// Probes every service that has a health-check URL and records the result.
    pub async fn check_health(&self) -> Result<HealthSweepSummary, DbErr> {
        let targets: Vec<(Uuid, String)> = Service::find()
            .filter(ServiceColumn::HealthCheckUrl.is_not_null())
            .all(&self.db)
            .await?
            .into_iter()
            .filter_map(|s| s.health_check_url.map(|url| (s.id, url)))
            .collect();

        let outcomes: Vec<(Uuid, ProbeOutcome)> = stream::iter(targets)
            .map(|(id, url)| async move { (id, self.probe_service(id, &url).await) })
            .buffer_unordered(MAX_CONCURRENT_PROBES)
            .collect()
            .await;

        let checked_at = Utc::now();
        let mut summary = HealthSweepSummary {
            checked: outcomes.len(),
            ..Default::default()
        };

        let txn = self.db.begin().await?;
        for (id, outcome) in &outcomes {
            match outcome {
                ProbeOutcome::Healthy => summary.healthy += 1,
                ProbeOutcome::Unhealthy => summary.unhealthy += 1,
                ProbeOutcome::Blocked => {
                    summary.unhealthy += 1;
                    summary.blocked += 1;
                }
            }
            Service::update_many()
                .col_expr(ServiceColumn::Status, Expr::value(outcome.status()))
                .col_expr(ServiceColumn::LastHealthCheck, Expr::value(checked_at))
                .col_expr(ServiceColumn::UpdatedAt, Expr::value(checked_at))
                .filter(ServiceColumn::Id.eq(*id))
                .exec(&txn)
                .await?;
        }
        txn.commit().await?;

        info!(
            checked = summary.checked,
            healthy = summary.healthy,
            unhealthy = summary.unhealthy,
            blocked = summary.blocked,
            "Health check sweep complete."
        );
        Ok(summary)
    }

    async fn probe_service(&self, id: Uuid, url: &str) -> ProbeOutcome {
        if !self.guard.is_url_safe(url).await {
            return ProbeOutcome::Blocked;
        }
        match probe(&self.client, url).await {
            ServiceStatus::Healthy => ProbeOutcome::Healthy,
            _ => {
                debug!(service_id = %id, url, "Service probe failed.");
                ProbeOutcome::Unhealthy
            }
        }
    }
}

/// One GET: any status below 400 is healthy; errors and timeouts are unhealthy.
pub async fn probe(client: &reqwest::Client, url: &str) -> ServiceStatus {
    match client.get(url).send().await {
        Ok(resp) if resp.status().as_u16() < 400 => ServiceStatus::Healthy,
        Ok(resp) => {
            debug!(url, status = resp.status().as_u16(), "Probe returned error status.");
            ServiceStatus::Unhealthy
        }
        Err(e) => {
            debug!(url, error = %e, "Probe request failed.");
            ServiceStatus::Unhealthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::service;
    use crate::db::services::service_catalog_service::create_service;
    use crate::test_support::{StaticResolver, test_db};
    use crate::web::models::service_models::CreateService;
    use axum::{Router, http::StatusCode, routing::get};
    use std::net::SocketAddr;

    const PUBLIC_NAME: &str = "status.example.com";

    async fn spawn_target() -> SocketAddr {
        let app = Router::new()
            .route("/ok", get(|| async { "fine" }))
            .route("/moved", get(|| async { (StatusCode::FOUND, [("location", "/ok")]) }))
            .route("/down", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    /// The guard sees a public answer while the client is pinned to the local test server.
    fn checker(db: &DatabaseConnection, target: SocketAddr) -> HealthChecker {
        let guard = UrlGuard::new(Arc::new(
            StaticResolver::new()
                .with(PUBLIC_NAME, &["93.184.216.34"])
                .with("internal.example.com", &["127.0.0.1"]),
        ));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(300))
            .redirect(Policy::none())
            .resolve(PUBLIC_NAME, target)
            .build()
            .unwrap();
        HealthChecker::with_client(db.clone(), guard, client)
    }

    async fn add(db: &DatabaseConnection, name: &str, url: Option<String>) -> service::Model {
        create_service(
            db,
            CreateService {
                name: name.to_string(),
                description: Some(format!("{name} service")),
                service_type: "vm".to_string(),
                health_check_url: url,
                vm_id: None,
                namespace: Some("prod".to_string()),
                metadata: Some(serde_json::json!({"team": "infra"})),
            },
        )
        .await
        .unwrap()
    }

    async fn reload(db: &DatabaseConnection, id: Uuid) -> service::Model {
        Service::find_by_id(id).one(db).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn classifies_probe_results() {
        let db = test_db().await;
        let target = spawn_target().await;
        let port = target.port();
        let ok = add(&db, "ok", Some(format!("http://{PUBLIC_NAME}:{port}/ok"))).await;
        let moved = add(&db, "moved", Some(format!("http://{PUBLIC_NAME}:{port}/moved"))).await;
        let down = add(&db, "down", Some(format!("http://{PUBLIC_NAME}:{port}/down"))).await;
        let slow = add(&db, "slow", Some(format!("http://{PUBLIC_NAME}:{port}/slow"))).await;

        let summary = checker(&db, target).check_health().await.unwrap();
        assert_eq!(
            summary,
            HealthSweepSummary {
                checked: 4,
                healthy: 2,
                unhealthy: 2,
                blocked: 0,
            }
        );
        assert_eq!(reload(&db, ok.id).await.status, ServiceStatus::Healthy);
        assert_eq!(reload(&db, moved.id).await.status, ServiceStatus::Healthy);
        assert_eq!(reload(&db, down.id).await.status, ServiceStatus::Unhealthy);
        assert_eq!(reload(&db, slow.id).await.status, ServiceStatus::Unhealthy);
    }

    #[tokio::test]
    async fn names_resolving_inward_are_blocked() {
        let db = test_db().await;
        let target = spawn_target().await;
        let sneaky = add(
            &db,
            "sneaky",
            Some(format!("http://internal.example.com:{}/ok", target.port())),
        )
        .await;

        let summary = checker(&db, target).check_health().await.unwrap();
        assert_eq!(summary.blocked, 1);
        assert_eq!(summary.unhealthy, 1);

        let after = reload(&db, sneaky.id).await;
        assert_eq!(after.status, ServiceStatus::Unhealthy);
        assert!(after.last_health_check.is_some());
    }

    #[tokio::test]
    async fn sweep_only_touches_health_fields() {
        let db = test_db().await;
        let target = spawn_target().await;
        let probed = add(
            &db,
            "probed",
            Some(format!("http://{PUBLIC_NAME}:{}/ok", target.port())),
        )
        .await;
        let unprobed = add(&db, "no-url", None).await;

        checker(&db, target).check_health().await.unwrap();

        let after = reload(&db, probed.id).await;
        assert_eq!(after.status, ServiceStatus::Healthy);
        assert!(after.last_health_check.is_some());
        assert_eq!(
            service::Model {
                status: probed.status,
                last_health_check: None,
                updated_at: probed.updated_at,
                ..after
            },
            probed
        );
        assert_eq!(reload(&db, unprobed.id).await, unprobed);
    }
}
