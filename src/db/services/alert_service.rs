//! Alert listing and alert-rule storage. Rules are stored only; nothing here evaluates them.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, DeleteResult, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::db::entities::alert_rule::ChannelList;
use crate::db::entities::{alert, alert_rule, prelude::*};
use crate::db::enums::AlertStatus;
use crate::web::models::alert_models::{CreateAlertRule, UpdateAlertRule};

/// Alerts newest first, optionally narrowed to one status.
pub async fn list_alerts<C: ConnectionTrait>(
    db: &C,
    status: Option<AlertStatus>,
) -> Result<Vec<alert::Model>, DbErr> {
    let mut query = Alert::find();
    if let Some(status) = status {
        query = query.filter(AlertColumn::Status.eq(status));
    }
    query.order_by_desc(AlertColumn::FiredAt).all(db).await
}

pub async fn list_rules<C: ConnectionTrait>(db: &C) -> Result<Vec<alert_rule::Model>, DbErr> {
    AlertRule::find()
        .order_by_asc(AlertRuleColumn::Name)
        .all(db)
        .await
}

pub async fn create_rule<C: ConnectionTrait>(
    db: &C,
    data: CreateAlertRule,
) -> Result<alert_rule::Model, DbErr> {
    let now = Utc::now();
    alert_rule::ActiveModel {
        id: Set(Uuid::now_v7()),
        name: Set(data.name),
        description: Set(data.description),
        metric_name: Set(data.metric_name),
        condition: Set(data.condition),
        threshold: Set(data.threshold),
        duration_seconds: Set(data.duration_seconds),
        severity: Set(data.severity),
        enabled: Set(data.enabled),
        notification_channels: Set(data.notification_channels.map(ChannelList)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
}

pub async fn update_rule<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    data: UpdateAlertRule,
) -> Result<Option<alert_rule::Model>, DbErr> {
    let Some(existing) = AlertRule::find_by_id(id).one(db).await? else {
        return Ok(None);
    };
    let mut active = existing.into_active_model();

    if let Some(name) = data.name {
        active.name = Set(name);
    }
    if let Some(description) = data.description {
        active.description = Set(description);
    }
    if let Some(metric_name) = data.metric_name {
        active.metric_name = Set(metric_name);
    }
    if let Some(condition) = data.condition {
        active.condition = Set(condition);
    }
    if let Some(threshold) = data.threshold {
        active.threshold = Set(threshold);
    }
    if let Some(duration) = data.duration_seconds {
        active.duration_seconds = Set(duration);
    }
    if let Some(severity) = data.severity {
        active.severity = Set(severity);
    }
    if let Some(enabled) = data.enabled {
        active.enabled = Set(enabled);
    }
    if let Some(channels) = data.notification_channels {
        active.notification_channels = Set(channels.map(ChannelList));
    }
    active.updated_at = Set(Utc::now());

    active.update(db).await.map(Some)
}

/// Deleting a rule cascades to the alerts it fired.
pub async fn delete_rule<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<DeleteResult, DbErr> {
    AlertRule::delete_by_id(id).exec(db).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::{AlertCondition, AlertSeverity, SourceType};
    use crate::test_support::test_db;
    use chrono::Duration;

    fn cpu_rule() -> CreateAlertRule {
        CreateAlertRule {
            name: "cpu hot".to_string(),
            description: None,
            metric_name: "cpu_usage".to_string(),
            condition: AlertCondition::Gt,
            threshold: 90.0,
            duration_seconds: 0,
            severity: AlertSeverity::Warning,
            enabled: true,
            notification_channels: Some(vec!["ops".to_string()]),
        }
    }

    async fn fire<C: ConnectionTrait>(
        db: &C,
        rule_id: Uuid,
        status: AlertStatus,
        fired_at: chrono::DateTime<Utc>,
    ) {
        alert::ActiveModel {
            id: Set(Uuid::now_v7()),
            rule_id: Set(rule_id),
            source_type: Set(SourceType::Vm),
            source_id: Set(Uuid::now_v7()),
            severity: Set(AlertSeverity::Warning),
            status: Set(status),
            title: Set("cpu hot".to_string()),
            description: Set(None),
            fired_at: Set(fired_at),
            acknowledged_at: Set(None),
            resolved_at: Set(None),
        }
        .insert(db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn alerts_filter_by_status_newest_first() {
        let db = test_db().await;
        let rule = create_rule(&db, cpu_rule()).await.unwrap();
        let now = Utc::now();
        fire(&db, rule.id, AlertStatus::Firing, now - Duration::minutes(10)).await;
        fire(&db, rule.id, AlertStatus::Firing, now).await;
        fire(&db, rule.id, AlertStatus::Resolved, now).await;

        let firing = list_alerts(&db, Some(AlertStatus::Firing)).await.unwrap();
        assert_eq!(firing.len(), 2);
        assert!(firing[0].fired_at >= firing[1].fired_at);
        assert_eq!(list_alerts(&db, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rule_update_is_partial() {
        let db = test_db().await;
        let rule = create_rule(&db, cpu_rule()).await.unwrap();
        let updated = update_rule(
            &db,
            rule.id,
            UpdateAlertRule {
                threshold: Some(75.5),
                notification_channels: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(updated.threshold, 75.5);
        assert_eq!(updated.metric_name, "cpu_usage");
        assert_eq!(updated.notification_channels, None);

        assert_eq!(delete_rule(&db, rule.id).await.unwrap().rows_affected, 1);
        assert!(list_rules(&db).await.unwrap().is_empty());
    }
}
