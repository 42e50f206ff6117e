use serde::Deserialize;

use crate::db::enums::{AlertCondition, AlertSeverity, AlertStatus};
use crate::web::models::double_option;

fn default_severity() -> AlertSeverity {
    AlertSeverity::Warning
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAlertRule {
    pub name: String,
    pub description: Option<String>,
    pub metric_name: String,
    pub condition: AlertCondition,
    pub threshold: f64,
    #[serde(default)]
    pub duration_seconds: i32,
    #[serde(default = "default_severity")]
    pub severity: AlertSeverity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub notification_channels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAlertRule {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub metric_name: Option<String>,
    pub condition: Option<AlertCondition>,
    pub threshold: Option<f64>,
    pub duration_seconds: Option<i32>,
    pub severity: Option<AlertSeverity>,
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub notification_channels: Option<Option<Vec<String>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertListQuery {
    pub status: Option<AlertStatus>,
}
