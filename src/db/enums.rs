use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "node_status_enum")]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[sea_orm(string_value = "online")]
    Online,
    #[sea_orm(string_value = "offline")]
    Offline,
}

/// Guest flavour on a Proxmox node: full QEMU virtual machine or LXC container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "vm_type_enum")]
#[serde(rename_all = "lowercase")]
pub enum VmType {
    #[sea_orm(string_value = "qemu")]
    Qemu,
    #[sea_orm(string_value = "lxc")]
    Lxc,
}

impl VmType {
    /// Prefix used to name guests the cluster reports without a name (`vm-101`, `ct-200`).
    pub fn default_name_prefix(&self) -> &'static str {
        match self {
            VmType::Qemu => "vm",
            VmType::Lxc => "ct",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "service_status_enum")]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    #[sea_orm(string_value = "healthy")]
    Healthy,
    #[sea_orm(string_value = "unhealthy")]
    Unhealthy,
    #[sea_orm(string_value = "unknown")]
    Unknown,
}

/// Kind of entity a metric sample or an alert refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "source_type_enum")]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[sea_orm(string_value = "node")]
    Node,
    #[sea_orm(string_value = "vm")]
    Vm,
    #[sea_orm(string_value = "service")]
    Service,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "alert_condition_enum")]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    #[sea_orm(string_value = "gt")]
    Gt,
    #[sea_orm(string_value = "lt")]
    Lt,
    #[sea_orm(string_value = "gte")]
    Gte,
    #[sea_orm(string_value = "lte")]
    Lte,
    #[sea_orm(string_value = "eq")]
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "alert_severity_enum")]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    #[sea_orm(string_value = "info")]
    Info,
    #[sea_orm(string_value = "warning")]
    Warning,
    #[sea_orm(string_value = "critical")]
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "alert_status_enum")]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    #[sea_orm(string_value = "firing")]
    Firing,
    #[sea_orm(string_value = "acknowledged")]
    Acknowledged,
    #[sea_orm(string_value = "resolved")]
    Resolved,
}

macro_rules! display_as_db_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.to_value())
                }
            }
        )*
    };
}

display_as_db_value!(
    NodeStatus,
    VmType,
    ServiceStatus,
    SourceType,
    AlertCondition,
    AlertSeverity,
    AlertStatus,
);
