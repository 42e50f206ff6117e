//! SeaORM entities backing the infrastructure mirror, telemetry and alerting tables.

pub mod alert;
pub mod alert_rule;
pub mod metric;
pub mod node;
pub mod service;
pub mod vm;

// Prelude module for easy importing of all entities and their related types
pub mod prelude {
    pub use super::node::ActiveModel as NodeActiveModel;
    pub use super::node::Column as NodeColumn;
    pub use super::node::Entity as Node;
    pub use super::node::Model as NodeModel;

    pub use super::vm::ActiveModel as VmActiveModel;
    pub use super::vm::Column as VmColumn;
    pub use super::vm::Entity as Vm;
    pub use super::vm::Model as VmModel;

    pub use super::metric::ActiveModel as MetricActiveModel;
    pub use super::metric::Column as MetricColumn;
    pub use super::metric::Entity as Metric;
    pub use super::metric::Model as MetricModel;

    pub use super::service::ActiveModel as ServiceActiveModel;
    pub use super::service::Column as ServiceColumn;
    pub use super::service::Entity as Service;
    pub use super::service::Model as ServiceModel;

    pub use super::alert_rule::ActiveModel as AlertRuleActiveModel;
    pub use super::alert_rule::Column as AlertRuleColumn;
    pub use super::alert_rule::Entity as AlertRule;
    pub use super::alert_rule::Model as AlertRuleModel;

    pub use super::alert::ActiveModel as AlertActiveModel;
    pub use super::alert::Column as AlertColumn;
    pub use super::alert::Entity as Alert;
    pub use super::alert::Model as AlertModel;
}
