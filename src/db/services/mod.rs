pub mod alert_service;
pub mod infrastructure_service;
pub mod metric_service;
pub mod service_catalog_service;
