pub mod alert_routes;
pub mod infrastructure_routes;
pub mod metrics_routes;
pub mod service_routes;
