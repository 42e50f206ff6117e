//! Service liveness probing with SSRF protection.

pub mod health_checker;
pub mod url_guard;

pub use health_checker::{HealthChecker, HealthSweepSummary};
pub use url_guard::{HostResolver, SystemResolver, UrlGuard, UrlValidationError};
