pub mod cluster;
pub mod db;
pub mod health;
pub mod reconciliation;
pub mod server;
pub mod telemetry;
pub mod units;
pub mod version;
pub mod web;

#[cfg(test)]
pub(crate) mod test_support;
