//! Merges authoritative cluster state into the node/VM mirror.

pub mod node_snapshot;
pub mod sync_service;

pub use sync_service::{InfrastructureSyncService, SyncError, SyncReport};
