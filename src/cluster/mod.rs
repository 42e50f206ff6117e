//! Adapter to the Proxmox VE control-plane API.

pub mod client;
pub mod models;

pub use client::{ClusterClient, ClusterError, ProxmoxClient, ProxmoxConfig};
