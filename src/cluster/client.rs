use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::models::{
    ApiResponse, ClusterNode, GuestConfig, GuestStatus, GuestSummary, NetworkInterface,
    NodeStatusDetail, StoragePool,
};

/// Failures talking to the cluster. Never escapes the adapter: callers see empty values instead.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Invalid cluster configuration: {0}")]
    InvalidConfig(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Cluster returned no task id for {0}")]
    MissingTask(String),
}

/// Read and lifecycle operations against the hypervisor cluster.
///
/// Every method degrades to an empty value on transport or protocol failure so a single flaky
/// node never aborts a whole reconciliation pass.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn list_nodes(&self) -> Vec<ClusterNode>;
    async fn get_node_status(&self, node: &str) -> NodeStatusDetail;
    async fn list_network_interfaces(&self, node: &str) -> Vec<NetworkInterface>;
    async fn list_storage(&self, node: &str) -> Vec<StoragePool>;
    async fn list_vms(&self, node: &str) -> Vec<GuestSummary>;
    async fn list_containers(&self, node: &str) -> Vec<GuestSummary>;
    async fn get_vm_status(&self, node: &str, vmid: i32) -> Option<GuestStatus>;
    async fn get_vm_config(&self, node: &str, vmid: i32) -> GuestConfig;
    /// Returns the task UPID on success.
    async fn start_vm(&self, node: &str, vmid: i32) -> Option<String>;
    async fn stop_vm(&self, node: &str, vmid: i32) -> Option<String>;
    /// Reboots the guest.
    async fn restart_vm(&self, node: &str, vmid: i32) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct ProxmoxConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub token_name: String,
    pub token_value: String,
    pub verify_ssl: bool,
    pub timeout: Duration,
}

impl ProxmoxConfig {
    fn auth_header(&self) -> String {
        format!(
            "PVEAPIToken={}!{}={}",
            self.user, self.token_name, self.token_value
        )
    }
}

/// `reqwest`-backed [`ClusterClient`] for `https://{host}:{port}/api2/json`.
pub struct ProxmoxClient {
    config: ProxmoxConfig,
    base_url: Result<Url, String>,
    http: OnceCell<reqwest::Client>,
}

impl ProxmoxClient {
    pub fn new(config: ProxmoxConfig) -> Self {
        let base_url = Url::parse(&format!("https://{}:{}/api2/json", config.host, config.port))
            .map_err(|e| format!("invalid Proxmox host '{}': {e}", config.host));
        Self {
            config,
            base_url,
            http: OnceCell::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(config: ProxmoxConfig, base_url: Url) -> Self {
        Self {
            config,
            base_url: Ok(base_url),
            http: OnceCell::new(),
        }
    }

    /// Built on first use, then shared for the lifetime of this client.
    fn http(&self) -> Result<&reqwest::Client, ClusterError> {
        self.http.get_or_try_init(|| {
            let mut auth = HeaderValue::from_str(&self.config.auth_header())
                .map_err(|e| ClusterError::InvalidConfig(format!("API token: {e}")))?;
            auth.set_sensitive(true);
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, auth);

            let client = reqwest::Client::builder()
                .default_headers(headers)
                .danger_accept_invalid_certs(!self.config.verify_ssl)
                .timeout(self.config.timeout)
                .build()?;
            info!(
                host = %self.config.host,
                port = self.config.port,
                "Proxmox API client initialized."
            );
            Ok(client)
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClusterError> {
        let mut url = self
            .base_url
            .clone()
            .map_err(ClusterError::InvalidConfig)?;
        url.path_segments_mut()
            .map_err(|_| ClusterError::InvalidConfig("base URL cannot carry a path".to_string()))?
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ClusterError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        let body: ApiResponse<T> = self
            .http()?
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.data)
    }

    async fn post_action(&self, segments: &[&str]) -> Result<String, ClusterError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "POST");
        let body: ApiResponse<Option<String>> = self
            .http()?
            .post(url.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        body.data
            .ok_or_else(|| ClusterError::MissingTask(url.path().to_string()))
    }

    async fn guest_action(&self, node: &str, vmid: i32, action: &str) -> Option<String> {
        let id = vmid.to_string();
        match self
            .post_action(&["nodes", node, "qemu", &id, "status", action])
            .await
        {
            Ok(upid) => {
                info!(node, vmid, action, upid = %upid, "Guest lifecycle action accepted.");
                Some(upid)
            }
            Err(e) => {
                warn!(node, vmid, action, error = %e, "Guest lifecycle action failed.");
                None
            }
        }
    }
}

/// Logs a failed read and substitutes the fallback.
fn or_degraded<T>(result: Result<T, ClusterError>, what: &str, node: Option<&str>, fallback: T) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(node = node.unwrap_or("-"), error = %e, "Failed to fetch {what} from Proxmox.");
            fallback
        }
    }
}

#[async_trait]
impl ClusterClient for ProxmoxClient {
    async fn list_nodes(&self) -> Vec<ClusterNode> {
        or_degraded(self.get(&["nodes"]).await, "node list", None, Vec::new())
    }

    async fn get_node_status(&self, node: &str) -> NodeStatusDetail {
        or_degraded(
            self.get(&["nodes", node, "status"]).await,
            "node status",
            Some(node),
            NodeStatusDetail::default(),
        )
    }

    async fn list_network_interfaces(&self, node: &str) -> Vec<NetworkInterface> {
        or_degraded(
            self.get(&["nodes", node, "network"]).await,
            "network interfaces",
            Some(node),
            Vec::new(),
        )
    }

    async fn list_storage(&self, node: &str) -> Vec<StoragePool> {
        or_degraded(
            self.get(&["nodes", node, "storage"]).await,
            "storage pools",
            Some(node),
            Vec::new(),
        )
    }

    async fn list_vms(&self, node: &str) -> Vec<GuestSummary> {
        or_degraded(
            self.get(&["nodes", node, "qemu"]).await,
            "VM list",
            Some(node),
            Vec::new(),
        )
    }

    async fn list_containers(&self, node: &str) -> Vec<GuestSummary> {
        or_degraded(
            self.get(&["nodes", node, "lxc"]).await,
            "container list",
            Some(node),
            Vec::new(),
        )
    }

    async fn get_vm_status(&self, node: &str, vmid: i32) -> Option<GuestStatus> {
        let id = vmid.to_string();
        or_degraded(
            self.get(&["nodes", node, "qemu", &id, "status", "current"])
                .await
                .map(Some),
            "VM status",
            Some(node),
            None,
        )
    }

    async fn get_vm_config(&self, node: &str, vmid: i32) -> GuestConfig {
        let id = vmid.to_string();
        or_degraded(
            self.get(&["nodes", node, "qemu", &id, "config"]).await,
            "VM config",
            Some(node),
            GuestConfig::new(),
        )
    }

    async fn start_vm(&self, node: &str, vmid: i32) -> Option<String> {
        self.guest_action(node, vmid, "start").await
    }

    async fn stop_vm(&self, node: &str, vmid: i32) -> Option<String> {
        self.guest_action(node, vmid, "stop").await
    }

    async fn restart_vm(&self, node: &str, vmid: i32) -> Option<String> {
        self.guest_action(node, vmid, "reboot").await
    }
}
