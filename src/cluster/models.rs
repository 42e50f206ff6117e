//! Plain records decoded from Proxmox API payloads.
//!
//! Proxmox is loose about numeric types: `vmid`, byte counters and even CPU fractions show up as
//! JSON numbers on one endpoint and as strings on another, so every numeric field goes through
//! [`flexible`].

use serde::{Deserialize, Serialize};

/// Every Proxmox response body is wrapped as `{"data": ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// One entry of `GET /nodes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub node: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "flexible::opt_f64")]
    pub cpu: Option<f64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub maxcpu: Option<u64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub mem: Option<u64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub maxmem: Option<u64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub disk: Option<u64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub maxdisk: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageInfo {
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub total: Option<u64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub used: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuInfo {
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub cores: Option<u64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub cpus: Option<u64>,
}

/// `GET /nodes/{node}/status`. Defaults to all-empty when the node cannot be queried.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStatusDetail {
    #[serde(default)]
    pub memory: Option<UsageInfo>,
    #[serde(default)]
    pub rootfs: Option<UsageInfo>,
    #[serde(default)]
    pub cpuinfo: Option<CpuInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterface {
    #[serde(default)]
    pub iface: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoragePool {
    #[serde(default)]
    pub storage: Option<String>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub total: Option<u64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub used: Option<u64>,
}

/// One entry of `GET /nodes/{node}/qemu` or `GET /nodes/{node}/lxc`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuestSummary {
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub vmid: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub maxcpu: Option<u64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub cpus: Option<u64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub maxmem: Option<u64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub maxdisk: Option<u64>,
    /// `;`-delimited tag list, e.g. `"prod;web"`.
    #[serde(default)]
    pub tags: Option<String>,
}

impl GuestSummary {
    /// Guest id clamped into the storage column's range. A missing id maps to 0.
    pub fn vmid(&self) -> i32 {
        self.vmid
            .map(|id| i32::try_from(id).unwrap_or(i32::MAX))
            .unwrap_or(0)
    }
}

/// `GET /nodes/{node}/qemu/{vmid}/status/current`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuestStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "flexible::opt_f64")]
    pub cpu: Option<f64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub mem: Option<u64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub maxmem: Option<u64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub disk: Option<u64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub maxdisk: Option<u64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub netin: Option<u64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub netout: Option<u64>,
    #[serde(default, deserialize_with = "flexible::opt_u64")]
    pub uptime: Option<u64>,
}

/// `GET /nodes/{node}/qemu/{vmid}/config` is an open-ended key/value map.
pub type GuestConfig = serde_json::Map<String, serde_json::Value>;

pub mod flexible {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Unsigned(u64),
        Float(f64),
        Text(String),
    }

    pub fn opt_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        let value = Option::<Loose>::deserialize(deserializer)?;
        Ok(value.and_then(|v| match v {
            Loose::Unsigned(n) => Some(n),
            Loose::Float(f) if f.is_finite() && f >= 0.0 => Some(f as u64),
            Loose::Float(_) => None,
            Loose::Text(s) => {
                let s = s.trim();
                s.parse::<u64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64))
            }
        }))
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        let value = Option::<Loose>::deserialize(deserializer)?;
        Ok(value.and_then(|v| match v {
            Loose::Unsigned(n) => Some(n as f64),
            Loose::Float(f) => Some(f),
            Loose::Text(s) => s.trim().parse::<f64>().ok(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_numbers_as_strings() {
        let guest: GuestSummary = serde_json::from_value(json!({
            "vmid": "105",
            "name": "web",
            "maxmem": 2147483648u64,
            "maxdisk": "34359738368",
            "tags": "prod;web"
        }))
        .unwrap();
        assert_eq!(guest.vmid(), 105);
        assert_eq!(guest.maxmem, Some(2147483648));
        assert_eq!(guest.maxdisk, Some(34359738368));
        assert_eq!(guest.maxcpu, None);
    }

    #[test]
    fn unwraps_data_envelope() {
        let body = json!({"data": [{"node": "pve1", "status": "online", "cpu": "0.25", "maxcpu": 8}]});
        let parsed: ApiResponse<Vec<ClusterNode>> = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.data.len(), 1);
        assert_eq!(parsed.data[0].cpu, Some(0.25));
        assert_eq!(parsed.data[0].maxcpu, Some(8));
        assert_eq!(parsed.data[0].mem, None);
    }

    #[test]
    fn garbage_numbers_become_none() {
        let status: GuestStatus =
            serde_json::from_value(json!({"cpu": "n/a", "mem": -5, "netin": null})).unwrap();
        assert_eq!(status.cpu, None);
        assert_eq!(status.mem, None);
        assert_eq!(status.netin, None);
    }
}
