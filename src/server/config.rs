use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::cluster::ProxmoxConfig;
use crate::server::scheduler::{RetryPolicy, TaskBudget, TaskSchedule};

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    pub proxmox_host: String,
    #[serde(default = "default_proxmox_port")]
    pub proxmox_port: u16,
    pub proxmox_user: String,
    pub proxmox_token_name: String,
    pub proxmox_token_value: String,
    #[serde(default)]
    pub proxmox_verify_ssl: bool,
    #[serde(default = "default_proxmox_timeout")]
    pub proxmox_timeout_seconds: u64,

    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// Threads for the background job runtime. `None` lets tokio decide.
    #[serde(default)]
    pub worker_threads: Option<usize>,

    #[serde(default = "default_interval")]
    pub sync_interval_seconds: u64,
    #[serde(default = "default_interval")]
    pub metrics_interval_seconds: u64,
    #[serde(default = "default_interval")]
    pub health_interval_seconds: u64,
    #[serde(default = "default_sync_retry_delay")]
    pub sync_retry_delay_seconds: u64,
    #[serde(default = "default_retry_delay")]
    pub metrics_retry_delay_seconds: u64,
    #[serde(default = "default_retry_delay")]
    pub health_retry_delay_seconds: u64,
    #[serde(default = "default_soft_limit")]
    pub job_soft_limit_seconds: u64,
    #[serde(default = "default_hard_limit")]
    pub job_hard_limit_seconds: u64,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug, Clone)]
pub struct PartialServerConfig {
    database_url: Option<String>,
    listen_addr: Option<String>,
    proxmox_host: Option<String>,
    proxmox_port: Option<u16>,
    proxmox_user: Option<String>,
    proxmox_token_name: Option<String>,
    proxmox_token_value: Option<String>,
    proxmox_verify_ssl: Option<bool>,
    proxmox_timeout_seconds: Option<u64>,
    cors_origins: Option<Vec<String>>,
    log_dir: Option<String>,
    worker_threads: Option<usize>,
    sync_interval_seconds: Option<u64>,
    metrics_interval_seconds: Option<u64>,
    health_interval_seconds: Option<u64>,
    sync_retry_delay_seconds: Option<u64>,
    metrics_retry_delay_seconds: Option<u64>,
    health_retry_delay_seconds: Option<u64>,
    job_soft_limit_seconds: Option<u64>,
    job_hard_limit_seconds: Option<u64>,
}

impl PartialServerConfig {
    /// A missing path or file yields an empty layer.
    fn from_file(config_path: Option<&str>) -> Result<Self, String> {
        match config_path {
            Some(path_str) if Path::new(path_str).exists() => {
                let path = Path::new(path_str);
                let contents = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
                toml::from_str(&contents)
                    .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))
            }
            _ => Ok(Self::default()),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_proxmox_port() -> u16 {
    8006
}

fn default_proxmox_timeout() -> u64 {
    15
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_interval() -> u64 {
    30
}

fn default_sync_retry_delay() -> u64 {
    60
}

fn default_retry_delay() -> u64 {
    30
}

fn default_soft_limit() -> u64 {
    240
}

fn default_hard_limit() -> u64 {
    300
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config = PartialServerConfig::from_file(config_path)?;

        // 2. Load from environment variables
        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        // 3. Merge: environment overrides file
        Self::from_layers(file_config, env_config)
    }

    pub fn from_layers(
        file: PartialServerConfig,
        env: PartialServerConfig,
    ) -> Result<Self, String> {
        let config = ServerConfig {
            database_url: env
                .database_url
                .or(file.database_url)
                .ok_or("DATABASE_URL is required")?,
            listen_addr: env
                .listen_addr
                .or(file.listen_addr)
                .unwrap_or_else(default_listen_addr),
            proxmox_host: env
                .proxmox_host
                .or(file.proxmox_host)
                .ok_or("PROXMOX_HOST is required")?,
            proxmox_port: env
                .proxmox_port
                .or(file.proxmox_port)
                .unwrap_or_else(default_proxmox_port),
            proxmox_user: env
                .proxmox_user
                .or(file.proxmox_user)
                .unwrap_or_else(|| "root@pam".to_string()),
            proxmox_token_name: env
                .proxmox_token_name
                .or(file.proxmox_token_name)
                .ok_or("PROXMOX_TOKEN_NAME is required")?,
            proxmox_token_value: env
                .proxmox_token_value
                .or(file.proxmox_token_value)
                .ok_or("PROXMOX_TOKEN_VALUE is required")?,
            proxmox_verify_ssl: env
                .proxmox_verify_ssl
                .or(file.proxmox_verify_ssl)
                .unwrap_or(false),
            proxmox_timeout_seconds: env
                .proxmox_timeout_seconds
                .or(file.proxmox_timeout_seconds)
                .unwrap_or_else(default_proxmox_timeout),
            cors_origins: env.cors_origins.or(file.cors_origins).unwrap_or_default(),
            log_dir: env
                .log_dir
                .or(file.log_dir)
                .unwrap_or_else(default_log_dir),
            worker_threads: env.worker_threads.or(file.worker_threads),
            sync_interval_seconds: env
                .sync_interval_seconds
                .or(file.sync_interval_seconds)
                .unwrap_or_else(default_interval),
            metrics_interval_seconds: env
                .metrics_interval_seconds
                .or(file.metrics_interval_seconds)
                .unwrap_or_else(default_interval),
            health_interval_seconds: env
                .health_interval_seconds
                .or(file.health_interval_seconds)
                .unwrap_or_else(default_interval),
            sync_retry_delay_seconds: env
                .sync_retry_delay_seconds
                .or(file.sync_retry_delay_seconds)
                .unwrap_or_else(default_sync_retry_delay),
            metrics_retry_delay_seconds: env
                .metrics_retry_delay_seconds
                .or(file.metrics_retry_delay_seconds)
                .unwrap_or_else(default_retry_delay),
            health_retry_delay_seconds: env
                .health_retry_delay_seconds
                .or(file.health_retry_delay_seconds)
                .unwrap_or_else(default_retry_delay),
            job_soft_limit_seconds: env
                .job_soft_limit_seconds
                .or(file.job_soft_limit_seconds)
                .unwrap_or_else(default_soft_limit),
            job_hard_limit_seconds: env
                .job_hard_limit_seconds
                .or(file.job_hard_limit_seconds)
                .unwrap_or_else(default_hard_limit),
        };

        if [
            config.sync_interval_seconds,
            config.metrics_interval_seconds,
            config.health_interval_seconds,
        ]
        .contains(&0)
        {
            return Err("Job intervals must be at least one second".to_string());
        }
        if config.job_soft_limit_seconds > config.job_hard_limit_seconds {
            return Err("JOB_SOFT_LIMIT_SECONDS must not exceed JOB_HARD_LIMIT_SECONDS".to_string());
        }
        Ok(config)
    }

    pub fn proxmox(&self) -> ProxmoxConfig {
        ProxmoxConfig {
            host: self.proxmox_host.clone(),
            port: self.proxmox_port,
            user: self.proxmox_user.clone(),
            token_name: self.proxmox_token_name.clone(),
            token_value: self.proxmox_token_value.clone(),
            verify_ssl: self.proxmox_verify_ssl,
            timeout: Duration::from_secs(self.proxmox_timeout_seconds),
        }
    }

    fn budget(&self) -> TaskBudget {
        TaskBudget {
            soft: Duration::from_secs(self.job_soft_limit_seconds),
            hard: Duration::from_secs(self.job_hard_limit_seconds),
        }
    }

    fn schedule(&self, interval_secs: u64, retry_delay_secs: u64) -> TaskSchedule {
        TaskSchedule {
            interval: Duration::from_secs(interval_secs),
            retry: RetryPolicy {
                delay: Duration::from_secs(retry_delay_secs),
                ..RetryPolicy::default()
            },
            budget: self.budget(),
        }
    }

    pub fn sync_schedule(&self) -> TaskSchedule {
        self.schedule(self.sync_interval_seconds, self.sync_retry_delay_seconds)
    }

    pub fn metrics_schedule(&self) -> TaskSchedule {
        self.schedule(self.metrics_interval_seconds, self.metrics_retry_delay_seconds)
    }

    pub fn health_schedule(&self) -> TaskSchedule {
        self.schedule(self.health_interval_seconds, self.health_retry_delay_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_layer() -> PartialServerConfig {
        toml::from_str(
            r#"
            database_url = "postgres://file/db"
            proxmox_host = "pve.file.lan"
            proxmox_token_name = "nexops"
            proxmox_token_value = "from-file"
            cors_origins = ["https://ops.example.com"]
            sync_interval_seconds = 300
            "#,
        )
        .unwrap()
    }

    #[test]
    fn environment_overrides_file() {
        let env = PartialServerConfig {
            proxmox_token_value: Some("from-env".to_string()),
            proxmox_verify_ssl: Some(true),
            ..Default::default()
        };
        let config = ServerConfig::from_layers(file_layer(), env).unwrap();
        assert_eq!(config.database_url, "postgres://file/db");
        assert_eq!(config.proxmox_token_value, "from-env");
        assert!(config.proxmox_verify_ssl);
        assert_eq!(config.cors_origins, vec!["https://ops.example.com".to_string()]);
        assert_eq!(config.sync_interval_seconds, 300);
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let config =
            ServerConfig::from_layers(file_layer(), PartialServerConfig::default()).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8000");
        assert_eq!(config.proxmox_port, 8006);
        assert_eq!(config.proxmox_user, "root@pam");
        assert_eq!(config.proxmox_timeout_seconds, 15);
        assert_eq!(config.metrics_interval_seconds, 30);
        assert_eq!(config.log_dir, "logs");

        let sync = config.sync_schedule();
        assert_eq!(sync.retry.max_attempts, 3);
        assert_eq!(sync.retry.delay, Duration::from_secs(60));
        assert_eq!(config.health_schedule().retry.delay, Duration::from_secs(30));
        assert_eq!(sync.budget.soft, Duration::from_secs(240));
        assert_eq!(sync.budget.hard, Duration::from_secs(300));
        assert_eq!(config.proxmox().timeout, Duration::from_secs(15));
    }

    #[test]
    fn reads_toml_file_layer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            b"proxmox_host = \"pve.lan\"\nhealth_interval_seconds = 120\n",
        )
        .unwrap();
        let layer = PartialServerConfig::from_file(file.path().to_str()).unwrap();
        assert_eq!(layer.proxmox_host.as_deref(), Some("pve.lan"));
        assert_eq!(layer.health_interval_seconds, Some(120));

        let missing = PartialServerConfig::from_file(Some("/nonexistent/nexops.toml")).unwrap();
        assert!(missing.proxmox_host.is_none());

        std::io::Write::write_all(&mut file, b"proxmox_port = \"not a port\"\n").unwrap();
        assert!(PartialServerConfig::from_file(file.path().to_str()).is_err());
    }

    #[test]
    fn missing_required_fields_fail() {
        let err = ServerConfig::from_layers(
            PartialServerConfig::default(),
            PartialServerConfig::default(),
        )
        .unwrap_err();
        assert!(err.contains("DATABASE_URL"));
    }

    #[test]
    fn rejects_inverted_time_limits() {
        let env = PartialServerConfig {
            job_soft_limit_seconds: Some(600),
            ..Default::default()
        };
        assert!(ServerConfig::from_layers(file_layer(), env).is_err());
    }
}
