use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub tenant: TenantConfig,
    pub device: DeviceConfig,
    pub storage: StorageConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantConfig {
    /// Tenant domain name, e.g. "iotep.cumulocity.com"
    pub host: String,
    pub port: u16,
    /// Shared bootstrap Authorization header value. The default is the
    /// platform-wide device bootstrap credential.
    pub bootstrap_auth: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Name the managed object is created under
    pub name: String,
    /// Hardware address used as the bootstrap id, e.g. "AA:BB:CC:DD:EE:FF"
    pub hardware_id: String,
    /// Operation identifiers advertised at registration
    #[serde(default)]
    pub supported_operations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// File backing the 512-byte credential region
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Delay between polling cycles while waiting for operator approval
    pub poll_delay_ms: u64,
    /// Per-cycle read deadline before the connection is torn down
    pub read_timeout_ms: u64,
    /// Polling attempt budget; the default is effectively unbounded
    pub max_attempts: u32,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        Ok(config)
    }
}

impl RetryConfig {
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tenant: TenantConfig {
                host: "iotep.cumulocity.com".to_string(),
                port: 443,
                bootstrap_auth: "Basic bWFuYWdlbWVudC9kZXZpY2Vib290c3RyYXA6RmhkdDFiYjFm"
                    .to_string(),
            },
            device: DeviceConfig {
                name: "c8y-uplink-device".to_string(),
                hardware_id: "00:00:00:00:00:00".to_string(),
                supported_operations: Vec::new(),
            },
            storage: StorageConfig {
                path: "credentials.bin".to_string(),
            },
            retry: RetryConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            poll_delay_ms: 3000,
            read_timeout_ms: 10_000,
            max_attempts: u32::MAX,
        }
    }
}
