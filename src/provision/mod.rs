//! Device provisioning state machine
//!
//! Reference: https://cumulocity.com/docs/device-integration/rest/
//!
//! ## How provisioning works:
//! 1. Try the persisted credential record. A hit for the requested host
//!    skips straight to the registration check.
//! 2. Otherwise poll `POST /devicecontrol/deviceCredentials` with the
//!    hardware address until an operator approves the device in the
//!    tenant console and the response carries `tenantId`/`username`/
//!    `password`. A `404` just means "not approved yet".
//! 3. Persist the credentials, then resolve the device id: either load
//!    it from the region or create a managed object via
//!    `POST /inventory/managedObjects/` and scrape the assigned `"id"`.
//! 4. `Registered` exposes a [`DeviceLink`] for the telemetry
//!    dispatcher.
//!
//! Both polling loops open a fresh connection per cycle, wait out a
//! fixed delay between cycles, and run under an explicit attempt budget
//! (`u32::MAX` in production — approval can take as long as the operator
//! does; cancellation is the caller's business).

use std::io;

use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::{DeviceConfig, RetryConfig, TenantConfig};
use crate::store::region::NvRegion;
use crate::store::{CredentialRecord, CredentialStore, StoreError};
use crate::transport::Connect;
use crate::wire::{self, ResponseBuffer};

/// Bootstrap credential endpoint
pub const BOOTSTRAP_PATH: &str = "/devicecontrol/deviceCredentials";

/// Managed object creation endpoint
pub const INVENTORY_PATH: &str = "/inventory/managedObjects/";

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("persisting credentials: {0}")]
    Store(#[from] StoreError),

    #[error("network: {0}")]
    Io(#[from] io::Error),

    #[error("gave up after {0} polling attempts")]
    AttemptsExhausted(u32),

    #[error("hardware id {0:?} is not a hex address")]
    InvalidHardwareId(String),
}

/// Where a session currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unprovisioned,
    AwaitingApproval,
    CredentialsReady,
    Registered,
}

/// Everything the telemetry dispatcher needs from a registered device
#[derive(Debug, Clone)]
pub struct DeviceLink {
    pub host: String,
    /// Base64 `tenantId/username:password`
    pub credentials: String,
    pub device_id: String,
}

impl DeviceLink {
    /// Recover the link for an already provisioned and registered
    /// device straight from the store, without touching the network.
    pub fn from_store<R: NvRegion>(store: &CredentialStore<R>) -> Result<Self, StoreError> {
        let record = store.load()?;
        let device_id = store.load_device_id()?;
        Ok(Self {
            host: record.host,
            credentials: record.credentials,
            device_id,
        })
    }
}

/// Credentials object the tenant returns once the device is approved
#[derive(Debug, Deserialize)]
struct BootstrapCredentials {
    #[serde(rename = "tenantId")]
    tenant_id: String,
    username: String,
    password: String,
}

/// Normalize a hardware address into the bootstrap id form: uppercase
/// hex pairs joined by underscores, `AA_BB_CC_DD_EE_FF`.
pub fn bootstrap_id(hardware_id: &str) -> Result<String, ProvisionError> {
    let compact: String = hardware_id
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '_'))
        .collect();
    let bytes = hex::decode(&compact)
        .map_err(|_| ProvisionError::InvalidHardwareId(hardware_id.to_string()))?;
    if bytes.is_empty() {
        return Err(ProvisionError::InvalidHardwareId(hardware_id.to_string()));
    }
    Ok(bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join("_"))
}

/// Registration body: name, the device marker, and any advertised
/// operations
fn registration_body(name: &str, operations: &[String]) -> String {
    if operations.is_empty() {
        format!(r#"{{"name":"{name}","c8y_IsDevice":"{{}}"}}"#)
    } else {
        let ops = operations
            .iter()
            .map(|op| format!("\"{op}\""))
            .collect::<Vec<_>>()
            .join(",");
        format!(r#"{{"name":"{name}","c8y_IsDevice":"{{}}","c8y_SupportedOperations":[{ops}]}}"#)
    }
}

/// Drives a device from power-on to `Registered`.
///
/// Owns the in-memory credential copy; the store owns the persisted
/// bytes. One session, one device, one tenant.
pub struct ProvisioningSession<C: Connect, R: NvRegion> {
    connector: C,
    store: CredentialStore<R>,
    tenant: TenantConfig,
    device: DeviceConfig,
    retry: RetryConfig,
    state: SessionState,
    record: Option<CredentialRecord>,
}

impl<C: Connect, R: NvRegion> ProvisioningSession<C, R> {
    pub fn new(
        connector: C,
        store: CredentialStore<R>,
        tenant: TenantConfig,
        device: DeviceConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            connector,
            store,
            tenant,
            device,
            retry,
            state: SessionState::Unprovisioned,
            record: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The in-memory copy of the persisted record, once one exists
    pub fn record(&self) -> Option<&CredentialRecord> {
        self.record.as_ref()
    }

    /// Run provisioning to completion: credentials, then registration.
    pub async fn provision(&mut self) -> Result<DeviceLink, ProvisionError> {
        let record = match self.store.load() {
            Ok(record) if record.host == self.tenant.host => {
                info!("Using persisted credentials for {}", record.host);
                record
            }
            Ok(record) => {
                info!(
                    "Host changed ({} -> {}), requesting new device credentials",
                    record.host, self.tenant.host
                );
                self.await_approval().await?
            }
            Err(StoreError::NotFound) => {
                info!("No persisted credentials, requesting device credentials from tenant");
                self.await_approval().await?
            }
            Err(e) => return Err(e.into()),
        };
        self.state = SessionState::CredentialsReady;

        let device_id = match self.store.load_device_id() {
            Ok(id) => {
                debug!("Loaded device id {}", id);
                id
            }
            Err(StoreError::NotFound) => self.register(&record).await?,
            Err(e) => return Err(e.into()),
        };
        self.state = SessionState::Registered;
        info!("Device {} registered with id {}", self.device.name, device_id);

        let link = DeviceLink {
            host: record.host.clone(),
            credentials: record.credentials.clone(),
            device_id,
        };
        self.record = Some(record);
        Ok(link)
    }

    /// Attempt to load existing credentials, then erase the region if
    /// the load failed or the caller forces it. A transient read glitch
    /// therefore cannot silently wipe a valid record.
    ///
    /// Removing the managed object from the tenant would go here; the
    /// network call is not implemented.
    pub fn remove_device(&mut self, force: bool) -> Result<(), ProvisionError> {
        let loaded = self.store.load();
        match &loaded {
            Ok(record) => info!("Credentials for {} are present", record.host),
            Err(_) => warn!("Could not load credentials from the region"),
        }
        if loaded.is_err() || force {
            info!("Erasing credential region");
            self.store.erase()?;
            self.state = SessionState::Unprovisioned;
            self.record = None;
        }
        Ok(())
    }

    /// Bootstrap poll loop: busy-wait for out-of-band operator approval.
    async fn await_approval(&mut self) -> Result<CredentialRecord, ProvisionError> {
        self.state = SessionState::AwaitingApproval;

        let id = bootstrap_id(&self.device.hardware_id)?;
        let body = format!(r#"{{"id":"{id}"}}"#);
        let request = wire::build_request(
            "POST",
            BOOTSTRAP_PATH,
            &self.tenant.host,
            &self.tenant.bootstrap_auth,
            &body,
        );
        info!(
            "Requesting device credentials. Register a device with id {} in your tenant.",
            id
        );

        for attempt in 1..=self.retry.max_attempts {
            match self.bootstrap_cycle(&request).await {
                Ok(Some(credentials)) => {
                    // TooLarge here is fatal: retrying cannot shrink it
                    let record = self.store.save(
                        &self.tenant.host,
                        &credentials.tenant_id,
                        &credentials.username,
                        &credentials.password,
                    )?;
                    info!("Device credentials stored for tenant {}", credentials.tenant_id);
                    return Ok(record);
                }
                Ok(None) => debug!("No credentials yet (attempt {})", attempt),
                Err(e) => warn!("Bootstrap cycle failed: {}", e),
            }
            sleep(self.retry.poll_delay()).await;
        }
        Err(ProvisionError::AttemptsExhausted(self.retry.max_attempts))
    }

    /// One bootstrap cycle: connect, send, read until a terminal
    /// response, connection close, or the read deadline.
    ///
    /// `Ok(None)` means "not approved yet": a 404, non-JSON chatter
    /// until close, or a deadline. Dropping the stream is the teardown.
    async fn bootstrap_cycle(
        &self,
        request: &[u8],
    ) -> Result<Option<BootstrapCredentials>, ProvisionError> {
        let mut stream = self.connector.connect().await?;
        stream.write_all(request).await?;
        stream.flush().await?;

        let mut response = ResponseBuffer::new();
        let mut chunk = [0u8; 1024];
        loop {
            let read = match timeout(self.retry.read_timeout(), stream.read(&mut chunk)).await {
                Ok(Ok(0)) => return Ok(None),
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    debug!("Read deadline hit, tearing the connection down");
                    return Ok(None);
                }
            };
            response.push(&chunk[..read]);

            if response.is_not_found() {
                debug!("Credentials not ready (404)");
                return Ok(None);
            }
            if !response.looks_like_json() {
                // Keep-alive noise; keep waiting
                continue;
            }
            if let Some(body) = response.body() {
                if let Ok(credentials) = serde_json::from_str::<BootstrapCredentials>(body) {
                    return Ok(Some(credentials));
                }
                // Body still arriving (or malformed); keep reading
            }
        }
    }

    /// Create the managed object and persist the assigned id.
    async fn register(&mut self, record: &CredentialRecord) -> Result<String, ProvisionError> {
        let body = registration_body(&self.device.name, &self.device.supported_operations);
        let authorization = format!("Basic {}", record.credentials);
        let request =
            wire::build_request("POST", INVENTORY_PATH, &record.host, &authorization, &body);
        info!("Registering device {} with tenant", self.device.name);

        for attempt in 1..=self.retry.max_attempts {
            match self.registration_cycle(&request).await {
                Ok(Some(id)) => {
                    self.store.save_device_id(&id)?;
                    return Ok(id);
                }
                Ok(None) => debug!("No device id yet (attempt {})", attempt),
                Err(e) => warn!("Registration cycle failed: {}", e),
            }
            sleep(self.retry.poll_delay()).await;
        }
        Err(ProvisionError::AttemptsExhausted(self.retry.max_attempts))
    }

    /// One registration cycle: re-read the response until the `"id"`
    /// marker can be extracted. A connection that closes without it is
    /// retried by the caller rather than spun on forever.
    async fn registration_cycle(&self, request: &[u8]) -> Result<Option<String>, ProvisionError> {
        let mut stream = self.connector.connect().await?;
        stream.write_all(request).await?;
        stream.flush().await?;

        let mut response = ResponseBuffer::new();
        let mut chunk = [0u8; 1024];
        loop {
            let read = match timeout(self.retry.read_timeout(), stream.read(&mut chunk)).await {
                Ok(Ok(0)) => return Ok(None),
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Ok(None),
            };
            response.push(&chunk[..read]);

            if response.is_not_found() {
                return Ok(None);
            }
            // The scraper runs over the whole buffered response; the id
            // marker only occurs in the body
            if let Ok(text) = std::str::from_utf8(response.raw()) {
                if let Some(id) = wire::extract_field(text, "id") {
                    return Ok(Some(id.to_string()));
                }
            }
        }
    }
}
