//! Telemetry dispatcher
//!
//! Posts measurement/alarm/event bodies to their fixed resource paths
//! using the stored credentials. Fire-and-forget: the request goes out
//! over a fresh connection and the response is never read — a sensor
//! loop has no use for the acknowledgement.
//!
//! Every send is gated on a registered device id. With none, the
//! operation fails with [`TelemetryError::NotRegistered`] before any
//! network I/O.

pub mod body;

use std::io;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::provision::DeviceLink;
use crate::store::region::NvRegion;
use crate::store::{CredentialStore, StoreError};
use crate::transport::Connect;
use crate::wire;

use body::SampleValue;

pub const MEASUREMENTS_PATH: &str = "/measurement/measurements";
pub const ALARMS_PATH: &str = "/alarm/alarms";
pub const EVENTS_PATH: &str = "/event/events";

#[derive(Debug, Error)]
pub enum TelemetryError {
    /// No device id exists yet. Reported without any I/O; run
    /// provisioning first.
    #[error("device is not registered with the tenant")]
    NotRegistered,

    #[error("network: {0}")]
    Io(#[from] io::Error),
}

/// Sends telemetry on behalf of one registered device.
pub struct TelemetryDispatcher<C: Connect, K: Clock> {
    connector: C,
    clock: K,
    link: DeviceLink,
}

impl<C: Connect, K: Clock> TelemetryDispatcher<C, K> {
    pub fn new(connector: C, clock: K, link: DeviceLink) -> Self {
        Self {
            connector,
            clock,
            link,
        }
    }

    /// Build a dispatcher from the persisted record of an earlier
    /// provisioning run.
    pub fn from_store<R: NvRegion>(
        connector: C,
        clock: K,
        store: &CredentialStore<R>,
    ) -> Result<Self, TelemetryError> {
        let link = DeviceLink::from_store(store).map_err(|e| match e {
            StoreError::NotFound => TelemetryError::NotRegistered,
            StoreError::Io(e) => TelemetryError::Io(e),
            // TooLarge cannot come out of a load
            StoreError::TooLarge => TelemetryError::NotRegistered,
        })?;
        Ok(Self::new(connector, clock, link))
    }

    pub async fn send_measurement(
        &self,
        kind: &str,
        fragment: &str,
        series: &str,
        value: SampleValue,
        unit: Option<&str>,
    ) -> Result<(), TelemetryError> {
        let body = body::measurement(
            kind,
            fragment,
            series,
            value,
            unit,
            &self.link.device_id,
            &self.clock.timestamp(),
        );
        info!("Sending measurement {}/{} = {}", fragment, series, value);
        self.post(MEASUREMENTS_PATH, &body).await
    }

    pub async fn send_alarm(
        &self,
        severity: &str,
        text: &str,
        kind: &str,
    ) -> Result<(), TelemetryError> {
        let body = body::alarm(
            severity,
            text,
            kind,
            &self.link.device_id,
            &self.clock.timestamp(),
        );
        info!("Sending {} alarm {}", severity, kind);
        self.post(ALARMS_PATH, &body).await
    }

    pub async fn send_event(&self, kind: &str, text: &str) -> Result<(), TelemetryError> {
        let body = body::event(kind, text, &self.link.device_id, &self.clock.timestamp());
        info!("Sending event {}", kind);
        self.post(EVENTS_PATH, &body).await
    }

    /// POST `body` to `path` on a fresh connection and hang up.
    async fn post(&self, path: &str, body: &str) -> Result<(), TelemetryError> {
        if self.link.device_id.is_empty() {
            return Err(TelemetryError::NotRegistered);
        }

        let authorization = format!("Basic {}", self.link.credentials);
        let request = wire::build_request("POST", path, &self.link.host, &authorization, body);

        let mut stream = self.connector.connect().await?;
        stream.write_all(&request).await?;
        stream.flush().await?;
        stream.shutdown().await?;
        debug!("Posted {} bytes to {}", request.len(), path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::FixedClock;
    use crate::store::region::MemRegion;
    use std::sync::Mutex;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};
    use tokio::task::JoinHandle;

    /// Connector yielding a single prepared stream
    struct OneShotConnector {
        stream: Mutex<Option<DuplexStream>>,
    }

    impl Connect for OneShotConnector {
        type Stream = DuplexStream;

        async fn connect(&self) -> io::Result<DuplexStream> {
            self.stream
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "no stream"))
        }
    }

    /// Connector that must never be reached
    struct UnreachableConnector;

    impl Connect for UnreachableConnector {
        type Stream = DuplexStream;

        async fn connect(&self) -> io::Result<DuplexStream> {
            panic!("NotRegistered must be checked before any network I/O");
        }
    }

    fn link() -> DeviceLink {
        DeviceLink {
            host: "t.example.com".to_string(),
            credentials: "dDEvdTE6cDE=".to_string(),
            device_id: "4711".to_string(),
        }
    }

    /// A dispatcher over a captured stream plus the capture handle
    fn capturing_dispatcher() -> (
        TelemetryDispatcher<OneShotConnector, FixedClock>,
        JoinHandle<Vec<u8>>,
    ) {
        let (client, mut server) = duplex(4096);
        let capture = tokio::spawn(async move {
            let mut request = Vec::new();
            server.read_to_end(&mut request).await.unwrap();
            request
        });
        let dispatcher = TelemetryDispatcher::new(
            OneShotConnector {
                stream: Mutex::new(Some(client)),
            },
            FixedClock("2026-08-06T12:30:05Z"),
            link(),
        );
        (dispatcher, capture)
    }

    #[tokio::test]
    async fn test_measurement_request_on_the_wire() {
        let (dispatcher, capture) = capturing_dispatcher();
        dispatcher
            .send_measurement(
                "c8y_TemperatureMeasurement",
                "c8y_Temperature",
                "T",
                SampleValue::Decimal(22.5),
                Some("C"),
            )
            .await
            .unwrap();

        let request = String::from_utf8(capture.await.unwrap()).unwrap();
        let body = r#"{"type":"c8y_TemperatureMeasurement","c8y_Temperature":{"T":{"value":22.5,"unit":"C"}},"source":{"id":"4711"},"time":"2026-08-06T12:30:05Z"}"#;

        assert!(request.starts_with("POST /measurement/measurements HTTP/1.1\r\n"));
        assert!(request.contains("\r\nHost: t.example.com\r\n"));
        assert!(request.contains("\r\nAuthorization: Basic dDEvdTE6cDE=\r\n"));
        assert!(request.contains(&format!("\r\nContent-Length: {}\r\n", body.len())));
        assert!(request.ends_with(&format!("\r\n\r\n{body}")));
    }

    #[tokio::test]
    async fn test_alarm_request_path() {
        let (dispatcher, capture) = capturing_dispatcher();
        dispatcher
            .send_alarm("MAJOR", "Over temperature", "c8y_TemperatureAlarm")
            .await
            .unwrap();

        let request = String::from_utf8(capture.await.unwrap()).unwrap();
        assert!(request.starts_with("POST /alarm/alarms HTTP/1.1\r\n"));
        assert!(request.contains(r#""severity":"MAJOR""#));
    }

    #[tokio::test]
    async fn test_event_request_path() {
        let (dispatcher, capture) = capturing_dispatcher();
        dispatcher
            .send_event("c8y_DoorOpenedEvent", "Door opened")
            .await
            .unwrap();

        let request = String::from_utf8(capture.await.unwrap()).unwrap();
        assert!(request.starts_with("POST /event/events HTTP/1.1\r\n"));
        assert!(request.contains(r#""type":"c8y_DoorOpenedEvent""#));
    }

    #[tokio::test]
    async fn test_unregistered_device_performs_no_io() {
        let dispatcher = TelemetryDispatcher::new(
            UnreachableConnector,
            FixedClock("2026-08-06T12:30:05Z"),
            DeviceLink {
                host: "t.example.com".to_string(),
                credentials: "dDEvdTE6cDE=".to_string(),
                device_id: String::new(),
            },
        );

        let result = dispatcher
            .send_measurement("t", "f", "s", SampleValue::Integer(1), None)
            .await;
        assert!(matches!(result, Err(TelemetryError::NotRegistered)));
    }

    #[tokio::test]
    async fn test_from_store_requires_registration() {
        let mut store = CredentialStore::new(MemRegion::new());
        store.save("t.example.com", "t1", "u1", "p1").unwrap();

        // Credentials but no device id: not registered
        let result = TelemetryDispatcher::from_store(
            UnreachableConnector,
            FixedClock("2026-08-06T12:30:05Z"),
            &store,
        );
        assert!(matches!(result, Err(TelemetryError::NotRegistered)));

        store.save_device_id("4711").unwrap();
        let dispatcher = TelemetryDispatcher::from_store(
            UnreachableConnector,
            FixedClock("2026-08-06T12:30:05Z"),
            &store,
        )
        .unwrap();
        assert_eq!(dispatcher.link.device_id, "4711");
    }
}
