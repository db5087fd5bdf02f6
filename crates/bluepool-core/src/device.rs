//! Probe connection over btleplug.
//!
//! [`BtleTransport`] is the production [`Transport`]: it finds the probe by
//! wire address (scanning for it if the adapter has not seen it yet),
//! connects with retry, and hands the session a [`BtleConnection`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::{RwLock, mpsc};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bluepool_types::uuids::PROBE_SERVICE;

use crate::error::{ConnectFailureReason, Error, Result};
use crate::retry::{RetryConfig, with_retry};
use crate::transport::{Connection, Transport};

/// Default timeout for establishing a BLE connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for service discovery after connection.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for characteristic read operations.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for characteristic write operations.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between adapter polls while scanning for an unseen probe.
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Depth of the notification channel handed to the session.
///
/// The probe sends one frame per trigger; anything beyond a couple of
/// buffered frames is the session lagging, not the probe flooding.
const NOTIFICATION_CHANNEL_DEPTH: usize = 8;

/// Configuration for BLE connection timeouts.
///
/// Increase timeouts for probes in challenging RF environments (the probe
/// floats in water, which attenuates 2.4 GHz heavily).
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use bluepool_core::device::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .connection_timeout(Duration::from_secs(25))
///     .read_timeout(Duration::from_secs(15));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for establishing a BLE connection.
    pub connection_timeout: Duration,
    /// Timeout for service discovery after connection.
    pub discovery_timeout: Duration,
    /// Timeout for BLE read operations.
    pub read_timeout: Duration,
    /// Timeout for BLE write operations.
    pub write_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Create a connection config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

/// Production transport backed by the host's Bluetooth adapter.
pub struct BtleTransport {
    adapter: Adapter,
    config: ConnectionConfig,
    retry: RetryConfig,
}

impl std::fmt::Debug for BtleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleTransport")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl BtleTransport {
    /// Create a transport on the first available Bluetooth adapter.
    pub async fn new() -> Result<Self> {
        Self::with_config(ConnectionConfig::default(), RetryConfig::default()).await
    }

    /// Create a transport with custom timeout and retry configuration.
    pub async fn with_config(config: ConnectionConfig, retry: RetryConfig) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::connect_failed(None, ConnectFailureReason::AdapterUnavailable)
            })?;
        Ok(Self {
            adapter,
            config,
            retry,
        })
    }

    /// Create a transport on an explicit adapter.
    pub fn from_adapter(adapter: Adapter, config: ConnectionConfig, retry: RetryConfig) -> Self {
        Self {
            adapter,
            config,
            retry,
        }
    }

    /// Find the peripheral with the given wire address.
    ///
    /// Checks the adapter's known peripherals first; if the probe has not
    /// been seen yet, scans for the probe service until the discovery
    /// timeout elapses.
    async fn find_peripheral(&self, address: &str) -> Result<Peripheral> {
        if let Some(peripheral) = self.known_peripheral(address).await? {
            return Ok(peripheral);
        }

        debug!(%address, "probe not yet known to adapter, scanning");
        let filter = ScanFilter {
            services: vec![PROBE_SERVICE],
        };
        self.adapter.start_scan(filter).await?;

        let deadline = tokio::time::Instant::now() + self.config.discovery_timeout;
        let found = loop {
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
            if let Some(peripheral) = self.known_peripheral(address).await? {
                break Some(peripheral);
            }
            if tokio::time::Instant::now() >= deadline {
                break None;
            }
        };

        if let Err(e) = self.adapter.stop_scan().await {
            warn!(error = %e, "failed to stop scan");
        }

        found.ok_or_else(|| {
            Error::connect_failed(
                Some(address.to_string()),
                ConnectFailureReason::UnknownDevice,
            )
        })
    }

    async fn known_peripheral(&self, address: &str) -> Result<Option<Peripheral>> {
        for peripheral in self.adapter.peripherals().await? {
            if peripheral
                .address()
                .to_string()
                .eq_ignore_ascii_case(address)
            {
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }

    async fn connect_once(&self, address: &str) -> Result<BtleConnection> {
        let peripheral = self.find_peripheral(address).await?;

        info!(%address, "connecting to probe");
        timeout(self.config.connection_timeout, peripheral.connect())
            .await
            .map_err(|_| {
                Error::connect_failed(Some(address.to_string()), ConnectFailureReason::Timeout)
            })?
            .map_err(|e| {
                Error::connect_failed(
                    Some(address.to_string()),
                    ConnectFailureReason::BleError(e.to_string()),
                )
            })?;

        // The link is up from here on. A setup failure never produces a
        // Connection the session could tear down, so disconnect before
        // propagating or the peripheral stays connected across cycles.
        match self.setup_connection(&peripheral).await {
            Ok(connection) => Ok(connection),
            Err(e) => {
                if let Err(cleanup) = peripheral.disconnect().await {
                    warn!(error = %cleanup, "disconnect after failed setup also failed");
                }
                Err(e)
            }
        }
    }

    /// Service discovery and connection bookkeeping after the link is up.
    async fn setup_connection(&self, peripheral: &Peripheral) -> Result<BtleConnection> {
        timeout(self.config.discovery_timeout, peripheral.discover_services())
            .await
            .map_err(|_| Error::timeout("discover services", self.config.discovery_timeout))??;

        let services = peripheral.services();
        let mut characteristics = HashMap::new();
        for service in &services {
            for characteristic in &service.characteristics {
                characteristics.insert(characteristic.uuid, characteristic.clone());
            }
        }
        debug!(
            services = services.len(),
            characteristics = characteristics.len(),
            "service discovery complete"
        );

        let name = peripheral
            .properties()
            .await?
            .and_then(|p| p.local_name);

        Ok(BtleConnection {
            peripheral: peripheral.clone(),
            name,
            characteristics: RwLock::new(characteristics),
            notification_handles: tokio::sync::Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
            config: self.config.clone(),
        })
    }
}

#[async_trait]
impl Transport for BtleTransport {
    #[tracing::instrument(level = "info", skip(self))]
    async fn connect(&self, address: &str) -> Result<Box<dyn Connection>> {
        let connection = with_retry(&self.retry, "connect", || self.connect_once(address)).await?;
        Ok(Box::new(connection))
    }
}

/// One live btleplug connection to a probe.
pub struct BtleConnection {
    peripheral: Peripheral,
    name: Option<String>,
    /// Characteristics by UUID, cached at discovery time for O(1) lookup.
    characteristics: RwLock<HashMap<Uuid, Characteristic>>,
    /// Spawned notification routers, aborted on disconnect.
    notification_handles: tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
    disconnected: AtomicBool,
    config: ConnectionConfig,
}

impl std::fmt::Debug for BtleConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleConnection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl BtleConnection {
    async fn find_characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        let cache = self.characteristics.read().await;
        cache.get(&uuid).cloned().ok_or_else(|| {
            Error::characteristic_not_found(uuid.to_string(), self.peripheral.services().len())
        })
    }
}

#[async_trait]
impl Connection for BtleConnection {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<mpsc::Receiver<Vec<u8>>> {
        let target = self.find_characteristic(characteristic).await?;
        self.peripheral.subscribe(&target).await?;

        let mut stream = self.peripheral.notifications().await?;
        let (tx, rx) = mpsc::channel(NOTIFICATION_CHANNEL_DEPTH);

        let handle = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid != characteristic {
                    continue;
                }
                // Receiver dropped means the session is done with this
                // subscription; stop routing.
                if tx.send(notification.value).await.is_err() {
                    break;
                }
            }
        });
        self.notification_handles.lock().await.push(handle);

        Ok(rx)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8], wait_for_ack: bool) -> Result<()> {
        let target = self.find_characteristic(characteristic).await?;
        let write_type = if wait_for_ack {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        timeout(
            self.config.write_timeout,
            self.peripheral.write(&target, data, write_type),
        )
        .await
        .map_err(|_| {
            Error::timeout(
                format!("write characteristic {characteristic}"),
                self.config.write_timeout,
            )
        })?
        .map_err(|e| Error::WriteFailed {
            uuid: characteristic.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let target = self.find_characteristic(characteristic).await?;
        let data = timeout(self.config.read_timeout, self.peripheral.read(&target))
            .await
            .map_err(|_| {
                Error::timeout(
                    format!("read characteristic {characteristic}"),
                    self.config.read_timeout,
                )
            })??;
        Ok(data)
    }

    async fn disconnect(&self) -> Result<()> {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        {
            let mut handles = self.notification_handles.lock().await;
            for handle in handles.drain(..) {
                handle.abort();
            }
        }

        self.peripheral.disconnect().await?;
        debug!(name = ?self.name, "disconnected from probe");
        Ok(())
    }
}

impl Drop for BtleConnection {
    fn drop(&mut self) {
        if !self.disconnected.swap(true, Ordering::SeqCst) {
            warn!(
                name = ?self.name,
                "connection dropped without disconnect, attempting best-effort cleanup"
            );

            if let Ok(mut handles) = self.notification_handles.try_lock() {
                for handle in handles.drain(..) {
                    handle.abort();
                }
            }

            let peripheral = self.peripheral.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = peripheral.disconnect().await {
                        debug!(error = %e, "best-effort disconnect failed");
                    }
                });
            }
        }
    }
}
