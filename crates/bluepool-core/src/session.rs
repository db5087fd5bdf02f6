//! The per-probe update session.
//!
//! A [`Probe`] owns everything that persists across update cycles: the
//! transport, the calibration, and the smoothing history. Each call to
//! [`Probe::update`] runs one complete GATT exchange:
//!
//! 1. connect to the probe (with retry inside the transport)
//! 2. subscribe to the sensor-frame characteristic
//! 3. write the measurement trigger, acknowledged
//! 4. wait for one notification, bounded by the session timeout
//! 5. decode and derive metrics into a fresh snapshot
//! 6. disconnect, unconditionally
//!
//! The probe's radio duty-cycles aggressively, so a missed notification is
//! routine: it yields an identity-only snapshot, not an error. Connect
//! failures and malformed frames are errors; the connection is still torn
//! down before they propagate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use bluepool_types::{DeviceIdentity, DeviceSnapshot, RawReading};
use bluepool_types::uuids::{HARDWARE_REVISION, MEASUREMENT_TRIGGER, SENSOR_FRAME, SOFTWARE_REVISION};

use crate::commands::trigger_payload;
use crate::error::{Error, Result};
use crate::history::SmoothingState;
use crate::metrics::{Calibration, derive_metrics};
use crate::transport::{Connection, Transport};

/// Default bound on waiting for the measurement notification.
const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for the update session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long to wait for the measurement notification after the
    /// trigger write is acknowledged.
    pub notify_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Create a session config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the notification wait bound.
    #[must_use]
    pub fn notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }
}

/// Options for a single update request.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Skip the measurement exchange entirely and return an identity-only
    /// snapshot without touching the transport. Used when only identity
    /// metadata is needed.
    pub skip_query: bool,
}

/// Phases of one update session, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session running.
    Idle,
    /// Transport connect in flight.
    Connecting,
    /// Subscribed to the sensor-frame characteristic.
    Subscribed,
    /// Trigger written and acknowledged, waiting for the frame.
    AwaitingNotification,
    /// Frame received and decoded.
    Completed,
    /// No frame arrived within the bound.
    TimedOut,
    /// Connection torn down.
    Disconnected,
}

/// A handle to one physical probe.
///
/// Holds the smoothing history across cycles, so keep one `Probe` per
/// physical device for the life of the process rather than constructing a
/// fresh one per poll.
pub struct Probe {
    transport: Arc<dyn Transport>,
    address: String,
    calibration: Calibration,
    config: SessionConfig,
    smoothing: Mutex<SmoothingState>,
    session_active: AtomicBool,
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe")
            .field("address", &self.address)
            .field("calibration", &self.calibration)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Releases the session slot when the update future completes or is
/// dropped mid-flight.
struct SessionGuard<'a> {
    active: &'a AtomicBool,
}

impl<'a> SessionGuard<'a> {
    fn acquire(active: &'a AtomicBool, address: &str) -> Result<Self> {
        if active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::session_in_progress(address));
        }
        Ok(Self { active })
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

impl Probe {
    /// Create a probe handle for the given wire address.
    pub fn new(transport: Arc<dyn Transport>, address: impl Into<String>) -> Self {
        Self {
            transport,
            address: address.into(),
            calibration: Calibration::default(),
            config: SessionConfig::default(),
            smoothing: Mutex::new(SmoothingState::default()),
            session_active: AtomicBool::new(false),
        }
    }

    /// Set the calibration constants used by the derivation pipeline.
    #[must_use]
    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Set the session configuration.
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// The probe's wire address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Drop all smoothing history, e.g. after moving the probe to a
    /// different pool.
    pub async fn reset_smoothing(&self) {
        self.smoothing.lock().await.reset();
    }

    /// Run one update cycle and return the resulting snapshot.
    ///
    /// Returns [`Error::SessionInProgress`] if a cycle for this probe is
    /// already running; sessions are serialized, never interleaved. A
    /// notification timeout is not an error: the returned snapshot simply
    /// carries no sensor values.
    pub async fn update(&self) -> Result<DeviceSnapshot> {
        self.update_with_options(UpdateOptions::default()).await
    }

    /// Run one update cycle with explicit options.
    #[tracing::instrument(level = "info", skip(self, options), fields(address = %self.address))]
    pub async fn update_with_options(&self, options: UpdateOptions) -> Result<DeviceSnapshot> {
        if options.skip_query {
            debug!("skip_query set, returning identity-only snapshot");
            return Ok(DeviceSnapshot::new(DeviceIdentity::new(&self.address)));
        }

        let _guard = SessionGuard::acquire(&self.session_active, &self.address)?;

        debug!(state = ?SessionState::Connecting, "session state");
        let connection = self.transport.connect(&self.address).await?;

        let identity = self.read_identity(connection.as_ref()).await;
        let mut snapshot = DeviceSnapshot::new(identity);

        let exchange = self.exchange(connection.as_ref(), &mut snapshot).await;

        // Teardown is unconditional so a decode failure never leaks a
        // connection into the next cycle.
        debug!(state = ?SessionState::Disconnected, "session state");
        if let Err(e) = connection.disconnect().await {
            warn!(error = %e, "disconnect failed");
        }

        exchange?;
        Ok(snapshot)
    }

    /// Populate identity metadata from the live connection.
    ///
    /// Revision reads are best effort: probes with older firmware omit the
    /// Device Information characteristics, which leaves the fields empty.
    async fn read_identity(&self, connection: &dyn Connection) -> DeviceIdentity {
        let mut identity = DeviceIdentity::new(&self.address);
        if let Some(name) = connection.name() {
            identity.name = name;
        }
        identity.hw_version = read_revision(connection, HARDWARE_REVISION).await;
        identity.sw_version = read_revision(connection, SOFTWARE_REVISION).await;
        identity
    }

    /// The measurement exchange: subscribe, trigger, wait, decode.
    async fn exchange(
        &self,
        connection: &dyn Connection,
        snapshot: &mut DeviceSnapshot,
    ) -> Result<()> {
        debug!(state = ?SessionState::Subscribed, "session state");
        let mut frames = connection.subscribe(SENSOR_FRAME).await?;

        debug!(state = ?SessionState::AwaitingNotification, "session state");
        connection
            .write(MEASUREMENT_TRIGGER, &trigger_payload(), true)
            .await?;

        match self.await_frame(&mut frames).await {
            Some(frame) => {
                let raw = RawReading::from_bytes(&frame)?;
                debug!(?raw, "frame decoded");

                let mut smoothing = self.smoothing.lock().await;
                derive_metrics(&raw, &self.calibration, &mut smoothing, snapshot);

                debug!(state = ?SessionState::Completed, "session state");
                info!(name = %snapshot.identity.name, "measurement cycle complete");
                Ok(())
            }
            None => {
                debug!(state = ?SessionState::TimedOut, "session state");
                Ok(())
            }
        }
    }

    /// Wait for the first notification, bounded by the session timeout.
    ///
    /// Returns `None` on timeout or if the transport closed the channel;
    /// either way the cycle ends with an identity-only snapshot.
    async fn await_frame(&self, frames: &mut mpsc::Receiver<Vec<u8>>) -> Option<Vec<u8>> {
        match timeout(self.config.notify_timeout, frames.recv()).await {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => {
                warn!("notification channel closed before a frame arrived");
                None
            }
            Err(_) => {
                warn!(
                    timeout = ?self.config.notify_timeout,
                    "no measurement notification before timeout"
                );
                None
            }
        }
    }
}

async fn read_revision(connection: &dyn Connection, characteristic: uuid::Uuid) -> String {
    match connection.read(characteristic).await {
        Ok(data) => String::from_utf8(data)
            .unwrap_or_default()
            .trim_end_matches('\0')
            .to_string(),
        Err(e) => {
            debug!(%characteristic, error = %e, "revision read unavailable");
            String::new()
        }
    }
}
