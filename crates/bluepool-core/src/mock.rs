//! Mock transport for testing without Bluetooth hardware.
//!
//! [`MockTransport`] scripts one probe: the frame it answers a trigger
//! with (or no frame at all, to exercise the notification timeout), the
//! identity strings its characteristics report, and whether connecting
//! fails. Counters record every transport interaction so tests can assert
//! on session behavior, e.g. that disconnect runs exactly once per cycle.
//!
//! # Example
//!
//! ```
//! use bluepool_core::mock::MockTransport;
//!
//! let transport = MockTransport::new()
//!     .with_name("Blue Connect")
//!     .with_frame(vec![0x00, 0xE8, 0x03, 0x00, 0x08, 0xC8, 0x00, 0x10, 0x27, 0xA0, 0x0C, 0x00]);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use bluepool_types::uuids::{
    DEVICE_NAME, HARDWARE_REVISION, MEASUREMENT_TRIGGER, SENSOR_FRAME, SOFTWARE_REVISION,
};

use crate::error::{ConnectFailureReason, Error, Result};
use crate::transport::{Connection, Transport};

#[derive(Debug)]
struct MockState {
    name: RwLock<Option<String>>,
    hw_version: RwLock<String>,
    sw_version: RwLock<String>,
    /// Frame sent in response to a trigger write; `None` means the probe
    /// never answers and the session times out.
    frame: RwLock<Option<Vec<u8>>>,
    connect_failure: RwLock<Option<ConnectFailureReason>>,
    subscribe_failure: RwLock<bool>,
    connect_latency: RwLock<Duration>,
    connect_count: AtomicUsize,
    subscribe_count: AtomicUsize,
    write_count: AtomicUsize,
    read_count: AtomicUsize,
    disconnect_count: AtomicUsize,
}

/// A scripted [`Transport`] implementation.
///
/// Cheap to clone; clones share state, so a test can keep one handle for
/// assertions while the probe session owns another.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a mock probe that never answers a trigger.
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                name: RwLock::new(None),
                hw_version: RwLock::new("2.1".to_string()),
                sw_version: RwLock::new("1.8.2".to_string()),
                frame: RwLock::new(None),
                connect_failure: RwLock::new(None),
                subscribe_failure: RwLock::new(false),
                connect_latency: RwLock::new(Duration::ZERO),
                connect_count: AtomicUsize::new(0),
                subscribe_count: AtomicUsize::new(0),
                write_count: AtomicUsize::new(0),
                read_count: AtomicUsize::new(0),
                disconnect_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Set the advertised local name.
    #[must_use]
    pub fn with_name(self, name: impl Into<String>) -> Self {
        *self.state.name.write().unwrap() = Some(name.into());
        self
    }

    /// Set the frame the probe answers a trigger write with.
    #[must_use]
    pub fn with_frame(self, frame: Vec<u8>) -> Self {
        *self.state.frame.write().unwrap() = Some(frame);
        self
    }

    /// Set the hardware and software revision strings.
    #[must_use]
    pub fn with_revisions(self, hw: impl Into<String>, sw: impl Into<String>) -> Self {
        *self.state.hw_version.write().unwrap() = hw.into();
        *self.state.sw_version.write().unwrap() = sw.into();
        self
    }

    /// Make every connect attempt fail with the given reason.
    #[must_use]
    pub fn with_connect_failure(self, reason: ConnectFailureReason) -> Self {
        *self.state.connect_failure.write().unwrap() = Some(reason);
        self
    }

    /// Make every subscribe attempt fail after connect succeeds.
    #[must_use]
    pub fn with_subscribe_failure(self) -> Self {
        *self.state.subscribe_failure.write().unwrap() = true;
        self
    }

    /// Add artificial latency to connect attempts.
    #[must_use]
    pub fn with_connect_latency(self, latency: Duration) -> Self {
        *self.state.connect_latency.write().unwrap() = latency;
        self
    }

    /// Replace the scripted frame mid-test.
    pub fn set_frame(&self, frame: Option<Vec<u8>>) {
        *self.state.frame.write().unwrap() = frame;
    }

    /// Clear a previously scripted connect failure.
    pub fn clear_connect_failure(&self) {
        *self.state.connect_failure.write().unwrap() = None;
    }

    /// Number of connect attempts made.
    pub fn connect_count(&self) -> usize {
        self.state.connect_count.load(Ordering::SeqCst)
    }

    /// Number of subscriptions opened.
    pub fn subscribe_count(&self) -> usize {
        self.state.subscribe_count.load(Ordering::SeqCst)
    }

    /// Number of characteristic writes.
    pub fn write_count(&self) -> usize {
        self.state.write_count.load(Ordering::SeqCst)
    }

    /// Number of characteristic reads.
    pub fn read_count(&self) -> usize {
        self.state.read_count.load(Ordering::SeqCst)
    }

    /// Number of disconnects.
    pub fn disconnect_count(&self) -> usize {
        self.state.disconnect_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, address: &str) -> Result<Box<dyn Connection>> {
        self.state.connect_count.fetch_add(1, Ordering::SeqCst);

        let latency = *self.state.connect_latency.read().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(reason) = self.state.connect_failure.read().unwrap().clone() {
            return Err(Error::connect_failed(Some(address.to_string()), reason));
        }

        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
            frame_tx: Mutex::new(None),
        }))
    }
}

/// One scripted connection handed out by [`MockTransport`].
#[derive(Debug)]
pub struct MockConnection {
    state: Arc<MockState>,
    /// Sender for the sensor-frame subscription, if one is open.
    frame_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
}

#[async_trait]
impl Connection for MockConnection {
    fn name(&self) -> Option<String> {
        self.state.name.read().unwrap().clone()
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<mpsc::Receiver<Vec<u8>>> {
        self.state.subscribe_count.fetch_add(1, Ordering::SeqCst);
        if *self.state.subscribe_failure.read().unwrap() {
            return Err(Error::NotConnected);
        }
        if characteristic != SENSOR_FRAME {
            return Err(Error::characteristic_not_found(characteristic.to_string(), 3));
        }
        let (tx, rx) = mpsc::channel(8);
        *self.frame_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8], _wait_for_ack: bool) -> Result<()> {
        self.state.write_count.fetch_add(1, Ordering::SeqCst);
        if characteristic != MEASUREMENT_TRIGGER {
            return Err(Error::characteristic_not_found(characteristic.to_string(), 3));
        }

        // A trigger write makes the probe emit its scripted frame, if any.
        if data == [crate::commands::TRIGGER_MEASUREMENT] {
            let frame = self.state.frame.read().unwrap().clone();
            if let Some(frame) = frame {
                let tx = self.frame_tx.lock().unwrap().clone();
                if let Some(tx) = tx {
                    let _ = tx.try_send(frame);
                }
            }
        }
        Ok(())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        self.state.read_count.fetch_add(1, Ordering::SeqCst);
        if characteristic == HARDWARE_REVISION {
            Ok(self.state.hw_version.read().unwrap().clone().into_bytes())
        } else if characteristic == SOFTWARE_REVISION {
            Ok(self.state.sw_version.read().unwrap().clone().into_bytes())
        } else if characteristic == DEVICE_NAME {
            match self.state.name.read().unwrap().clone() {
                Some(name) => Ok(name.into_bytes()),
                None => Err(Error::characteristic_not_found(characteristic.to_string(), 3)),
            }
        } else {
            Err(Error::characteristic_not_found(characteristic.to_string(), 3))
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.disconnect_count.fetch_add(1, Ordering::SeqCst);
        // Closing the sender ends any open subscription stream.
        *self.frame_tx.lock().unwrap() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_frame_is_delivered_on_trigger() {
        let transport = MockTransport::new().with_frame(vec![1, 2, 3]);
        let connection = transport.connect("AA:BB").await.unwrap();

        let mut rx = connection.subscribe(SENSOR_FRAME).await.unwrap();
        connection
            .write(MEASUREMENT_TRIGGER, &[0x01], true)
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(transport.write_count(), 1);
    }

    #[tokio::test]
    async fn test_unscripted_probe_never_notifies() {
        let transport = MockTransport::new();
        let connection = transport.connect("AA:BB").await.unwrap();

        let mut rx = connection.subscribe(SENSOR_FRAME).await.unwrap();
        connection
            .write(MEASUREMENT_TRIGGER, &[0x01], true)
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_failure_injection() {
        let transport =
            MockTransport::new().with_connect_failure(ConnectFailureReason::UnknownDevice);
        let result = transport.connect("AA:BB").await;
        assert!(matches!(result, Err(Error::ConnectFailed { .. })));

        transport.clear_connect_failure();
        assert!(transport.connect("AA:BB").await.is_ok());
        assert_eq!(transport.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_identity_reads() {
        let transport = MockTransport::new()
            .with_name("Blue Connect")
            .with_revisions("3.0", "2.4.1");
        let connection = transport.connect("AA:BB").await.unwrap();

        assert_eq!(connection.name().as_deref(), Some("Blue Connect"));
        assert_eq!(
            connection.read(HARDWARE_REVISION).await.unwrap(),
            b"3.0".to_vec()
        );
        assert_eq!(
            connection.read(SOFTWARE_REVISION).await.unwrap(),
            b"2.4.1".to_vec()
        );
    }

    #[tokio::test]
    async fn test_disconnect_closes_subscription() {
        let transport = MockTransport::new().with_frame(vec![1]);
        let connection = transport.connect("AA:BB").await.unwrap();

        let mut rx = connection.subscribe(SENSOR_FRAME).await.unwrap();
        connection.disconnect().await.unwrap();

        assert!(rx.recv().await.is_none());
        assert_eq!(transport.disconnect_count(), 1);
    }
}
