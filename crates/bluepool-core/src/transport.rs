//! Transport abstraction over the BLE stack.
//!
//! The session layer talks to probes exclusively through these traits so
//! that the whole exchange can run against [`MockTransport`] in tests.
//! [`BtleTransport`] is the production implementation backed by btleplug.
//!
//! [`MockTransport`]: crate::mock::MockTransport
//! [`BtleTransport`]: crate::device::BtleTransport

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// Opens connections to probes by wire address.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the peripheral at `address` and discover its services.
    async fn connect(&self, address: &str) -> Result<Box<dyn Connection>>;
}

/// One live connection to a probe.
///
/// Dropped or explicitly disconnected at the end of every update cycle;
/// connections are never reused across cycles.
#[async_trait]
pub trait Connection: Send + Sync {
    /// The peripheral's advertised local name, if it has one.
    fn name(&self) -> Option<String>;

    /// Subscribe to notifications on a characteristic.
    ///
    /// Returns the receiving end of a channel carrying raw notification
    /// payloads. The session is the only consumer; the sender side is
    /// closed when the connection is torn down.
    async fn subscribe(&self, characteristic: Uuid) -> Result<mpsc::Receiver<Vec<u8>>>;

    /// Write `data` to a characteristic. With `wait_for_ack` the write is
    /// performed with-response and completes only once the peripheral
    /// acknowledges it.
    async fn write(&self, characteristic: Uuid, data: &[u8], wait_for_ack: bool) -> Result<()>;

    /// Read a characteristic's current value.
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Tear the connection down. Idempotent.
    async fn disconnect(&self) -> Result<()>;
}
