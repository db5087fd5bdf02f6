//! Core library for Blue Connect Go pool-water probes over Bluetooth Low
//! Energy.
//!
//! The probe measures temperature, pH, ORP, conductivity, and battery
//! voltage. Each update cycle is a single GATT exchange: connect, subscribe
//! to the sensor-frame characteristic, write the measurement trigger, wait
//! for one notification, derive the water-chemistry metrics, disconnect.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use bluepool_core::{BtleTransport, Probe};
//! use bluepool_core::keys;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(BtleTransport::new().await?);
//!     let probe = Probe::new(transport, "AA:BB:CC:DD:EE:FF");
//!
//!     let snapshot = probe.update().await?;
//!     if let Some(temp) = snapshot.value(keys::TEMPERATURE) {
//!         println!("water temperature: {temp} °C");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Testing without hardware
//!
//! [`Probe`] talks to the probe through the [`Transport`] trait;
//! [`MockTransport`] scripts a probe in memory, so the full session runs
//! under `cargo test` with no Bluetooth adapter.

pub mod commands;
pub mod device;
pub mod error;
pub mod history;
pub mod metrics;
pub mod mock;
pub mod retry;
pub mod session;
pub mod transport;

pub use device::{BtleConnection, BtleTransport, ConnectionConfig};
pub use error::{ConnectFailureReason, Error, Result};
pub use history::{HistoryBuffer, MAX_HISTORY_LEN, SmoothingState};
pub use metrics::{Calibration, DerivationFault, derive_metrics, estimate_chlorine};
pub use mock::{MockConnection, MockTransport};
pub use retry::{RetryConfig, with_retry};
pub use session::{Probe, SessionConfig, SessionState, UpdateOptions};
pub use transport::{Connection, Transport};

// Re-export the shared types so most callers only depend on this crate.
pub use bluepool_types::{
    DeviceIdentity, DeviceSnapshot, FRAME_LEN, MIN_FRAME_LEN, ParseError, RawReading, keys, uuids,
};
