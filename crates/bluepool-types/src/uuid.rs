//! Bluetooth UUIDs for Blue Connect Go probes.
//!
//! This module contains the UUIDs needed to communicate with the probe
//! over Bluetooth Low Energy.

use uuid::{Uuid, uuid};

// --- Probe Service UUIDs ---

/// Blue Connect Go custom measurement service.
pub const PROBE_SERVICE: Uuid = uuid!("f3300001-f0a2-9b06-0c59-1bc4763b5c00");

// --- Probe Characteristic UUIDs ---

/// Command characteristic: a single-byte write here triggers a measurement.
pub const MEASUREMENT_TRIGGER: Uuid = uuid!("f3300002-f0a2-9b06-0c59-1bc4763b5c00");

/// Notification characteristic carrying the 12-byte telemetry frame.
pub const SENSOR_FRAME: Uuid = uuid!("f3300003-f0a2-9b06-0c59-1bc4763b5c00");

// --- Standard BLE Service UUIDs ---

/// Generic Access Profile (GAP) service.
pub const GAP_SERVICE: Uuid = uuid!("00001800-0000-1000-8000-00805f9b34fb");

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

// --- Device Information Characteristic UUIDs ---

/// Device name characteristic.
pub const DEVICE_NAME: Uuid = uuid!("00002a00-0000-1000-8000-00805f9b34fb");

/// Hardware revision string characteristic.
pub const HARDWARE_REVISION: Uuid = uuid!("00002a27-0000-1000-8000-00805f9b34fb");

/// Software revision string characteristic.
pub const SOFTWARE_REVISION: Uuid = uuid!("00002a28-0000-1000-8000-00805f9b34fb");
