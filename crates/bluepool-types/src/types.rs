//! Core types for Blue Connect Go probe data.

use std::collections::BTreeMap;

use bytes::Buf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Minimum usable notification frame length.
///
/// Byte 0 is a status/sequence byte; the five u16 sensor fields occupy
/// bytes 1..11. Probes normally send 12 bytes, but only 11 are interpreted.
pub const MIN_FRAME_LEN: usize = 11;

/// Nominal notification frame length sent by the probe.
pub const FRAME_LEN: usize = 12;

/// Fixed sensor keys written into every [`DeviceSnapshot`].
///
/// Consumers (entity/presentation layers) key off these strings; a key is
/// always present in the snapshot map, with `None` marking a value the
/// pipeline could not compute this cycle.
pub mod keys {
    /// Water temperature, °C.
    pub const TEMPERATURE: &str = "temperature";
    /// Acidity.
    pub const PH: &str = "pH";
    /// Oxidation-reduction potential, mV.
    pub const ORP: &str = "ORP";
    /// Electrical conductivity, µS/cm.
    pub const EC: &str = "EC";
    /// Smoothed salt concentration, ppm.
    pub const SALT: &str = "salt";
    /// Unsmoothed salt concentration, ppm.
    pub const SALT_RAW: &str = "salt_raw";
    /// Smoothed salt concentration, g/L.
    pub const SALT_GRAMS: &str = "salt_grams";
    /// Battery charge estimate, %.
    pub const BATTERY: &str = "battery";
    /// Battery voltage, mV.
    pub const BATTERY_VOLTAGE: &str = "battery_voltage";
    /// Smoothed free chlorine estimate, ppm.
    pub const CHLORINE: &str = "chlorine";
    /// Unsmoothed free chlorine estimate, ppm.
    pub const CHLORINE_RAW: &str = "chlorine_raw";

    /// Every key the derivation pipeline can produce.
    pub const ALL: [&str; 11] = [
        TEMPERATURE,
        PH,
        ORP,
        EC,
        SALT,
        SALT_RAW,
        SALT_GRAMS,
        BATTERY,
        BATTERY_VOLTAGE,
        CHLORINE,
        CHLORINE_RAW,
    ];
}

/// Raw sensor fields sliced out of one notification frame.
///
/// All fields are unsigned little-endian 16-bit values at fixed offsets;
/// scaling into physical units happens in bluepool-core's calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawReading {
    /// Temperature raw value (bytes 1..3), hundredths of °C.
    pub temperature: u16,
    /// pH raw value (bytes 3..5).
    pub ph: u16,
    /// ORP raw value (bytes 5..7).
    pub orp: u16,
    /// Electrical conductivity raw value (bytes 7..9), µS/cm.
    pub ec: u16,
    /// Battery voltage raw value (bytes 9..11), mV.
    pub battery: u16,
}

impl RawReading {
    /// Decode a notification frame.
    ///
    /// Format (12 bytes, only 11 interpreted):
    /// - byte 0: status/sequence (ignored)
    /// - bytes 1-2: temperature (u16 LE, /100 for °C)
    /// - bytes 3-4: pH (u16 LE)
    /// - bytes 5-6: ORP (u16 LE)
    /// - bytes 7-8: EC (u16 LE, µS/cm)
    /// - bytes 9-10: battery voltage (u16 LE, mV)
    ///
    /// Frames shorter than [`MIN_FRAME_LEN`] fail with
    /// [`ParseError::InsufficientBytes`]; no field is decoded partially.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < MIN_FRAME_LEN {
            return Err(ParseError::InsufficientBytes {
                expected: MIN_FRAME_LEN,
                actual: data.len(),
            });
        }

        let mut buf = data;
        buf.advance(1); // status/sequence byte

        Ok(Self {
            temperature: buf.get_u16_le(),
            ph: buf.get_u16_le(),
            orp: buf.get_u16_le(),
            ec: buf.get_u16_le(),
            battery: buf.get_u16_le(),
        })
    }
}

/// Identity metadata for one probe.
///
/// Populated once per session and handed to the snapshot; the session never
/// mutates it afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceIdentity {
    /// Stable wire identifier (link-layer MAC on Linux/Windows).
    pub address: String,
    /// Display name; falls back to the address when the peripheral
    /// advertises no local name.
    pub name: String,
    /// Hardware revision string from the Device Information service,
    /// empty when unavailable.
    pub hw_version: String,
    /// Software revision string from the Device Information service,
    /// empty when unavailable.
    pub sw_version: String,
}

impl DeviceIdentity {
    /// Create an identity seed from a wire address.
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            name: address.clone(),
            address,
            hw_version: String::new(),
            sw_version: String::new(),
        }
    }
}

/// Aggregate result of one update cycle.
///
/// Created fresh at the start of each cycle with every sensor key present
/// and absent; the derivation pipeline overwrites keys as values become
/// available. A key that stays `None` was not computable this cycle — never
/// a stale value from a previous cycle.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceSnapshot {
    /// Identity of the probe this snapshot was read from.
    pub identity: DeviceIdentity,
    sensors: BTreeMap<String, Option<f64>>,
}

impl DeviceSnapshot {
    /// Create an empty snapshot: identity only, every sensor key absent.
    pub fn new(identity: DeviceIdentity) -> Self {
        let sensors = keys::ALL
            .iter()
            .map(|k| ((*k).to_string(), None))
            .collect();
        Self { identity, sensors }
    }

    /// Set a sensor key. `None` marks the value as unavailable this cycle.
    pub fn set(&mut self, key: &str, value: Option<f64>) {
        self.sensors.insert(key.to_string(), value);
    }

    /// The value for a key, or `None` when absent or never written.
    pub fn value(&self, key: &str) -> Option<f64> {
        self.sensors.get(key).copied().flatten()
    }

    /// Whether the key carries a value this cycle.
    pub fn is_present(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    /// The full key → optional-value map, for consumers that iterate.
    pub fn sensors(&self) -> &BTreeMap<String, Option<f64>> {
        &self.sensors
    }

    /// True when no sensor key carries a value (identity-only snapshot).
    pub fn is_empty(&self) -> bool {
        self.sensors.values().all(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reference_frame() {
        // temperature=1000, pH=2048, ORP=200, EC=10000, battery=3232
        let data: [u8; 12] = [
            0x00, // status byte
            0xE8, 0x03, // temperature = 1000
            0x00, 0x08, // pH = 2048
            0xC8, 0x00, // ORP = 200
            0x10, 0x27, // EC = 10000
            0xA0, 0x0C, // battery = 3232
            0x00, // trailing byte, ignored
        ];

        let raw = RawReading::from_bytes(&data).unwrap();
        assert_eq!(raw.temperature, 1000);
        assert_eq!(raw.ph, 2048);
        assert_eq!(raw.orp, 200);
        assert_eq!(raw.ec, 10000);
        assert_eq!(raw.battery, 3232);
    }

    #[test]
    fn test_decode_short_frame() {
        let data: [u8; 10] = [0; 10];

        let err = RawReading::from_bytes(&data).unwrap_err();
        assert!(err.to_string().contains("requires 11 bytes"));
        assert!(err.to_string().contains("got 10"));
    }

    #[test]
    fn test_decode_exactly_min_len() {
        // 11 bytes is enough: byte 0 plus five u16 fields
        let data: [u8; 11] = [0xFF, 1, 0, 2, 0, 3, 0, 4, 0, 5, 0];

        let raw = RawReading::from_bytes(&data).unwrap();
        assert_eq!(raw.temperature, 1);
        assert_eq!(raw.ph, 2);
        assert_eq!(raw.orp, 3);
        assert_eq!(raw.ec, 4);
        assert_eq!(raw.battery, 5);
    }

    #[test]
    fn test_decode_empty_frame() {
        assert!(RawReading::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_decode_max_values() {
        let data: [u8; 11] = [0, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

        let raw = RawReading::from_bytes(&data).unwrap();
        assert_eq!(raw.temperature, 65535);
        assert_eq!(raw.battery, 65535);
    }

    #[test]
    fn test_decode_extra_bytes_ignored() {
        let data: [u8; 16] = [
            0x00, 0xE8, 0x03, 0x00, 0x08, 0xC8, 0x00, 0x10, 0x27, 0xA0, 0x0C, 0x00, 0xAA, 0xBB,
            0xCC, 0xDD,
        ];

        let raw = RawReading::from_bytes(&data).unwrap();
        assert_eq!(raw.temperature, 1000);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let data: [u8; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        assert_eq!(
            RawReading::from_bytes(&data).unwrap(),
            RawReading::from_bytes(&data).unwrap()
        );
    }

    #[test]
    fn test_identity_name_falls_back_to_address() {
        let identity = DeviceIdentity::new("AA:BB:CC:DD:EE:FF");
        assert_eq!(identity.name, "AA:BB:CC:DD:EE:FF");
        assert_eq!(identity.address, "AA:BB:CC:DD:EE:FF");
        assert!(identity.hw_version.is_empty());
        assert!(identity.sw_version.is_empty());
    }

    #[test]
    fn test_snapshot_starts_all_absent() {
        let snapshot = DeviceSnapshot::new(DeviceIdentity::new("AA:BB"));
        assert!(snapshot.is_empty());
        for key in keys::ALL {
            assert!(snapshot.sensors().contains_key(key), "missing key {key}");
            assert!(!snapshot.is_present(key));
        }
    }

    #[test]
    fn test_snapshot_set_and_value() {
        let mut snapshot = DeviceSnapshot::new(DeviceIdentity::new("AA:BB"));
        snapshot.set(keys::TEMPERATURE, Some(21.5));
        snapshot.set(keys::EC, None);

        assert_eq!(snapshot.value(keys::TEMPERATURE), Some(21.5));
        assert_eq!(snapshot.value(keys::EC), None);
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn test_snapshot_absent_key_stays_explicit() {
        let mut snapshot = DeviceSnapshot::new(DeviceIdentity::new("AA:BB"));
        snapshot.set(keys::CHLORINE, None);

        // Key is present in the map with an explicit absent marker
        assert_eq!(snapshot.sensors().get(keys::CHLORINE), Some(&None));
    }
}
