//! Platform-agnostic types for Blue Connect Go pool-water probes.
//!
//! This crate provides the shared data types used by bluepool-core:
//!
//! - [`RawReading`]: the decoded 12-byte telemetry frame
//! - [`DeviceIdentity`] and [`DeviceSnapshot`]: per-cycle results
//! - UUID constants for the probe's BLE characteristics
//! - [`ParseError`] for frame decoding failures
//!
//! # Example
//!
//! ```
//! use bluepool_types::RawReading;
//!
//! let frame: [u8; 12] = [
//!     0x00, 0xE8, 0x03, 0x00, 0x08, 0xC8, 0x00, 0x10, 0x27, 0xA0, 0x0C, 0x00,
//! ];
//! let raw = RawReading::from_bytes(&frame).unwrap();
//! assert_eq!(raw.temperature, 1000);
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{DeviceIdentity, DeviceSnapshot, FRAME_LEN, MIN_FRAME_LEN, RawReading, keys};
pub use self::uuid as uuids;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_snapshot_serialization_roundtrip() {
        let mut snapshot = DeviceSnapshot::new(DeviceIdentity::new("AA:BB:CC:DD:EE:FF"));
        snapshot.set(keys::TEMPERATURE, Some(21.5));
        snapshot.set(keys::CHLORINE, None);

        let json = serde_json::to_string(&snapshot).unwrap();
        let deserialized: DeviceSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.identity.address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(deserialized.value(keys::TEMPERATURE), Some(21.5));
        assert_eq!(deserialized.value(keys::CHLORINE), None);
    }

    #[test]
    fn test_raw_reading_serialization() {
        let raw = RawReading {
            temperature: 1000,
            ph: 2048,
            orp: 200,
            ec: 10000,
            battery: 3232,
        };

        let json = serde_json::to_string(&raw).unwrap();
        assert!(json.contains("\"temperature\":1000"));
        assert!(json.contains("\"battery\":3232"));
    }

    proptest! {
        /// Decoding never panics, whatever the payload looks like.
        #[test]
        fn decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = RawReading::from_bytes(&data);
        }

        /// Payloads of at least MIN_FRAME_LEN bytes always decode, and
        /// decoding the same bytes twice yields the same fields.
        #[test]
        fn decode_is_total_and_deterministic(
            data in proptest::collection::vec(any::<u8>(), MIN_FRAME_LEN..32)
        ) {
            let first = RawReading::from_bytes(&data).unwrap();
            let second = RawReading::from_bytes(&data).unwrap();
            prop_assert_eq!(first, second);
        }

        /// Short payloads always fail, never partially decode.
        #[test]
        fn short_frames_always_fail(data in proptest::collection::vec(any::<u8>(), 0..MIN_FRAME_LEN)) {
            prop_assert!(RawReading::from_bytes(&data).is_err());
        }
    }
}
