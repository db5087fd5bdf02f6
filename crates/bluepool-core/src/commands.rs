//! Command bytes written to the probe's control characteristic.

/// Requests one measurement cycle; the probe answers with a single
/// notification on the sensor-frame characteristic.
pub const TRIGGER_MEASUREMENT: u8 = 0x01;

/// Build the trigger payload written to the control characteristic.
pub fn trigger_payload() -> [u8; 1] {
    [TRIGGER_MEASUREMENT]
}
