//! Derived water-chemistry metrics.
//!
//! Converts a decoded [`RawReading`] into the physical values published in a
//! [`DeviceSnapshot`]: scaled temperature/pH/ORP, salt concentration from
//! conductivity, battery charge from voltage, and a free-chlorine estimate
//! from the Nernst relation between ORP and pH.
//!
//! The pipeline is total over valid frames: a fault in the chlorine
//! derivation (non-finite intermediates from degenerate inputs) leaves the
//! chlorine keys absent and never fails the cycle.

use tracing::{debug, warn};

use bluepool_types::{DeviceSnapshot, RawReading, keys};

use crate::history::SmoothingState;

/// Ideal gas constant, J/(mol·K).
const GAS_CONSTANT: f64 = 8.314;
/// Faraday constant, C/mol.
const FARADAY: f64 = 96485.0;
/// Molar mass of chlorine, g/mol.
const CHLORINE_MOLAR_MASS: f64 = 35.45;
/// Lower clamp for the chlorine log-concentration term.
const LOG_CHLORINE_MIN: f64 = -6.0;
/// Salinity damping never drops the chlorine estimate below this factor.
const SALT_DAMPING_FLOOR: f64 = 0.7;
/// Salt ppm at which damping would reach zero without the floor.
const SALT_DAMPING_SCALE: f64 = 50_000.0;

/// Calibration constants for the derivation pipeline.
///
/// Defaults match the probe's stock electrode characteristics; all fields
/// are adjustable for recalibrated or aged electrodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    /// Salt ppm per µS/cm of conductivity.
    pub salt_ppm_per_microsiemens: f64,
    /// ORP (mV) the electrode reads at pH 7 in fully chlorinated water.
    pub chlorine_orp_reference_mv: f64,
    /// Chlorine estimates above this (ppm) are treated as sensor noise.
    pub chlorine_ppm_max: f64,
    /// Battery voltage (mV) reported as 0% charge.
    pub battery_empty_mv: f64,
    /// Battery voltage (mV) reported as 100% charge.
    pub battery_full_mv: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            salt_ppm_per_microsiemens: 0.256,
            chlorine_orp_reference_mv: 700.0,
            chlorine_ppm_max: 5.0,
            battery_empty_mv: 2800.0,
            battery_full_mv: 3640.0,
        }
    }
}

impl Calibration {
    /// Create a calibration with stock defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the salt conversion factor (ppm per µS/cm).
    #[must_use]
    pub fn with_salt_factor(mut self, ppm_per_microsiemens: f64) -> Self {
        self.salt_ppm_per_microsiemens = ppm_per_microsiemens;
        self
    }

    /// Set the ORP reference (mV at pH 7, fully chlorinated).
    #[must_use]
    pub fn with_orp_reference(mut self, millivolts: f64) -> Self {
        self.chlorine_orp_reference_mv = millivolts;
        self
    }

    /// Set the plausibility ceiling for chlorine estimates (ppm).
    #[must_use]
    pub fn with_chlorine_max(mut self, ppm: f64) -> Self {
        self.chlorine_ppm_max = ppm;
        self
    }

    /// Set the battery voltage range mapped to 0..100%.
    #[must_use]
    pub fn with_battery_range(mut self, empty_mv: f64, full_mv: f64) -> Self {
        self.battery_empty_mv = empty_mv;
        self.battery_full_mv = full_mv;
        self
    }
}

/// A non-finite intermediate in the chlorine derivation.
///
/// Produced only from degenerate inputs (e.g. a temperature at absolute
/// zero collapsing the Nernst slope); the session absorbs it into absent
/// chlorine keys rather than failing the cycle.
#[derive(Debug, Clone, thiserror::Error)]
#[error("chlorine derivation fault: {context}")]
pub struct DerivationFault {
    /// Which intermediate went non-finite.
    pub context: String,
}

/// Round half away from zero to `decimals` places, matching the probe
/// vendor's published figures.
fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Derive all physical metrics from one raw frame.
///
/// Writes every computable sensor key into `snapshot` and appends this
/// cycle's salt/chlorine samples to `smoothing`. Keys the pipeline cannot
/// compute (EC of zero suppresses all salt keys, chlorine faults suppress
/// both chlorine keys) stay explicitly absent.
pub fn derive_metrics(
    raw: &RawReading,
    calibration: &Calibration,
    smoothing: &mut SmoothingState,
    snapshot: &mut DeviceSnapshot,
) {
    let temperature = f64::from(raw.temperature) / 100.0;
    let ph = (2048.0 - f64::from(raw.ph)) / 232.0 + 7.2;
    let orp = f64::from(raw.orp) / 4.0 - 5.0;

    // The electrode scalings are exact; only the derived salt, battery,
    // and chlorine figures get rounded for presentation.
    snapshot.set(keys::TEMPERATURE, Some(temperature));
    snapshot.set(keys::PH, Some(ph));
    snapshot.set(keys::ORP, Some(orp));

    let battery_mv = f64::from(raw.battery);
    let battery_span = calibration.battery_full_mv - calibration.battery_empty_mv;
    let battery_pct =
        ((battery_mv - calibration.battery_empty_mv) / battery_span * 100.0).clamp(0.0, 100.0);
    snapshot.set(keys::BATTERY_VOLTAGE, Some(battery_mv));
    snapshot.set(keys::BATTERY, Some(round_to(battery_pct, 1)));

    // EC of zero means the conductivity electrode gave no reading this
    // cycle; all salt-derived keys stay absent and the salt history is
    // left untouched.
    let smoothed_salt = if raw.ec == 0 {
        debug!("conductivity reading absent, skipping salt derivation");
        None
    } else {
        let ec = f64::from(raw.ec);
        snapshot.set(keys::EC, Some(ec));

        let salt_raw = round_to(ec * calibration.salt_ppm_per_microsiemens, 1);
        snapshot.set(keys::SALT_RAW, Some(salt_raw));

        smoothing.salt.push(salt_raw);
        let salt = smoothing.salt.mean();
        if let Some(salt) = salt {
            snapshot.set(keys::SALT, Some(round_to(salt, 2)));
            snapshot.set(keys::SALT_GRAMS, Some(round_to(salt / 1000.0, 1)));
        }
        salt
    };

    match estimate_chlorine(temperature, ph, orp, smoothed_salt, calibration) {
        Ok(Some(chlorine_raw)) => {
            snapshot.set(keys::CHLORINE_RAW, Some(chlorine_raw));
            smoothing.chlorine.push(chlorine_raw);
        }
        Ok(None) => {
            debug!("chlorine estimate out of plausible range, dropping sample");
        }
        Err(fault) => {
            warn!(%fault, "chlorine derivation fault");
            // Both chlorine keys stay absent; the smoothed value is not
            // reported from a cycle whose derivation went non-finite.
            return;
        }
    }

    if let Some(mean) = smoothing.chlorine.mean() {
        snapshot.set(keys::CHLORINE, Some(round_to(mean, 3)));
    }
}

/// Estimate free chlorine (ppm) from the Nernst relation.
///
/// Returns `Ok(None)` when the estimate exceeds the calibrated plausibility
/// ceiling, and [`DerivationFault`] when an intermediate is non-finite.
/// Negative estimates are clamped to zero.
pub fn estimate_chlorine(
    temperature_c: f64,
    ph: f64,
    orp_mv: f64,
    smoothed_salt_ppm: Option<f64>,
    calibration: &Calibration,
) -> Result<Option<f64>, DerivationFault> {
    let temperature_k = temperature_c + 273.15;

    // Nernst slope in mV per decade of concentration.
    let nernst_mv = (GAS_CONSTANT * temperature_k) / (FARADAY * std::f64::consts::LN_10) * 1000.0;
    if !nernst_mv.is_finite() || nernst_mv <= 0.0 {
        return Err(DerivationFault {
            context: format!("nernst slope {nernst_mv} from {temperature_c} degC"),
        });
    }

    // ORP expected at this pH in fully chlorinated water.
    let orp_reference = calibration.chlorine_orp_reference_mv - (ph - 7.0) * nernst_mv;
    let log_chlorine = ((orp_mv - orp_reference) / nernst_mv).clamp(LOG_CHLORINE_MIN, 0.0);

    let mut ppm = 10f64.powf(log_chlorine) * CHLORINE_MOLAR_MASS * 1000.0;

    // High salinity suppresses the ORP response; damp the estimate, but
    // never below the floor.
    if let Some(salt_ppm) = smoothed_salt_ppm {
        let damping = (1.0 - salt_ppm / SALT_DAMPING_SCALE).max(SALT_DAMPING_FLOOR);
        ppm *= damping;
    }

    if !ppm.is_finite() {
        return Err(DerivationFault {
            context: format!("chlorine ppm {ppm} from log term {log_chlorine}"),
        });
    }

    if ppm > calibration.chlorine_ppm_max {
        return Ok(None);
    }

    Ok(Some(round_to(ppm.max(0.0), 3)))
}
