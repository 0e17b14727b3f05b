//! Engine configuration
//!
//! Every tunable constant of the DVFS engine lives in [`DvfsConfig`]. The
//! defaults describe the MT6358 PMIC rails and the GPU PLL of the MT8169.

use gpufreq_api::{CentiMv, FreqKhz, Milliwatt, PMIC_STEP};
use static_assertions::const_assert;

/// Smallest allowed VSRAM - VGPU differential (100 mV)
pub const BUCK_DIFF_MIN: CentiMv = 10_000;

/// Largest allowed VSRAM - VGPU differential (250 mV)
pub const BUCK_DIFF_MAX: CentiMv = 25_000;

const_assert!(BUCK_DIFF_MIN < BUCK_DIFF_MAX);
const_assert!(BUCK_DIFF_MAX % PMIC_STEP == 0);

/// Settle-time model of one rail
///
/// `settle = (delta / step + 1) * ns_per_step + overhead`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RailTiming {
    /// Nanoseconds per PMIC step while rising
    pub rise_ns_per_step: u32,
    /// Nanoseconds per PMIC step while falling
    pub fall_ns_per_step: u32,
    /// Fixed overhead in microseconds
    pub overhead_us: u32,
}

impl RailTiming {
    /// VGPU buck: 12.5 mV/µs up, 5 mV/µs down, 4 µs + 5 µs overhead
    pub const VGPU: Self = Self {
        rise_ns_per_step: 500,
        fall_ns_per_step: 1250,
        overhead_us: 9,
    };

    /// VSRAM LDO: 12.5 mV/µs up, 5 mV/µs down, 3 µs + 5 µs overhead
    pub const VSRAM: Self = Self {
        rise_ns_per_step: 500,
        fall_ns_per_step: 1250,
        overhead_us: 8,
    };
}

/// GPU PLL parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PllConfig {
    /// Reference clock in MHz
    pub fin_mhz: u32,
    /// DDS fractional bits
    pub dds_shift: u32,
    /// Lowest VCO frequency the PLL locks at
    pub vco_min_khz: FreqKhz,
    /// Largest post divider power
    pub max_posdiv_power: u8,
    /// Wait after reprogramming before switching back to the PLL
    pub settle_us: u32,
}

impl Default for PllConfig {
    fn default() -> Self {
        Self {
            fin_mhz: 26,
            dds_shift: 14,
            vco_min_khz: 1_500_000,
            max_posdiv_power: 4,
            settle_us: 20,
        }
    }
}

/// Reference point of the dynamic power model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerReference {
    /// Power drawn at the reference point
    pub power_mw: Milliwatt,
    /// Reference frequency
    pub freq_khz: FreqKhz,
    /// Reference voltage
    pub vgpu: CentiMv,
}

impl Default for PowerReference {
    fn default() -> Self {
        Self {
            power_mw: 1285,
            freq_khz: 900_000,
            vgpu: 90_000,
        }
    }
}

/// Frequency caps applied by the battery kickers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryThrottle {
    /// Cap while battery over-current is signalled
    pub oc_limit_khz: FreqKhz,
    /// Cap while battery percentage is low
    pub percent_limit_khz: FreqKhz,
    /// Cap while battery voltage is low
    pub low_batt_limit_khz: FreqKhz,
    /// Low battery level at which the cap engages
    pub low_batt_level: u32,
}

impl Default for BatteryThrottle {
    fn default() -> Self {
        Self {
            oc_limit_khz: 485_000,
            percent_limit_khz: 485_000,
            low_batt_limit_khz: 485_000,
            low_batt_level: 2,
        }
    }
}

/// DVFS engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DvfsConfig {
    /// Smallest VSRAM - VGPU differential
    pub buck_diff_min: CentiMv,
    /// Largest VSRAM - VGPU differential
    pub buck_diff_max: CentiMv,
    /// PMIC voltage step
    pub pmic_step: CentiMv,
    /// VGPU settle model
    pub vgpu_timing: RailTiming,
    /// VSRAM settle model
    pub vsram_timing: RailTiming,
    /// Actually wait for the computed settle time after a voltage switch
    pub apply_settle_delay: bool,
    /// GPU PLL parameters
    pub pll: PllConfig,
    /// Dynamic power reference point
    pub power_ref: PowerReference,
    /// Leakage used when no leakage model is supplied
    pub fixed_leakage_mw: Milliwatt,
    /// Battery throttling caps
    pub battery: BatteryThrottle,
    /// Segment-relative index to move to at start-up
    pub initial_opp_idx: usize,
}

impl Default for DvfsConfig {
    fn default() -> Self {
        Self {
            buck_diff_min: BUCK_DIFF_MIN,
            buck_diff_max: BUCK_DIFF_MAX,
            pmic_step: PMIC_STEP,
            vgpu_timing: RailTiming::VGPU,
            vsram_timing: RailTiming::VSRAM,
            // TODO: enable once the regulator ramp-delay is confirmed insufficient on silicon
            apply_settle_delay: false,
            pll: PllConfig::default(),
            power_ref: PowerReference::default(),
            fixed_leakage_mw: 71,
            battery: BatteryThrottle::default(),
            initial_opp_idx: 0,
        }
    }
}

impl DvfsConfig {
    /// Check internal consistency
    pub fn validate(&self) -> gpufreq_api::Result<()> {
        if self.buck_diff_min >= self.buck_diff_max {
            return Err(gpufreq_api::Error::InvalidConfig("buck differential window is empty"));
        }
        if self.pmic_step == 0 {
            return Err(gpufreq_api::Error::InvalidConfig("PMIC step must be non-zero"));
        }
        if self.pll.fin_mhz == 0 {
            return Err(gpufreq_api::Error::InvalidConfig("PLL reference clock must be non-zero"));
        }
        if self.power_ref.freq_khz == 0 || self.power_ref.vgpu == 0 {
            return Err(gpufreq_api::Error::InvalidConfig("power reference point must be non-zero"));
        }
        Ok(())
    }
}
