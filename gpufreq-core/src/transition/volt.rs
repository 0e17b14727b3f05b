//! Voltage rules and rail switching

use gpufreq_api::{CentiMv, CurrentState, GpuHardware, Rail};

use crate::config::{DvfsConfig, RailTiming};

/// Rule deriving VSRAM from VGPU
///
/// Above `threshold` VSRAM tracks VGPU at a fixed offset, at or below it
/// VSRAM sits at a segment-specific constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VsramRule {
    /// VGPU above which VSRAM tracks
    pub threshold: CentiMv,
    /// Offset while tracking
    pub fixed_diff: CentiMv,
    /// VSRAM at or below the threshold
    pub fixed_volt: CentiMv,
}

impl VsramRule {
    /// Track above 0.75 V, 0.85 V floor
    pub const TRACK_75000: Self = Self {
        threshold: 75_000,
        fixed_diff: 10_000,
        fixed_volt: 85_000,
    };

    /// Track above 0.725 V, 0.825 V floor
    pub const TRACK_72500: Self = Self {
        threshold: 72_500,
        fixed_diff: 10_000,
        fixed_volt: 82_500,
    };

    /// VSRAM needed for a VGPU voltage
    pub const fn vsram_from_vgpu(&self, vgpu: CentiMv) -> CentiMv {
        if vgpu > self.threshold {
            vgpu.saturating_add(self.fixed_diff)
        } else {
            self.fixed_volt
        }
    }
}

/// Round a voltage up to the next PMIC step
pub const fn normalize_volt(volt: CentiMv, step: CentiMv) -> CentiMv {
    if volt % step != 0 {
        (volt - volt % step).saturating_add(step)
    } else {
        volt
    }
}

/// Time for a rail to settle after moving by `delta`, in microseconds
pub fn settle_time(timing: &RailTiming, rising: bool, delta: CentiMv, step: CentiMv) -> u32 {
    let steps = delta / step + 1;
    let ns_per_step = if rising {
        timing.rise_ns_per_step
    } else {
        timing.fall_ns_per_step
    };
    steps
        .saturating_mul(ns_per_step)
        .div_ceil(1000)
        .saturating_add(timing.overhead_us)
}

/// Settle times computed for one voltage switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleTime {
    /// VGPU settle time in microseconds
    pub vgpu_us: u32,
    /// VSRAM settle time in microseconds
    pub vsram_us: u32,
}

impl SettleTime {
    /// Time until both rails have settled
    pub fn max_us(&self) -> u32 {
        self.vgpu_us.max(self.vsram_us)
    }
}

/// Move both rails to new voltages, keeping the VSRAM/VGPU window intact
///
/// On a rising switch VSRAM is written first, on a falling one VGPU. Write
/// failures are logged and `state` is advanced regardless. Returns `None`
/// when nothing had to change.
pub fn volt_switch<H: GpuHardware>(
    hw: &mut H,
    config: &DvfsConfig,
    state: &mut CurrentState,
    vgpu_new: CentiMv,
    vsram_new: CentiMv,
) -> Option<SettleTime> {
    let vgpu_old = state.vgpu;
    let vsram_old = state.vsram;

    if vgpu_old == vgpu_new && vsram_old == vsram_new {
        return None;
    }

    let rising = vgpu_new > vgpu_old || (vgpu_new == vgpu_old && vsram_new > vsram_old);
    let settle = SettleTime {
        vgpu_us: settle_time(
            &config.vgpu_timing,
            vgpu_new >= vgpu_old,
            vgpu_new.abs_diff(vgpu_old),
            config.pmic_step,
        ),
        vsram_us: settle_time(
            &config.vsram_timing,
            vsram_new >= vsram_old,
            vsram_new.abs_diff(vsram_old),
            config.pmic_step,
        ),
    };

    let order = if rising {
        [(Rail::Vsram, vsram_new), (Rail::Vgpu, vgpu_new)]
    } else {
        [(Rail::Vgpu, vgpu_new), (Rail::Vsram, vsram_new)]
    };
    for (rail, volt) in order {
        if let Err(err) = hw.set_rail_voltage(rail, volt) {
            gf_error!("failed to set {:?} to {}: {}", rail, volt, err);
        }
    }

    if config.apply_settle_delay {
        hw.delay_us(settle.max_us());
    }

    gf_trace!(
        "volt switch vgpu {} -> {}, vsram {} -> {}, settle {}us",
        vgpu_old,
        vgpu_new,
        vsram_old,
        vsram_new,
        settle.max_us()
    );

    state.vgpu = vgpu_new;
    state.vsram = vsram_new;
    Some(settle)
}
