//! Power calculator
//!
//! Dynamic power scales linearly with frequency and quadratically with
//! voltage around a reference point. All ratios are scaled by 100 and the
//! product divided by 100^3 so no floating point is needed.

use alloc::vec::Vec;

use gpufreq_api::{CentiMv, FreqKhz, LeakageModel, Milliwatt};

use crate::config::PowerReference;
use crate::opp::OppTable;

/// Leakage model returning a constant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedLeakage(pub Milliwatt);

impl LeakageModel for FixedLeakage {
    fn leakage_mw(&self, _vgpu: CentiMv) -> Milliwatt {
        self.0
    }
}

/// Dynamic power at a frequency and voltage
pub fn dynamic_power(freq_khz: FreqKhz, vgpu: CentiMv, reference: &PowerReference) -> Milliwatt {
    let freq_ratio = freq_khz as u64 * 100 / reference.freq_khz as u64;
    let volt_ratio = vgpu as u64 * 100 / reference.vgpu as u64;
    let power = reference.power_mw as u64 * freq_ratio * volt_ratio * volt_ratio / (100 * 100 * 100);
    power.min(Milliwatt::MAX as u64) as Milliwatt
}

/// Power estimate of one operating point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerEntry {
    /// Frequency
    pub freq_khz: FreqKhz,
    /// VGPU voltage
    pub vgpu: CentiMv,
    /// Dynamic plus leakage power
    pub power_mw: Milliwatt,
}

/// Power estimates for every point of an OPP table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PowerTable {
    entries: Vec<PowerEntry>,
}

impl PowerTable {
    /// Compute the power table for the current OPP voltages
    pub fn build(table: &OppTable, reference: &PowerReference, leakage: &dyn LeakageModel) -> Self {
        let entries = table
            .points()
            .iter()
            .map(|opp| PowerEntry {
                freq_khz: opp.freq_khz,
                vgpu: opp.vgpu,
                power_mw: dynamic_power(opp.freq_khz, opp.vgpu, reference)
                    .saturating_add(leakage.leakage_mw(opp.vgpu)),
            })
            .collect();
        Self { entries }
    }

    /// Estimate at `idx`
    pub fn get(&self, idx: usize) -> Option<&PowerEntry> {
        self.entries.get(idx)
    }

    /// Total power at `idx`, zero when out of range
    pub fn total_power(&self, idx: usize) -> Milliwatt {
        self.entries.get(idx).map(|entry| entry.power_mw).unwrap_or(0)
    }

    /// All estimates
    pub fn entries(&self) -> &[PowerEntry] {
        &self.entries
    }

    /// First index in `[from, to]` whose power fits in `budget_mw`
    ///
    /// Falls back to `to` when nothing fits.
    pub fn idx_within_budget(&self, budget_mw: Milliwatt, from: usize, to: usize) -> usize {
        (from..=to)
            .find(|&idx| self.total_power(idx) <= budget_mw)
            .unwrap_or(to)
    }
}
