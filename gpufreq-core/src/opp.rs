//! OPP table
//!
//! The table holds every operating point of the signed table, ordered from
//! the highest frequency (index 0) down. VSRAM is never stored independently:
//! it is always derived from VGPU through the segment's [`VsramRule`], which
//! is what makes aging compensation exactly reversible.

use alloc::vec::Vec;
use core::ops::RangeInclusive;

use gpufreq_api::{CentiMv, Error, FreqKhz, OperatingPoint, Result, VoltageSource};

use crate::config::DvfsConfig;
use crate::segment::OppSeed;
use crate::transition::{VsramRule, normalize_volt};

/// Operating points of one chip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OppTable {
    points: Vec<OperatingPoint>,
    /// Unaged VGPU captured at build time, used to restore after PTPOD
    default_vgpu: Vec<CentiMv>,
    rule: VsramRule,
    aging_applied: bool,
}

impl OppTable {
    /// Build a table from compiled-in seeds
    ///
    /// A voltage source, when given, may replace the VGPU of any point.
    pub fn build(
        seeds: &[OppSeed],
        rule: VsramRule,
        source: Option<&dyn VoltageSource>,
        config: &DvfsConfig,
    ) -> Result<Self> {
        if seeds.is_empty() {
            return Err(Error::EmptyTable);
        }

        let mut points = Vec::new();
        points
            .try_reserve_exact(seeds.len())
            .map_err(|_| Error::InvalidConfig("out of memory for OPP table"))?;

        for seed in seeds {
            let vgpu = source
                .and_then(|src| src.voltage_for(seed.freq_khz))
                .map(|volt| normalize_volt(volt, config.pmic_step))
                .unwrap_or(seed.vgpu);
            points.push(OperatingPoint::new(
                seed.freq_khz,
                vgpu,
                rule.vsram_from_vgpu(vgpu),
                seed.aging_margin,
            ));
        }

        let default_vgpu = points.iter().map(|opp| opp.vgpu).collect();
        let table = Self {
            points,
            default_vgpu,
            rule,
            aging_applied: false,
        };
        table.validate(config)?;
        Ok(table)
    }

    /// Check frequency ordering and the VSRAM/VGPU window
    ///
    /// The window is checked for both the unaged and the aged voltages.
    pub fn validate(&self, config: &DvfsConfig) -> Result<()> {
        if self.points.is_empty() {
            return Err(Error::EmptyTable);
        }
        for (index, pair) in self.points.windows(2).enumerate() {
            if pair[1].freq_khz >= pair[0].freq_khz {
                return Err(Error::FrequencyOrder { index: index + 1 });
            }
        }
        for (index, opp) in self.points.iter().enumerate() {
            let unaged = if self.aging_applied {
                opp.vgpu + opp.aging_margin
            } else {
                opp.vgpu
            };
            if opp.aging_margin >= unaged {
                return Err(Error::BuckConstraint { index });
            }
            for vgpu in [unaged, unaged - opp.aging_margin] {
                let diff = self.rule.vsram_from_vgpu(vgpu).checked_sub(vgpu);
                match diff {
                    Some(diff) if diff >= config.buck_diff_min && diff <= config.buck_diff_max => {}
                    _ => return Err(Error::BuckConstraint { index }),
                }
            }
        }
        Ok(())
    }

    /// Number of operating points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Operating point at `idx`
    pub fn get(&self, idx: usize) -> Option<&OperatingPoint> {
        self.points.get(idx)
    }

    /// All operating points
    pub fn points(&self) -> &[OperatingPoint] {
        &self.points
    }

    /// Lowest and highest VGPU in the table
    pub fn vgpu_range(&self) -> Option<(CentiMv, CentiMv)> {
        let lowest = self.points.iter().map(|opp| opp.vgpu).min()?;
        let highest = self.points.iter().map(|opp| opp.vgpu).max()?;
        Some((lowest, highest))
    }

    /// VSRAM rule in effect
    pub fn vsram_rule(&self) -> VsramRule {
        self.rule
    }

    /// Whether aging compensation is applied
    pub fn aging_applied(&self) -> bool {
        self.aging_applied
    }

    /// VGPU captured at build time
    pub fn default_vgpu(&self, idx: usize) -> Option<CentiMv> {
        self.default_vgpu.get(idx).copied()
    }

    /// Apply or remove the aging margin
    ///
    /// Returns `false` when the table already was in the requested state.
    pub fn apply_aging(&mut self, apply: bool) -> bool {
        if self.aging_applied == apply {
            return false;
        }
        for opp in self.points.iter_mut() {
            if apply {
                opp.vgpu -= opp.aging_margin;
            } else {
                opp.vgpu += opp.aging_margin;
            }
            opp.vsram = self.rule.vsram_from_vgpu(opp.vgpu);
        }
        self.aging_applied = apply;
        true
    }

    /// Replace every VGPU with new unaged voltages
    pub fn update_volt(&mut self, volts: &[CentiMv], config: &DvfsConfig) -> Result<()> {
        if volts.len() != self.points.len() {
            return Err(Error::VoltTableLength {
                expected: self.points.len(),
                got: volts.len(),
            });
        }

        let previous = self.points.clone();
        for (opp, &volt) in self.points.iter_mut().zip(volts) {
            let unaged = normalize_volt(volt, config.pmic_step);
            opp.vgpu = if self.aging_applied {
                unaged.saturating_sub(opp.aging_margin)
            } else {
                unaged
            };
            opp.vsram = self.rule.vsram_from_vgpu(opp.vgpu);
        }

        if let Err(err) = self.validate(config) {
            self.points = previous;
            return Err(err);
        }
        Ok(())
    }

    /// Go back to the voltages captured at build time
    pub fn restore_default_volt(&mut self) {
        for (opp, &unaged) in self.points.iter_mut().zip(self.default_vgpu.iter()) {
            opp.vgpu = if self.aging_applied {
                unaged - opp.aging_margin
            } else {
                unaged
            };
            opp.vsram = self.rule.vsram_from_vgpu(opp.vgpu);
        }
    }

    /// Fastest index within `range` whose frequency does not exceed `freq_khz`
    ///
    /// A frequency below every entry of the range maps to the range's slowest
    /// index.
    pub fn idx_by_freq(&self, freq_khz: FreqKhz, range: RangeInclusive<usize>) -> usize {
        let last = *range.end();
        range
            .into_iter()
            .find(|&idx| self.points.get(idx).is_some_and(|opp| opp.freq_khz <= freq_khz))
            .unwrap_or(last)
    }
}
