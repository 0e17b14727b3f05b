//! Status dumps
//!
//! Owned snapshots taken under the engine locks, printable with `Display`.

use alloc::vec::Vec;
use core::fmt;

use gpufreq_api::{CurrentState, GpuHardware, Milliwatt, OperatingPoint, ResolvedWindow};

use crate::domain::PowerDomain;
use crate::engine::{DvfsEngine, FixedOverride};

/// One row of the OPP dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OppRow {
    /// Signed-table index
    pub idx: usize,
    /// Operating point
    pub opp: OperatingPoint,
    /// Total power
    pub power_mw: Milliwatt,
    /// Springboard index when ramping up
    pub up: usize,
    /// Springboard index when ramping down
    pub down: usize,
}

/// OPP table dump of the usable segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OppDump {
    /// Rows from the segment's fastest to slowest OPP
    pub rows: Vec<OppRow>,
    /// Current index
    pub current_idx: usize,
}

impl fmt::Display for OppDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  {:>3} {:>8} {:>7} {:>7} {:>5} {:>6} {:>3} {:>4}",
            "idx", "freq", "vgpu", "vsram", "aging", "power", "up", "down"
        )?;
        for row in self.rows.iter() {
            let mark = if row.idx == self.current_idx { '*' } else { ' ' };
            writeln!(
                f,
                "{} {:>3} {:>8} {:>7} {:>7} {:>5} {:>6} {:>3} {:>4}",
                mark,
                row.idx,
                row.opp.freq_khz,
                row.opp.vgpu,
                row.opp.vsram,
                row.opp.aging_margin,
                row.power_mw,
                row.up,
                row.down
            )?;
        }
        Ok(())
    }
}

/// Current engine status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Segment name
    pub segment: &'static str,
    /// Operating state
    pub state: CurrentState,
    /// Limiter window
    pub window: ResolvedWindow,
    /// Whether requests are acted upon
    pub dvfs_enabled: bool,
    /// Active override
    pub fixed: Option<FixedOverride>,
    /// Whether the aging margin is applied
    pub aging_applied: bool,
    /// Whether stress testing is on
    pub stress_enabled: bool,
    /// Power domain
    pub power: PowerDomain,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "segment: {}", self.segment)?;
        writeln!(
            f,
            "opp {}: {} kHz, vgpu {}, vsram {}",
            self.state.opp_idx, self.state.freq_khz, self.state.vgpu, self.state.vsram
        )?;
        writeln!(
            f,
            "window: [{}, {}]",
            self.window.upper_limited_idx, self.window.lower_limited_idx
        )?;
        writeln!(f, "dvfs: {}", if self.dvfs_enabled { "enabled" } else { "disabled" })?;
        match self.fixed {
            Some(fixed) => writeln!(f, "fixed: {}", fixed)?,
            None => writeln!(f, "fixed: none")?,
        }
        writeln!(f, "aging: {}", self.aging_applied)?;
        writeln!(f, "stress: {}", self.stress_enabled)?;
        write!(f, "{}", self.power)
    }
}

impl<H: GpuHardware> DvfsEngine<H> {
    /// Dump of the segment's OPPs with power and springboard columns
    pub fn opp_dump(&self) -> OppDump {
        let inner = self.gpufreq.lock();
        let rows = self
            .segment_range()
            .filter_map(|idx| {
                let opp = *inner.table.get(idx)?;
                Some(OppRow {
                    idx,
                    opp,
                    power_mw: inner.power_table.total_power(idx),
                    up: inner.springboard.up(idx),
                    down: inner.springboard.down(idx),
                })
            })
            .collect();
        OppDump {
            rows,
            current_idx: inner.state.opp_idx,
        }
    }

    /// Snapshot of the engine status
    pub fn status(&self) -> StatusReport {
        let inner = self.gpufreq.lock();
        let window = self.limit.lock().window();
        let power = *self.power.lock();
        StatusReport {
            segment: self.segment.name,
            state: inner.state,
            window,
            dvfs_enabled: inner.dvfs_enabled,
            fixed: inner.fixed,
            aging_applied: inner.table.aging_applied(),
            stress_enabled: inner.stress.enabled(),
            power,
        }
    }
}
