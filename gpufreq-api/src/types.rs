//! Core types for the GPU DVFS engine

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Frequency in kHz
pub type FreqKhz = u32;

/// Voltage in hundredths of a millivolt (10 µV), the PMIC's native unit.
///
/// `80_000` is 0.8 V.
pub type CentiMv = u32;

/// Power in milliwatts
pub type Milliwatt = u32;

/// PMIC voltage step (6.25 mV)
pub const PMIC_STEP: CentiMv = 625;

/// Operating point: one frequency and the rail voltages it needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OperatingPoint {
    /// GPU clock frequency
    pub freq_khz: FreqKhz,
    /// VGPU rail voltage
    pub vgpu: CentiMv,
    /// VSRAM rail voltage
    pub vsram: CentiMv,
    /// Voltage removed from `vgpu` while aging compensation is applied
    pub aging_margin: CentiMv,
}

impl OperatingPoint {
    /// Create an operating point
    pub const fn new(freq_khz: FreqKhz, vgpu: CentiMv, vsram: CentiMv, aging_margin: CentiMv) -> Self {
        Self {
            freq_khz,
            vgpu,
            vsram,
            aging_margin,
        }
    }
}

/// Subsystems that may request an upper/lower OPP index limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum KickerId {
    /// Stress test generator
    Stress,
    /// User requests through the control interface
    Proc,
    /// Voltage binning (PTPOD)
    Ptpod,
    /// Thermal power budget
    Thermal,
    /// Battery over-current throttling
    BattOc,
    /// Low battery voltage throttling
    BattLow,
    /// Battery percentage throttling
    BattPercent,
    /// Peak power budget manager
    Pbm,
    /// Governor policy
    Policy,
}

impl KickerId {
    /// Number of kickers
    pub const COUNT: usize = 9;

    /// Every kicker, in limiter table order
    pub const ALL: [KickerId; Self::COUNT] = [
        KickerId::Stress,
        KickerId::Proc,
        KickerId::Ptpod,
        KickerId::Thermal,
        KickerId::BattOc,
        KickerId::BattLow,
        KickerId::BattPercent,
        KickerId::Pbm,
        KickerId::Policy,
    ];

    /// Slot of this kicker in the limiter table
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Kicker name as shown in status dumps
    pub const fn name(self) -> &'static str {
        match self {
            KickerId::Stress => "STRESS",
            KickerId::Proc => "PROC",
            KickerId::Ptpod => "PTPOD",
            KickerId::Thermal => "THERMAL",
            KickerId::BattOc => "BATT_OC",
            KickerId::BattLow => "BATT_LOW",
            KickerId::BattPercent => "BATT_PERCENT",
            KickerId::Pbm => "PBM",
            KickerId::Policy => "POLICY",
        }
    }

    /// Priority the kicker is created with
    pub const fn default_priority(self) -> LimitPriority {
        match self {
            KickerId::Stress => LimitPriority::P8,
            KickerId::Proc => LimitPriority::P7,
            KickerId::Ptpod => LimitPriority::P6,
            KickerId::Thermal
            | KickerId::BattOc
            | KickerId::BattLow
            | KickerId::BattPercent
            | KickerId::Pbm => LimitPriority::P5,
            KickerId::Policy => LimitPriority::P4,
        }
    }
}

static_assertions::const_assert_eq!(KickerId::ALL.len(), KickerId::COUNT);
static_assertions::const_assert_eq!(KickerId::Policy as usize + 1, KickerId::COUNT);

impl fmt::Display for KickerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Limiter priority; a strictly greater priority always wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LimitPriority(pub u8);

impl LimitPriority {
    /// No priority; the starting point of window resolution
    pub const NONE: Self = Self(0);
    /// Priority 1 (lowest real priority)
    pub const P1: Self = Self(1);
    /// Priority 2
    pub const P2: Self = Self(2);
    /// Priority 3
    pub const P3: Self = Self(3);
    /// Priority 4
    pub const P4: Self = Self(4);
    /// Priority 5
    pub const P5: Self = Self(5);
    /// Priority 6
    pub const P6: Self = Self(6);
    /// Priority 7
    pub const P7: Self = Self(7);
    /// Priority 8 (highest)
    pub const P8: Self = Self(8);
}

/// Snapshot of the engine's current operating state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CurrentState {
    /// Current index into the signed OPP table
    pub opp_idx: usize,
    /// Current GPU frequency
    pub freq_khz: FreqKhz,
    /// Current VGPU voltage
    pub vgpu: CentiMv,
    /// Current VSRAM voltage
    pub vsram: CentiMv,
    /// Power domain enable count
    pub power_count: i32,
}

/// Effective `[upper, lower]` OPP index window after limiter aggregation
///
/// `upper_limited_idx` is the fastest index allowed (numerically smallest),
/// `lower_limited_idx` the slowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResolvedWindow {
    /// Highest-performance index allowed
    pub upper_limited_idx: usize,
    /// Lowest-performance index allowed
    pub lower_limited_idx: usize,
    /// Kicker owning the upper bound, `None` when unconstrained
    pub upper_kicker: Option<KickerId>,
    /// Kicker owning the lower bound, `None` when unconstrained
    pub lower_kicker: Option<KickerId>,
}

impl ResolvedWindow {
    /// Window spanning a whole segment, owned by nobody
    pub const fn unconstrained(segment_max_idx: usize, segment_min_idx: usize) -> Self {
        Self {
            upper_limited_idx: segment_max_idx,
            lower_limited_idx: segment_min_idx,
            upper_kicker: None,
            lower_kicker: None,
        }
    }

    /// Clamp an index into the window
    pub fn clamp(&self, idx: usize) -> usize {
        if idx < self.upper_limited_idx {
            self.upper_limited_idx
        } else if idx > self.lower_limited_idx {
            self.lower_limited_idx
        } else {
            idx
        }
    }
}
