//! Chip segments and their compiled-in OPP tables
//!
//! Every MT8169 carries the same signed OPP table. The segment read from the
//! efuse decides which sub-range of it may be used and which VSRAM rule
//! applies below the tracking threshold.

use gpufreq_api::{CentiMv, FreqKhz};

use crate::transition::VsramRule;

/// Seed of one operating point: the values compiled into the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OppSeed {
    /// Frequency
    pub freq_khz: FreqKhz,
    /// Signed VGPU voltage
    pub vgpu: CentiMv,
    /// Aging margin
    pub aging_margin: CentiMv,
}

const fn seed(freq_khz: FreqKhz, vgpu: CentiMv, aging_margin: CentiMv) -> OppSeed {
    OppSeed {
        freq_khz,
        vgpu,
        aging_margin,
    }
}

/// Signed OPP table of the MT8169 GPU
pub static MT8169_SIGNED_TABLE: [OppSeed; 16] = [
    seed(950_000, 80_000, 625),
    seed(915_000, 78_750, 625),
    seed(880_000, 77_500, 625),
    seed(850_000, 76_250, 625),
    seed(800_000, 75_000, 625),
    seed(747_000, 73_750, 625),
    seed(700_000, 72_500, 625),
    seed(650_000, 71_250, 625),
    seed(600_000, 70_000, 625),
    seed(555_000, 68_750, 625),
    seed(510_000, 67_500, 625),
    seed(485_000, 66_250, 625),
    seed(455_000, 65_000, 625),
    seed(420_000, 63_750, 625),
    seed(390_000, 62_500, 625),
    seed(350_000, 61_875, 625),
];

/// Chip binning classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Segment {
    /// Full speed part
    #[default]
    Mt8169A,
    /// Mid bin, capped at 880 MHz
    Mt8169B,
    /// Low bin, capped at 800 MHz
    Mt8169Lite,
}

/// Per-segment parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Segment name
    pub name: &'static str,
    /// Highest-performance index usable by this segment
    pub max_opp_idx: usize,
    /// Lowest-performance index usable by this segment
    pub min_opp_idx: usize,
    /// VSRAM derivation rule
    pub vsram_rule: VsramRule,
}

impl Segment {
    /// Map an efuse segment code to a segment
    ///
    /// Unknown codes select [`Segment::Mt8169A`].
    pub fn from_efuse(code: u32) -> Self {
        match code {
            0x00 | 0x01 => Segment::Mt8169A,
            0x02 => Segment::Mt8169B,
            0x03 | 0x04 => Segment::Mt8169Lite,
            _ => {
                gf_warn!("unknown efuse segment code {:#x}, using MT8169A", code);
                Segment::Mt8169A
            }
        }
    }

    /// Parameters of this segment
    pub const fn info(self) -> SegmentInfo {
        match self {
            Segment::Mt8169A => SegmentInfo {
                name: "MT8169A",
                max_opp_idx: 0,
                min_opp_idx: 15,
                vsram_rule: VsramRule::TRACK_75000,
            },
            Segment::Mt8169B => SegmentInfo {
                name: "MT8169B",
                max_opp_idx: 2,
                min_opp_idx: 15,
                vsram_rule: VsramRule::TRACK_72500,
            },
            Segment::Mt8169Lite => SegmentInfo {
                name: "MT8169-LITE",
                max_opp_idx: 4,
                min_opp_idx: 15,
                vsram_rule: VsramRule::TRACK_75000,
            },
        }
    }

    /// Compiled-in seeds of the signed table
    pub fn seeds(self) -> &'static [OppSeed] {
        &MT8169_SIGNED_TABLE
    }
}
