//! Springboard index table
//!
//! VSRAM and VGPU must stay within `buck_diff_max` of each other at every
//! moment, including between the two rail writes of a voltage switch. A jump
//! between distant OPPs may break that, so transitions walk through
//! intermediate "springboard" indices computed here.

use alloc::vec::Vec;

use gpufreq_api::CentiMv;

use crate::opp::OppTable;

/// Safe intermediate indices for ramping up and down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpringboardTable {
    up: Vec<usize>,
    down: Vec<usize>,
}

impl SpringboardTable {
    /// Derive the springboard table from an OPP table
    ///
    /// `up[i]` is the fastest index whose VSRAM can be written while VGPU is
    /// still at OPP `i`. `down[i]` is the slowest index whose VGPU can be
    /// written while VSRAM is still at OPP `i`.
    pub fn build(table: &OppTable, buck_diff_max: CentiMv) -> Self {
        let points = table.points();
        let len = points.len();
        let last = len.saturating_sub(1);

        // first index already at the lowest VSRAM
        let floor_vsram = points.last().map(|opp| opp.vsram).unwrap_or_default();
        let min_vsram_idx = points
            .iter()
            .position(|opp| opp.vsram == floor_vsram)
            .unwrap_or(last);

        let up = (0..len)
            .map(|i| {
                let ceiling = points[i].vgpu + buck_diff_max;
                (0..=min_vsram_idx)
                    .find(|&j| points[j].vsram <= ceiling)
                    .unwrap_or(min_vsram_idx)
            })
            .collect();

        let down = (0..len)
            .map(|i| {
                if i >= min_vsram_idx {
                    return last;
                }
                let floor = points[i].vsram.saturating_sub(buck_diff_max);
                (0..len)
                    .rev()
                    .find(|&j| points[j].vgpu >= floor)
                    .unwrap_or(i)
            })
            .collect();

        let table = Self { up, down };
        gf_trace!("springboard up {:?} down {:?}", table.up, table.down);
        table
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.up.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.up.is_empty()
    }

    /// Springboard index when ramping up from `idx`
    pub fn up(&self, idx: usize) -> usize {
        self.up[idx]
    }

    /// Springboard index when ramping down from `idx`
    pub fn down(&self, idx: usize) -> usize {
        self.down[idx]
    }

    /// Next index on the way from `cur` to the faster `target`
    ///
    /// Never overshoots `target` and always makes progress.
    pub fn next_up(&self, cur: usize, target: usize) -> usize {
        if cur <= target {
            return target;
        }
        let sb = self.up[cur].max(target);
        if sb >= cur {
            gf_warn!("no springboard progress up from {}, stepping one index", cur);
            cur - 1
        } else {
            sb
        }
    }

    /// Next index on the way from `cur` to the slower `target`
    ///
    /// Never overshoots `target` and always makes progress.
    pub fn next_down(&self, cur: usize, target: usize) -> usize {
        if cur >= target {
            return target;
        }
        let sb = self.down[cur].min(target);
        if sb <= cur {
            gf_warn!("no springboard progress down from {}, stepping one index", cur);
            cur + 1
        } else {
            sb
        }
    }
}
