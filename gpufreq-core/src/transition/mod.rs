//! Transition engine
//!
//! Moves the GPU from its current operating state to a target one:
//!
//! - equal frequency: one voltage switch
//! - rising frequency: ramp voltage up through the springboard chain, then
//!   switch the clock
//! - falling frequency: switch the clock, then ramp voltage down
//!
//! All hardware access is best effort. After a transition the hardware is
//! read back and the readback becomes the new state.

pub mod clock;
pub mod volt;

pub use clock::{clock_switch, pll_setting};
pub use volt::{SettleTime, VsramRule, normalize_volt, settle_time, volt_switch};

use alloc::vec::Vec;
use core::cmp::Ordering;

use gpufreq_api::{CentiMv, CurrentState, FreqKhz, GpuHardware, Rail};

use crate::config::DvfsConfig;
use crate::opp::OppTable;
use crate::springboard::SpringboardTable;

/// Upper bound on window-limited sub-steps of one voltage move
const MAX_VOLT_SUBSTEPS: usize = 32;

/// Where a transition should end up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionTarget {
    /// Target OPP index
    pub idx: usize,
    /// Target frequency
    pub freq_khz: FreqKhz,
    /// Target VGPU voltage
    pub vgpu: CentiMv,
    /// Target VSRAM voltage
    pub vsram: CentiMv,
}

impl TransitionTarget {
    /// Target taken straight from an OPP table entry
    pub fn from_table(table: &OppTable, idx: usize) -> Option<Self> {
        table.get(idx).map(|opp| Self {
            idx,
            freq_khz: opp.freq_khz,
            vgpu: opp.vgpu,
            vsram: opp.vsram,
        })
    }
}

/// Direction of a transition, decided by frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Voltage only
    Equal,
    /// Frequency rises
    Rising,
    /// Frequency falls
    Falling,
}

/// Record of one performed transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTrace {
    /// Direction taken
    pub direction: Direction,
    /// Springboard indices visited, in order
    pub steps: Vec<usize>,
    /// Number of voltage switches issued
    pub volt_switches: usize,
    /// Longest computed settle time
    pub max_settle_us: u32,
}

/// Drives one transition against a hardware backend
pub struct TransitionEngine<'a, H: GpuHardware> {
    hw: &'a mut H,
    config: &'a DvfsConfig,
}

impl<'a, H: GpuHardware> TransitionEngine<'a, H> {
    /// Create a transition engine
    pub fn new(hw: &'a mut H, config: &'a DvfsConfig) -> Self {
        Self { hw, config }
    }

    /// Move `state` to `target`
    pub fn run(
        &mut self,
        state: &mut CurrentState,
        target: TransitionTarget,
        table: &OppTable,
        springboard: &SpringboardTable,
    ) -> TransitionTrace {
        let direction = match target.freq_khz.cmp(&state.freq_khz) {
            Ordering::Equal => Direction::Equal,
            Ordering::Greater => Direction::Rising,
            Ordering::Less => Direction::Falling,
        };
        let mut trace = TransitionTrace {
            direction,
            steps: Vec::new(),
            volt_switches: 0,
            max_settle_us: 0,
        };

        match direction {
            Direction::Equal => {
                self.switch_volt(state, target.vgpu, target.vsram, &mut trace);
            }
            Direction::Rising => {
                self.ramp(state, target, table, springboard, &mut trace);
                clock_switch(self.hw, &self.config.pll, state, target.freq_khz);
            }
            Direction::Falling => {
                clock_switch(self.hw, &self.config.pll, state, target.freq_khz);
                self.ramp(state, target, table, springboard, &mut trace);
            }
        }

        state.opp_idx = target.idx;
        self.read_back(state);
        trace
    }

    /// Step voltage through the springboard chain towards the target
    ///
    /// Springboard entries that would move VGPU away from the target, or
    /// past it, are visited without touching the rails. Rails reached after
    /// an override need not match the table entry of `state.opp_idx`.
    fn ramp(
        &mut self,
        state: &mut CurrentState,
        target: TransitionTarget,
        table: &OppTable,
        springboard: &SpringboardTable,
        trace: &mut TransitionTrace,
    ) {
        let rising = trace.direction == Direction::Rising;

        while state.vgpu != target.vgpu && state.opp_idx != target.idx {
            let next = if rising {
                springboard.next_up(state.opp_idx, target.idx)
            } else {
                springboard.next_down(state.opp_idx, target.idx)
            };
            let Some(opp) = table.get(next) else {
                gf_error!("springboard index {} outside OPP table", next);
                break;
            };

            let toward_target = if rising {
                opp.vgpu > state.vgpu && opp.vgpu <= target.vgpu
            } else {
                opp.vgpu < state.vgpu && opp.vgpu >= target.vgpu
            };
            gf_trace!("springboard step {} -> {}", state.opp_idx, next);
            if toward_target {
                self.switch_volt(state, opp.vgpu, opp.vsram, trace);
            }
            state.opp_idx = next;
            trace.steps.push(next);
        }

        // Overrides may ask for voltages that are not in the table
        self.switch_volt(state, target.vgpu, target.vsram, trace);
    }

    /// Move both rails to `vgpu`/`vsram` from wherever they are now
    ///
    /// The move is split so that after every single rail write VSRAM stays
    /// between `buck_diff_min` and `buck_diff_max` above VGPU. Moves between
    /// two table entries linked by the springboard need one switch.
    fn switch_volt(
        &mut self,
        state: &mut CurrentState,
        vgpu: CentiMv,
        vsram: CentiMv,
        trace: &mut TransitionTrace,
    ) {
        let diff_min = self.config.buck_diff_min;
        let diff_max = self.config.buck_diff_max;

        for _ in 0..MAX_VOLT_SUBSTEPS {
            if state.vgpu == vgpu && state.vsram == vsram {
                return;
            }
            let rising = vgpu > state.vgpu || (vgpu == state.vgpu && vsram > state.vsram);
            // VSRAM leads on the way up, VGPU on the way down
            let (next_vgpu, next_vsram) = if rising {
                let next_vsram = vsram.min(state.vgpu.saturating_add(diff_max));
                (vgpu.min(next_vsram.saturating_sub(diff_min)), next_vsram)
            } else {
                let next_vgpu = vgpu.max(state.vsram.saturating_sub(diff_max));
                (next_vgpu, vsram.max(next_vgpu.saturating_add(diff_min)))
            };
            if next_vgpu == state.vgpu && next_vsram == state.vsram {
                break;
            }
            if next_vgpu != vgpu || next_vsram != vsram {
                gf_trace!("volt sub-step vgpu {} vsram {}", next_vgpu, next_vsram);
            }
            self.write_volt(state, next_vgpu, next_vsram, trace);
        }

        if state.vgpu != vgpu || state.vsram != vsram {
            gf_warn!(
                "no differential-safe path to vgpu {} vsram {}, switching directly",
                vgpu,
                vsram
            );
            self.write_volt(state, vgpu, vsram, trace);
        }
    }

    fn write_volt(
        &mut self,
        state: &mut CurrentState,
        vgpu: CentiMv,
        vsram: CentiMv,
        trace: &mut TransitionTrace,
    ) {
        if let Some(settle) = volt_switch(self.hw, self.config, state, vgpu, vsram) {
            trace.volt_switches += 1;
            trace.max_settle_us = trace.max_settle_us.max(settle.max_us());
        }
    }

    /// Replace the commanded state with what the hardware reports
    pub fn read_back(&mut self, state: &mut CurrentState) {
        match self.hw.read_freq_khz() {
            Ok(freq) => state.freq_khz = freq,
            Err(err) => {
                gf_warn!("frequency readback failed: {}", err);
            }
        }
        match self.hw.read_rail_voltage(Rail::Vgpu) {
            Ok(volt) => state.vgpu = volt,
            Err(err) => {
                gf_warn!("VGPU readback failed: {}", err);
            }
        }
        match self.hw.read_rail_voltage(Rail::Vsram) {
            Ok(volt) => state.vsram = volt,
            Err(err) => {
                gf_warn!("VSRAM readback failed: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BUCK_DIFF_MAX;
    use crate::segment::OppSeed;
    use gpufreq_api::{ClockSource, HwError, PllSetting, PowerStage};

    #[derive(Default)]
    struct Rails {
        vgpu: CentiMv,
        vsram: CentiMv,
        freq: FreqKhz,
        worst_diff: CentiMv,
        writes: Vec<Rail>,
    }

    impl GpuHardware for Rails {
        fn set_rail_voltage(&mut self, rail: Rail, volt: CentiMv) -> Result<(), HwError> {
            match rail {
                Rail::Vgpu => self.vgpu = volt,
                Rail::Vsram => self.vsram = volt,
            }
            self.worst_diff = self.worst_diff.max(self.vsram.abs_diff(self.vgpu));
            self.writes.push(rail);
            Ok(())
        }

        fn read_rail_voltage(&mut self, rail: Rail) -> Result<CentiMv, HwError> {
            Ok(match rail {
                Rail::Vgpu => self.vgpu,
                Rail::Vsram => self.vsram,
            })
        }

        fn select_clock_source(&mut self, _source: ClockSource) -> Result<(), HwError> {
            Ok(())
        }

        fn program_pll(&mut self, freq_khz: FreqKhz, _setting: PllSetting) -> Result<(), HwError> {
            self.freq = freq_khz;
            Ok(())
        }

        fn read_freq_khz(&mut self) -> Result<FreqKhz, HwError> {
            Ok(self.freq)
        }

        fn set_power_stage(&mut self, _stage: PowerStage, _on: bool) -> Result<(), HwError> {
            Ok(())
        }

        fn delay_us(&mut self, _us: u32) {}
    }

    fn wide_table() -> OppTable {
        let seeds: Vec<OppSeed> = (0..8u32)
            .map(|i| OppSeed {
                freq_khz: 1_000_000 - i * 100_000,
                vgpu: 110_000 - i * 6_250,
                aging_margin: 0,
            })
            .collect();
        OppTable::build(&seeds, VsramRule::TRACK_75000, None, &DvfsConfig::default()).unwrap()
    }

    fn settled_at(table: &OppTable, idx: usize) -> (Rails, CurrentState) {
        let opp = table.get(idx).unwrap();
        let hw = Rails {
            vgpu: opp.vgpu,
            vsram: opp.vsram,
            freq: opp.freq_khz,
            worst_diff: opp.vsram - opp.vgpu,
            writes: Vec::new(),
        };
        let state = CurrentState {
            opp_idx: idx,
            freq_khz: opp.freq_khz,
            vgpu: opp.vgpu,
            vsram: opp.vsram,
            power_count: 1,
        };
        (hw, state)
    }

    #[test]
    fn test_rising_walks_springboard_chain() {
        let table = wide_table();
        let sb = SpringboardTable::build(&table, BUCK_DIFF_MAX);
        let config = DvfsConfig::default();
        let (mut hw, mut state) = settled_at(&table, 7);

        let target = TransitionTarget::from_table(&table, 0).unwrap();
        let trace = TransitionEngine::new(&mut hw, &config).run(&mut state, target, &table, &sb);

        assert_eq!(trace.direction, Direction::Rising);
        assert_eq!(trace.steps, vec![5, 3, 1, 0]);
        assert_eq!(state.opp_idx, 0);
        assert_eq!(state.freq_khz, 1_000_000);
        assert_eq!(state.vgpu, 110_000);
        assert!(hw.worst_diff <= BUCK_DIFF_MAX);
    }

    #[test]
    fn test_falling_walks_springboard_chain() {
        let table = wide_table();
        let sb = SpringboardTable::build(&table, BUCK_DIFF_MAX);
        let config = DvfsConfig::default();
        let (mut hw, mut state) = settled_at(&table, 0);

        let target = TransitionTarget::from_table(&table, 7).unwrap();
        let trace = TransitionEngine::new(&mut hw, &config).run(&mut state, target, &table, &sb);

        assert_eq!(trace.direction, Direction::Falling);
        assert_eq!(*trace.steps.last().unwrap(), 7);
        assert!(trace.steps.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(state.opp_idx, 7);
        assert_eq!(state.vsram, 85_000);
        assert!(hw.worst_diff <= BUCK_DIFF_MAX);
    }

    #[test]
    fn test_equal_frequency_is_voltage_only() {
        let table = wide_table();
        let sb = SpringboardTable::build(&table, BUCK_DIFF_MAX);
        let config = DvfsConfig::default();
        let (mut hw, mut state) = settled_at(&table, 3);

        let mut target = TransitionTarget::from_table(&table, 3).unwrap();
        target.vgpu -= 625;
        target.vsram -= 625;
        let trace = TransitionEngine::new(&mut hw, &config).run(&mut state, target, &table, &sb);

        assert_eq!(trace.direction, Direction::Equal);
        assert!(trace.steps.is_empty());
        assert_eq!(trace.volt_switches, 1);
        // falling voltage programs VGPU first
        assert_eq!(hw.writes, vec![Rail::Vgpu, Rail::Vsram]);
        assert_eq!(state.vgpu, 90_625);
    }

    #[test]
    fn test_off_table_voltage_is_split_into_safe_steps() {
        let table = wide_table();
        let sb = SpringboardTable::build(&table, BUCK_DIFF_MAX);
        let config = DvfsConfig::default();
        let (mut hw, mut state) = settled_at(&table, 7);

        // same index, far higher voltage than the table entry
        let target = TransitionTarget {
            idx: 7,
            freq_khz: 350_000,
            vgpu: 110_000,
            vsram: 120_000,
        };
        let trace = TransitionEngine::new(&mut hw, &config).run(&mut state, target, &table, &sb);

        assert_eq!(trace.direction, Direction::Rising);
        assert_eq!(trace.volt_switches, 3);
        assert_eq!((state.vgpu, state.vsram), (110_000, 120_000));
        assert!(hw.worst_diff <= BUCK_DIFF_MAX);
    }

    #[test]
    fn test_equal_frequency_leaves_off_table_rails_safely() {
        let table = wide_table();
        let sb = SpringboardTable::build(&table, BUCK_DIFF_MAX);
        let config = DvfsConfig::default();
        let (mut hw, mut state) = settled_at(&table, 0);
        state.opp_idx = 7;
        state.freq_khz = table.get(7).unwrap().freq_khz;

        let target = TransitionTarget::from_table(&table, 7).unwrap();
        let trace = TransitionEngine::new(&mut hw, &config).run(&mut state, target, &table, &sb);

        assert_eq!(trace.direction, Direction::Equal);
        assert_eq!((state.vgpu, state.vsram), (target.vgpu, target.vsram));
        assert!(hw.worst_diff <= BUCK_DIFF_MAX);
    }

    #[test]
    fn test_falling_override_does_not_dip_below_target() {
        let table = wide_table();
        let sb = SpringboardTable::build(&table, BUCK_DIFF_MAX);
        let config = DvfsConfig::default();
        let (mut hw, mut state) = settled_at(&table, 0);

        let target = TransitionTarget {
            idx: 7,
            freq_khz: 300_000,
            vgpu: 103_750,
            vsram: 113_750,
        };
        let trace = TransitionEngine::new(&mut hw, &config).run(&mut state, target, &table, &sb);

        // springboard entries below 1.0375 V are passed over
        assert_eq!(*trace.steps.last().unwrap(), 7);
        assert_eq!(trace.volt_switches, 1);
        assert_eq!(hw.writes, vec![Rail::Vgpu, Rail::Vsram]);
        assert_eq!(state.freq_khz, 300_000);
        assert_eq!(state.vgpu, 103_750);
    }
}
