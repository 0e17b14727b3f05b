//! Common test utilities
//!
//! A fake GPU backend that records every hardware operation and a power
//! budget consumer that records every notification.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use gpufreq_core::{
    BUCK_DIFF_MAX, BudgetUpdate, CentiMv, ClockSource, DvfsEngine, FreqKhz, GpuHardware, HwError,
    PllSetting, PowerBudget, PowerStage, Rail, Segment,
};

/// One recorded hardware operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwOp {
    SetRail(Rail, CentiMv),
    Clock(ClockSource),
    Pll(FreqKhz),
    Stage(PowerStage, bool),
    Delay(u32),
}

/// Hardware state shared between the fake and the test
#[derive(Debug, Default)]
pub struct HwLog {
    pub ops: Vec<HwOp>,
    pub vgpu: CentiMv,
    pub vsram: CentiMv,
    pub freq_khz: FreqKhz,
    /// Largest VSRAM - VGPU differential seen after any rail write
    pub worst_diff: CentiMv,
    /// VSRAM dropped below VGPU at some point
    pub inverted: bool,
    pub fail_rail_writes: bool,
    pub fail_readback: bool,
}

impl HwLog {
    pub fn rail_writes(&self) -> Vec<(Rail, CentiMv)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                HwOp::SetRail(rail, volt) => Some((*rail, *volt)),
                _ => None,
            })
            .collect()
    }

    pub fn stages(&self) -> Vec<(PowerStage, bool)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                HwOp::Stage(stage, on) => Some((*stage, *on)),
                _ => None,
            })
            .collect()
    }
}

/// Fake GPU backend
#[derive(Debug, Clone, Default)]
pub struct FakeHardware {
    log: Arc<Mutex<HwLog>>,
}

impl FakeHardware {
    /// Hardware left by the bootloader at the slowest signed OPP
    pub fn booted() -> Self {
        Self::booted_at(350_000, 61_875, 85_000)
    }

    pub fn booted_at(freq_khz: FreqKhz, vgpu: CentiMv, vsram: CentiMv) -> Self {
        let hw = Self::default();
        {
            let mut log = hw.log();
            log.freq_khz = freq_khz;
            log.vgpu = vgpu;
            log.vsram = vsram;
            log.worst_diff = vsram.saturating_sub(vgpu);
        }
        hw
    }

    pub fn log(&self) -> MutexGuard<'_, HwLog> {
        self.log.lock().unwrap()
    }

    pub fn clear_ops(&self) {
        self.log().ops.clear();
    }
}

impl GpuHardware for FakeHardware {
    fn set_rail_voltage(&mut self, rail: Rail, volt: CentiMv) -> Result<(), HwError> {
        let mut log = self.log();
        log.ops.push(HwOp::SetRail(rail, volt));
        if log.fail_rail_writes {
            return Err(HwError::Regulator(-16));
        }
        match rail {
            Rail::Vgpu => log.vgpu = volt,
            Rail::Vsram => log.vsram = volt,
        }
        match log.vsram.checked_sub(log.vgpu) {
            Some(diff) => log.worst_diff = log.worst_diff.max(diff),
            None => log.inverted = true,
        }
        Ok(())
    }

    fn read_rail_voltage(&mut self, rail: Rail) -> Result<CentiMv, HwError> {
        let log = self.log();
        if log.fail_readback {
            return Err(HwError::Readback);
        }
        Ok(match rail {
            Rail::Vgpu => log.vgpu,
            Rail::Vsram => log.vsram,
        })
    }

    fn select_clock_source(&mut self, source: ClockSource) -> Result<(), HwError> {
        self.log().ops.push(HwOp::Clock(source));
        Ok(())
    }

    fn program_pll(&mut self, freq_khz: FreqKhz, _setting: PllSetting) -> Result<(), HwError> {
        let mut log = self.log();
        log.ops.push(HwOp::Pll(freq_khz));
        log.freq_khz = freq_khz;
        Ok(())
    }

    fn read_freq_khz(&mut self) -> Result<FreqKhz, HwError> {
        let log = self.log();
        if log.fail_readback {
            return Err(HwError::Readback);
        }
        Ok(log.freq_khz)
    }

    fn set_power_stage(&mut self, stage: PowerStage, on: bool) -> Result<(), HwError> {
        self.log().ops.push(HwOp::Stage(stage, on));
        Ok(())
    }

    fn delay_us(&mut self, us: u32) {
        self.log().ops.push(HwOp::Delay(us));
    }
}

/// Records every budget notification
#[derive(Debug, Clone, Default)]
pub struct BudgetRecorder {
    updates: Arc<Mutex<Vec<BudgetUpdate>>>,
}

impl BudgetRecorder {
    pub fn updates(&self) -> Vec<BudgetUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

impl PowerBudget for BudgetRecorder {
    fn on_gpu_update(&self, update: BudgetUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

/// Engine on a segment plus a handle on its fake hardware
pub fn engine_for(segment: Segment) -> (DvfsEngine<FakeHardware>, FakeHardware) {
    let hw = FakeHardware::booted();
    let engine = DvfsEngine::builder(hw.clone())
        .segment(segment)
        .build()
        .expect("engine builds");
    (engine, hw)
}

/// Differential never left the allowed window
pub fn assert_buck_safe(hw: &FakeHardware) {
    let log = hw.log();
    assert!(!log.inverted, "VSRAM fell below VGPU");
    assert!(
        log.worst_diff <= BUCK_DIFF_MAX,
        "differential {} above {}",
        log.worst_diff,
        BUCK_DIFF_MAX
    );
}
