//! GPU power domain reference counting
//!
//! The first `power_on` brings up buck, MTCMOS and clock gate in that order;
//! the last `power_off` takes them down in reverse.

use core::fmt;

use gpufreq_api::{GpuHardware, PowerStage};

bitflags::bitflags! {
    /// Power stages currently enabled
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PowerRails: u8 {
        /// Buck regulators
        const BUCK = 1 << 0;
        /// MTCMOS power domain
        const MTCMOS = 1 << 1;
        /// Clock gate
        const CLOCK_GATE = 1 << 2;
    }
}

impl Default for PowerRails {
    fn default() -> Self {
        Self::empty()
    }
}

/// Bring-up order
const POWER_ON_SEQUENCE: [(PowerStage, PowerRails); 3] = [
    (PowerStage::Buck, PowerRails::BUCK),
    (PowerStage::Mtcmos, PowerRails::MTCMOS),
    (PowerStage::ClockGate, PowerRails::CLOCK_GATE),
];

/// Outcome of a power request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerChange {
    /// Stages were switched
    Switched,
    /// Only the count changed
    Counted,
    /// `power_off` without matching `power_on`
    Unbalanced,
}

/// Reference-counted GPU power domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerDomain {
    count: i32,
    rails: PowerRails,
}

impl PowerDomain {
    /// Current enable count
    pub fn count(&self) -> i32 {
        self.count
    }

    /// Stages currently enabled
    pub fn rails(&self) -> PowerRails {
        self.rails
    }

    /// Whether the GPU is powered
    pub fn is_powered(&self) -> bool {
        self.count > 0
    }

    /// Take a reference, bringing the domain up on the first one
    pub fn power_on<H: GpuHardware>(&mut self, hw: &mut H) -> PowerChange {
        self.count += 1;
        if self.count > 1 {
            return PowerChange::Counted;
        }
        for (stage, rail) in POWER_ON_SEQUENCE {
            match hw.set_power_stage(stage, true) {
                Ok(()) => self.rails.insert(rail),
                Err(err) => {
                    gf_error!("enabling {:?} failed: {}", stage, err);
                }
            }
        }
        gf_debug!("GPU powered on, rails {:?}", self.rails);
        PowerChange::Switched
    }

    /// Drop a reference, taking the domain down on the last one
    pub fn power_off<H: GpuHardware>(&mut self, hw: &mut H) -> PowerChange {
        if self.count <= 0 {
            gf_warn!("unbalanced GPU power off, count {}", self.count);
            return PowerChange::Unbalanced;
        }
        self.count -= 1;
        if self.count > 0 {
            return PowerChange::Counted;
        }
        for (stage, rail) in POWER_ON_SEQUENCE.iter().rev() {
            match hw.set_power_stage(*stage, false) {
                Ok(()) => self.rails.remove(*rail),
                Err(err) => {
                    gf_error!("disabling {:?} failed: {}", stage, err);
                }
            }
        }
        gf_debug!("GPU powered off, rails {:?}", self.rails);
        PowerChange::Switched
    }
}

impl fmt::Display for PowerDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "power count {} rails {:?}", self.count, self.rails)
    }
}
