//! Hardware and collaborator interfaces
//!
//! The engine never touches registers itself. Everything it needs from the
//! platform goes through [`GpuHardware`]; consumers of its decisions implement
//! [`PowerBudget`]; optional models plug in through [`VoltageSource`] and
//! [`LeakageModel`].

use crate::error::HwError;
use crate::types::{CentiMv, FreqKhz, Milliwatt};

/// Voltage rails feeding the GPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rail {
    /// GPU core rail
    Vgpu,
    /// GPU SRAM rail
    Vsram,
}

/// Clock mux inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    /// GPU PLL
    Main,
    /// Fixed auxiliary PLL used while the GPU PLL is reprogrammed
    Sub,
}

/// GPU PLL programming word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PllSetting {
    /// Post divider as a power of two
    pub posdiv_power: u8,
    /// DDS word
    pub dds: u32,
}

/// Stages of GPU power bring-up, in power-on order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerStage {
    /// Buck regulators
    Buck,
    /// MTCMOS power domain
    Mtcmos,
    /// Clock gate
    ClockGate,
}

/// Platform access needed by the DVFS engine
///
/// Every method is a single register-level operation. Errors are reported
/// but the engine treats them as best effort.
pub trait GpuHardware {
    /// Program a rail to a voltage
    fn set_rail_voltage(&mut self, rail: Rail, volt: CentiMv) -> Result<(), HwError>;

    /// Read a rail's present voltage
    fn read_rail_voltage(&mut self, rail: Rail) -> Result<CentiMv, HwError>;

    /// Switch the GPU clock mux
    fn select_clock_source(&mut self, source: ClockSource) -> Result<(), HwError>;

    /// Reprogram the GPU PLL for `freq_khz` using the computed `setting`
    fn program_pll(&mut self, freq_khz: FreqKhz, setting: PllSetting) -> Result<(), HwError>;

    /// Read the present GPU frequency
    fn read_freq_khz(&mut self) -> Result<FreqKhz, HwError>;

    /// Enable or disable one power bring-up stage
    fn set_power_stage(&mut self, stage: PowerStage, on: bool) -> Result<(), HwError>;

    /// Busy-wait
    fn delay_us(&mut self, us: u32);
}

/// Supplies per-frequency voltages that replace the compiled-in ones
pub trait VoltageSource {
    /// Voltage for `freq_khz`, or `None` to keep the table value
    fn voltage_for(&self, freq_khz: FreqKhz) -> Option<CentiMv>;
}

/// Notification sent to a power budget consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetUpdate {
    /// Whether the GPU is powered
    pub powered: bool,
    /// Current frequency
    pub freq_khz: FreqKhz,
    /// Current VGPU voltage
    pub vgpu: CentiMv,
    /// Estimated power at the current point
    pub power_mw: Milliwatt,
}

/// Consumer of GPU power state, e.g. a peak power budget manager
pub trait PowerBudget: Send + Sync {
    /// Called after every performed transition and power state change
    fn on_gpu_update(&self, update: BudgetUpdate);
}

/// Static (leakage) power model
pub trait LeakageModel: Send + Sync {
    /// Leakage at a VGPU voltage
    fn leakage_mw(&self, vgpu: CentiMv) -> Milliwatt;
}
