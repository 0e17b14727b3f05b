//! GPUFREQ API - Core types and interfaces for the GPU DVFS engine
//!
//! This crate provides the vocabulary shared between the DVFS engine and the
//! code that embeds it: unit aliases, operating points, limiter kickers,
//! state snapshots, diagnostics and the hardware-facing traits.
//!
//! # Architecture
//!
//! - **Types**: Operating points, kickers, priorities and state snapshots
//! - **Error**: Construction errors, hardware errors and skip diagnostics
//! - **Hw**: Traits implemented by the platform (rails, clock, power domain)
//!   and by budget consumers
//! - **Sync**: Lock primitives used by the engine
//!
//! # Usage
//!
//! ```rust
//! use gpufreq_api::{KickerId, OperatingPoint};
//!
//! let opp = OperatingPoint::new(950_000, 80_000, 90_000, 625);
//! assert_eq!(opp.freq_khz, 950_000);
//! assert_eq!(KickerId::Thermal.name(), "THERMAL");
//! ```

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod types;
pub mod error;
pub mod hw;
pub mod sync;

// Re-export commonly used types
pub use crate::types::*;
pub use crate::error::{Error, HwError, Result, SkipMask, SkipReason};
pub use crate::hw::{
    BudgetUpdate, ClockSource, GpuHardware, LeakageModel, PllSetting, PowerBudget, PowerStage,
    Rail, VoltageSource,
};
