//! GPUFREQ Core
//!
//! This crate provides the MT8169 GPU DVFS engine: OPP and springboard
//! tables, limiter aggregation, target resolution, safe voltage/frequency
//! transitions and power estimation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use gpufreq_core::{DvfsEngine, KickerId, Segment};
//!
//! let engine = DvfsEngine::builder(hw).segment(Segment::from_efuse(code)).build()?;
//! engine.power_on();
//! engine.set_thermal_power_limit(800);
//! engine.request_target(0, KickerId::Policy)?;
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

#[macro_use]
mod logging;

// Re-export API types
pub use gpufreq_api::*;

pub mod config;
pub mod segment;
pub mod opp;
pub mod springboard;
pub mod transition;
pub mod power;
pub mod limiter;
pub mod stress;
pub mod domain;
pub mod engine;
pub mod throttle;
pub mod status;

// Re-export commonly used types
pub use config::{BatteryThrottle, DvfsConfig, PllConfig, PowerReference, RailTiming, BUCK_DIFF_MAX, BUCK_DIFF_MIN};
pub use domain::{PowerChange, PowerDomain, PowerRails};
pub use engine::{DvfsEngine, DvfsEngineBuilder, FixedOverride};
pub use limiter::{BoundWinner, LimitScan, LimiterEntry, LimiterTable};
pub use opp::OppTable;
pub use power::{FixedLeakage, PowerEntry, PowerTable, dynamic_power};
pub use segment::{MT8169_SIGNED_TABLE, OppSeed, Segment, SegmentInfo};
pub use springboard::SpringboardTable;
pub use status::{OppDump, OppRow, StatusReport};
pub use stress::StressGenerator;
pub use transition::{
    Direction, SettleTime, TransitionEngine, TransitionTarget, TransitionTrace, VsramRule,
    clock_switch, normalize_volt, pll_setting, settle_time, volt_switch,
};
