//! Error handling module for the GPU DVFS engine
//!
//! Only construction can fail with an [`Error`]. Requests that are not acted
//! upon report a [`SkipReason`]; hardware write failures during a transition
//! are logged by the engine and never surface to callers.

use core::fmt;

/// Errors raised while building the engine or its tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Invalid configuration value
    InvalidConfig(&'static str),
    /// The OPP table has no entries
    EmptyTable,
    /// Frequencies do not strictly decrease at this index
    FrequencyOrder {
        /// Offending index
        index: usize,
    },
    /// VSRAM is outside the allowed window above VGPU at this index
    BuckConstraint {
        /// Offending index
        index: usize,
    },
    /// Index outside of the table
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Table length
        len: usize,
    },
    /// A voltage table of the wrong length was supplied
    VoltTableLength {
        /// Expected number of entries
        expected: usize,
        /// Supplied number of entries
        got: usize,
    },
    /// Voltage outside what the OPP table can drive
    VoltageOutOfRange {
        /// Requested VGPU
        volt: u32,
        /// Lowest table VGPU
        min: u32,
        /// Highest table VGPU
        max: u32,
    },
    /// Hardware access failed
    Hardware(HwError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::EmptyTable => write!(f, "OPP table is empty"),
            Error::FrequencyOrder { index } => {
                write!(f, "OPP frequencies not strictly decreasing at index {}", index)
            }
            Error::BuckConstraint { index } => {
                write!(f, "VSRAM/VGPU differential out of range at index {}", index)
            }
            Error::IndexOutOfRange { index, len } => {
                write!(f, "OPP index {} out of range (table size {})", index, len)
            }
            Error::VoltTableLength { expected, got } => {
                write!(f, "Voltage table length mismatch (expected {}, got {})", expected, got)
            }
            Error::VoltageOutOfRange { volt, min, max } => {
                write!(f, "Voltage {} outside table range {}..={}", volt, min, max)
            }
            Error::Hardware(err) => write!(f, "Hardware error: {}", err),
        }
    }
}

impl From<HwError> for Error {
    fn from(err: HwError) -> Self {
        Error::Hardware(err)
    }
}

/// Result type for operations that can fail
pub type Result<T> = core::result::Result<T, Error>;

/// Failure reported by a hardware backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwError {
    /// Regulator write or read failed with the given code
    Regulator(i32),
    /// Clock mux or PLL access failed with the given code
    Clock(i32),
    /// Power domain control failed with the given code
    PowerDomain(i32),
    /// Hardware state could not be read back
    Readback,
}

impl fmt::Display for HwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HwError::Regulator(code) => write!(f, "regulator error {}", code),
            HwError::Clock(code) => write!(f, "clock error {}", code),
            HwError::PowerDomain(code) => write!(f, "power domain error {}", code),
            HwError::Readback => write!(f, "readback failed"),
        }
    }
}

/// Why a target request did not cause a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// DVFS is disabled
    DvfsDisabled,
    /// The requested index lies outside the segment
    OutOfSegmentRange,
    /// A fixed OPP or fixed frequency/voltage override is active
    FixedOverrideActive,
    /// The resolved target equals the current frequency and voltage
    NoChange,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DvfsDisabled => write!(f, "DVFS disabled"),
            SkipReason::OutOfSegmentRange => write!(f, "target out of segment range"),
            SkipReason::FixedOverrideActive => write!(f, "fixed override active"),
            SkipReason::NoChange => write!(f, "no change"),
        }
    }
}

bitflags::bitflags! {
    /// All skip conditions detected for one request, OR'd together
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct SkipMask: u8 {
        /// DVFS is disabled
        const DVFS_DISABLED = 1 << 0;
        /// Target outside the segment
        const OUT_OF_RANGE = 1 << 1;
        /// Override active
        const FIXED_OVERRIDE = 1 << 2;
        /// Nothing to do
        const NO_CHANGE = 1 << 3;
    }
}

impl Default for SkipMask {
    fn default() -> Self {
        Self::empty()
    }
}

impl SkipMask {
    /// First detected reason, in declaration order
    pub fn first_reason(self) -> Option<SkipReason> {
        if self.contains(SkipMask::DVFS_DISABLED) {
            Some(SkipReason::DvfsDisabled)
        } else if self.contains(SkipMask::OUT_OF_RANGE) {
            Some(SkipReason::OutOfSegmentRange)
        } else if self.contains(SkipMask::FIXED_OVERRIDE) {
            Some(SkipReason::FixedOverrideActive)
        } else if self.contains(SkipMask::NO_CHANGE) {
            Some(SkipReason::NoChange)
        } else {
            None
        }
    }

    /// Convert into the result returned from a target request
    pub fn into_result(self) -> core::result::Result<(), SkipReason> {
        match self.first_reason() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}

impl From<SkipReason> for SkipMask {
    fn from(reason: SkipReason) -> Self {
        match reason {
            SkipReason::DvfsDisabled => SkipMask::DVFS_DISABLED,
            SkipReason::OutOfSegmentRange => SkipMask::OUT_OF_RANGE,
            SkipReason::FixedOverrideActive => SkipMask::FIXED_OVERRIDE,
            SkipReason::NoChange => SkipMask::NO_CHANGE,
        }
    }
}
