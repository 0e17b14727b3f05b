//! Synchronization primitives for the DVFS engine
//!
//! The engine runs in no_std environments, so it locks with spinning mutexes.

pub use spin::Mutex;
pub use spin::MutexGuard;
