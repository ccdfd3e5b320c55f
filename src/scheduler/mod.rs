//! Alert scheduling core.
//!
//! Owns the ordered set of scheduled alerts, the at-most-one active alert,
//! the focus state, and the single fire timer, and fans lifecycle
//! notifications out to the bound observer.

pub mod core;
pub(crate) mod queue;

pub use self::core::{AlertScheduler, AlertsContext};
