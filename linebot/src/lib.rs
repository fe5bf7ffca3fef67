//! Control engine for a three-sensor line-following robot.
//!
//! The engine classifies reflectance readings into black/white symbols,
//! steers proportionally, runs timed open-loop maneuvers and searches for the
//! line when it is lost. All hardware is reached through the traits in
//! [`devices`], so the same engine drives the real robot and the simulator.

pub mod config;
pub mod devices;
pub mod error;
pub mod history;
pub mod maneuver;
pub mod runtime;
pub mod scheduler;
pub mod search;
pub mod sensing;
pub mod steering;
pub mod symbol;

#[cfg(test)]
mod mock;

pub use config::EngineConfig;
pub use devices::Platform;
pub use error::{Error, Result};
pub use runtime::Runtime;
pub use scheduler::{CycleOutcome, RunSummary, StopReason, TickReport};
pub use symbol::{Channel, Readings, Symbol, Tri};
