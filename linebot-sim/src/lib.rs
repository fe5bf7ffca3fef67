//! Host-side simulator for the line-following engine.

pub mod lcd;
pub mod simulation;
pub mod telemetry;
pub mod track;
pub mod track_format;
pub mod world;

pub use simulation::Simulation;
