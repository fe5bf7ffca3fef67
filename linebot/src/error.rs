//! Error types for the engine.

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Conditions that stop the control loop.
///
/// Everything recoverable (ambiguous readings, a lost line, obstacles, a
/// skipped calibration) is handled inside the loop and never shows up here.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The line search used up its retry budget; the robot needs an operator.
    #[error("line search exhausted after {iterations} iterations")]
    SearchExhausted {
        /// Iterations completed before giving up.
        iterations: u32,
    },
}
