//! Tuning for every part of the engine.
//!
//! All fields have defaults taken from the physical robot, so an empty TOML
//! document deserializes to a working configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sensing: SensingConfig,
    pub steering: SteeringConfig,
    pub maneuver: ManeuverConfig,
    pub search: SearchConfig,
    pub scheduler: SchedulerConfig,
}

impl EngineConfig {
    /// Check value ranges the algorithms rely on.
    pub fn validate(&self) -> Result<()> {
        let s = &self.sensing;
        if !(s.alpha > 0.0 && s.alpha <= 1.0) {
            return Err(invalid(format!("sensing.alpha must be in (0, 1], got {}", s.alpha)));
        }
        if s.difference_threshold < 0 {
            return Err(invalid("sensing.difference_threshold must not be negative"));
        }
        if s.min_intensity >= s.max_intensity {
            return Err(invalid("sensing.min_intensity must be below sensing.max_intensity"));
        }
        let intensity_range = s.min_intensity as f64..=s.max_intensity as f64;
        if !intensity_range.contains(&s.default_threshold) {
            return Err(invalid("sensing.default_threshold must lie within the intensity range"));
        }
        if s.history_capacity == 0 {
            return Err(invalid("sensing.history_capacity must be at least 1"));
        }

        let st = &self.steering;
        if !(1..=100).contains(&st.step) {
            return Err(invalid(format!("steering.step must be in 1..=100, got {}", st.step)));
        }
        if st.base_speed == 0 {
            return Err(invalid("steering.base_speed must be positive"));
        }
        if st.sharp_turn_threshold < 0 {
            return Err(invalid("steering.sharp_turn_threshold must not be negative"));
        }
        if !(1..=MAX_ROTATION_DEGREES).contains(&st.sharp_turn_angle) {
            return Err(invalid(format!(
                "steering.sharp_turn_angle must be in 1..={MAX_ROTATION_DEGREES}, got {}",
                st.sharp_turn_angle
            )));
        }

        let m = &self.maneuver;
        check_length("maneuver.track_width_cm", m.track_width_cm, MIN_GEOMETRY_CM)?;
        check_length(
            "maneuver.distance_per_rotation_cm",
            m.distance_per_rotation_cm,
            MIN_GEOMETRY_CM,
        )?;
        if m.rotation_speed == 0 || m.backoff_speed == 0 {
            return Err(invalid("maneuver speeds must be positive"));
        }
        check_length("maneuver.backoff_distance_cm", m.backoff_distance_cm, 0.0)?;

        let se = &self.search;
        // odd iterations sweep twice as far
        if !(1..=MAX_ROTATION_DEGREES / 2).contains(&se.search_angle) {
            return Err(invalid(format!(
                "search.search_angle must be in 1..={}, got {}",
                MAX_ROTATION_DEGREES / 2,
                se.search_angle
            )));
        }
        if se.retry_budget == 0 {
            return Err(invalid("search.retry_budget must be at least 1"));
        }
        if se.backoff_every == 0 {
            return Err(invalid("search.backoff_every must be at least 1"));
        }

        if self.scheduler.frequent_period_ms == 0 {
            return Err(invalid("scheduler.frequent_period_ms must be positive"));
        }
        Ok(())
    }
}

/// Longest rotation a single maneuver may request, in degrees.
const MAX_ROTATION_DEGREES: i32 = 360;
/// Smallest wheel geometry accepted, in cm.
const MIN_GEOMETRY_CM: f64 = 0.1;
/// Upper bound for every length in the config, in cm.
const MAX_LENGTH_CM: f64 = 1000.0;

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidConfig(message.into())
}

/// Finite and within `[min, MAX_LENGTH_CM]`; rejects NaN.
fn check_length(name: &str, value: f64, min: f64) -> Result<()> {
    if value.is_finite() && (min..=MAX_LENGTH_CM).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be between {min} and {MAX_LENGTH_CM} cm, got {value}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensingConfig {
    /// EMA smoothing factor for the adaptive thresholds.
    pub alpha: f64,
    /// Inter-channel difference that triggers the differential override.
    pub difference_threshold: i32,
    /// Threshold used until (or instead of) a calibration.
    pub default_threshold: f64,
    pub min_intensity: i32,
    pub max_intensity: i32,
    pub history_capacity: usize,
    /// An all-white run at least this long is a long white section.
    pub long_white_ticks: u32,
    /// A center-black run at most this long counts as a dash.
    pub short_black_ticks: u32,
    /// Dashes needed in the history before the line is considered dashed.
    pub dashed_min_segments: usize,
}

impl Default for SensingConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            difference_threshold: 10,
            default_threshold: 50.0,
            min_intensity: 0,
            max_intensity: 100,
            history_capacity: 8,
            long_white_ticks: 10,
            short_black_ticks: 2,
            dashed_min_segments: 3,
        }
    }
}

/// What to do when both outer sensors see black at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WideMarkPolicy {
    /// Keep driving with a centered heading.
    Straight,
    /// Stop the wheels until the marking is left behind.
    Stop,
    /// Back off a short distance, then resume following.
    #[default]
    BackOff,
    /// Treat it as a lost line and start searching.
    Search,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// Angle change per tick while one outer sensor sees black.
    pub step: i32,
    /// Wheel speed of the outside wheel, in degrees per second.
    pub base_speed: u32,
    /// Left/right reading difference above which a timed rotation replaces
    /// proportional steering, once the center has left the line.
    pub sharp_turn_threshold: i32,
    /// Rotation used for a sharp turn, in degrees.
    pub sharp_turn_angle: i32,
    pub wide_mark: WideMarkPolicy,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            step: 20,
            base_speed: 200,
            sharp_turn_threshold: 50,
            sharp_turn_angle: 90,
            wide_mark: WideMarkPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManeuverConfig {
    /// Distance between the wheels.
    pub track_width_cm: f64,
    /// Distance travelled per full wheel rotation.
    pub distance_per_rotation_cm: f64,
    /// Wheel speed during in-place rotations, degrees per second.
    pub rotation_speed: u32,
    /// Wheel speed while backing off, degrees per second.
    pub backoff_speed: u32,
    /// Distance of a single backoff.
    pub backoff_distance_cm: f64,
}

impl Default for ManeuverConfig {
    fn default() -> Self {
        Self {
            track_width_cm: 13.0,
            distance_per_rotation_cm: 9.42478,
            rotation_speed: 200,
            backoff_speed: 200,
            backoff_distance_cm: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Base sweep angle in degrees; odd iterations sweep twice as far.
    pub search_angle: i32,
    /// Iterations before the search gives up.
    pub retry_budget: u32,
    /// Insert a backoff every this many iterations.
    pub backoff_every: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            search_angle: 15,
            retry_budget: 10,
            backoff_every: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Period of the line-following tick.
    pub frequent_period_ms: u64,
    /// All-white ticks tolerated before the line counts as lost.
    pub line_loss_ticks: u32,
    /// Extra tolerance while the history shows a dashed line.
    pub dashed_gap_ticks: u32,
    /// How long the cancel button must be held to stop the run.
    pub cancel_hold_ms: u64,
}

impl SchedulerConfig {
    pub fn frequent_period(&self) -> Duration {
        Duration::from_millis(self.frequent_period_ms)
    }

    pub fn cancel_hold(&self) -> Duration {
        Duration::from_millis(self.cancel_hold_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frequent_period_ms: 200,
            line_loss_ticks: 1,
            dashed_gap_ticks: 3,
            cancel_hold_ms: 3000,
        }
    }
}
