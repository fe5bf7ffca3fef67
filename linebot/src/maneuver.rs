//! Timed, open-loop rotations and backoffs.
//!
//! Durations come from the robot geometry and wheel speed only; there is no
//! encoder feedback, so wheel slip shows up as angle error. Only one
//! maneuver runs at a time and new requests are refused while one is active.

use std::f64::consts::PI;
use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ManeuverConfig;
use crate::devices::{Motors, Wheel};
use crate::steering::TurnDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManeuverKind {
    Rotate,
    BackOff,
}

impl fmt::Display for ManeuverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManeuverKind::Rotate => f.write_str("rotation"),
            ManeuverKind::BackOff => f.write_str("backoff"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ManeuverTarget {
    Degrees(i32),
    Centimeters(f64),
}

/// An accepted maneuver with its wall-clock deadline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManeuverRequest {
    pub kind: ManeuverKind,
    pub target: ManeuverTarget,
    /// Rotation direction; `None` for backoffs.
    pub direction: Option<TurnDirection>,
    pub started: Duration,
    pub deadline: Duration,
}

impl ManeuverRequest {
    pub fn duration(&self) -> Duration {
        self.deadline.saturating_sub(self.started)
    }

    pub fn remaining(&self, now: Duration) -> Duration {
        self.deadline.saturating_sub(now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ManeuverState {
    #[default]
    Idle,
    Rotating(ManeuverRequest),
    BackingOff(ManeuverRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManeuverStatus {
    Idle,
    Active(ManeuverKind),
    Completed(ManeuverKind),
    /// Stopped early by an obstacle or an explicit abort.
    Aborted(ManeuverKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ManeuverError {
    #[error("a {active} is already in progress")]
    Busy { active: ManeuverKind },
}

#[derive(Debug, Clone)]
pub struct ManeuverExecutor {
    config: ManeuverConfig,
    state: ManeuverState,
}

impl ManeuverExecutor {
    pub fn new(config: ManeuverConfig) -> Self {
        Self {
            config,
            state: ManeuverState::Idle,
        }
    }

    pub fn config(&self) -> &ManeuverConfig {
        &self.config
    }

    pub fn state(&self) -> &ManeuverState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, ManeuverState::Idle)
    }

    pub fn active(&self) -> Option<&ManeuverRequest> {
        match &self.state {
            ManeuverState::Idle => None,
            ManeuverState::Rotating(request) | ManeuverState::BackingOff(request) => Some(request),
        }
    }

    /// Time needed to turn the robot in place by `degrees`.
    pub fn rotation_duration(&self, degrees: i32) -> Duration {
        let travel = PI * self.config.track_width_cm * degrees.unsigned_abs() as f64 / 360.0;
        self.travel_time(travel, self.config.rotation_speed)
    }

    /// Time needed to reverse by `distance_cm`.
    pub fn backoff_duration(&self, distance_cm: f64) -> Duration {
        self.travel_time(distance_cm.abs(), self.config.backoff_speed)
    }

    /// Zero when the inputs do not describe a finite motion.
    fn travel_time(&self, distance_cm: f64, wheel_speed: u32) -> Duration {
        let wheel_degrees = distance_cm / self.config.distance_per_rotation_cm * 360.0;
        let secs = wheel_degrees / wheel_speed as f64;
        Duration::try_from_secs_f64(secs).unwrap_or_else(|error| {
            warn!(distance_cm, wheel_speed, %error, "maneuver cannot be timed");
            Duration::ZERO
        })
    }

    /// Start an in-place rotation. Positive angles turn right.
    ///
    /// The angle is reduced modulo 360; a rotation that reduces to zero
    /// needs no motion and yields `Ok(None)`.
    pub fn rotate<M: Motors + ?Sized>(
        &mut self,
        degrees: i32,
        now: Duration,
        motors: &mut M,
    ) -> Result<Option<ManeuverRequest>, ManeuverError> {
        self.ensure_idle()?;
        let degrees = degrees % 360;
        let Some(direction) = TurnDirection::from_sign(degrees) else {
            return Ok(None);
        };

        let request = ManeuverRequest {
            kind: ManeuverKind::Rotate,
            target: ManeuverTarget::Degrees(degrees),
            direction: Some(direction),
            started: now,
            deadline: now + self.rotation_duration(degrees),
        };
        let speed = self.config.rotation_speed;
        motors.set_speed(Wheel::Left, speed);
        motors.set_speed(Wheel::Right, speed);
        match direction {
            TurnDirection::Right => {
                motors.forward(Wheel::Left);
                motors.backward(Wheel::Right);
            }
            TurnDirection::Left => {
                motors.backward(Wheel::Left);
                motors.forward(Wheel::Right);
            }
        }
        debug!(degrees, duration = ?request.duration(), "rotation started");
        self.state = ManeuverState::Rotating(request);
        Ok(Some(request))
    }

    /// Start reversing in a straight line.
    pub fn back_off<M: Motors + ?Sized>(
        &mut self,
        distance_cm: f64,
        now: Duration,
        motors: &mut M,
    ) -> Result<Option<ManeuverRequest>, ManeuverError> {
        self.ensure_idle()?;
        let duration = self.backoff_duration(distance_cm);
        if duration.is_zero() {
            return Ok(None);
        }

        let request = ManeuverRequest {
            kind: ManeuverKind::BackOff,
            target: ManeuverTarget::Centimeters(distance_cm.abs()),
            direction: None,
            started: now,
            deadline: now + duration,
        };
        let speed = self.config.backoff_speed;
        for wheel in Wheel::BOTH {
            motors.set_speed(wheel, speed);
            motors.backward(wheel);
        }
        debug!(distance_cm, ?duration, "backoff started");
        self.state = ManeuverState::BackingOff(request);
        Ok(Some(request))
    }

    /// Advance the active maneuver. An obstacle aborts it on the spot;
    /// otherwise it completes once its deadline has passed.
    pub fn tick<M: Motors + ?Sized>(
        &mut self,
        now: Duration,
        obstacle: bool,
        motors: &mut M,
    ) -> ManeuverStatus {
        let Some(request) = self.active().copied() else {
            return ManeuverStatus::Idle;
        };
        if obstacle {
            info!(
                kind = %request.kind,
                remaining = ?request.remaining(now),
                "maneuver aborted by obstacle"
            );
            self.finish(motors);
            return ManeuverStatus::Aborted(request.kind);
        }
        if now >= request.deadline {
            debug!(kind = %request.kind, "maneuver completed");
            self.finish(motors);
            return ManeuverStatus::Completed(request.kind);
        }
        ManeuverStatus::Active(request.kind)
    }

    /// Hard-stop whatever is running. Returns the kind that was cut short.
    pub fn abort<M: Motors + ?Sized>(&mut self, motors: &mut M) -> Option<ManeuverKind> {
        let kind = self.active().map(|request| request.kind)?;
        self.finish(motors);
        Some(kind)
    }

    fn finish<M: Motors + ?Sized>(&mut self, motors: &mut M) {
        motors.stop_all();
        self.state = ManeuverState::Idle;
    }

    fn ensure_idle(&self) -> Result<(), ManeuverError> {
        match self.active() {
            Some(request) => Err(ManeuverError::Busy { active: request.kind }),
            None => Ok(()),
        }
    }
}
