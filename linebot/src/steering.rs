//! Proportional steering from classified symbols.
//!
//! Angles run from -100 (hard left) to 100 (hard right). A turn slows the
//! inside wheel proportionally while the outside wheel keeps the base speed.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::SteeringConfig;
use crate::devices::{Motors, Wheel};
use crate::symbol::{Symbol, Tri};

pub const MAX_ANGLE: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDirection {
    Left,
    Right,
}

impl TurnDirection {
    /// -1 for left, 1 for right; matches the sign of steering angles and
    /// rotation degrees.
    pub const fn sign(self) -> i32 {
        match self {
            TurnDirection::Left => -1,
            TurnDirection::Right => 1,
        }
    }

    pub const fn flipped(self) -> Self {
        match self {
            TurnDirection::Left => TurnDirection::Right,
            TurnDirection::Right => TurnDirection::Left,
        }
    }

    pub fn from_sign(value: i32) -> Option<Self> {
        match value.signum() {
            -1 => Some(TurnDirection::Left),
            1 => Some(TurnDirection::Right),
            _ => None,
        }
    }
}

/// Result of [`SteeringController::compute_angle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heading {
    Angle(i32),
    /// Both outer sensors on black; what that means is up to the caller.
    WideMark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteeringCommand {
    Proportional(i32),
    /// The line bends too sharply for proportional steering; rotate in place.
    SharpTurn(TurnDirection),
    WideMark,
}

/// Commanded angle plus the direction of the last actual turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SteeringState {
    angle: i32,
    last_turn: Option<TurnDirection>,
}

impl SteeringState {
    pub fn angle(&self) -> i32 {
        self.angle
    }

    pub fn last_turn(&self) -> Option<TurnDirection> {
        self.last_turn
    }

    pub fn commit(&mut self, angle: i32) {
        self.angle = angle.clamp(-MAX_ANGLE, MAX_ANGLE);
        if let Some(direction) = TurnDirection::from_sign(self.angle) {
            self.last_turn = Some(direction);
        }
    }

    /// Center the heading without forgetting the last turn direction.
    pub fn recenter(&mut self) {
        self.angle = 0;
    }

    pub(crate) fn remember_turn(&mut self, direction: TurnDirection) {
        self.last_turn = Some(direction);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WheelSpeeds {
    pub left: u32,
    pub right: u32,
}

#[derive(Debug, Clone)]
pub struct SteeringController {
    config: SteeringConfig,
}

impl SteeringController {
    pub fn new(config: SteeringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SteeringConfig {
        &self.config
    }

    pub fn compute_angle(&self, symbol: &Symbol, previous: i32) -> Heading {
        let step = self.config.step;
        match (symbol.left().is_black(), symbol.right().is_black()) {
            (true, true) => Heading::WideMark,
            (true, false) => Heading::Angle((previous - step).max(-MAX_ANGLE)),
            (false, true) => Heading::Angle((previous + step).min(MAX_ANGLE)),
            (false, false) => Heading::Angle(previous / 2),
        }
    }

    /// Decide between proportional steering, a sharp-turn rotation and the
    /// wide-mark case.
    pub fn plan(&self, symbol: &Symbol, previous: i32) -> SteeringCommand {
        let angle = match self.compute_angle(symbol, previous) {
            Heading::WideMark => return SteeringCommand::WideMark,
            Heading::Angle(angle) => angle,
        };

        // while the center still has the line, a curve is steered, not rotated
        let toward = match (symbol.left(), symbol.right(), symbol.center()) {
            (_, _, Tri::Black) => None,
            (Tri::Black, Tri::White, _) => Some(TurnDirection::Left),
            (Tri::White, Tri::Black, _) => Some(TurnDirection::Right),
            _ => None,
        };
        if let Some(direction) = toward {
            let readings = symbol.readings();
            if (readings.left() - readings.right()).abs() > self.config.sharp_turn_threshold {
                return SteeringCommand::SharpTurn(direction);
            }
        }
        SteeringCommand::Proportional(angle)
    }

    /// Drive both wheels forward for the given angle. Does not block.
    pub fn apply_to_motors<M: Motors + ?Sized>(
        &self,
        angle: i32,
        base_speed: u32,
        motors: &mut M,
    ) -> WheelSpeeds {
        let speeds = wheel_speeds(angle, base_speed);
        trace!(angle, left = speeds.left, right = speeds.right, "steering");
        motors.set_speed(Wheel::Left, speeds.left);
        motors.set_speed(Wheel::Right, speeds.right);
        motors.forward(Wheel::Left);
        motors.forward(Wheel::Right);
        speeds
    }
}

/// Inside wheel slowed in proportion to the angle, outside wheel at `base`.
pub fn wheel_speeds(angle: i32, base: u32) -> WheelSpeeds {
    let angle = angle.clamp(-MAX_ANGLE, MAX_ANGLE);
    let inside = (base as u64 * (MAX_ANGLE - angle.abs()) as u64 / MAX_ANGLE as u64) as u32;
    match angle.signum() {
        -1 => WheelSpeeds { left: inside, right: base },
        1 => WheelSpeeds { left: base, right: inside },
        _ => WheelSpeeds { left: base, right: base },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPlatform, Spin};
    use crate::symbol::Readings;

    fn controller() -> SteeringController {
        SteeringController::new(SteeringConfig::default())
    }

    fn sym(left: Tri, right: Tri, center: Tri, readings: Readings) -> Symbol {
        Symbol::new(left, right, center, readings)
    }

    #[test]
    fn left_black_steers_left_by_one_step() {
        let symbol = sym(Tri::Black, Tri::White, Tri::White, Readings::new(30, 70, 70));
        assert_eq!(controller().compute_angle(&symbol, 0), Heading::Angle(-20));
        assert_eq!(controller().plan(&symbol, 0), SteeringCommand::Proportional(-20));
    }

    #[test]
    fn right_black_mirrors_left() {
        let symbol = sym(Tri::White, Tri::Black, Tri::White, Readings::new(60, 40, 60));
        assert_eq!(controller().compute_angle(&symbol, 30), Heading::Angle(50));
    }

    #[test]
    fn both_outer_black_is_a_wide_mark() {
        let symbol = sym(Tri::Black, Tri::Black, Tri::White, Readings::new(20, 20, 60));
        assert_eq!(controller().compute_angle(&symbol, 40), Heading::WideMark);
        assert_eq!(controller().plan(&symbol, 40), SteeringCommand::WideMark);
    }

    #[test]
    fn neither_black_decays_toward_zero() {
        let symbol = sym(Tri::White, Tri::White, Tri::Black, Readings::new(70, 70, 20));
        let c = controller();
        assert_eq!(c.compute_angle(&symbol, 60), Heading::Angle(30));
        assert_eq!(c.compute_angle(&symbol, -45), Heading::Angle(-22));
        assert_eq!(c.compute_angle(&symbol, 1), Heading::Angle(0));
        assert_eq!(c.compute_angle(&symbol, -1), Heading::Angle(0));
    }

    #[test]
    fn angle_stays_clamped_over_long_sequences() {
        let c = controller();
        let left = sym(Tri::Black, Tri::White, Tri::White, Readings::new(45, 55, 55));
        let right = sym(Tri::White, Tri::Black, Tri::White, Readings::new(55, 45, 55));
        let mut angle = 0;
        for i in 0..500 {
            let symbol = if (i / 37) % 2 == 0 { left } else { right };
            if let Heading::Angle(next) = c.compute_angle(&symbol, angle) {
                angle = next;
            }
            assert!((-MAX_ANGLE..=MAX_ANGLE).contains(&angle));
        }
    }

    #[test]
    fn large_outer_difference_requests_sharp_turn() {
        let symbol = sym(Tri::White, Tri::Black, Tri::White, Readings::new(85, 15, 80));
        assert_eq!(
            controller().plan(&symbol, 0),
            SteeringCommand::SharpTurn(TurnDirection::Right)
        );
    }

    #[test]
    fn curve_under_the_center_is_steered_not_rotated() {
        let symbol = sym(Tri::White, Tri::Black, Tri::Black, Readings::new(85, 15, 38));
        assert_eq!(controller().plan(&symbol, 20), SteeringCommand::Proportional(40));
    }

    #[test]
    fn unknown_outer_channel_never_triggers_sharp_turn() {
        let symbol = sym(Tri::Black, Tri::Unknown, Tri::White, Readings::new(10, 120, 80));
        assert_eq!(controller().plan(&symbol, 0), SteeringCommand::Proportional(-20));
    }

    #[test]
    fn wheel_speeds_slow_the_inside_wheel() {
        assert_eq!(wheel_speeds(0, 200), WheelSpeeds { left: 200, right: 200 });
        assert_eq!(wheel_speeds(-20, 200), WheelSpeeds { left: 160, right: 200 });
        assert_eq!(wheel_speeds(50, 200), WheelSpeeds { left: 200, right: 100 });
        assert_eq!(wheel_speeds(250, 200), WheelSpeeds { left: 200, right: 0 });
        assert_eq!(wheel_speeds(-100, 200), WheelSpeeds { left: 0, right: 200 });
    }

    #[test]
    fn apply_to_motors_drives_forward_without_exceeding_base() {
        let mut platform = MockPlatform::new();
        let speeds = controller().apply_to_motors(35, 180, &mut platform);
        assert!(speeds.left <= 180 && speeds.right <= 180);
        assert_eq!(platform.wheel(Wheel::Left).speed, 180);
        assert_eq!(platform.wheel(Wheel::Right).speed, 117);
        assert_eq!(platform.wheel(Wheel::Left).spin, Spin::Forward);
        assert_eq!(platform.wheel(Wheel::Right).spin, Spin::Forward);
    }

    #[test]
    fn state_remembers_last_non_zero_turn() {
        let mut state = SteeringState::default();
        assert_eq!(state.last_turn(), None);
        state.commit(-40);
        state.commit(0);
        assert_eq!(state.angle(), 0);
        assert_eq!(state.last_turn(), Some(TurnDirection::Left));
        state.commit(300);
        assert_eq!(state.angle(), MAX_ANGLE);
        assert_eq!(state.last_turn(), Some(TurnDirection::Right));
    }
}
