//! Scriptable test platform shared by the unit tests.

use std::collections::VecDeque;
use std::time::Duration;

use crate::devices::{Clock, Display, LightSensors, Motors, ObstacleSensor, OperatorInput, Wheel};
use crate::symbol::{Channel, Readings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Spin {
    #[default]
    Stopped,
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WheelState {
    pub speed: u32,
    pub spin: Spin,
}

#[derive(Debug, Default)]
pub struct MockPlatform {
    pub now: Duration,
    /// Added to `now` on every `idle`.
    pub step: Duration,
    pub readings: Readings,
    /// Readings applied on successive `idle` calls; the last one sticks.
    pub reading_script: VecDeque<Readings>,
    pub bumper: bool,
    pub cancel: bool,
    /// One entry per `await_confirm`: whether to confirm and what the sensors
    /// see afterwards.
    pub confirms: VecDeque<(bool, Readings)>,
    pub wheels: [WheelState; 2],
    pub shown: Vec<String>,
    pub calibrated_high: Vec<Channel>,
    pub calibrated_low: Vec<Channel>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            step: Duration::from_millis(10),
            readings: Readings::new(80, 80, 80),
            ..Default::default()
        }
    }

    pub fn with_readings(readings: Readings) -> Self {
        Self {
            readings,
            ..Self::new()
        }
    }

    pub fn wheel(&self, wheel: Wheel) -> WheelState {
        self.wheels[wheel_index(wheel)]
    }

    pub fn all_stopped(&self) -> bool {
        self.wheels.iter().all(|w| w.spin == Spin::Stopped)
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }
}

fn wheel_index(wheel: Wheel) -> usize {
    match wheel {
        Wheel::Left => 0,
        Wheel::Right => 1,
    }
}

impl Motors for MockPlatform {
    fn set_speed(&mut self, wheel: Wheel, speed: u32) {
        self.wheels[wheel_index(wheel)].speed = speed;
    }

    fn forward(&mut self, wheel: Wheel) {
        self.wheels[wheel_index(wheel)].spin = Spin::Forward;
    }

    fn backward(&mut self, wheel: Wheel) {
        self.wheels[wheel_index(wheel)].spin = Spin::Backward;
    }

    fn stop(&mut self, wheel: Wheel) {
        self.wheels[wheel_index(wheel)].spin = Spin::Stopped;
    }

    fn is_moving(&self, wheel: Wheel) -> bool {
        let state = self.wheel(wheel);
        state.spin != Spin::Stopped && state.speed > 0
    }
}

impl LightSensors for MockPlatform {
    fn intensity(&mut self, channel: Channel) -> i32 {
        self.readings.get(channel)
    }

    fn calibrate_high(&mut self, channel: Channel) {
        self.calibrated_high.push(channel);
    }

    fn calibrate_low(&mut self, channel: Channel) {
        self.calibrated_low.push(channel);
    }
}

impl ObstacleSensor for MockPlatform {
    fn is_pressed(&mut self) -> bool {
        self.bumper
    }
}

impl Display for MockPlatform {
    fn show(&mut self, text: &str) {
        self.shown.push(text.to_string());
    }
}

impl OperatorInput for MockPlatform {
    fn await_confirm(&mut self) -> bool {
        match self.confirms.pop_front() {
            Some((confirmed, readings)) => {
                self.readings = readings;
                confirmed
            }
            None => false,
        }
    }

    fn cancel_pressed(&mut self) -> bool {
        self.cancel
    }
}

impl Clock for MockPlatform {
    fn now(&self) -> Duration {
        self.now
    }

    fn idle(&mut self) {
        self.now += self.step;
        if let Some(next) = self.reading_script.pop_front() {
            self.readings = next;
        }
    }
}
