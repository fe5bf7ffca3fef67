//! A simulated robot on a simulated floor.
//!
//! [`SimWorld`] implements every capability trait of the engine on a single
//! struct: motor commands drive a differential-drive model, the light
//! sensors sample the floor under their mounting points and the clock only
//! moves when the engine idles.

use std::collections::VecDeque;
use std::f64::consts::FRAC_PI_2;
use std::time::Duration;

use linebot::config::ManeuverConfig;
use linebot::devices::{Clock, Display, LightSensors, Motors, ObstacleSensor, OperatorInput, Wheel};
use linebot::symbol::Channel;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::lcd::Lcd;
use crate::track::{Point, Pose, Track};

/// How close the bumper has to come to an obstacle to close its switch.
const CONTACT_CM: f64 = 0.25;

#[derive(Debug, Clone, PartialEq)]
pub struct RobotGeometry {
    /// Distance between the wheels, in cm.
    pub track_width_cm: f64,
    pub distance_per_rotation_cm: f64,
    /// How far ahead of the axle the sensor row sits.
    pub sensor_forward_cm: f64,
    /// Lateral distance from the center sensor to each outer one.
    pub sensor_spacing_cm: f64,
    pub bumper_forward_cm: f64,
}

impl RobotGeometry {
    /// Wheel geometry shared with the maneuver timing, so open-loop turns
    /// come out right.
    pub fn from_maneuver(config: &ManeuverConfig) -> Self {
        Self {
            track_width_cm: config.track_width_cm,
            distance_per_rotation_cm: config.distance_per_rotation_cm,
            ..Self::default()
        }
    }
}

impl Default for RobotGeometry {
    fn default() -> Self {
        Self {
            track_width_cm: 13.0,
            distance_per_rotation_cm: 9.42478,
            sensor_forward_cm: 6.0,
            sensor_spacing_cm: 2.0,
            bumper_forward_cm: 9.0,
        }
    }
}

/// Reflectance of the floor as seen by the sensors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    pub white: i32,
    pub black: i32,
    /// Width of the grey band at the tape edge, in cm.
    pub edge_blur_cm: f64,
}

impl Default for Surface {
    fn default() -> Self {
        Self {
            white: 85,
            black: 15,
            edge_blur_cm: 0.6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Simulated time per `Clock::idle`.
    pub step: Duration,
    pub seed: u64,
    /// Uniform noise amplitude added to every reading.
    pub noise: i32,
    /// Hold the cancel button from this time on.
    pub cancel_at: Option<Duration>,
    pub surface: Surface,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(10),
            seed: 0,
            noise: 0,
            cancel_at: None,
            surface: Surface::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Spin {
    #[default]
    Stopped,
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WheelCommand {
    /// Degrees per second.
    pub speed: u32,
    pub spin: Spin,
}

#[derive(Debug)]
pub struct SimWorld {
    track: Track,
    geometry: RobotGeometry,
    options: SimOptions,
    pose: Pose,
    time: Duration,
    wheels: [WheelCommand; 2],
    rng: StdRng,
    /// Poses the operator "carries" the robot to on each confirm.
    calibration_poses: VecDeque<Pose>,
    lcd: Lcd,
    odometer_cm: f64,
}

impl SimWorld {
    pub fn new(track: Track, geometry: RobotGeometry, options: SimOptions) -> Self {
        let pose = track.start_pose();
        let rng = StdRng::seed_from_u64(options.seed);
        Self {
            track,
            geometry,
            options,
            pose,
            time: Duration::ZERO,
            wheels: [WheelCommand::default(); 2],
            rng,
            calibration_poses: VecDeque::new(),
            lcd: Lcd::default(),
            odometer_cm: 0.0,
        }
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn geometry(&self) -> &RobotGeometry {
        &self.geometry
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn place(&mut self, pose: Pose) {
        self.pose = pose;
    }

    pub fn time(&self) -> Duration {
        self.time
    }

    pub fn lcd(&self) -> &Lcd {
        &self.lcd
    }

    pub fn odometer_cm(&self) -> f64 {
        self.odometer_cm
    }

    pub fn wheel(&self, wheel: Wheel) -> WheelCommand {
        self.wheels[wheel_index(wheel)]
    }

    /// Queue the white and black poses the calibration ritual asks for.
    ///
    /// White is well clear of the track. For black the robot stands across
    /// the first segment so the whole sensor row lies on the tape.
    pub fn script_calibration(&mut self) {
        let (_, max) = self.track.bounds();
        let white = Pose::new(max.x + 50.0, max.y + 50.0, 0.0);
        self.calibration_poses.push_back(white);

        if let Some((a, b)) = self.track.segments().next() {
            let along = b - a;
            let length = along.length();
            if length > 0.0 {
                let dir = along * (1.0 / length);
                let spot = a + dir * (length / 2.0);
                let heading = dir.y.atan2(dir.x) - FRAC_PI_2;
                let axle = spot - Point::from_heading(heading) * self.geometry.sensor_forward_cm;
                self.calibration_poses
                    .push_back(Pose::new(axle.x, axle.y, heading));
            }
        }
    }

    pub fn sensor_position(&self, channel: Channel) -> Point {
        let lateral = match channel {
            Channel::Left => self.geometry.sensor_spacing_cm,
            Channel::Right => -self.geometry.sensor_spacing_cm,
            Channel::Center => 0.0,
        };
        self.pose.offset(self.geometry.sensor_forward_cm, lateral)
    }

    pub fn bumper_position(&self) -> Point {
        self.pose.offset(self.geometry.bumper_forward_cm, 0.0)
    }

    /// Noise-free reading of the floor at `p`.
    pub fn floor_intensity(&self, p: Point) -> i32 {
        let surface = self.options.surface;
        let half = self.track.line_width() / 2.0;
        let d = self.track.distance_to_line(p) - half;
        let whiteness = if d <= 0.0 {
            0.0
        } else if surface.edge_blur_cm <= 0.0 {
            1.0
        } else {
            (d / surface.edge_blur_cm).min(1.0)
        };
        surface.black + ((surface.white - surface.black) as f64 * whiteness).round() as i32
    }

    /// Signed ground speed of a wheel in cm/s.
    fn wheel_velocity(&self, wheel: Wheel) -> f64 {
        let command = self.wheel(wheel);
        let magnitude = command.speed as f64 / 360.0 * self.geometry.distance_per_rotation_cm;
        match command.spin {
            Spin::Stopped => 0.0,
            Spin::Forward => magnitude,
            Spin::Backward => -magnitude,
        }
    }

    /// Advance the differential-drive model by `dt`.
    pub fn integrate(&mut self, dt: Duration) {
        let dt = dt.as_secs_f64();
        let left = self.wheel_velocity(Wheel::Left);
        let right = self.wheel_velocity(Wheel::Right);
        let v = (left + right) / 2.0;
        let omega = (right - left) / self.geometry.track_width_cm;

        let mid_heading = self.pose.heading + omega * dt / 2.0;
        let moved = Pose {
            position: self.pose.position + Point::from_heading(mid_heading) * (v * dt),
            heading: self.pose.heading + omega * dt,
        };
        // the robot cannot drive into an obstacle, only turn or back away
        let blocked = v > 0.0 && {
            let bumper = moved.offset(self.geometry.bumper_forward_cm, 0.0);
            self.track.obstacle_at(bumper).is_some()
        };
        if blocked {
            self.pose.heading = moved.heading;
        } else {
            self.odometer_cm += (v * dt).abs();
            self.pose = moved;
        }
    }
}

fn wheel_index(wheel: Wheel) -> usize {
    match wheel {
        Wheel::Left => 0,
        Wheel::Right => 1,
    }
}

impl Motors for SimWorld {
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
        let command = self.wheel(wheel);
        command.spin != Spin::Stopped && command.speed > 0
    }
}

impl LightSensors for SimWorld {
    fn intensity(&mut self, channel: Channel) -> i32 {
        let clean = self.floor_intensity(self.sensor_position(channel));
        let noise = self.options.noise.abs();
        if noise == 0 {
            return clean;
        }
        (clean + self.rng.random_range(-noise..=noise)).clamp(0, 100)
    }

    fn calibrate_high(&mut self, channel: Channel) {
        debug!(?channel, "sensor white point set");
    }

    fn calibrate_low(&mut self, channel: Channel) {
        debug!(?channel, "sensor black point set");
    }
}

impl ObstacleSensor for SimWorld {
    fn is_pressed(&mut self) -> bool {
        self.track
            .obstacle_within(self.bumper_position(), CONTACT_CM)
            .is_some()
    }
}

impl Display for SimWorld {
    fn show(&mut self, text: &str) {
        debug!(text, "lcd");
        self.lcd.show(text);
    }
}

impl OperatorInput for SimWorld {
    fn await_confirm(&mut self) -> bool {
        match self.calibration_poses.pop_front() {
            Some(pose) => {
                self.pose = pose;
                true
            }
            None => false,
        }
    }

    fn cancel_pressed(&mut self) -> bool {
        self.options.cancel_at.is_some_and(|at| self.time >= at)
    }
}

impl Clock for SimWorld {
    fn now(&self) -> Duration {
        self.time
    }

    fn idle(&mut self) {
        let step = self.options.step;
        self.integrate(step);
        self.time += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn straight() -> Track {
        Track::new(vec![Point::new(0.0, 0.0), Point::new(200.0, 0.0)], false, 1.8)
    }

    fn world() -> SimWorld {
        SimWorld::new(straight(), RobotGeometry::default(), SimOptions::default())
    }

    fn drive(world: &mut SimWorld, left: Spin, right: Spin, speed: u32) {
        for (wheel, spin) in [(Wheel::Left, left), (Wheel::Right, right)] {
            world.set_speed(wheel, speed);
            match spin {
                Spin::Forward => world.forward(wheel),
                Spin::Backward => world.backward(wheel),
                Spin::Stopped => world.stop(wheel),
            }
        }
    }

    #[test]
    fn start_pose_sees_line_under_center_only() {
        let mut world = world();
        assert_eq!(world.intensity(Channel::Center), 15);
        assert_eq!(world.intensity(Channel::Left), 85);
        assert_eq!(world.intensity(Channel::Right), 85);
    }

    #[test]
    fn tape_edge_reads_grey() {
        let world = world();
        let reading = world.floor_intensity(Point::new(10.0, 1.2));
        assert!(reading > 15 && reading < 85, "got {reading}");
    }

    #[test]
    fn equal_wheels_drive_straight() {
        let mut world = world();
        drive(&mut world, Spin::Forward, Spin::Forward, 360);
        for _ in 0..100 {
            world.idle();
        }
        let pose = world.pose();
        // one wheel rotation per second for one second
        assert!((pose.position.x - 9.42478).abs() < 1e-6);
        assert!(pose.position.y.abs() < 1e-9);
        assert_eq!(world.time(), Duration::from_secs(1));
    }

    #[test]
    fn opposite_wheels_turn_in_place() {
        let mut world = world();
        // matches the executor's timing for a quarter turn at 200 deg/s
        drive(&mut world, Spin::Forward, Spin::Backward, 200);
        for _ in 0..195 {
            world.idle();
        }
        let pose = world.pose();
        assert!(pose.position.distance(Point::default()) < 1e-9);
        assert!((pose.heading + PI / 2.0).abs() < 0.01, "heading {}", pose.heading);
    }

    #[test]
    fn obstacle_blocks_forward_motion_and_presses_bumper() {
        let track = straight().with_obstacle(crate::track_format::ObstacleSpec {
            x: 12.0,
            y: 0.0,
            radius: 2.0,
        });
        let mut world = SimWorld::new(track, RobotGeometry::default(), SimOptions::default());
        assert!(!world.is_pressed());
        drive(&mut world, Spin::Forward, Spin::Forward, 360);
        for _ in 0..200 {
            world.idle();
        }
        assert!(world.is_pressed());
        assert!(world.pose().position.x < 1.5);
    }

    #[test]
    fn calibration_poses_put_sensors_on_white_then_black() {
        let mut world = world();
        world.script_calibration();
        assert!(world.await_confirm());
        for channel in Channel::ALL {
            assert_eq!(world.intensity(channel), 85);
        }
        assert!(world.await_confirm());
        for channel in Channel::ALL {
            assert_eq!(world.intensity(channel), 15, "{channel:?}");
        }
        assert!(!world.await_confirm());
    }

    #[test]
    fn noise_is_seeded_and_bounded() {
        let options = SimOptions {
            noise: 5,
            seed: 7,
            ..SimOptions::default()
        };
        let mut a = SimWorld::new(straight(), RobotGeometry::default(), options.clone());
        let mut b = SimWorld::new(straight(), RobotGeometry::default(), options);
        for _ in 0..50 {
            let reading = a.intensity(Channel::Left);
            assert_eq!(reading, b.intensity(Channel::Left));
            assert!((80..=90).contains(&reading));
        }
    }

    #[test]
    fn cancel_button_follows_script() {
        let options = SimOptions {
            cancel_at: Some(Duration::from_millis(50)),
            ..SimOptions::default()
        };
        let mut world = SimWorld::new(straight(), RobotGeometry::default(), options);
        assert!(!world.cancel_pressed());
        for _ in 0..5 {
            world.idle();
        }
        assert!(world.cancel_pressed());
    }
}
