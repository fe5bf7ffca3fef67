/// One of the two driven wheels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wheel {
    Left,
    Right,
}

impl Wheel {
    pub const BOTH: [Wheel; 2] = [Wheel::Left, Wheel::Right];
}

/// Regulated wheel motors. Speeds are wheel rotation rates in degrees per
/// second and are always non-negative; direction is set separately.
pub trait Motors {
    fn set_speed(&mut self, wheel: Wheel, speed: u32);
    fn forward(&mut self, wheel: Wheel);
    fn backward(&mut self, wheel: Wheel);
    fn stop(&mut self, wheel: Wheel);
    fn is_moving(&self, wheel: Wheel) -> bool;

    /// Hard stop on both wheels.
    fn stop_all(&mut self) {
        for wheel in Wheel::BOTH {
            self.stop(wheel);
        }
    }
}
