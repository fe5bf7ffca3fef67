/// Front bump switch.
pub trait ObstacleSensor {
    fn is_pressed(&mut self) -> bool;
}
