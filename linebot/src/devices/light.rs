use crate::symbol::Channel;

/// Reflectance sensors, one per [`Channel`]. Intensities are on the driver's
/// 0–100 scale; anything outside that range is treated as a glitch.
pub trait LightSensors {
    fn intensity(&mut self, channel: Channel) -> i32;

    /// Tell the driver the sensor currently sees the bright reference.
    fn calibrate_high(&mut self, channel: Channel);

    /// Tell the driver the sensor currently sees the dark reference.
    fn calibrate_low(&mut self, channel: Channel);
}
