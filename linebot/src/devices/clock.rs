use std::time::Duration;

/// Monotonic time source for deadlines and tick scheduling.
pub trait Clock {
    /// Time elapsed since the platform started.
    fn now(&self) -> Duration;

    /// Called between control cycles. Hardware platforms may sleep briefly,
    /// simulated ones advance their world.
    fn idle(&mut self) {}
}
