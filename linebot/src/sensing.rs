//! Calibration and classification of the three reflectance channels.
//!
//! Each channel keeps an adaptive threshold that follows the readings through
//! an exponential moving average. Because a single sensor drifting over a
//! grey transition zone can sit on either side of its own threshold, the raw
//! call is corrected by comparing channels against each other (the
//! differential override).

use tracing::{debug, info, warn};

use crate::config::SensingConfig;
use crate::devices::{Display, LightSensors, OperatorInput};
use crate::history::{LinePattern, SymbolHistory};
use crate::symbol::{Channel, Readings, Symbol, Tri};

/// Pairs compared by the differential override, in application order.
const OVERRIDE_PAIRS: [(Channel, Channel); 3] = [
    (Channel::Left, Channel::Right),
    (Channel::Center, Channel::Left),
    (Channel::Center, Channel::Right),
];

/// Reference readings captured by the calibration ritual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationProfile {
    white: Readings,
    black: Readings,
}

impl CalibrationProfile {
    pub const fn new(white: Readings, black: Readings) -> Self {
        Self { white, black }
    }

    pub fn white(&self, channel: Channel) -> i32 {
        self.white.get(channel)
    }

    pub fn black(&self, channel: Channel) -> i32 {
        self.black.get(channel)
    }

    pub fn midpoint(&self, channel: Channel) -> f64 {
        (self.white(channel) as f64 + self.black(channel) as f64) / 2.0
    }

    /// Lower and upper calibrated bound of a channel.
    pub fn bounds(&self, channel: Channel) -> (f64, f64) {
        let (white, black) = (self.white(channel) as f64, self.black(channel) as f64);
        (white.min(black), white.max(black))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationOutcome {
    Calibrated(CalibrationProfile),
    /// The operator skipped a step; default thresholds stay in place.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct SensorFusion {
    config: SensingConfig,
    thresholds: [f64; 3],
    profile: Option<CalibrationProfile>,
    history: SymbolHistory,
}

impl SensorFusion {
    pub fn new(config: SensingConfig) -> Self {
        Self {
            thresholds: [config.default_threshold; 3],
            profile: None,
            history: SymbolHistory::new(config.history_capacity),
            config,
        }
    }

    pub fn config(&self) -> &SensingConfig {
        &self.config
    }

    pub fn threshold(&self, channel: Channel) -> f64 {
        self.thresholds[channel.index()]
    }

    pub fn profile(&self) -> Option<&CalibrationProfile> {
        self.profile.as_ref()
    }

    pub fn history(&self) -> &SymbolHistory {
        &self.history
    }

    /// Run the calibration ritual: the operator places the robot over white,
    /// confirms, then over black and confirms again.
    pub fn calibrate<P>(&mut self, platform: &mut P) -> CalibrationOutcome
    where
        P: LightSensors + Display + OperatorInput + ?Sized,
    {
        platform.show("Place robot over\nWHITE and confirm");
        if !platform.await_confirm() {
            return self.skip_calibration(platform);
        }
        let mut white = Readings::default();
        for channel in Channel::ALL {
            platform.calibrate_high(channel);
            white.set(channel, platform.intensity(channel));
        }

        platform.show("Place robot over\nBLACK and confirm");
        if !platform.await_confirm() {
            return self.skip_calibration(platform);
        }
        let mut black = Readings::default();
        for channel in Channel::ALL {
            platform.calibrate_low(channel);
            black.set(channel, platform.intensity(channel));
        }

        let profile = CalibrationProfile::new(white, black);
        self.apply_calibration(profile);
        info!(?white, ?black, thresholds = ?self.thresholds, "sensors calibrated");
        platform.show(&format!(
            "Calibrated\nL:{:.0} R:{:.0} C:{:.0}",
            self.threshold(Channel::Left),
            self.threshold(Channel::Right),
            self.threshold(Channel::Center),
        ));
        CalibrationOutcome::Calibrated(profile)
    }

    /// Install a calibration profile and seed the thresholds with its
    /// midpoints.
    pub fn apply_calibration(&mut self, profile: CalibrationProfile) {
        for channel in Channel::ALL {
            self.thresholds[channel.index()] = profile.midpoint(channel);
        }
        self.profile = Some(profile);
    }

    fn skip_calibration<P: Display + ?Sized>(&mut self, platform: &mut P) -> CalibrationOutcome {
        self.thresholds = [self.config.default_threshold; 3];
        self.profile = None;
        warn!(
            threshold = self.config.default_threshold,
            "calibration skipped, using default thresholds"
        );
        platform.show("Calibration\nskipped");
        CalibrationOutcome::Skipped
    }

    /// Sample all channels and classify them.
    pub fn classify<P: LightSensors + ?Sized>(&mut self, platform: &mut P) -> Symbol {
        let mut readings = Readings::default();
        for channel in Channel::ALL {
            readings.set(channel, platform.intensity(channel));
        }
        self.classify_readings(readings)
    }

    /// Update the thresholds with one sample and classify it.
    pub fn classify_readings(&mut self, readings: Readings) -> Symbol {
        let mut states = [Tri::Unknown; 3];
        for channel in Channel::ALL {
            let reading = readings.get(channel);
            if reading < self.config.min_intensity || reading > self.config.max_intensity {
                debug!(?channel, reading, "reading out of range");
                continue;
            }
            let threshold = self.adapt_threshold(channel, reading);
            states[channel.index()] = if (reading as f64) < threshold {
                Tri::Black
            } else {
                Tri::White
            };
        }
        differential_override(&mut states, readings, self.config.difference_threshold);
        Symbol::from_parts(states, readings)
    }

    fn adapt_threshold(&mut self, channel: Channel, reading: i32) -> f64 {
        let alpha = self.config.alpha;
        let slot = &mut self.thresholds[channel.index()];
        let mut next = alpha * reading as f64 + (1.0 - alpha) * *slot;
        if let Some(profile) = &self.profile {
            let (low, high) = profile.bounds(channel);
            next = next.clamp(low, high);
        }
        *slot = next;
        next
    }

    /// Append to the history unless the symbol repeats the latest event.
    pub fn update_history(&mut self, symbol: Symbol) -> bool {
        self.history.push(symbol)
    }

    pub fn pattern(&self) -> LinePattern {
        self.history.pattern(&self.config)
    }
}

/// Force the darker channel of every sufficiently different pair to black
/// and the brighter one to white. Outer channels keep the first forced value;
/// the center follows the last pair that touched it.
fn differential_override(states: &mut [Tri; 3], readings: Readings, difference_threshold: i32) {
    let mut forced = [false; 3];
    for (a, b) in OVERRIDE_PAIRS {
        if states[a.index()] == Tri::Unknown || states[b.index()] == Tri::Unknown {
            continue;
        }
        let (ra, rb) = (readings.get(a), readings.get(b));
        if (ra - rb).abs() <= difference_threshold {
            continue;
        }
        let (dark, light) = if ra < rb { (a, b) } else { (b, a) };
        for (channel, tri) in [(dark, Tri::Black), (light, Tri::White)] {
            let slot = channel.index();
            if channel == Channel::Center || !forced[slot] {
                states[slot] = tri;
                forced[slot] = true;
            }
        }
    }
}
