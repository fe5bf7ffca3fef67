use std::time::Duration;

use tracing::info;

use crate::config::EngineConfig;
use crate::devices::Platform;
use crate::error::Result;
use crate::maneuver::ManeuverExecutor;
use crate::scheduler::{CycleOutcome, Engine, MotionScheduler, RunSummary, StopReason};
use crate::search::SearchStateMachine;
use crate::sensing::{CalibrationOutcome, SensorFusion};
use crate::steering::SteeringController;

/// Owns every engine component for one robot.
///
/// Built once from a validated [`EngineConfig`] and handed around by
/// reference; nothing in the engine is global.
#[derive(Debug, Clone)]
pub struct Runtime {
    config: EngineConfig,
    fusion: SensorFusion,
    steering: SteeringController,
    executor: ManeuverExecutor,
    search: SearchStateMachine,
    scheduler: MotionScheduler,
}

impl Runtime {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        info!("engine configured");
        Ok(Self {
            fusion: SensorFusion::new(config.sensing.clone()),
            steering: SteeringController::new(config.steering.clone()),
            executor: ManeuverExecutor::new(config.maneuver.clone()),
            search: SearchStateMachine::new(config.search.clone()),
            scheduler: MotionScheduler::new(config.scheduler.clone()),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn fusion(&self) -> &SensorFusion {
        &self.fusion
    }

    pub fn executor(&self) -> &ManeuverExecutor {
        &self.executor
    }

    pub fn scheduler(&self) -> &MotionScheduler {
        &self.scheduler
    }

    pub fn calibrate<P: Platform + ?Sized>(&mut self, platform: &mut P) -> CalibrationOutcome {
        self.fusion.calibrate(platform)
    }

    pub fn cycle<P: Platform + ?Sized>(&mut self, platform: &mut P) -> Result<CycleOutcome> {
        let (mut engine, scheduler) = self.split();
        scheduler.cycle(&mut engine, platform)
    }

    pub fn run<P: Platform + ?Sized>(&mut self, platform: &mut P) -> Result<RunSummary> {
        let (engine, scheduler) = self.split();
        scheduler.run(engine, platform)
    }

    pub fn run_for<P: Platform + ?Sized>(
        &mut self,
        platform: &mut P,
        limit: Duration,
    ) -> Result<RunSummary> {
        let (engine, scheduler) = self.split();
        scheduler.run_for(engine, platform, limit)
    }

    pub fn halt<P: Platform + ?Sized>(
        &mut self,
        platform: &mut P,
        reason: StopReason,
    ) -> RunSummary {
        let (mut engine, scheduler) = self.split();
        scheduler.halt(&mut engine, platform, reason)
    }

    fn split(&mut self) -> (Engine<'_>, &mut MotionScheduler) {
        let engine = Engine {
            fusion: &mut self.fusion,
            steering: &self.steering,
            executor: &mut self.executor,
            search: &self.search,
        };
        (engine, &mut self.scheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::mock::MockPlatform;
    use crate::sensing::CalibrationProfile;
    use crate::symbol::{Channel, Readings};

    #[test]
    fn rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.search.retry_budget = 0;
        assert!(matches!(Runtime::new(config), Err(Error::InvalidConfig(_))));

        let mut config = EngineConfig::default();
        config.maneuver.track_width_cm = f64::NAN;
        assert!(matches!(Runtime::new(config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn calibrates_then_follows_until_time_limit() {
        let mut runtime = Runtime::new(EngineConfig::default()).unwrap();
        let mut platform = MockPlatform::new();
        platform.confirms.push_back((true, Readings::new(90, 90, 90)));
        platform.confirms.push_back((true, Readings::new(10, 10, 10)));

        let outcome = runtime.calibrate(&mut platform);
        assert_eq!(
            outcome,
            CalibrationOutcome::Calibrated(CalibrationProfile::new(
                Readings::new(90, 90, 90),
                Readings::new(10, 10, 10)
            ))
        );
        assert_eq!(runtime.fusion().threshold(Channel::Center), 50.0);

        platform.readings = Readings::new(85, 85, 15);
        let summary = runtime.run_for(&mut platform, Duration::from_secs(2)).unwrap();
        assert_eq!(summary.reason, StopReason::TimeLimit);
        assert_eq!(summary.stats.searches, 0);
        assert!(summary.stats.frequent_ticks >= 10);
        assert!(platform.all_stopped());
    }

    #[test]
    fn cycle_reports_frequent_ticks() {
        let mut runtime = Runtime::new(EngineConfig::default()).unwrap();
        let mut platform = MockPlatform::with_readings(Readings::new(80, 80, 20));
        assert!(matches!(runtime.cycle(&mut platform), Ok(CycleOutcome::Ticked(_))));
        assert_eq!(runtime.scheduler().stats().frequent_ticks, 1);
    }
}
