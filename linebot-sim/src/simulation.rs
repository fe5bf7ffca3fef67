use std::io::Write;
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::Context;
use linebot::devices::Clock;
use linebot::sensing::CalibrationOutcome;
use linebot::{CycleOutcome, EngineConfig, RunSummary, Runtime, StopReason, TickReport};
use tracing::info;

use crate::telemetry::{Frame, Telemetry};
use crate::track::Track;
use crate::world::{RobotGeometry, SimOptions, SimWorld};

/// The engine and the simulated robot it drives.
pub struct Simulation {
    runtime: Runtime,
    world: SimWorld,
    telemetry: Option<Telemetry<Box<dyn Write>>>,
    last_report: Option<TickReport>,
    finished: Option<linebot::Result<RunSummary>>,
}

impl Simulation {
    pub fn new(config: EngineConfig, track: Track, options: SimOptions) -> Result<Self> {
        let geometry = RobotGeometry::from_maneuver(&config.maneuver);
        let runtime = Runtime::new(config).wrap_err("invalid engine configuration")?;
        info!(track = %track.name, length_cm = track.length(), "simulation ready");
        Ok(Self {
            runtime,
            world: SimWorld::new(track, geometry, options),
            telemetry: None,
            last_report: None,
            finished: None,
        })
    }

    pub fn with_telemetry(mut self, writer: Box<dyn Write>) -> Self {
        self.telemetry = Some(Telemetry::new(writer));
        self
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn world(&self) -> &SimWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut SimWorld {
        &mut self.world
    }

    pub fn last_report(&self) -> Option<&TickReport> {
        self.last_report.as_ref()
    }

    /// How the run ended, once it has.
    pub fn finished(&self) -> Option<&linebot::Result<RunSummary>> {
        self.finished.as_ref()
    }

    /// Walk the robot through the calibration ritual, then put it back at
    /// the start of the track.
    pub fn calibrate(&mut self) -> CalibrationOutcome {
        let start = self.world.pose();
        self.world.script_calibration();
        let outcome = self.runtime.calibrate(&mut self.world);
        self.world.place(start);
        outcome
    }

    /// Run the calibration ritual with nobody confirming the prompts, which
    /// leaves the default thresholds in place.
    pub fn skip_calibration(&mut self) -> CalibrationOutcome {
        self.runtime.calibrate(&mut self.world)
    }

    /// One control cycle followed by one physics step. Does nothing once the
    /// run has ended.
    pub fn step(&mut self) -> Result<()> {
        if self.finished.is_some() {
            return Ok(());
        }
        match self.runtime.cycle(&mut self.world) {
            Ok(CycleOutcome::Idle) => {}
            Ok(CycleOutcome::Ticked(report)) => {
                self.last_report = Some(report);
                if let Some(telemetry) = &mut self.telemetry {
                    telemetry
                        .record(&Frame::new(report, self.world.pose()))
                        .wrap_err("failed to write telemetry")?;
                }
            }
            Ok(CycleOutcome::Cancelled) => {
                let summary = self.runtime.halt(&mut self.world, StopReason::Cancelled);
                self.finish(Ok(summary))?;
                return Ok(());
            }
            Err(error) => {
                self.finish(Err(error))?;
                return Ok(());
            }
        }
        self.world.idle();
        Ok(())
    }

    /// Stop the robot where it is.
    pub fn stop(&mut self, reason: StopReason) -> Result<()> {
        if self.finished.is_none() {
            let summary = self.runtime.halt(&mut self.world, reason);
            self.finish(Ok(summary))?;
        }
        Ok(())
    }

    /// Simulated time at which a run of `limit` starting now ends.
    pub fn deadline(&self, limit: Duration) -> Duration {
        self.world.now() + limit
    }

    /// One step, or stop with [`StopReason::TimeLimit`] once `deadline` is
    /// reached.
    pub fn step_until(&mut self, deadline: Duration) -> Result<()> {
        if self.world.now() >= deadline {
            self.stop(StopReason::TimeLimit)
        } else {
            self.step()
        }
    }

    /// Step until the run ends on its own or `limit` of simulated time has
    /// passed.
    pub fn run(&mut self, limit: Duration) -> Result<linebot::Result<RunSummary>> {
        let deadline = self.deadline(limit);
        loop {
            if let Some(result) = &self.finished {
                return Ok(result.clone());
            }
            self.step_until(deadline)?;
        }
    }

    fn finish(&mut self, result: linebot::Result<RunSummary>) -> Result<()> {
        match &result {
            Ok(summary) => info!(?summary, "run finished"),
            Err(error) => info!(%error, "run halted"),
        }
        self.finished = Some(result);
        if let Some(telemetry) = &mut self.telemetry {
            telemetry.flush().wrap_err("failed to flush telemetry")?;
        }
        Ok(())
    }
}
