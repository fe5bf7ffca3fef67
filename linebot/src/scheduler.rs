//! The cooperative control loop.
//!
//! Every cycle checks the cancel button and the bumper; the line sensors are
//! only sampled on the frequent tick. Between cycles the platform gets a
//! chance to idle, which is a short sleep on hardware and one physics step in
//! the simulator.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{SchedulerConfig, WideMarkPolicy};
use crate::devices::Platform;
use crate::error::{Error, Result};
use crate::history::LinePattern;
use crate::maneuver::ManeuverExecutor;
use crate::search::{SearchContext, SearchOutcome, SearchPhase, SearchStateMachine};
use crate::sensing::SensorFusion;
use crate::steering::{SteeringCommand, SteeringController, SteeringState, TurnDirection};
use crate::symbol::Symbol;

/// Engine parts the scheduler drives, borrowed for one call.
pub struct Engine<'a> {
    pub fusion: &'a mut SensorFusion,
    pub steering: &'a SteeringController,
    pub executor: &'a mut ManeuverExecutor,
    pub search: &'a SearchStateMachine,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Following,
    Searching(SearchContext),
}

impl Mode {
    pub fn is_searching(&self) -> bool {
        matches!(self, Mode::Searching(_))
    }
}

/// What the frequent tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickAction {
    Steer { angle: i32 },
    SharpTurn { direction: TurnDirection },
    WideMark { policy: WideMarkPolicy },
    /// A maneuver started while following is still running.
    Maneuvering,
    Searching { iteration: u32, phase: SearchPhase },
}

/// One frequent tick, as reported to telemetry and the live view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TickReport {
    pub time_ms: u64,
    pub symbol: Symbol,
    pub pattern: LinePattern,
    pub angle: i32,
    pub action: TickAction,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Only the fast checks ran.
    Idle,
    Ticked(TickReport),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The operator held the cancel button.
    Cancelled,
    /// `run_for` reached its time limit.
    TimeLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunStats {
    pub cycles: u64,
    pub frequent_ticks: u64,
    pub searches: u32,
    pub obstacles: u32,
    pub sharp_turns: u32,
    pub wide_marks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub reason: StopReason,
    pub elapsed_ms: u64,
    pub stats: RunStats,
}

/// Tracks how long the cancel button has been held.
#[derive(Debug, Clone)]
pub struct CancelMonitor {
    hold: Duration,
    pressed_since: Option<Duration>,
}

impl CancelMonitor {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            pressed_since: None,
        }
    }

    /// Returns true once the button has been held for the full hold time.
    pub fn update(&mut self, pressed: bool, now: Duration) -> bool {
        if !pressed {
            self.pressed_since = None;
            return false;
        }
        let since = *self.pressed_since.get_or_insert(now);
        now.saturating_sub(since) >= self.hold
    }
}

#[derive(Debug, Clone)]
pub struct MotionScheduler {
    config: SchedulerConfig,
    steering: SteeringState,
    mode: Mode,
    cancel: CancelMonitor,
    bumper_was_pressed: bool,
    last_frequent: Option<Duration>,
    /// Consecutive frequent ticks without any black channel.
    lost_ticks: u32,
    started: Option<Duration>,
    stats: RunStats,
}

impl MotionScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let cancel = CancelMonitor::new(config.cancel_hold());
        Self {
            config,
            steering: SteeringState::default(),
            mode: Mode::Following,
            cancel,
            bumper_was_pressed: false,
            last_frequent: None,
            lost_ticks: 0,
            started: None,
            stats: RunStats::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn steering(&self) -> &SteeringState {
        &self.steering
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Drive the loop until cancelled or the search gives up.
    pub fn run<P: Platform + ?Sized>(
        &mut self,
        engine: Engine<'_>,
        platform: &mut P,
    ) -> Result<RunSummary> {
        self.run_until(engine, platform, None)
    }

    /// Like [`MotionScheduler::run`], but stops the robot after `limit`.
    pub fn run_for<P: Platform + ?Sized>(
        &mut self,
        engine: Engine<'_>,
        platform: &mut P,
        limit: Duration,
    ) -> Result<RunSummary> {
        self.run_until(engine, platform, Some(limit))
    }

    fn run_until<P: Platform + ?Sized>(
        &mut self,
        mut engine: Engine<'_>,
        platform: &mut P,
        limit: Option<Duration>,
    ) -> Result<RunSummary> {
        let start = platform.now();
        info!(period = ?self.config.frequent_period(), "line following started");
        loop {
            if let CycleOutcome::Cancelled = self.cycle(&mut engine, platform)? {
                return Ok(self.summary(StopReason::Cancelled, platform.now()));
            }
            if let Some(limit) = limit {
                if platform.now().saturating_sub(start) >= limit {
                    return Ok(self.halt(&mut engine, platform, StopReason::TimeLimit));
                }
            }
            platform.idle();
        }
    }

    /// Stop all motion and summarize the run so far.
    pub fn halt<P: Platform + ?Sized>(
        &mut self,
        engine: &mut Engine<'_>,
        platform: &mut P,
        reason: StopReason,
    ) -> RunSummary {
        engine.executor.abort(platform);
        platform.stop_all();
        info!(?reason, "run stopped");
        self.summary(reason, platform.now())
    }

    /// One pass of the loop. Never blocks.
    pub fn cycle<P: Platform + ?Sized>(
        &mut self,
        engine: &mut Engine<'_>,
        platform: &mut P,
    ) -> Result<CycleOutcome> {
        let now = platform.now();
        self.started.get_or_insert(now);
        self.stats.cycles += 1;

        // 1. Cancel.
        if self.cancel.update(platform.cancel_pressed(), now) {
            engine.executor.abort(platform);
            platform.stop_all();
            platform.show("Stopped");
            info!("cancelled by operator");
            return Ok(CycleOutcome::Cancelled);
        }

        // 2. Crucial check: react to the bumper on every cycle.
        let pressed = platform.is_pressed();
        let obstacle = pressed && !self.bumper_was_pressed;
        self.bumper_was_pressed = pressed;
        if obstacle {
            self.on_obstacle(engine, platform, now);
        }

        // 3. Maneuver deadlines.
        engine.executor.tick(now, false, platform);

        // 4. Frequent tick.
        let due = self
            .last_frequent
            .is_none_or(|last| now.saturating_sub(last) >= self.config.frequent_period());
        if !due {
            return Ok(CycleOutcome::Idle);
        }
        self.last_frequent = Some(now);
        self.stats.frequent_ticks += 1;
        let report = self.frequent_tick(engine, platform, now)?;
        Ok(CycleOutcome::Ticked(report))
    }

    fn on_obstacle<P: Platform + ?Sized>(
        &mut self,
        engine: &mut Engine<'_>,
        platform: &mut P,
        now: Duration,
    ) {
        self.stats.obstacles += 1;
        let interrupted = engine.executor.abort(platform);
        platform.stop_all();
        warn!(interrupted = ?interrupted, "obstacle detected");

        match &mut self.mode {
            Mode::Searching(ctx) => {
                engine.search.recover_from_obstacle(ctx, now, engine.executor, platform);
            }
            Mode::Following => {
                let mut ctx = engine.search.begin(self.search_direction(), now);
                engine.search.recover_from_obstacle(&mut ctx, now, engine.executor, platform);
                self.stats.searches += 1;
                self.lost_ticks = 0;
                self.steering.recenter();
                self.mode = Mode::Searching(ctx);
            }
        }
    }

    fn frequent_tick<P: Platform + ?Sized>(
        &mut self,
        engine: &mut Engine<'_>,
        platform: &mut P,
        now: Duration,
    ) -> Result<TickReport> {
        let symbol = engine.fusion.classify(platform);
        engine.fusion.update_history(symbol);
        let pattern = engine.fusion.pattern();
        platform.show(&symbol.to_string());

        let action = match &mut self.mode {
            Mode::Searching(ctx) => match engine
                .search
                .step(ctx, &symbol, now, engine.executor, platform)
            {
                SearchOutcome::Searching => TickAction::Searching {
                    iteration: ctx.iteration,
                    phase: ctx.phase,
                },
                SearchOutcome::Found => {
                    self.mode = Mode::Following;
                    self.lost_ticks = 0;
                    self.follow(engine, platform, &symbol, pattern, now)?
                }
                SearchOutcome::Aborted { iterations } => {
                    return Err(self.exhausted(platform, iterations));
                }
            },
            Mode::Following => self.follow(engine, platform, &symbol, pattern, now)?,
        };

        debug!(%symbol, ?action, "tick");
        Ok(TickReport {
            time_ms: now.as_millis() as u64,
            symbol,
            pattern,
            angle: self.steering.angle(),
            action,
        })
    }

    fn follow<P: Platform + ?Sized>(
        &mut self,
        engine: &mut Engine<'_>,
        platform: &mut P,
        symbol: &Symbol,
        pattern: LinePattern,
        now: Duration,
    ) -> Result<TickAction> {
        if !engine.executor.is_idle() {
            return Ok(TickAction::Maneuvering);
        }

        if symbol.any_black() {
            self.lost_ticks = 0;
        } else {
            self.lost_ticks += 1;
            if self.lost_ticks > self.loss_tolerance(pattern) {
                return self.start_search(engine, platform, now);
            }
        }

        let config = engine.steering.config();
        match engine.steering.plan(symbol, self.steering.angle()) {
            SteeringCommand::Proportional(angle) => {
                self.steering.commit(angle);
                engine.steering.apply_to_motors(angle, config.base_speed, platform);
                Ok(TickAction::Steer { angle })
            }
            SteeringCommand::SharpTurn(direction) => {
                self.stats.sharp_turns += 1;
                self.steering.recenter();
                self.steering.remember_turn(direction);
                info!(?direction, "sharp turn");
                if let Err(error) = engine
                    .executor
                    .rotate(direction.sign() * config.sharp_turn_angle, now, platform)
                {
                    debug!(%error, "sharp turn refused");
                }
                Ok(TickAction::SharpTurn { direction })
            }
            SteeringCommand::WideMark => {
                self.stats.wide_marks += 1;
                let policy = config.wide_mark;
                debug!(?policy, "wide mark");
                match policy {
                    WideMarkPolicy::Straight => {
                        self.steering.recenter();
                        engine.steering.apply_to_motors(0, config.base_speed, platform);
                    }
                    WideMarkPolicy::Stop => {
                        self.steering.recenter();
                        platform.stop_all();
                    }
                    WideMarkPolicy::BackOff => {
                        let distance = engine.executor.config().backoff_distance_cm;
                        if let Err(error) = engine.executor.back_off(distance, now, platform) {
                            debug!(%error, "wide mark backoff refused");
                        }
                    }
                    WideMarkPolicy::Search => return self.start_search(engine, platform, now),
                }
                Ok(TickAction::WideMark { policy })
            }
        }
    }

    fn start_search<P: Platform + ?Sized>(
        &mut self,
        engine: &mut Engine<'_>,
        platform: &mut P,
        now: Duration,
    ) -> Result<TickAction> {
        let mut ctx = engine.search.begin(self.search_direction(), now);
        self.stats.searches += 1;
        self.lost_ticks = 0;
        self.steering.recenter();
        let outcome = engine.search.advance(&mut ctx, now, engine.executor, platform);
        let action = TickAction::Searching {
            iteration: ctx.iteration,
            phase: ctx.phase,
        };
        self.mode = Mode::Searching(ctx);
        match outcome {
            SearchOutcome::Aborted { iterations } => Err(self.exhausted(platform, iterations)),
            SearchOutcome::Searching | SearchOutcome::Found => Ok(action),
        }
    }

    fn search_direction(&self) -> TurnDirection {
        self.steering.last_turn().unwrap_or(TurnDirection::Left)
    }

    fn loss_tolerance(&self, pattern: LinePattern) -> u32 {
        match pattern {
            LinePattern::ShortBlackSections => {
                self.config.line_loss_ticks + self.config.dashed_gap_ticks
            }
            _ => self.config.line_loss_ticks,
        }
    }

    fn exhausted<P: Platform + ?Sized>(&mut self, platform: &mut P, iterations: u32) -> Error {
        platform.stop_all();
        platform.show("Line lost\nsearch aborted");
        self.mode = Mode::Following;
        Error::SearchExhausted { iterations }
    }

    fn summary(&self, reason: StopReason, now: Duration) -> RunSummary {
        let elapsed = now.saturating_sub(self.started.unwrap_or(now));
        RunSummary {
            reason,
            elapsed_ms: elapsed.as_millis() as u64,
            stats: self.stats,
        }
    }
}
