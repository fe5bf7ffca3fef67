//! Line reacquisition after the line has been lost.
//!
//! Each iteration sweeps to one side (`Rotating`), turns back to the heading
//! the search started from (`Realigning`) and, every few iterations, reverses
//! a little to widen the search radius (`Advancing`). The next iteration
//! sweeps to the other side. Any black reading ends the search at once.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::devices::Motors;
use crate::maneuver::{ManeuverError, ManeuverExecutor, ManeuverRequest};
use crate::steering::TurnDirection;
use crate::symbol::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPhase {
    Rotating,
    Realigning,
    Advancing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Searching,
    /// A channel reads black again; hand control back to steering.
    Found,
    /// The retry budget is used up.
    Aborted { iterations: u32 },
}

/// Progress of one search, from line loss until found or aborted.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchContext {
    pub iteration: u32,
    pub direction: TurnDirection,
    pub phase: SearchPhase,
    pub phase_start: Duration,
    /// Iterations repeated because an obstacle interrupted them.
    pub obstacle_retries: u32,
    /// Sweep angle of the current iteration, undone while realigning.
    sweep: i32,
    /// The current phase has already issued its maneuver.
    issued: bool,
    /// The current iteration was interrupted by an obstacle and is repeated.
    retry: bool,
}

impl SearchContext {
    fn enter(&mut self, phase: SearchPhase, now: Duration) {
        debug!(iteration = self.iteration, ?phase, "search phase");
        self.phase = phase;
        self.phase_start = now;
        self.issued = false;
    }
}

#[derive(Debug, Clone)]
pub struct SearchStateMachine {
    config: SearchConfig,
}

impl SearchStateMachine {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Start a fresh search turning toward `direction` first.
    pub fn begin(&self, direction: TurnDirection, now: Duration) -> SearchContext {
        info!(?direction, "line lost, searching");
        SearchContext {
            iteration: 0,
            direction,
            phase: SearchPhase::Rotating,
            phase_start: now,
            obstacle_retries: 0,
            sweep: 0,
            issued: false,
            retry: false,
        }
    }

    /// Sweep angle for an iteration; odd iterations sweep twice as far.
    pub fn sweep_angle(&self, iteration: u32) -> i32 {
        self.config.search_angle * (iteration % 2 + 1) as i32
    }

    /// Out of iterations, or out of rounds counting obstacle retries, which
    /// are capped at twice the budget.
    pub fn is_exhausted(&self, ctx: &SearchContext) -> bool {
        let budget = self.config.retry_budget;
        ctx.iteration >= budget || ctx.iteration + ctx.obstacle_retries >= budget.saturating_mul(2)
    }

    fn backs_off(&self, ctx: &SearchContext) -> bool {
        ctx.retry || (ctx.iteration + 1) % self.config.backoff_every == 0
    }

    /// Advance the search with the symbol of this tick.
    pub fn step<M: Motors + ?Sized>(
        &self,
        ctx: &mut SearchContext,
        symbol: &Symbol,
        now: Duration,
        executor: &mut ManeuverExecutor,
        motors: &mut M,
    ) -> SearchOutcome {
        // an obstacle backoff runs to the end, even if the line is back in view
        if ctx.retry && ctx.phase == SearchPhase::Advancing {
            return self.advance(ctx, now, executor, motors);
        }
        if symbol.any_black() {
            executor.abort(motors);
            info!(iteration = ctx.iteration, %symbol, "line found");
            return SearchOutcome::Found;
        }
        self.advance(ctx, now, executor, motors)
    }

    /// Move through the phases until a maneuver is running or the budget is
    /// spent. Does not look at the sensors.
    pub fn advance<M: Motors + ?Sized>(
        &self,
        ctx: &mut SearchContext,
        now: Duration,
        executor: &mut ManeuverExecutor,
        motors: &mut M,
    ) -> SearchOutcome {
        if self.is_exhausted(ctx) {
            return self.give_up(ctx, executor, motors);
        }
        if !executor.is_idle() {
            return SearchOutcome::Searching;
        }

        loop {
            match (ctx.phase, ctx.issued) {
                (SearchPhase::Rotating, false) => {
                    ctx.sweep = ctx.direction.sign() * self.sweep_angle(ctx.iteration);
                    ctx.issued = true;
                    if started(executor.rotate(ctx.sweep, now, motors)) {
                        return SearchOutcome::Searching;
                    }
                }
                (SearchPhase::Rotating, true) => ctx.enter(SearchPhase::Realigning, now),
                (SearchPhase::Realigning, false) => {
                    ctx.issued = true;
                    if started(executor.rotate(-ctx.sweep, now, motors)) {
                        return SearchOutcome::Searching;
                    }
                }
                (SearchPhase::Realigning, true) => ctx.enter(SearchPhase::Advancing, now),
                (SearchPhase::Advancing, false) => {
                    ctx.issued = true;
                    if self.backs_off(ctx) {
                        let distance = executor.config().backoff_distance_cm;
                        if started(executor.back_off(distance, now, motors)) {
                            return SearchOutcome::Searching;
                        }
                    }
                }
                (SearchPhase::Advancing, true) => {
                    if ctx.retry {
                        ctx.retry = false;
                    } else {
                        ctx.iteration += 1;
                    }
                    ctx.direction = ctx.direction.flipped();
                    if self.is_exhausted(ctx) {
                        return self.give_up(ctx, executor, motors);
                    }
                    ctx.enter(SearchPhase::Rotating, now);
                }
            }
        }
    }

    /// The bumper hit something mid-search: stop on the spot. The next step
    /// backs off and repeats the iteration from the other side.
    pub fn recover_from_obstacle<M: Motors + ?Sized>(
        &self,
        ctx: &mut SearchContext,
        now: Duration,
        executor: &mut ManeuverExecutor,
        motors: &mut M,
    ) {
        executor.abort(motors);
        motors.stop_all();
        ctx.obstacle_retries += 1;
        ctx.retry = true;
        ctx.enter(SearchPhase::Advancing, now);
    }

    fn give_up<M: Motors + ?Sized>(
        &self,
        ctx: &SearchContext,
        executor: &mut ManeuverExecutor,
        motors: &mut M,
    ) -> SearchOutcome {
        executor.abort(motors);
        motors.stop_all();
        warn!(
            iterations = ctx.iteration,
            obstacle_retries = ctx.obstacle_retries,
            "line search exhausted"
        );
        SearchOutcome::Aborted {
            iterations: ctx.iteration,
        }
    }
}

/// Whether a maneuver request put the robot in motion.
fn started(result: Result<Option<ManeuverRequest>, ManeuverError>) -> bool {
    match result {
        Ok(request) => request.is_some(),
        Err(error) => {
            debug!(%error, "search maneuver refused");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManeuverConfig;
    use crate::maneuver::{ManeuverKind, ManeuverState, ManeuverTarget};
    use crate::mock::{MockPlatform, Spin};
    use crate::symbol::{Readings, Tri};

    fn machine() -> SearchStateMachine {
        SearchStateMachine::new(SearchConfig::default())
    }

    fn white() -> Symbol {
        Symbol::new(Tri::White, Tri::White, Tri::White, Readings::new(80, 80, 80))
    }

    fn center_black() -> Symbol {
        Symbol::new(Tri::White, Tri::White, Tri::Black, Readings::new(80, 80, 20))
    }

    fn rotation_degrees(executor: &ManeuverExecutor) -> Option<i32> {
        match executor.state() {
            ManeuverState::Rotating(request) => match request.target {
                ManeuverTarget::Degrees(d) => Some(d),
                ManeuverTarget::Centimeters(_) => None,
            },
            _ => None,
        }
    }

    /// Run the search on all-white input, finishing each maneuver at its
    /// deadline, and record every maneuver issued.
    fn run_blind(
        machine: &SearchStateMachine,
        ctx: &mut SearchContext,
        executor: &mut ManeuverExecutor,
        platform: &mut MockPlatform,
    ) -> (SearchOutcome, Vec<(ManeuverKind, Option<i32>)>) {
        let mut issued = Vec::new();
        for _ in 0..1000 {
            let now = platform.now;
            executor.tick(now, false, platform);
            let outcome = machine.step(ctx, &white(), now, executor, platform);
            if let Some(request) = executor.active() {
                if request.started == now {
                    issued.push((request.kind, rotation_degrees(executor)));
                }
                platform.now = request.deadline;
            }
            if outcome != SearchOutcome::Searching {
                return (outcome, issued);
            }
        }
        panic!("search did not terminate");
    }

    #[test]
    fn first_sweep_turns_toward_initial_direction() {
        let m = machine();
        let mut executor = ManeuverExecutor::new(ManeuverConfig::default());
        let mut platform = MockPlatform::new();
        let mut ctx = m.begin(TurnDirection::Left, Duration::ZERO);

        let outcome = m.step(&mut ctx, &white(), Duration::ZERO, &mut executor, &mut platform);
        assert_eq!(outcome, SearchOutcome::Searching);
        assert_eq!(rotation_degrees(&executor), Some(-15));
        assert_eq!(ctx.phase, SearchPhase::Rotating);
    }

    #[test]
    fn sweeps_alternate_sides_with_growing_angle() {
        let m = machine();
        let mut executor = ManeuverExecutor::new(ManeuverConfig::default());
        let mut platform = MockPlatform::new();
        let mut ctx = m.begin(TurnDirection::Right, Duration::ZERO);
        let (_, issued) = run_blind(&m, &mut ctx, &mut executor, &mut platform);

        let expected_start = [
            (ManeuverKind::Rotate, Some(15)),
            (ManeuverKind::Rotate, Some(-15)),
            (ManeuverKind::Rotate, Some(-30)),
            (ManeuverKind::Rotate, Some(30)),
            (ManeuverKind::BackOff, None),
            (ManeuverKind::Rotate, Some(15)),
            (ManeuverKind::Rotate, Some(-15)),
            (ManeuverKind::Rotate, Some(-30)),
        ];
        assert_eq!(&issued[..expected_start.len()], &expected_start);
    }

    #[test]
    fn gives_up_after_retry_budget() {
        let m = machine();
        let mut executor = ManeuverExecutor::new(ManeuverConfig::default());
        let mut platform = MockPlatform::new();
        let mut ctx = m.begin(TurnDirection::Left, Duration::ZERO);
        let (outcome, issued) = run_blind(&m, &mut ctx, &mut executor, &mut platform);

        assert_eq!(outcome, SearchOutcome::Aborted { iterations: 10 });
        assert!(ctx.iteration <= 2 * m.config().retry_budget);
        // two rotations per iteration plus a backoff every second iteration
        assert_eq!(issued.len(), 10 * 2 + 5);
        assert!(executor.is_idle());
        assert!(platform.all_stopped());
    }

    #[test]
    fn black_reading_short_circuits_mid_rotation() {
        let m = machine();
        let mut executor = ManeuverExecutor::new(ManeuverConfig::default());
        let mut platform = MockPlatform::new();
        let mut ctx = m.begin(TurnDirection::Left, Duration::ZERO);
        m.step(&mut ctx, &white(), Duration::ZERO, &mut executor, &mut platform);
        assert!(!executor.is_idle());

        let outcome = m.step(
            &mut ctx,
            &center_black(),
            Duration::from_millis(50),
            &mut executor,
            &mut platform,
        );
        assert_eq!(outcome, SearchOutcome::Found);
        assert!(executor.is_idle());
        assert!(platform.all_stopped());
    }

    #[test]
    fn obstacle_backoff_repeats_the_iteration() {
        let m = machine();
        let mut executor = ManeuverExecutor::new(ManeuverConfig::default());
        let mut platform = MockPlatform::new();
        let mut ctx = m.begin(TurnDirection::Left, Duration::ZERO);
        m.step(&mut ctx, &white(), Duration::ZERO, &mut executor, &mut platform);

        m.recover_from_obstacle(&mut ctx, Duration::from_millis(20), &mut executor, &mut platform);
        assert_eq!(ctx.phase, SearchPhase::Advancing);
        assert!(executor.is_idle());
        assert!(platform.all_stopped());

        m.step(&mut ctx, &white(), Duration::from_millis(200), &mut executor, &mut platform);
        assert!(matches!(executor.state(), ManeuverState::BackingOff(_)));
        assert_eq!(platform.wheel(crate::devices::Wheel::Left).spin, Spin::Backward);

        let deadline = executor.active().unwrap().deadline;
        executor.tick(deadline, false, &mut platform);
        m.step(&mut ctx, &white(), deadline, &mut executor, &mut platform);
        assert_eq!(ctx.iteration, 0);
        assert_eq!(ctx.direction, TurnDirection::Right);
        assert_eq!(rotation_degrees(&executor), Some(15));
    }

    #[test]
    fn obstacles_on_every_sweep_still_exhaust_the_search() {
        let m = machine();
        let mut executor = ManeuverExecutor::new(ManeuverConfig::default());
        let mut platform = MockPlatform::new();
        let mut ctx = m.begin(TurnDirection::Left, Duration::ZERO);

        let mut outcome = SearchOutcome::Searching;
        for _ in 0..1000 {
            let now = platform.now;
            executor.tick(now, false, &mut platform);
            outcome = m.step(&mut ctx, &white(), now, &mut executor, &mut platform);
            if outcome != SearchOutcome::Searching {
                break;
            }
            if ctx.phase == SearchPhase::Rotating && !executor.is_idle() {
                m.recover_from_obstacle(&mut ctx, now, &mut executor, &mut platform);
            } else if let Some(request) = executor.active() {
                platform.now = request.deadline;
            }
            platform.now += Duration::from_millis(200);
        }

        assert_eq!(outcome, SearchOutcome::Aborted { iterations: 0 });
        assert_eq!(ctx.obstacle_retries, 2 * m.config().retry_budget);
        assert!(executor.is_idle());
        assert!(platform.all_stopped());
    }

    #[test]
    fn obstacle_retries_count_against_the_doubled_budget() {
        let m = machine();
        let mut ctx = m.begin(TurnDirection::Left, Duration::ZERO);
        ctx.iteration = 9;
        ctx.obstacle_retries = 10;
        assert!(!m.is_exhausted(&ctx));
        ctx.obstacle_retries = 11;
        assert!(m.is_exhausted(&ctx));
    }

    #[test]
    fn obstacle_backoff_precedes_found() {
        let m = machine();
        let mut executor = ManeuverExecutor::new(ManeuverConfig::default());
        let mut platform = MockPlatform::new();
        let mut ctx = m.begin(TurnDirection::Right, Duration::ZERO);
        m.recover_from_obstacle(&mut ctx, Duration::ZERO, &mut executor, &mut platform);

        let now = Duration::from_millis(200);
        let outcome = m.step(&mut ctx, &center_black(), now, &mut executor, &mut platform);
        assert_eq!(outcome, SearchOutcome::Searching);
        assert!(matches!(executor.state(), ManeuverState::BackingOff(_)));

        let now = Duration::from_millis(400);
        let outcome = m.step(&mut ctx, &center_black(), now, &mut executor, &mut platform);
        assert_eq!(outcome, SearchOutcome::Searching);
        assert!(matches!(executor.state(), ManeuverState::BackingOff(_)));

        let deadline = executor.active().unwrap().deadline;
        executor.tick(deadline, false, &mut platform);
        m.step(&mut ctx, &center_black(), deadline, &mut executor, &mut platform);
        assert!(!ctx.retry);

        let now = deadline + Duration::from_millis(200);
        let outcome = m.step(&mut ctx, &center_black(), now, &mut executor, &mut platform);
        assert_eq!(outcome, SearchOutcome::Found);
        assert!(executor.is_idle());
    }

    #[test]
    fn advance_ignores_black_readings() {
        let m = machine();
        let mut executor = ManeuverExecutor::new(ManeuverConfig::default());
        let mut platform = MockPlatform::with_readings(Readings::new(10, 10, 10));
        let mut ctx = m.begin(TurnDirection::Right, Duration::ZERO);
        let outcome = m.advance(&mut ctx, Duration::ZERO, &mut executor, &mut platform);
        assert_eq!(outcome, SearchOutcome::Searching);
        assert_eq!(rotation_degrees(&executor), Some(15));
    }

    #[test]
    fn waits_while_a_maneuver_is_running() {
        let m = machine();
        let mut executor = ManeuverExecutor::new(ManeuverConfig::default());
        let mut platform = MockPlatform::new();
        let mut ctx = m.begin(TurnDirection::Left, Duration::ZERO);
        m.step(&mut ctx, &white(), Duration::ZERO, &mut executor, &mut platform);
        let first = *executor.active().unwrap();

        m.step(&mut ctx, &white(), Duration::from_millis(100), &mut executor, &mut platform);
        assert_eq!(executor.active(), Some(&first));
        assert_eq!(ctx.phase, SearchPhase::Rotating);
    }
}
