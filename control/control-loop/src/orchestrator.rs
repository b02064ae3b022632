//! The receding-horizon control loop.
//!
//! Each [`ControlLoop::step`] runs one tick:
//!
//! 1. observe the obstacle and compute the margin ε,
//! 2. select the regime with the [`DispatchPolicy`](crate::DispatchPolicy),
//! 3. solve the horizon problem (falling back on solver failure),
//! 4. optionally pass the control through the barrier filter, enforcing
//!    the safety distance plus the one-step travel,
//! 5. clamp the control and propagate the state,
//! 6. check the workspace, the target tolerance and the tick budget,
//! 7. append the tick to the trajectory record.

use std::fmt;

use control_optimize::{
    BarrierFilter, ConvexHorizonSolver, HorizonProblem, HorizonSolver, Regime,
    SafetyHeuristicSolver, SolveStatus,
};
use control_types::{Control, Plant, Result, State};
use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::config::{ControllerConfig, FallbackControl};
use crate::margin::MarginEstimator;
use crate::obstacle::ObstacleProvider;
use crate::record::{TickRecord, TrajectoryRecord};

/// Progress of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoopStatus {
    /// Still moving toward the target.
    Running,
    /// Within tolerance of the target.
    Reached,
    /// The state left the workspace.
    OutOfBounds,
    /// The tick budget ran out.
    StepLimitExceeded,
}

impl LoopStatus {
    /// Returns `true` for every status except `Running`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Reached => "reached",
            Self::OutOfBounds => "out of bounds",
            Self::StepLimitExceeded => "step limit exceeded",
        })
    }
}

/// Drives the agent from its initial state toward a target.
///
/// # Example
///
/// ```
/// use control_loop::{ControlLoop, ControllerConfig, LoopStatus, StaticObstacle};
/// use control_types::State;
/// use nalgebra::Point3;
///
/// let mut control = ControlLoop::new(
///     ControllerConfig::realtime().with_max_steps(5),
///     State::at_rest(Point3::origin()),
///     Point3::new(1.0, 0.0, 0.0),
///     Box::new(StaticObstacle::new(Point3::new(0.0, 1.5, 0.0), 0.1)),
/// )?;
///
/// assert_eq!(control.step(), LoopStatus::Running);
/// assert_eq!(control.history().len(), 1);
/// assert_eq!(control.run(), LoopStatus::StepLimitExceeded);
/// assert_eq!(control.history().len(), 5);
/// # Ok::<(), control_types::ControlError>(())
/// ```
pub struct ControlLoop {
    config: ControllerConfig,
    plant: Plant,
    margin: MarginEstimator,
    convex: ConvexHorizonSolver,
    heuristic: SafetyHeuristicSolver,
    filter: BarrierFilter,
    provider: Box<dyn ObstacleProvider>,
    state: State,
    target: State,
    tick: usize,
    status: LoopStatus,
    previous_control: Control,
    record: TrajectoryRecord,
}

impl fmt::Debug for ControlLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlLoop")
            .field("state", &self.state)
            .field("target", &self.target)
            .field("tick", &self.tick)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl ControlLoop {
    /// Validates the configuration and builds every component.
    ///
    /// # Errors
    ///
    /// Returns [`control_types::ControlError::InvalidConfig`] if any part of
    /// the configuration is invalid. Nothing else fails once the loop runs.
    pub fn new(
        config: ControllerConfig,
        initial: State,
        target: Point3<f64>,
        provider: Box<dyn ObstacleProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let plant = config.plant()?;

        let control_loop = Self {
            margin: MarginEstimator::new(config.dt, config.safety)?,
            convex: ConvexHorizonSolver::new(plant, config.weights, config.convex)?,
            heuristic: SafetyHeuristicSolver::new(
                plant,
                config.weights,
                config.safety,
                config.heuristic,
            )?,
            filter: BarrierFilter::new(config.limits, config.barrier)?,
            provider,
            state: initial,
            target: State::at_rest(target),
            tick: 0,
            status: LoopStatus::Running,
            previous_control: Control::zero(),
            record: TrajectoryRecord::new(initial),
            plant,
            config,
        };

        info!(
            start = ?initial.position,
            target = ?target,
            policy = ?control_loop.config.policy,
            max_steps = control_loop.config.max_steps,
            "Starting control loop"
        );
        Ok(control_loop)
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &State {
        &self.state
    }

    /// Target state (at rest).
    #[must_use]
    pub const fn target(&self) -> &State {
        &self.target
    }

    /// Ticks executed so far.
    #[must_use]
    pub const fn tick(&self) -> usize {
        self.tick
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> LoopStatus {
        self.status
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Trajectory recorded so far.
    #[must_use]
    pub const fn history(&self) -> &TrajectoryRecord {
        &self.record
    }

    /// Consumes the loop and returns its trajectory.
    #[must_use]
    pub fn into_history(self) -> TrajectoryRecord {
        self.record
    }

    /// Runs one tick and returns the resulting status.
    ///
    /// A loop that already finished returns its terminal status without
    /// advancing.
    pub fn step(&mut self) -> LoopStatus {
        if self.status.is_terminal() {
            return self.status;
        }

        let obstacle = self.provider.observe(self.tick);
        let epsilon = self.margin.estimate_margin(obstacle.confidence, obstacle.speed());
        let safety_distance = self.margin.safety_distance(epsilon);
        let dispatch = self
            .config
            .policy
            .select(&self.state, &obstacle, safety_distance);

        let problem = HorizonProblem::new(self.state, self.target, obstacle, epsilon);
        let solver: &mut dyn HorizonSolver = match dispatch.regime {
            Regime::Convex => &mut self.convex,
            Regime::SafetyHeuristic => &mut self.heuristic,
        };
        let outcome = solver.solve(&problem);

        let mut control = match outcome.status {
            SolveStatus::Failed(status) => {
                let fallback = match self.config.fallback {
                    FallbackControl::Zero => Control::zero(),
                    FallbackControl::Previous => self.previous_control,
                };
                warn!(
                    tick = self.tick,
                    regime = %dispatch.regime,
                    %status,
                    fallback = ?self.config.fallback,
                    "Optimizer failed, applying fallback control"
                );
                fallback
            }
            _ => outcome.control,
        };

        let mut filtered = false;
        if dispatch.filter {
            let delta = self.filter.sampled_delta(
                &self.state,
                &obstacle,
                safety_distance,
                self.plant.dynamics.dt(),
            );
            let filtered_outcome = self
                .filter
                .filter_control(&self.state, &control, &obstacle, delta);
            control = filtered_outcome.control;
            filtered = filtered_outcome.corrected;
        }

        let control = control.clamped(self.plant.limits.max_acceleration);
        let mut next = self.plant.dynamics.propagate(&self.state, &control);
        if self.config.project_velocity {
            next.velocity = self.plant.limits.project_velocity(&next.velocity);
        }

        self.state = next;
        self.previous_control = control;
        self.tick += 1;

        let distance = obstacle.predicted_surface_distance(&next.position, self.plant.dynamics.dt());
        self.status = if !self.plant.workspace.contains(&next.position) {
            LoopStatus::OutOfBounds
        } else if (next.position - self.target.position).norm() <= self.config.tolerance {
            LoopStatus::Reached
        } else if self.tick >= self.config.max_steps {
            LoopStatus::StepLimitExceeded
        } else {
            LoopStatus::Running
        };

        debug!(
            tick = self.tick,
            regime = %dispatch.regime,
            solve = %outcome.status,
            epsilon,
            distance,
            filtered,
            "Tick complete"
        );

        self.record.push(TickRecord {
            tick: self.tick,
            state: next,
            control,
            obstacle,
            epsilon,
            safety_distance,
            distance,
            regime: dispatch.regime,
            solve: outcome.status,
            filtered,
            status: self.status,
        });

        if self.status.is_terminal() {
            info!(
                status = %self.status,
                ticks = self.tick,
                min_clearance = ?self.record.min_clearance(),
                degraded = self.record.degraded_ticks(),
                "Control loop finished"
            );
        }

        self.status
    }

    /// Steps until a terminal status is reached.
    pub fn run(&mut self) -> LoopStatus {
        while !self.step().is_terminal() {}
        self.status
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::obstacle::{ScriptedObstacle, StaticObstacle};
    use crate::policy::DispatchPolicy;
    use approx::assert_relative_eq;
    use control_types::{ObstacleObservation, Workspace};
    use nalgebra::Vector3;

    fn far_obstacle() -> Box<dyn ObstacleProvider> {
        Box::new(StaticObstacle::new(Point3::new(-0.9, -0.9, -0.9), 0.0))
    }

    fn config() -> ControllerConfig {
        ControllerConfig::realtime()
            .with_workspace(Workspace::cube(-1.0, 2.0))
            .with_max_steps(50)
    }

    #[test]
    fn test_step_records_every_tick() {
        let mut control = ControlLoop::new(
            config(),
            State::at_rest(Point3::origin()),
            Point3::new(1.0, 0.0, 0.0),
            far_obstacle(),
        )
        .unwrap();

        for expected in 1..=3 {
            assert_eq!(control.step(), LoopStatus::Running);
            assert_eq!(control.tick(), expected);
            assert_eq!(control.history().len(), expected);
        }
        let last = control.history().last().unwrap();
        assert_eq!(last.state, *control.state());
        assert!(last.control.within(1.0));
    }

    #[test]
    fn test_terminal_loop_does_not_advance() {
        let mut control = ControlLoop::new(
            config().with_max_steps(2),
            State::at_rest(Point3::origin()),
            Point3::new(1.0, 0.0, 0.0),
            far_obstacle(),
        )
        .unwrap();

        assert_eq!(control.run(), LoopStatus::StepLimitExceeded);
        assert_eq!(control.step(), LoopStatus::StepLimitExceeded);
        assert_eq!(control.tick(), 2);
        assert_eq!(control.history().len(), 2);
    }

    #[test]
    fn test_reached_when_starting_near_target() {
        let target = Point3::new(1.0, 1.0, 1.0);
        let mut control = ControlLoop::new(
            config(),
            State::at_rest(Point3::new(1.0, 1.0, 1.01)),
            target,
            far_obstacle(),
        )
        .unwrap();
        assert_eq!(control.step(), LoopStatus::Reached);
    }

    #[test]
    fn test_out_of_bounds() {
        // Moving fast toward the workspace edge: no control can stop in time.
        let mut control = ControlLoop::new(
            config().with_policy(DispatchPolicy::ConvexOnly),
            State::new(Point3::new(1.99, 0.0, 0.0), Vector3::new(0.5, 0.0, 0.0)),
            Point3::new(1.0, 0.0, 0.0),
            far_obstacle(),
        )
        .unwrap();
        assert_eq!(control.run(), LoopStatus::OutOfBounds);
        assert_eq!(control.history().last().unwrap().status, LoopStatus::OutOfBounds);
    }

    #[test]
    fn test_fallback_previous_on_failure() {
        // Rushing at the +x wall: the heuristic brakes on the first tick, then
        // the convex regime takes over once past x = 1.97 and finds no stage
        // inside the workspace, so the braking control is held.
        let config = config()
            .with_policy(DispatchPolicy::AxisThreshold {
                axis: 0,
                threshold: 1.97,
            })
            .with_fallback(FallbackControl::Previous);
        let mut control = ControlLoop::new(
            config,
            State::new(Point3::new(1.95, 0.0, 0.0), Vector3::new(0.5, 0.0, 0.0)),
            Point3::new(1.0, 0.0, 0.0),
            far_obstacle(),
        )
        .unwrap();

        assert_eq!(control.step(), LoopStatus::Running);
        let first = control.history().last().unwrap().clone();
        assert_eq!(first.regime, Regime::SafetyHeuristic);
        assert!(!matches!(first.solve, SolveStatus::Failed(_)));
        assert!(first.control.acceleration.x < 0.0);
        assert!(first.state.position.x > 1.97);

        assert_eq!(control.step(), LoopStatus::OutOfBounds);
        let second = control.history().last().unwrap();
        assert_eq!(second.regime, Regime::Convex);
        assert!(matches!(second.solve, SolveStatus::Failed(_)));
        assert!(second.is_degraded());
        assert_ne!(second.control, Control::zero());
        assert_eq!(second.control, first.control);
    }

    #[test]
    fn test_fallback_zero_on_failure() {
        // Starting outside the workspace makes the convex problem infeasible.
        let mut control = ControlLoop::new(
            config().with_policy(DispatchPolicy::ConvexOnly),
            State::at_rest(Point3::new(5.0, 0.0, 0.0)),
            Point3::new(1.0, 0.0, 0.0),
            far_obstacle(),
        )
        .unwrap();

        assert_eq!(control.step(), LoopStatus::OutOfBounds);
        let record = control.history().last().unwrap();
        assert!(matches!(record.solve, SolveStatus::Failed(_)));
        assert_eq!(record.control, Control::zero());
    }

    #[test]
    fn test_margin_follows_confidence() {
        let moving = ObstacleObservation::point(Point3::new(-0.9, -0.9, -0.9))
            .with_velocity(Vector3::new(1.0, 0.0, 0.0))
            .with_confidence(0.5);
        let mut control = ControlLoop::new(
            config(),
            State::at_rest(Point3::origin()),
            Point3::new(1.0, 0.0, 0.0),
            Box::new(ScriptedObstacle::new(vec![moving]).unwrap()),
        )
        .unwrap();
        control.step();
        let record = control.history().last().unwrap();
        // 3 · 0.1 · 1 · 0.5
        assert_relative_eq!(record.epsilon, 0.15, epsilon = 1e-12);
        assert_relative_eq!(record.safety_distance, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = ControlLoop::new(
            ControllerConfig::default().with_dt(-1.0),
            State::default(),
            Point3::new(1.0, 0.0, 0.0),
            far_obstacle(),
        );
        assert!(result.unwrap_err().is_config_error());
    }
}
