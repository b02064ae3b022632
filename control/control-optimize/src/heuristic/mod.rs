//! Safety-constrained heuristic horizon optimizer.
//!
//! The obstacle clearance makes the horizon problem non-convex, so this
//! regime searches the control box directly:
//!
//! 1. a particle swarm explores the `3N`-dimensional box globally,
//! 2. simulated annealing refines the best warm start (or the zero sequence),
//! 3. the cheaper of the two sequences wins and its first control is applied.
//!
//! Both searches score candidates with [`SafetyFitness`], which rolls the
//! sequence out with the shared dynamics and penalises the first stage that
//! breaks clearance, actuator, speed or workspace limits.
//!
//! Randomness comes from a [`StdRng`] owned by the solver and seeded from
//! [`HeuristicConfig::seed`], so runs with the same seed are reproducible.

pub mod anneal;
pub mod fitness;
pub mod swarm;

pub use anneal::{AnnealConfig, SimulatedAnnealing};
pub use fitness::{Evaluation, SafetyFitness, Violation};
pub use swarm::{Candidate, ParticleSwarm, SwarmConfig};

use control_types::{
    CONTROL_DIM, Control, ControlError, CostWeights, Plant, Result, SafetyParams, State,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, warn};

use crate::solver::{HorizonPlan, HorizonProblem, HorizonSolver, Regime, SolveOutcome, SolveStatus};

/// Configuration for [`SafetyHeuristicSolver`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeuristicConfig {
    /// Number of planned stages N.
    pub horizon: usize,
    /// Penalty per unexecuted stage of an unsafe sequence, added on top of
    /// the bound on any feasible cost.
    pub penalty: f64,
    /// Extra effort weight at the safety boundary.
    pub repulsion_gain: f64,
    /// Clearance below which the effort weight starts to grow.
    pub influence_distance: f64,
    /// Whether the previous plan, shifted by one stage, seeds the next solve.
    pub reuse_previous_plan: bool,
    /// Swarm parameters.
    pub swarm: SwarmConfig,
    /// Annealing schedule.
    pub anneal: AnnealConfig,
    /// RNG seed (`None` seeds from entropy).
    pub seed: Option<u64>,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            horizon: 5,
            penalty: 1e6,
            repulsion_gain: 4.0,
            influence_distance: 0.3,
            reuse_previous_plan: true,
            swarm: SwarmConfig::default(),
            anneal: AnnealConfig::default(),
            seed: Some(42),
        }
    }
}

impl HeuristicConfig {
    /// Smaller swarm and shorter schedule for fast loops.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            swarm: SwarmConfig::default().with_particles(16).with_iterations(20),
            anneal: AnnealConfig::default().with_iterations(150),
            ..Self::default()
        }
    }

    /// Sets the horizon length.
    #[must_use]
    pub const fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    /// Sets the RNG seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the swarm parameters.
    #[must_use]
    pub const fn with_swarm(mut self, swarm: SwarmConfig) -> Self {
        self.swarm = swarm;
        self
    }

    /// Sets the annealing schedule.
    #[must_use]
    pub const fn with_anneal(mut self, anneal: AnnealConfig) -> Self {
        self.anneal = anneal;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] for a zero horizon, a
    /// non-positive penalty or invalid search parameters.
    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(ControlError::invalid_config(
                "heuristic horizon must be at least 1",
            ));
        }
        if !(self.penalty > 0.0) {
            return Err(ControlError::invalid_config(
                "heuristic penalty must be positive",
            ));
        }
        if !(self.repulsion_gain >= 0.0 && self.influence_distance >= 0.0) {
            return Err(ControlError::invalid_config(
                "repulsion gain and influence distance must be non-negative",
            ));
        }
        self.swarm.validate()?;
        self.anneal.validate()
    }
}

/// Particle swarm + simulated annealing optimizer with hard safety checks.
///
/// # Example
///
/// ```
/// use control_optimize::{HeuristicConfig, HorizonProblem, SafetyHeuristicSolver};
/// use control_types::{CostWeights, MotionLimits, ObstacleObservation, Plant, SafetyParams, State, Workspace};
/// use nalgebra::Point3;
///
/// let plant = Plant::new(0.1, MotionLimits::new(1.0, 0.5), Workspace::cube(-1.0, 2.0))?;
/// let mut solver = SafetyHeuristicSolver::new(
///     plant,
///     CostWeights::default(),
///     SafetyParams::default(),
///     HeuristicConfig::realtime(),
/// )?;
///
/// let problem = HorizonProblem::new(
///     State::at_rest(Point3::origin()),
///     State::at_rest(Point3::new(1.0, 0.0, 0.0)),
///     ObstacleObservation::point(Point3::new(0.0, 1.0, 0.0)),
///     0.0,
/// );
/// let outcome = solver.solve_safe_horizon(&problem);
/// assert!(outcome.status.is_acceptable());
/// assert!(outcome.control.within(1.0));
/// # Ok::<(), control_types::ControlError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SafetyHeuristicSolver {
    plant: Plant,
    weights: CostWeights,
    safety: SafetyParams,
    config: HeuristicConfig,
    rng: StdRng,
    warm_starts: Vec<Vec<f64>>,
    previous: Option<Vec<Control>>,
}

impl SafetyHeuristicSolver {
    /// Creates the solver.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] if the weights, the safety
    /// parameters or the configuration are invalid.
    pub fn new(
        plant: Plant,
        weights: CostWeights,
        safety: SafetyParams,
        config: HeuristicConfig,
    ) -> Result<Self> {
        weights.validate()?;
        safety.validate()?;
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            plant,
            weights,
            safety,
            config,
            rng,
            warm_starts: Vec::new(),
            previous: None,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &HeuristicConfig {
        &self.config
    }

    /// Queues a candidate control sequence for the next solve.
    ///
    /// The sequence is truncated or zero-padded to the horizon. Queued
    /// candidates seed the swarm and the annealing start, and are consumed
    /// by the next solve.
    pub fn inject(&mut self, controls: &[Control]) {
        let mut decision = fitness::to_decision(controls);
        decision.resize(CONTROL_DIM * self.config.horizon, 0.0);
        self.warm_starts.push(decision);
    }

    /// Builder form of [`Self::inject`].
    #[must_use]
    pub fn with_warm_start(mut self, controls: &[Control]) -> Self {
        self.inject(controls);
        self
    }

    /// Clears queued candidates and the remembered plan.
    pub fn reset(&mut self) {
        self.warm_starts.clear();
        self.previous = None;
    }

    /// Plans a safe horizon for `problem` and returns its first control.
    ///
    /// If no candidate satisfies every constraint, the least-penalised one is
    /// returned with [`SolveStatus::Unsafe`].
    pub fn solve_safe_horizon(&mut self, problem: &HorizonProblem) -> SolveOutcome {
        let seeds = self.seeds(&problem.state);
        let horizon = self.config.horizon;
        let bound = self.plant.limits.max_acceleration;
        let safety_distance = self.safety.safety_distance(problem.epsilon);
        let fitness = SafetyFitness::new(
            &self.plant,
            &self.weights,
            problem,
            horizon,
            safety_distance,
            self.config.penalty,
            self.config.repulsion_gain,
            self.config.influence_distance,
        );

        let mut evaluations = 0usize;
        let mut objective = |x: &[f64]| {
            evaluations += 1;
            fitness.evaluate(x).cost
        };

        let swarm = ParticleSwarm::new(self.config.swarm, bound).search(
            fitness.dimension(),
            &seeds,
            &mut objective,
            &mut self.rng,
        );

        let start = seeds
            .iter()
            .map(|s| Candidate {
                decision: s.clone(),
                cost: fitness.evaluate(s).cost,
            })
            .min_by(|a, b| a.cost.total_cmp(&b.cost))
            .unwrap_or_else(|| {
                let decision = vec![0.0; fitness.dimension()];
                let cost = fitness.evaluate(&decision).cost;
                Candidate { decision, cost }
            });
        let annealed =
            SimulatedAnnealing::new(self.config.anneal, bound).refine(start, &mut objective, &mut self.rng);

        let (best, source) = if annealed.cost < swarm.cost {
            (annealed, "anneal")
        } else {
            (swarm, "swarm")
        };

        let evaluation = fitness.evaluate(&best.decision);
        let controls = fitness::to_controls(&best.decision);
        let states = fitness.rollout(&best.decision);

        let status = if evaluation.is_safe() {
            SolveStatus::Optimal
        } else {
            warn!(
                best_cost = best.cost,
                violation = ?evaluation.violation,
                "All heuristic candidates violate a constraint"
            );
            SolveStatus::Unsafe {
                best_cost: best.cost,
            }
        };

        debug!(
            cost = best.cost,
            source,
            evaluations,
            safety_distance,
            "Heuristic solve finished"
        );

        self.previous = Some(controls.clone());
        let plan = HorizonPlan { controls, states };
        SolveOutcome {
            control: plan.first_control(),
            plan,
            cost: best.cost,
            status,
            iterations: evaluations,
        }
    }

    /// Warm starts for this solve: injected candidates, the shifted previous
    /// plan and a braking sequence.
    fn seeds(&mut self, state: &State) -> Vec<Vec<f64>> {
        let horizon = self.config.horizon;
        let mut seeds = std::mem::take(&mut self.warm_starts);

        if self.config.reuse_previous_plan {
            if let Some(previous) = self.previous.take() {
                let mut shifted: Vec<Control> = previous.into_iter().skip(1).collect();
                shifted.resize(horizon, Control::zero());
                seeds.push(fitness::to_decision(&shifted));
            }
        }

        seeds.push(fitness::to_decision(&braking_sequence(
            &self.plant,
            state,
            horizon,
        )));
        seeds
    }
}

/// Controls that bring the agent to rest as fast as the actuator allows.
#[must_use]
pub fn braking_sequence(plant: &Plant, state: &State, horizon: usize) -> Vec<Control> {
    let dt = plant.dynamics.dt();
    let limit = plant.limits.max_acceleration;
    let mut velocity = state.velocity;
    (0..horizon)
        .map(|_| {
            let control = Control::from_vector(-velocity / dt).clamped(limit);
            velocity += control.acceleration * dt;
            control
        })
        .collect()
}

impl HorizonSolver for SafetyHeuristicSolver {
    fn regime(&self) -> Regime {
        Regime::SafetyHeuristic
    }

    fn horizon(&self) -> usize {
        self.config.horizon
    }

    fn solve(&mut self, problem: &HorizonProblem) -> SolveOutcome {
        self.solve_safe_horizon(problem)
    }
}
