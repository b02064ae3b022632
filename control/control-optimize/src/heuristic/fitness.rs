//! Safety-aware fitness of a control sequence.
//!
//! A decision vector holds `3N` accelerations. It is rolled out with the
//! shared dynamics; the first stage that breaks a constraint ends the rollout
//! with a penalty scaled by the number of stages that were never executed, so
//! earlier violations rank worse than later ones. Feasible sequences are
//! scored with the quadratic tracking cost, where the effort weight grows as
//! the agent approaches the inflated safety boundary.
//!
//! The ranking is lexicographic: every unsafe cost starts at an upper bound
//! on the cost of any feasible sequence, so no feasible sequence ever ranks
//! behind an unsafe one, however far the target is.

use control_types::{CONTROL_DIM, Control, CostWeights, Plant, State};
use nalgebra::{SMatrix, SVector, Vector6};

use crate::solver::HorizonProblem;

const LIMIT_TOLERANCE: f64 = 1e-9;

/// Constraint that ended a rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Violation {
    /// Surface distance fell below the safety distance.
    Clearance,
    /// An acceleration component exceeded the actuator limit.
    Actuator,
    /// A velocity component exceeded the speed limit.
    Speed,
    /// The position left the workspace.
    Workspace,
}

/// Score of one decision vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Tracking cost, or the penalty for an unsafe sequence.
    pub cost: f64,
    /// First violated constraint and its stage, if any.
    pub violation: Option<(usize, Violation)>,
}

impl Evaluation {
    /// Returns `true` if no constraint was violated.
    #[must_use]
    pub const fn is_safe(&self) -> bool {
        self.violation.is_none()
    }
}

/// Fitness function for one horizon problem.
#[derive(Debug, Clone, Copy)]
pub struct SafetyFitness<'a> {
    plant: &'a Plant,
    weights: &'a CostWeights,
    problem: &'a HorizonProblem,
    horizon: usize,
    safety_distance: f64,
    penalty: f64,
    repulsion_gain: f64,
    influence_distance: f64,
    feasible_bound: f64,
}

impl<'a> SafetyFitness<'a> {
    /// Creates the fitness for a horizon of `horizon` stages.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        plant: &'a Plant,
        weights: &'a CostWeights,
        problem: &'a HorizonProblem,
        horizon: usize,
        safety_distance: f64,
        penalty: f64,
        repulsion_gain: f64,
        influence_distance: f64,
    ) -> Self {
        let mut fitness = Self {
            plant,
            weights,
            problem,
            horizon,
            safety_distance,
            penalty,
            repulsion_gain,
            influence_distance,
            feasible_bound: 0.0,
        };
        fitness.feasible_bound = fitness.feasible_cost_bound();
        fitness
    }

    /// Decision vector length (3N).
    #[must_use]
    pub const fn dimension(&self) -> usize {
        CONTROL_DIM * self.horizon
    }

    /// Cost at or above which a sequence is unsafe.
    #[must_use]
    pub fn penalty(&self) -> f64 {
        self.feasible_bound + self.penalty
    }

    /// Upper bound on the cost of any sequence that passes every check.
    ///
    /// Past the first stage a feasible state lies in the workspace with
    /// every velocity component within the speed limit, and every control
    /// lies in the actuator box, so each quadratic term is bounded by
    /// `|e|ᵀ |W| |e|` over the largest error magnitudes.
    #[must_use]
    pub fn feasible_cost_bound(&self) -> f64 {
        let limits = &self.plant.limits;
        let workspace = &self.plant.workspace;
        let target = &self.problem.target;

        let extent = Vector6::from_fn(|i, _| {
            if i < 3 {
                (workspace.min[i] - target.position[i])
                    .abs()
                    .max((workspace.max[i] - target.position[i]).abs())
            } else {
                limits.max_speed + target.velocity[i - 3].abs()
            }
        });
        let stage = quadratic_bound(&self.weights.stage, &extent);
        let terminal = quadratic_bound(&self.weights.terminal, &extent);
        let effort = (1.0 + self.repulsion_gain)
            * quadratic_bound(
                &self.weights.effort,
                &SVector::<f64, CONTROL_DIM>::repeat(limits.max_acceleration),
            );
        let initial = self
            .weights
            .stage_cost(&(self.problem.state.to_vector() - target.to_vector()));

        let n = self.horizon as f64;
        initial + (n - 1.0) * stage + n * effort + terminal
    }

    /// Scores a decision vector of length [`Self::dimension`].
    #[must_use]
    pub fn evaluate(&self, decision: &[f64]) -> Evaluation {
        let dynamics = &self.plant.dynamics;
        let limits = &self.plant.limits;
        let workspace = &self.plant.workspace;
        let obstacle = &self.problem.obstacle;
        let target = self.problem.target.to_vector();

        let mut state = self.problem.state;
        let mut cost = 0.0;

        for (k, u) in decision.chunks_exact(CONTROL_DIM).take(self.horizon).enumerate() {
            let control = Control::new(u[0], u[1], u[2]);
            let remaining = (self.horizon - k) as f64;

            let excess = control.acceleration.amax() - limits.max_acceleration;
            if excess > LIMIT_TOLERANCE {
                return self.violated(k, Violation::Actuator, remaining, excess);
            }

            cost += self.weights.stage_cost(&(state.to_vector() - target));
            state = dynamics.propagate(&state, &control);

            let excess = state.velocity.amax() - limits.max_speed;
            if excess > LIMIT_TOLERANCE {
                return self.violated(k, Violation::Speed, remaining, excess);
            }

            if !workspace.contains(&state.position) {
                let depth = (workspace.clamp(&state.position) - state.position).norm();
                return self.violated(k, Violation::Workspace, remaining, depth);
            }

            let elapsed = (k + 1) as f64 * dynamics.dt();
            let distance = obstacle.predicted_surface_distance(&state.position, elapsed);
            if distance < self.safety_distance {
                return self.violated(
                    k,
                    Violation::Clearance,
                    remaining,
                    self.safety_distance - distance,
                );
            }

            cost += self.effort_scale(distance) * self.weights.effort_cost(&control.acceleration);
        }

        cost += self.weights.terminal_cost(&(state.to_vector() - target));
        Evaluation {
            cost,
            violation: None,
        }
    }

    /// Predicted states of a decision vector (no constraint checks).
    #[must_use]
    pub fn rollout(&self, decision: &[f64]) -> Vec<State> {
        self.plant
            .dynamics
            .rollout(&self.problem.state, &to_controls(decision))
    }

    fn effort_scale(&self, distance: f64) -> f64 {
        let clearance = distance - self.safety_distance;
        if self.influence_distance > 0.0 && clearance < self.influence_distance {
            1.0 + self.repulsion_gain * (1.0 - clearance / self.influence_distance)
        } else {
            1.0
        }
    }

    fn violated(&self, stage: usize, violation: Violation, remaining: f64, depth: f64) -> Evaluation {
        Evaluation {
            cost: self.feasible_bound + self.penalty * remaining + depth,
            violation: Some((stage, violation)),
        }
    }
}

/// `|e|ᵀ |W| |e|`, the largest `eᵀ W e` over the box `|eᵢ| ≤ extentᵢ`.
fn quadratic_bound<const D: usize>(weight: &SMatrix<f64, D, D>, extent: &SVector<f64, D>) -> f64 {
    let extent = extent.abs();
    extent.dot(&(weight.abs() * extent))
}

/// Splits a decision vector into controls.
#[must_use]
pub fn to_controls(decision: &[f64]) -> Vec<Control> {
    decision
        .chunks_exact(CONTROL_DIM)
        .map(|u| Control::new(u[0], u[1], u[2]))
        .collect()
}

/// Flattens controls into a decision vector.
#[must_use]
pub fn to_decision(controls: &[Control]) -> Vec<f64> {
    controls
        .iter()
        .flat_map(|c| c.acceleration.iter().copied())
        .collect()
}
