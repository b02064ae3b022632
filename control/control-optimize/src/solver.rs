//! The horizon-solver capability shared by both optimizers.
//!
//! A [`HorizonSolver`] turns a [`HorizonProblem`] (current state, target,
//! obstacle observation and safety margin) into a [`SolveOutcome`] whose first
//! control is applied by the caller. [`Regime`] names the two
//! implementations so the control loop can dispatch without knowing their
//! concrete types.

use std::fmt;

use control_types::{Control, ControlError, ObstacleObservation, State};

use crate::qp::QpStatus;

/// Which optimizer produced a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Regime {
    /// Convex horizon QP (obstacle ignored).
    Convex,
    /// Non-convex search with the obstacle clearance enforced.
    SafetyHeuristic,
}

impl Regime {
    /// Short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Convex => "convex",
            Self::SafetyHeuristic => "safety-heuristic",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs of one horizon solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizonProblem {
    /// Current agent state.
    pub state: State,
    /// Target state (usually at rest).
    pub target: State,
    /// Obstacle observation for this tick.
    pub obstacle: ObstacleObservation,
    /// Adaptive safety margin ε for this tick.
    pub epsilon: f64,
}

impl HorizonProblem {
    /// Creates a problem.
    #[must_use]
    pub const fn new(
        state: State,
        target: State,
        obstacle: ObstacleObservation,
        epsilon: f64,
    ) -> Self {
        Self {
            state,
            target,
            obstacle,
            epsilon,
        }
    }
}

/// Quality of a solve.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolveStatus {
    /// Converged / safe candidate found.
    Optimal,
    /// Accepted but converged only to the loose tolerance.
    Inaccurate,
    /// The QP ended with a non-optimal status; the control is the zero control.
    Failed(QpStatus),
    /// Every candidate violated a constraint; the least-penalised one is used.
    Unsafe {
        /// Penalised cost of the returned candidate.
        best_cost: f64,
    },
}

impl SolveStatus {
    /// Returns `true` unless the solve failed or is unsafe.
    #[must_use]
    pub const fn is_acceptable(&self) -> bool {
        matches!(self, Self::Optimal | Self::Inaccurate)
    }

    /// The error describing a degraded solve, if any.
    #[must_use]
    pub fn degradation(&self) -> Option<ControlError> {
        match self {
            Self::Optimal | Self::Inaccurate => None,
            Self::Failed(status) => Some(ControlError::solver_infeasible(status.as_str())),
            Self::Unsafe { best_cost } => Some(ControlError::AllCandidatesUnsafe {
                best_cost: *best_cost,
            }),
        }
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Optimal => f.write_str("optimal"),
            Self::Inaccurate => f.write_str("inaccurate"),
            Self::Failed(status) => write!(f, "failed ({status})"),
            Self::Unsafe { .. } => f.write_str("unsafe"),
        }
    }
}

/// Predicted states and controls over one horizon.
///
/// Discarded after the first control is extracted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HorizonPlan {
    /// Planned controls `u_0 .. u_{N-1}`.
    pub controls: Vec<Control>,
    /// Predicted states `x_1 .. x_N`.
    pub states: Vec<State>,
}

impl HorizonPlan {
    /// Number of planned stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.controls.len()
    }

    /// Returns `true` if nothing was planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    /// The control to apply now (zero for an empty plan).
    #[must_use]
    pub fn first_control(&self) -> Control {
        self.controls.first().copied().unwrap_or_default()
    }
}

/// Result of a horizon solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    /// Control to apply this tick.
    pub control: Control,
    /// The full plan behind `control` (empty on failure).
    pub plan: HorizonPlan,
    /// Objective value of the plan.
    pub cost: f64,
    /// Solve quality.
    pub status: SolveStatus,
    /// Iterations spent (OSQP iterations or fitness evaluations).
    pub iterations: usize,
}

impl SolveOutcome {
    /// Outcome of a failed solve: the zero control with the failing status.
    #[must_use]
    pub fn failed(status: QpStatus, iterations: usize) -> Self {
        Self {
            control: Control::zero(),
            plan: HorizonPlan::default(),
            cost: f64::INFINITY,
            status: SolveStatus::Failed(status),
            iterations,
        }
    }
}

/// A receding-horizon optimizer.
pub trait HorizonSolver {
    /// Which regime this solver implements.
    fn regime(&self) -> Regime;

    /// Number of stages planned per solve.
    fn horizon(&self) -> usize;

    /// Plans over the horizon and returns the control to apply now.
    ///
    /// Never panics and never returns an error: failures are reported via
    /// [`SolveOutcome::status`] together with a usable control.
    fn solve(&mut self, problem: &HorizonProblem) -> SolveOutcome;
}
