//! Convex receding-horizon optimizer.
//!
//! Solves the tracking problem
//!
//! ```text
//! minimize    Σ_{k<N} (x_k − x_t)ᵀ Q (x_k − x_t) + u_kᵀ R u_k + (x_N − x_t)ᵀ Qf (x_N − x_t)
//! subject to  x_{k+1} = A x_k + B u_k
//!             workspace_min ≤ p_k ≤ workspace_max,  |v_k| ≤ v_max   (k = 1..N)
//!             |u_k| ≤ a_max                                          (k = 0..N-1)
//! ```
//!
//! in condensed form: the states are eliminated as `X = Φ x_0 + Γ U`, where
//! `Φ` stacks `A^k` and block `(k, j)` of `Γ` is `A^{k-1-j} B`, leaving a QP
//! over the 3N controls only. The obstacle is ignored in this regime.

use control_types::{
    CONTROL_DIM, Control, ControlError, CostWeights, Plant, Result, STATE_DIM, State,
};
use nalgebra::{DMatrix, DVector, Matrix6};
use tracing::{debug, warn};

use crate::qp::{QpProblem, QpSettings, QpSolver, QpStatus};
use crate::solver::{HorizonPlan, HorizonProblem, HorizonSolver, Regime, SolveOutcome, SolveStatus};

/// Configuration for [`ConvexHorizonSolver`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvexConfig {
    /// Number of planned stages N.
    pub horizon: usize,
    /// Settings of the underlying QP solver.
    pub qp: QpSettings,
}

impl Default for ConvexConfig {
    fn default() -> Self {
        Self {
            horizon: 10,
            qp: QpSettings::default().with_tolerance(1e-4, 1e-4),
        }
    }
}

impl ConvexConfig {
    /// Sets the horizon length.
    #[must_use]
    pub const fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    /// Sets the QP settings.
    #[must_use]
    pub const fn with_qp(mut self, qp: QpSettings) -> Self {
        self.qp = qp;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] for a zero horizon or invalid
    /// QP settings.
    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(ControlError::invalid_config(
                "convex horizon must be at least 1",
            ));
        }
        self.qp.validate()
    }
}

/// Problem data that depends only on the plant, the weights and N.
#[derive(Debug, Clone)]
struct CondensedHorizon {
    horizon: usize,
    /// Stacked `A^k`, k = 1..N (6N × 6).
    phi: DMatrix<f64>,
    /// Lower block-triangular input map (6N × 3N).
    gamma: DMatrix<f64>,
    /// `Q̄ = blockdiag(Q, .., Q, Qf)`.
    q_bar: DMatrix<f64>,
    /// Hessian `2 (Γᵀ Q̄ Γ + R̄)`.
    hessian: DMatrix<f64>,
    /// Constraint rows `[Γ; I]`.
    constraints: DMatrix<f64>,
    state_min: DVector<f64>,
    state_max: DVector<f64>,
    max_acceleration: f64,
}

impl CondensedHorizon {
    fn new(plant: &Plant, weights: &CostWeights, horizon: usize) -> Self {
        let (a, b) = plant.dynamics.matrices();
        let nx = STATE_DIM * horizon;
        let nu = CONTROL_DIM * horizon;

        let mut powers = Vec::with_capacity(horizon + 1);
        powers.push(Matrix6::<f64>::identity());
        for k in 1..=horizon {
            powers.push(a * powers[k - 1]);
        }

        let mut phi = DMatrix::zeros(nx, STATE_DIM);
        let mut gamma = DMatrix::zeros(nx, nu);
        let mut q_bar = DMatrix::zeros(nx, nx);
        let mut r_bar = DMatrix::zeros(nu, nu);

        for k in 1..=horizon {
            let row = STATE_DIM * (k - 1);
            phi.fixed_view_mut::<6, 6>(row, 0).copy_from(&powers[k]);
            for j in 0..k {
                gamma
                    .fixed_view_mut::<6, 3>(row, CONTROL_DIM * j)
                    .copy_from(&(powers[k - 1 - j] * b));
            }
            let weight = if k == horizon {
                &weights.terminal
            } else {
                &weights.stage
            };
            q_bar.fixed_view_mut::<6, 6>(row, row).copy_from(weight);
            let col = CONTROL_DIM * (k - 1);
            r_bar.fixed_view_mut::<3, 3>(col, col).copy_from(&weights.effort);
        }

        let hessian = (gamma.transpose() * &q_bar * &gamma + r_bar) * 2.0;

        let mut constraints = DMatrix::zeros(nx + nu, nu);
        constraints.view_mut((0, 0), (nx, nu)).copy_from(&gamma);
        constraints
            .view_mut((nx, 0), (nu, nu))
            .copy_from(&DMatrix::identity(nu, nu));

        let ws = &plant.workspace;
        let vmax = plant.limits.max_speed;
        let stage_min = [ws.min.x, ws.min.y, ws.min.z, -vmax, -vmax, -vmax];
        let stage_max = [ws.max.x, ws.max.y, ws.max.z, vmax, vmax, vmax];
        let state_min = DVector::from_fn(nx, |i, _| stage_min[i % STATE_DIM]);
        let state_max = DVector::from_fn(nx, |i, _| stage_max[i % STATE_DIM]);

        Self {
            horizon,
            phi,
            gamma,
            q_bar,
            hessian,
            constraints,
            state_min,
            state_max,
            max_acceleration: plant.limits.max_acceleration,
        }
    }

    /// Builds the QP for initial state `x0` and target `xt`.
    fn problem(&self, x0: &State, target: &State) -> Result<QpProblem> {
        let nx = STATE_DIM * self.horizon;
        let nu = CONTROL_DIM * self.horizon;

        let free = &self.phi * x0.to_vector();
        let target = target.to_vector();
        let reference = DVector::from_fn(nx, |i, _| target[i % STATE_DIM]);
        let linear = self.gamma.transpose() * &self.q_bar * (&free - reference) * 2.0;

        let amax = self.max_acceleration;
        let mut lower = DVector::from_element(nx + nu, -amax);
        let mut upper = DVector::from_element(nx + nu, amax);
        lower.rows_mut(0, nx).copy_from(&(&self.state_min - &free));
        upper.rows_mut(0, nx).copy_from(&(&self.state_max - &free));

        QpProblem::new(
            self.hessian.clone(),
            linear,
            self.constraints.clone(),
            lower,
            upper,
        )
    }
}

/// Convex horizon optimizer over the shared plant.
///
/// # Example
///
/// ```
/// use control_optimize::{ConvexConfig, ConvexHorizonSolver};
/// use control_types::{CostWeights, MotionLimits, Plant, State, Workspace};
/// use nalgebra::Point3;
///
/// let plant = Plant::new(0.1, MotionLimits::new(1.0, 0.5), Workspace::cube(-1.0, 2.0))?;
/// let solver = ConvexHorizonSolver::new(plant, CostWeights::default(), ConvexConfig::default())?;
///
/// let outcome = solver.solve_horizon(
///     &State::at_rest(Point3::origin()),
///     &State::at_rest(Point3::new(1.0, 0.0, 0.0)),
/// );
/// assert!(outcome.status.is_acceptable());
/// assert!(outcome.control.acceleration.x > 0.0);
/// # Ok::<(), control_types::ControlError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ConvexHorizonSolver {
    plant: Plant,
    config: ConvexConfig,
    condensed: CondensedHorizon,
    solver: QpSolver,
}

impl ConvexHorizonSolver {
    /// Creates the solver and precomputes the condensed matrices.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] if the weights or the
    /// configuration are invalid.
    pub fn new(plant: Plant, weights: CostWeights, config: ConvexConfig) -> Result<Self> {
        weights.validate()?;
        config.validate()?;
        Ok(Self {
            condensed: CondensedHorizon::new(&plant, &weights, config.horizon),
            solver: QpSolver::new(config.qp),
            plant,
            config,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ConvexConfig {
        &self.config
    }

    /// Plans from `state` toward `target`.
    ///
    /// `Solved` and `SolvedInaccurate` QP results are accepted; any other
    /// status yields the zero control together with that status. Identical
    /// inputs produce identical outputs.
    #[must_use]
    pub fn solve_horizon(&self, state: &State, target: &State) -> SolveOutcome {
        let problem = match self.condensed.problem(state, target) {
            Ok(problem) => problem,
            Err(error) => {
                warn!(%error, "Convex horizon problem rejected");
                return SolveOutcome::failed(QpStatus::SetupFailed, 0);
            }
        };

        let solution = self.solver.solve(&problem);
        let status = match solution.status {
            QpStatus::Solved => SolveStatus::Optimal,
            QpStatus::SolvedInaccurate => SolveStatus::Inaccurate,
            other => {
                debug!(status = %other, iterations = solution.iterations, "Convex solve failed");
                return SolveOutcome::failed(other, solution.iterations);
            }
        };

        let limit = self.plant.limits.max_acceleration;
        let controls: Vec<Control> = solution
            .x
            .as_slice()
            .chunks_exact(CONTROL_DIM)
            .map(|u| Control::new(u[0], u[1], u[2]).clamped(limit))
            .collect();
        let states = self.plant.dynamics.rollout(state, &controls);
        let plan = HorizonPlan { controls, states };

        debug!(
            iterations = solution.iterations,
            objective = solution.objective,
            %status,
            "Convex solve finished"
        );

        SolveOutcome {
            control: plan.first_control(),
            plan,
            cost: solution.objective,
            status,
            iterations: solution.iterations,
        }
    }
}

impl HorizonSolver for ConvexHorizonSolver {
    fn regime(&self) -> Regime {
        Regime::Convex
    }

    fn horizon(&self) -> usize {
        self.config.horizon
    }

    fn solve(&mut self, problem: &HorizonProblem) -> SolveOutcome {
        self.solve_horizon(&problem.state, &problem.target)
    }
}
