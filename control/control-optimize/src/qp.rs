//! Convex quadratic programs solved with OSQP.
//!
//! Solves problems of the form
//!
//! ```text
//! minimize    ½ xᵀ P x + qᵀ x
//! subject to  l ≤ A x ≤ u
//! ```
//!
//! with `P` symmetric positive semidefinite. Problems are assembled densely
//! with nalgebra and handed to [`osqp`] in compressed sparse column form,
//! keeping only the upper triangle of `P`.
//!
//! # Example
//!
//! ```
//! use control_optimize::qp::{QpProblem, QpSettings, QpSolver, QpStatus};
//! use nalgebra::{DMatrix, DVector};
//!
//! let p = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 2.0]);
//! let q = DVector::from_vec(vec![1.0, 1.0]);
//! let a = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 1.0, 0.0, 0.0, 1.0]);
//! let l = DVector::from_vec(vec![1.0, 0.0, 0.0]);
//! let u = DVector::from_vec(vec![1.0, 0.7, 0.7]);
//!
//! let problem = QpProblem::new(p, q, a, l, u)?;
//! let solution = QpSolver::new(QpSettings::high_accuracy()).solve(&problem);
//!
//! assert!(solution.status.is_optimal());
//! assert!((solution.x[0] - 0.3).abs() < 1e-3);
//! assert!((solution.x[1] - 0.7).abs() < 1e-3);
//! # Ok::<(), control_types::ControlError>(())
//! ```

use std::borrow::Cow;
use std::fmt;

use control_types::{ControlError, Result};
use nalgebra::{DMatrix, DVector};
use osqp::{CscMatrix, Problem, Settings, Status};
use tracing::debug;

/// Bound value treated as "no bound" (OSQP's own infinity).
pub const QP_INFINITY: f64 = 1e30;

/// Values below this magnitude are left out of the sparse matrices.
const SPARSITY_THRESHOLD: f64 = 1e-14;

/// Solver settings, mapped onto [`osqp::Settings`] for each solve.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QpSettings {
    /// Maximum number of OSQP iterations.
    pub max_iterations: u32,

    /// Absolute convergence tolerance.
    pub eps_abs: f64,

    /// Relative convergence tolerance.
    pub eps_rel: f64,

    /// Run OSQP's solution polishing step.
    pub polish: bool,
}

impl Default for QpSettings {
    fn default() -> Self {
        Self {
            max_iterations: 4000,
            eps_abs: 1e-5,
            eps_rel: 1e-5,
            polish: false,
        }
    }
}

impl QpSettings {
    /// Tight tolerances with polishing for offline analysis.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            max_iterations: 20_000,
            eps_abs: 1e-8,
            eps_rel: 1e-8,
            polish: true,
        }
    }

    /// Loose tolerances and a small iteration budget for fast control loops.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            max_iterations: 500,
            eps_abs: 1e-4,
            eps_rel: 1e-4,
            ..Self::default()
        }
    }

    /// Sets the iteration budget.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets both convergence tolerances.
    #[must_use]
    pub const fn with_tolerance(mut self, eps_abs: f64, eps_rel: f64) -> Self {
        self.eps_abs = eps_abs;
        self.eps_rel = eps_rel;
        self
    }

    /// Enables or disables polishing.
    #[must_use]
    pub const fn with_polish(mut self, polish: bool) -> Self {
        self.polish = polish;
        self
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(ControlError::invalid_config(
                "QP max_iterations must be positive",
            ));
        }
        if !(self.eps_abs >= 0.0 && self.eps_rel >= 0.0 && self.eps_abs + self.eps_rel > 0.0) {
            return Err(ControlError::invalid_config(
                "QP tolerances must be non-negative and not both zero",
            ));
        }
        Ok(())
    }

    fn to_osqp(self) -> Settings {
        Settings::default()
            .verbose(false)
            .max_iter(self.max_iterations)
            .eps_abs(self.eps_abs)
            .eps_rel(self.eps_rel)
            .polish(self.polish)
    }
}

/// Quadratic program data.
#[derive(Debug, Clone)]
pub struct QpProblem {
    p: DMatrix<f64>,
    q: DVector<f64>,
    a: DMatrix<f64>,
    l: DVector<f64>,
    u: DVector<f64>,
}

impl QpProblem {
    /// Creates a problem after checking shapes and bounds.
    ///
    /// Bounds beyond [`QP_INFINITY`] in magnitude, including `±∞`, are
    /// clamped to it.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::DimensionMismatch`] for inconsistent shapes
    /// and [`ControlError::InvalidConfig`] for a non-symmetric `P`, NaN data
    /// or a lower bound above its upper bound.
    pub fn new(
        p: DMatrix<f64>,
        q: DVector<f64>,
        a: DMatrix<f64>,
        l: DVector<f64>,
        u: DVector<f64>,
    ) -> Result<Self> {
        let n = q.len();
        let m = l.len();

        check_dim("P rows", n, p.nrows())?;
        check_dim("P columns", n, p.ncols())?;
        check_dim("A columns", n, a.ncols())?;
        check_dim("A rows", m, a.nrows())?;
        check_dim("upper bound", m, u.len())?;

        if p.iter().chain(q.iter()).chain(a.iter()).any(|v| !v.is_finite()) {
            return Err(ControlError::invalid_config(
                "QP matrices must be finite",
            ));
        }
        if (&p - p.transpose()).amax() > 1e-9 * (1.0 + p.amax()) {
            return Err(ControlError::invalid_config("QP matrix P must be symmetric"));
        }
        if l.iter().zip(u.iter()).any(|(lo, hi)| lo.is_nan() || hi.is_nan() || lo > hi) {
            return Err(ControlError::invalid_config(
                "QP bounds must satisfy l <= u",
            ));
        }

        let l = l.map(|v| v.clamp(-QP_INFINITY, QP_INFINITY));
        let u = u.map(|v| v.clamp(-QP_INFINITY, QP_INFINITY));
        Ok(Self { p, q, a, l, u })
    }

    /// Number of decision variables.
    #[must_use]
    pub fn num_variables(&self) -> usize {
        self.q.len()
    }

    /// Number of constraint rows.
    #[must_use]
    pub fn num_constraints(&self) -> usize {
        self.l.len()
    }

    /// Objective value `½ xᵀ P x + qᵀ x`.
    #[must_use]
    pub fn objective(&self, x: &DVector<f64>) -> f64 {
        0.5 * x.dot(&(&self.p * x)) + self.q.dot(x)
    }
}

fn check_dim(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ControlError::DimensionMismatch {
            what,
            expected,
            actual,
        })
    }
}

/// Dense column-major matrix to CSC, optionally keeping only the upper
/// triangle.
fn to_csc(matrix: &DMatrix<f64>, upper_only: bool) -> CscMatrix<'static> {
    let mut indptr = Vec::with_capacity(matrix.ncols() + 1);
    let mut indices = Vec::new();
    let mut data = Vec::new();

    indptr.push(0);
    for col in 0..matrix.ncols() {
        let rows = if upper_only { col + 1 } else { matrix.nrows() };
        for row in 0..rows {
            let value = matrix[(row, col)];
            if value.abs() > SPARSITY_THRESHOLD {
                indices.push(row);
                data.push(value);
            }
        }
        indptr.push(indices.len());
    }

    CscMatrix {
        nrows: matrix.nrows(),
        ncols: matrix.ncols(),
        indptr: Cow::Owned(indptr),
        indices: Cow::Owned(indices),
        data: Cow::Owned(data),
    }
}

/// Termination status of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QpStatus {
    /// Residuals met the tolerances.
    Solved,
    /// Residuals met relaxed tolerances only.
    SolvedInaccurate,
    /// Iteration budget exhausted.
    MaxIterationsReached,
    /// Time budget exhausted.
    TimeLimitReached,
    /// A primal infeasibility certificate was found.
    PrimalInfeasible,
    /// A dual infeasibility certificate was found (unbounded objective).
    DualInfeasible,
    /// `P` is not positive semidefinite.
    NonConvex,
    /// OSQP rejected the problem during setup, a non-convex `P` included.
    SetupFailed,
    /// Any other termination, such as an inaccurate certificate.
    Unsolved,
}

impl QpStatus {
    /// Returns `true` for `Solved` and `SolvedInaccurate`.
    #[must_use]
    pub const fn is_optimal(self) -> bool {
        matches!(self, Self::Solved | Self::SolvedInaccurate)
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Solved => "solved",
            Self::SolvedInaccurate => "solved inaccurate",
            Self::MaxIterationsReached => "maximum iterations reached",
            Self::TimeLimitReached => "time limit reached",
            Self::PrimalInfeasible => "primal infeasible",
            Self::DualInfeasible => "dual infeasible",
            Self::NonConvex => "non-convex",
            Self::SetupFailed => "setup failed",
            Self::Unsolved => "unsolved",
        }
    }
}

impl fmt::Display for QpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a solve.
#[derive(Debug, Clone)]
pub struct QpSolution {
    /// Primal solution, zero when the status carries no iterate.
    pub x: DVector<f64>,
    /// Termination status.
    pub status: QpStatus,
    /// Iterations reported by OSQP.
    pub iterations: usize,
    /// Objective value at `x`, infinite when there is no iterate.
    pub objective: f64,
}

impl QpSolution {
    fn failed(n: usize, status: QpStatus, iterations: usize) -> Self {
        Self {
            x: DVector::zeros(n),
            status,
            iterations,
            objective: f64::INFINITY,
        }
    }
}

/// OSQP-backed quadratic program solver.
#[derive(Debug, Clone, Default)]
pub struct QpSolver {
    settings: QpSettings,
}

impl QpSolver {
    /// Creates a solver with the given settings.
    #[must_use]
    pub const fn new(settings: QpSettings) -> Self {
        Self { settings }
    }

    /// Returns the settings.
    #[must_use]
    pub const fn settings(&self) -> &QpSettings {
        &self.settings
    }

    /// Sets up a fresh OSQP workspace and solves the problem.
    ///
    /// The solve is deterministic: identical problems produce identical
    /// solutions.
    #[must_use]
    pub fn solve(&self, problem: &QpProblem) -> QpSolution {
        let n = problem.num_variables();
        let p = to_csc(&problem.p, true);
        let a = to_csc(&problem.a, false);
        let settings = self.settings.to_osqp();

        let mut osqp_problem = match Problem::new(
            p,
            problem.q.as_slice(),
            a,
            problem.l.as_slice(),
            problem.u.as_slice(),
            &settings,
        ) {
            Ok(osqp_problem) => osqp_problem,
            Err(error) => {
                debug!(?error, n, "OSQP setup failed");
                return QpSolution::failed(n, QpStatus::SetupFailed, 0);
            }
        };

        let result = osqp_problem.solve();
        let iterations = result.iter() as usize;
        let (status, x) = match result {
            Status::Solved(solution) => (
                QpStatus::Solved,
                Some(DVector::from_column_slice(solution.x())),
            ),
            Status::SolvedInaccurate(solution) => (
                QpStatus::SolvedInaccurate,
                Some(DVector::from_column_slice(solution.x())),
            ),
            Status::MaxIterationsReached(_) => (QpStatus::MaxIterationsReached, None),
            Status::TimeLimitReached(_) => (QpStatus::TimeLimitReached, None),
            Status::PrimalInfeasible(_) => (QpStatus::PrimalInfeasible, None),
            Status::DualInfeasible(_) => (QpStatus::DualInfeasible, None),
            Status::NonConvex(_) => (QpStatus::NonConvex, None),
            _ => (QpStatus::Unsolved, None),
        };

        let Some(x) = x else {
            debug!(n, iterations, %status, "QP not solved");
            return QpSolution::failed(n, status, iterations);
        };

        let objective = problem.objective(&x);
        debug!(n, iterations, %status, objective, "QP solved");
        QpSolution {
            x,
            status,
            iterations,
            objective,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reference_problem() -> QpProblem {
        QpProblem::new(
            DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 2.0]),
            DVector::from_vec(vec![1.0, 1.0]),
            DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 1.0, 0.0, 0.0, 1.0]),
            DVector::from_vec(vec![1.0, 0.0, 0.0]),
            DVector::from_vec(vec![1.0, 0.7, 0.7]),
        )
        .unwrap()
    }

    #[test]
    fn test_reference_problem() {
        let solution = QpSolver::new(QpSettings::high_accuracy()).solve(&reference_problem());
        assert!(solution.status.is_optimal());
        assert_relative_eq!(solution.x[0], 0.3, epsilon = 1e-3);
        assert_relative_eq!(solution.x[1], 0.7, epsilon = 1e-3);
        assert_relative_eq!(solution.objective, 1.88, epsilon = 1e-2);
    }

    #[test]
    fn test_deterministic() {
        let problem = reference_problem();
        let solver = QpSolver::default();
        let a = solver.solve(&problem);
        let b = solver.solve(&problem);
        assert_eq!(a.x, b.x);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn test_box_constrained_minimum_on_boundary() {
        // min (x - 3)^2 s.t. -1 <= x <= 1
        let problem = QpProblem::new(
            DMatrix::from_element(1, 1, 2.0),
            DVector::from_element(1, -6.0),
            DMatrix::from_element(1, 1, 1.0),
            DVector::from_element(1, -1.0),
            DVector::from_element(1, 1.0),
        )
        .unwrap();
        let solution = QpSolver::default().solve(&problem);
        assert!(solution.status.is_optimal());
        assert_relative_eq!(solution.x[0], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_infeasible_problem_is_not_optimal() {
        // x >= 2 and x <= 1
        let problem = QpProblem::new(
            DMatrix::from_element(1, 1, 1.0),
            DVector::zeros(1),
            DMatrix::from_row_slice(2, 1, &[1.0, 1.0]),
            DVector::from_vec(vec![2.0, f64::NEG_INFINITY]),
            DVector::from_vec(vec![f64::INFINITY, 1.0]),
        )
        .unwrap();
        let solution = QpSolver::default().solve(&problem);
        assert!(!solution.status.is_optimal());
        assert!(solution.objective.is_infinite());
        assert_eq!(solution.x, DVector::zeros(1));
    }

    #[test]
    fn test_non_convex_is_not_optimal() {
        let problem = QpProblem::new(
            DMatrix::from_element(1, 1, -10.0),
            DVector::zeros(1),
            DMatrix::from_element(1, 1, 1.0),
            DVector::from_element(1, -1.0),
            DVector::from_element(1, 1.0),
        )
        .unwrap();
        let solution = QpSolver::default().solve(&problem);
        assert!(!solution.status.is_optimal());
    }

    #[test]
    fn test_infinite_bounds_clamped() {
        let problem = QpProblem::new(
            DMatrix::identity(1, 1),
            DVector::zeros(1),
            DMatrix::identity(1, 1),
            DVector::from_element(1, f64::NEG_INFINITY),
            DVector::from_element(1, f64::INFINITY),
        )
        .unwrap();
        assert_eq!(problem.l[0], -QP_INFINITY);
        assert_eq!(problem.u[0], QP_INFINITY);
    }

    #[test]
    fn test_upper_triangle_csc() {
        let p = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 2.0]);
        let csc = to_csc(&p, true);
        assert_eq!(csc.indptr.as_ref(), &[0, 1, 3]);
        assert_eq!(csc.indices.as_ref(), &[0, 0, 1]);
        assert_eq!(csc.data.as_ref(), &[4.0, 1.0, 2.0]);

        let a = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 1.0, 0.0, 0.0, 1.0]);
        let csc = to_csc(&a, false);
        assert_eq!(csc.indptr.as_ref(), &[0, 2, 4]);
        assert_eq!(csc.indices.as_ref(), &[0, 1, 0, 2]);
    }

    #[test]
    fn test_shape_validation() {
        let err = QpProblem::new(
            DMatrix::identity(2, 2),
            DVector::zeros(3),
            DMatrix::zeros(1, 3),
            DVector::zeros(1),
            DVector::zeros(1),
        )
        .unwrap_err();
        assert!(matches!(err, ControlError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_bound_order_validation() {
        let err = QpProblem::new(
            DMatrix::identity(1, 1),
            DVector::zeros(1),
            DMatrix::identity(1, 1),
            DVector::from_element(1, 1.0),
            DVector::from_element(1, 0.0),
        )
        .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_settings_validation() {
        assert!(QpSettings::default().validate().is_ok());
        assert!(QpSettings::realtime().validate().is_ok());
        assert!(QpSettings::high_accuracy().validate().is_ok());
        assert!(QpSettings::default().with_max_iterations(0).validate().is_err());
        assert!(QpSettings::default().with_tolerance(0.0, 0.0).validate().is_err());
    }
}
