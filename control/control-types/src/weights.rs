//! Quadratic cost weights for horizon optimization.
//!
//! The tracking objective is
//!
//! ```text
//! Σ_{k<N} (x_k − x_t)ᵀ Q (x_k − x_t) + u_kᵀ R u_k  +  (x_N − x_t)ᵀ Qf (x_N − x_t)
//! ```
//!
//! with `Q` the stage weight, `R` the control-effort weight and `Qf` the
//! terminal weight.

use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};

use crate::error::{ControlError, Result};

/// Stage, effort and terminal weight matrices.
///
/// # Example
///
/// ```
/// use control_types::CostWeights;
///
/// let weights = CostWeights::diagonal(10.0, 1.0, 0.1, 10.0);
/// assert!(weights.validate().is_ok());
/// assert_eq!(weights.stage[(0, 0)], 10.0);
/// assert_eq!(weights.stage[(3, 3)], 1.0);
/// assert_eq!(weights.terminal[(0, 0)], 100.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CostWeights {
    /// Stage state weight `Q` (6×6, positive semidefinite).
    pub stage: Matrix6<f64>,
    /// Control effort weight `R` (3×3, positive definite).
    pub effort: Matrix3<f64>,
    /// Terminal state weight `Qf` (6×6, positive semidefinite).
    pub terminal: Matrix6<f64>,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self::diagonal(10.0, 1.0, 0.1, 10.0)
    }
}

impl CostWeights {
    /// Builds diagonal weights.
    ///
    /// `Q = diag(position × 3, velocity × 3)`, `R = effort · I`,
    /// `Qf = terminal_scale · Q`.
    #[must_use]
    pub fn diagonal(position: f64, velocity: f64, effort: f64, terminal_scale: f64) -> Self {
        let stage = Matrix6::from_diagonal(&Vector6::new(
            position, position, position, velocity, velocity, velocity,
        ));
        Self {
            stage,
            effort: Matrix3::from_diagonal(&Vector3::repeat(effort)),
            terminal: stage * terminal_scale,
        }
    }

    /// Stage tracking cost `eᵀ Q e` for a state error `e`.
    #[must_use]
    pub fn stage_cost(&self, error: &Vector6<f64>) -> f64 {
        error.dot(&(self.stage * error))
    }

    /// Terminal tracking cost `eᵀ Qf e`.
    #[must_use]
    pub fn terminal_cost(&self, error: &Vector6<f64>) -> f64 {
        error.dot(&(self.terminal * error))
    }

    /// Effort cost `uᵀ R u`.
    #[must_use]
    pub fn effort_cost(&self, u: &Vector3<f64>) -> f64 {
        u.dot(&(self.effort * u))
    }

    /// Validates symmetry and definiteness.
    ///
    /// `Q` and `Qf` must be symmetric positive semidefinite and `R` symmetric
    /// positive definite, so the condensed horizon QP is strictly convex.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] naming the offending matrix.
    pub fn validate(&self) -> Result<()> {
        check_psd("stage weight Q", &self.stage)?;
        check_psd("terminal weight Qf", &self.terminal)?;

        if (self.effort - self.effort.transpose()).amax() > SYMMETRY_TOLERANCE {
            return Err(ControlError::invalid_config(
                "effort weight R must be symmetric",
            ));
        }
        if self.effort.cholesky().is_none() {
            return Err(ControlError::invalid_config(
                "effort weight R must be positive definite",
            ));
        }
        Ok(())
    }
}

const SYMMETRY_TOLERANCE: f64 = 1e-9;

fn check_psd(name: &str, m: &Matrix6<f64>) -> Result<()> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(ControlError::invalid_config(format!(
            "{name} must be finite"
        )));
    }
    if (m - m.transpose()).amax() > SYMMETRY_TOLERANCE {
        return Err(ControlError::invalid_config(format!(
            "{name} must be symmetric"
        )));
    }
    let eigen = m.symmetric_eigenvalues();
    if eigen.min() < -SYMMETRY_TOLERANCE {
        return Err(ControlError::invalid_config(format!(
            "{name} must be positive semidefinite"
        )));
    }
    Ok(())
}
