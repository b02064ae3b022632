//! Second-order control barrier function (CBF) safety filter.
//!
//! With relative position `r = p − p_o`, relative velocity `w = v − v_o` and
//! inflated radius `R = r_o + δ`, the barrier is
//!
//! ```text
//! h = ‖r‖² − R²,   ḣ = 2 r·w,   ḧ = 2 ‖w‖² + 2 r·u
//! ```
//!
//! (the obstacle is taken to move at constant velocity). Requiring
//! `ψ̇ + α₂ ψ ≥ 0` for `ψ = ḣ + α₁ h` gives one linear constraint on the
//! acceleration:
//!
//! ```text
//! 2 r·u ≥ −2 ‖w‖² − (α₁ + α₂) ḣ − α₁ α₂ h
//! ```
//!
//! The filter returns the control closest to the nominal one that satisfies
//! this constraint and the actuator box.
//!
//! # Sampled application
//!
//! The condition above is a continuous-time one, but the loop holds each
//! control for a whole step `dt`. Between two checks the separation can
//! shrink by up to the one-step travel
//!
//! ```text
//! ‖w‖ dt + ½ √3 a_max dt²
//! ```
//!
//! so a filter evaluated with the bare separation `δ` can end a step inside
//! `δ`. [`BarrierFilter::sampled_delta`] inflates `δ` by that travel and is
//! what the control loop passes to [`BarrierFilter::filter_control`].

use control_types::{Control, ControlError, MotionLimits, ObstacleObservation, Result, State};
use nalgebra::{DMatrix, DVector, Vector3};
use tracing::{debug, warn};

use crate::qp::{QP_INFINITY, QpProblem, QpSettings, QpSolver, QpStatus};

const SATISFACTION_TOLERANCE: f64 = 1e-9;

/// Filter gains and solver settings.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BarrierConfig {
    /// Gain α₁ on `h`.
    pub alpha1: f64,
    /// Gain α₂ on `ψ`.
    pub alpha2: f64,
    /// Settings of the projection QP.
    pub qp: QpSettings,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            alpha1: 2.0,
            alpha2: 2.0,
            qp: QpSettings::default().with_tolerance(1e-6, 1e-6).with_polish(true),
        }
    }
}

impl BarrierConfig {
    /// Sets both gains.
    #[must_use]
    pub const fn with_gains(mut self, alpha1: f64, alpha2: f64) -> Self {
        self.alpha1 = alpha1;
        self.alpha2 = alpha2;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] for non-positive gains or
    /// invalid QP settings.
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha1 > 0.0 && self.alpha2 > 0.0) {
            return Err(ControlError::invalid_config(
                "barrier gains must be positive",
            ));
        }
        self.qp.validate()
    }
}

/// The linear constraint `normalᵀ u ≥ bound` derived from the barrier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarrierConstraint {
    /// Constraint normal `2 (p − p_o)`.
    pub normal: Vector3<f64>,
    /// Right-hand side.
    pub bound: f64,
    /// Barrier value `h`.
    pub h: f64,
}

impl BarrierConstraint {
    /// Derives the constraint for one state/obstacle pair.
    #[must_use]
    pub fn new(
        state: &State,
        obstacle: &ObstacleObservation,
        delta: f64,
        alpha1: f64,
        alpha2: f64,
    ) -> Self {
        let r = state.position - obstacle.center;
        let w = state.velocity - obstacle.velocity;
        let radius = obstacle.radius + delta;

        let h = r.norm_squared() - radius * radius;
        let h_dot = 2.0 * r.dot(&w);

        Self {
            normal: 2.0 * r,
            bound: -2.0 * w.norm_squared() - (alpha1 + alpha2) * h_dot - alpha1 * alpha2 * h,
            h,
        }
    }

    /// Returns `true` if `control` satisfies the constraint.
    #[must_use]
    pub fn is_satisfied(&self, control: &Control) -> bool {
        self.slack(control) >= -SATISFACTION_TOLERANCE
    }

    /// `normalᵀ u − bound`; negative when violated.
    #[must_use]
    pub fn slack(&self, control: &Control) -> f64 {
        self.normal.dot(&control.acceleration) - self.bound
    }
}

/// Result of filtering one control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOutcome {
    /// Control to apply.
    pub control: Control,
    /// Whether the nominal control was modified.
    pub corrected: bool,
    /// Barrier value `h` (negative inside the inflated obstacle).
    pub barrier: f64,
    /// Projection QP status, if a projection was needed.
    pub status: Option<QpStatus>,
}

/// Barrier-function safety filter.
///
/// # Example
///
/// ```
/// use control_optimize::{BarrierConfig, BarrierFilter};
/// use control_types::{Control, MotionLimits, ObstacleObservation, State};
/// use nalgebra::{Point3, Vector3};
///
/// let filter = BarrierFilter::new(MotionLimits::new(1.0, 0.5), BarrierConfig::default())?;
/// let obstacle = ObstacleObservation::point(Point3::new(1.0, 0.0, 0.0));
///
/// // Far away and at rest: the nominal control passes through.
/// let state = State::at_rest(Point3::new(-3.0, 0.0, 0.0));
/// let nominal = Control::new(0.5, 0.0, 0.0);
/// let outcome = filter.filter_control(&state, &nominal, &obstacle, 0.1);
/// assert!(!outcome.corrected);
/// assert_eq!(outcome.control, nominal);
/// # Ok::<(), control_types::ControlError>(())
/// ```
#[derive(Debug, Clone)]
pub struct BarrierFilter {
    limits: MotionLimits,
    config: BarrierConfig,
    solver: QpSolver,
}

impl BarrierFilter {
    /// Creates the filter.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] for invalid limits or gains.
    pub fn new(limits: MotionLimits, config: BarrierConfig) -> Result<Self> {
        limits.validate()?;
        config.validate()?;
        Ok(Self {
            limits,
            config,
            solver: QpSolver::new(config.qp),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &BarrierConfig {
        &self.config
    }

    /// Separation to enforce when controls are held for `dt`: `delta` plus
    /// the distance the agent can close on the obstacle within one step.
    #[must_use]
    pub fn sampled_delta(
        &self,
        state: &State,
        obstacle: &ObstacleObservation,
        delta: f64,
        dt: f64,
    ) -> f64 {
        let closing_speed = (state.velocity - obstacle.velocity).norm();
        let max_accel = 3.0_f64.sqrt() * self.limits.max_acceleration;
        delta + closing_speed * dt + 0.5 * max_accel * dt * dt
    }

    /// Projects `nominal` onto the safe set for separation `delta`.
    ///
    /// A nominal control that already satisfies the barrier and the actuator
    /// box is returned unchanged. If the projection QP does not reach an
    /// optimal status the nominal control is returned (fail open).
    #[must_use]
    pub fn filter_control(
        &self,
        state: &State,
        nominal: &Control,
        obstacle: &ObstacleObservation,
        delta: f64,
    ) -> FilterOutcome {
        let constraint =
            BarrierConstraint::new(state, obstacle, delta, self.config.alpha1, self.config.alpha2);
        let limit = self.limits.max_acceleration;

        if constraint.is_satisfied(nominal) && nominal.within(limit) {
            return FilterOutcome {
                control: *nominal,
                corrected: false,
                barrier: constraint.h,
                status: None,
            };
        }

        let solution = match self.projection(&constraint, nominal) {
            Ok(problem) => self.solver.solve(&problem),
            Err(error) => {
                warn!(%error, "Barrier projection rejected, passing nominal control");
                return FilterOutcome {
                    control: *nominal,
                    corrected: false,
                    barrier: constraint.h,
                    status: None,
                };
            }
        };

        if !solution.status.is_optimal() {
            warn!(
                status = %solution.status,
                h = constraint.h,
                "Barrier projection failed, passing nominal control"
            );
            return FilterOutcome {
                control: *nominal,
                corrected: false,
                barrier: constraint.h,
                status: Some(solution.status),
            };
        }

        let control =
            Control::new(solution.x[0], solution.x[1], solution.x[2]).clamped(limit);
        debug!(
            h = constraint.h,
            slack = constraint.slack(&control),
            iterations = solution.iterations,
            "Barrier correction applied"
        );

        FilterOutcome {
            control,
            corrected: true,
            barrier: constraint.h,
            status: Some(solution.status),
        }
    }

    /// `min ‖u − u_nom‖²` subject to the barrier row and the box rows.
    fn projection(&self, constraint: &BarrierConstraint, nominal: &Control) -> Result<QpProblem> {
        let limit = self.limits.max_acceleration;
        let n = constraint.normal;

        let p = DMatrix::identity(3, 3) * 2.0;
        let q = DVector::from_iterator(3, nominal.acceleration.iter().map(|u| -2.0 * u));
        #[rustfmt::skip]
        let a = DMatrix::from_row_slice(4, 3, &[
            n.x, n.y, n.z,
            1.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
        ]);
        let l = DVector::from_vec(vec![constraint.bound, -limit, -limit, -limit]);
        let u = DVector::from_vec(vec![QP_INFINITY, limit, limit, limit]);

        QpProblem::new(p, q, a, l, u)
    }
}
