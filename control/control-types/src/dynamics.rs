//! Discrete-time double-integrator dynamics.
//!
//! The state transition is `x' = A x + B u` with
//!
//! ```text
//!     ┌ I  dt·I ┐        ┌   0  ┐
//! A = │         │,   B = │      │
//!     └ 0    I  ┘        └ dt·I ┘
//! ```
//!
//! so position advances by `velocity · dt` and velocity by `control · dt`.
//!
//! The same [`DoubleIntegrator`] value must be used for predictions inside
//! every optimizer and for propagating the real state, otherwise the plans
//! drift from what actually happens.

use nalgebra::{Matrix3, Matrix6, Matrix6x3, Vector6};

use crate::error::{ControlError, Result};
use crate::state::{Control, State};

/// State dimension.
pub const STATE_DIM: usize = 6;

/// Control dimension.
pub const CONTROL_DIM: usize = 3;

/// Discrete-time double integrator with fixed timestep.
///
/// # Example
///
/// ```
/// use control_types::{Control, DoubleIntegrator, State};
/// use nalgebra::{Point3, Vector3};
///
/// let model = DoubleIntegrator::new(0.1).unwrap();
/// let state = State::new(Point3::origin(), Vector3::new(1.0, 0.0, 0.0));
/// let next = model.propagate(&state, &Control::new(0.0, 2.0, 0.0));
///
/// assert!((next.position.x - 0.1).abs() < 1e-12);
/// assert!((next.velocity.y - 0.2).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DoubleIntegrator {
    dt: f64,
    a: Matrix6<f64>,
    b: Matrix6x3<f64>,
}

impl DoubleIntegrator {
    /// Creates the model for timestep `dt`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] if `dt` is not a positive
    /// finite number.
    pub fn new(dt: f64) -> Result<Self> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ControlError::invalid_config(format!(
                "dt must be positive and finite, got {dt}"
            )));
        }

        let mut a = Matrix6::identity();
        a.fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&(Matrix3::identity() * dt));

        let mut b = Matrix6x3::zeros();
        b.fixed_view_mut::<3, 3>(3, 0)
            .copy_from(&(Matrix3::identity() * dt));

        Ok(Self { dt, a, b })
    }

    /// Timestep in seconds.
    #[must_use]
    pub const fn dt(&self) -> f64 {
        self.dt
    }

    /// State transition matrix `A`.
    #[must_use]
    pub const fn a(&self) -> &Matrix6<f64> {
        &self.a
    }

    /// Input matrix `B`.
    #[must_use]
    pub const fn b(&self) -> &Matrix6x3<f64> {
        &self.b
    }

    /// Both transition matrices, `(A, B)`.
    #[must_use]
    pub const fn matrices(&self) -> (&Matrix6<f64>, &Matrix6x3<f64>) {
        (&self.a, &self.b)
    }

    /// Applies `x' = A x + B u` to a stacked state vector.
    #[must_use]
    pub fn step_vector(&self, x: &Vector6<f64>, control: &Control) -> Vector6<f64> {
        self.a * x + self.b * control.acceleration
    }

    /// Propagates a state by one tick.
    #[must_use]
    pub fn propagate(&self, state: &State, control: &Control) -> State {
        State::from_vector(&self.step_vector(&state.to_vector(), control))
    }

    /// Propagates a state through a control sequence.
    ///
    /// Returns the `controls.len()` successor states (the initial state is
    /// not included).
    #[must_use]
    pub fn rollout(&self, initial: &State, controls: &[Control]) -> Vec<State> {
        let mut state = *initial;
        controls
            .iter()
            .map(|u| {
                state = self.propagate(&state, u);
                state
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    #[test]
    fn test_rejects_bad_dt() {
        assert!(DoubleIntegrator::new(0.0).is_err());
        assert!(DoubleIntegrator::new(-0.1).is_err());
        assert!(DoubleIntegrator::new(f64::NAN).is_err());
    }

    #[test]
    fn test_matrices() {
        let model = DoubleIntegrator::new(0.2).unwrap();
        assert_relative_eq!(model.a()[(0, 3)], 0.2);
        assert_relative_eq!(model.a()[(3, 3)], 1.0);
        assert_relative_eq!(model.a()[(3, 0)], 0.0);
        assert_relative_eq!(model.b()[(3, 0)], 0.2);
        assert_relative_eq!(model.b()[(0, 0)], 0.0);
    }

    #[test]
    fn test_rest_with_zero_control_stays_put() {
        let model = DoubleIntegrator::new(0.1).unwrap();
        let state = State::at_rest(Point3::new(0.3, -0.2, 1.0));
        let next = model.propagate(&state, &Control::zero());
        assert_eq!(next, state);
    }

    #[test]
    fn test_control_does_not_move_position_in_one_step() {
        let model = DoubleIntegrator::new(0.1).unwrap();
        let state = State::at_rest(Point3::origin());
        let next = model.propagate(&state, &Control::new(5.0, 5.0, 5.0));
        assert_relative_eq!(next.position, Point3::origin());
        assert_relative_eq!(next.velocity, Vector3::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn test_constant_velocity_drift() {
        let model = DoubleIntegrator::new(0.5).unwrap();
        let state = State::new(Point3::origin(), Vector3::new(1.0, -2.0, 0.0));
        let states = model.rollout(&state, &[Control::zero(); 4]);
        assert_eq!(states.len(), 4);
        assert_relative_eq!(states[3].position, Point3::new(2.0, -4.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(states[3].velocity, state.velocity);
    }

    #[test]
    fn test_rollout_matches_repeated_propagate() {
        let model = DoubleIntegrator::new(0.1).unwrap();
        let start = State::new(Point3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 0.3, 0.0));
        let controls = [Control::new(1.0, 0.0, 0.0), Control::new(0.0, -1.0, 0.5)];
        let rolled = model.rollout(&start, &controls);
        let manual = model.propagate(&model.propagate(&start, &controls[0]), &controls[1]);
        assert_eq!(rolled[1], manual);
    }
}
