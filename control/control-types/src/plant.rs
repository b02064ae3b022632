//! The controlled plant: dynamics plus the limits it operates under.

use crate::dynamics::DoubleIntegrator;
use crate::error::{ControlError, Result};
use crate::limits::{MotionLimits, Workspace};
use crate::state::State;

/// Dynamics model, actuator/speed limits and workspace, shared read-only by
/// every optimizer and by the control loop.
///
/// # Example
///
/// ```
/// use control_types::{MotionLimits, Plant, Workspace};
///
/// let plant = Plant::new(0.1, MotionLimits::new(1.0, 0.5), Workspace::cube(-1.0, 2.0)).unwrap();
/// assert_eq!(plant.dynamics.dt(), 0.1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Plant {
    /// Discrete dynamics.
    pub dynamics: DoubleIntegrator,
    /// Actuator and speed bounds.
    pub limits: MotionLimits,
    /// Position box.
    pub workspace: Workspace,
}

impl Plant {
    /// Builds and validates a plant.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] if `dt`, the limits or the
    /// workspace are invalid.
    pub fn new(dt: f64, limits: MotionLimits, workspace: Workspace) -> Result<Self> {
        limits.validate()?;
        workspace.validate()?;
        Ok(Self {
            dynamics: DoubleIntegrator::new(dt)?,
            limits,
            workspace,
        })
    }

    /// Returns `true` if the state satisfies the workspace box and speed box.
    #[must_use]
    pub fn admits(&self, state: &State) -> bool {
        self.workspace.contains(&state.position) && self.limits.velocity_within(&state.velocity)
    }
}

/// Parameters of the adaptive safety margin.
///
/// The required separation at a tick is `ε + max_noise`, where
/// `ε = margin_gain · |dt · v_obstacle · (1 − confidence)|`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SafetyParams {
    /// Gain `k` applied to the distrust-weighted obstacle displacement.
    pub margin_gain: f64,
    /// Bound on the sensing perturbation; also the base separation.
    pub max_noise: f64,
}

impl Default for SafetyParams {
    fn default() -> Self {
        Self {
            margin_gain: 3.0,
            max_noise: 0.1,
        }
    }
}

impl SafetyParams {
    /// Creates safety parameters.
    #[must_use]
    pub const fn new(margin_gain: f64, max_noise: f64) -> Self {
        Self {
            margin_gain,
            max_noise,
        }
    }

    /// Inflated separation for margin `epsilon`.
    #[must_use]
    pub fn safety_distance(&self, epsilon: f64) -> f64 {
        epsilon.max(0.0) + self.max_noise
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] if the gain is negative or the
    /// noise bound is not positive.
    pub fn validate(&self) -> Result<()> {
        if !(self.margin_gain.is_finite() && self.margin_gain >= 0.0) {
            return Err(ControlError::invalid_config(
                "margin_gain must be non-negative and finite",
            ));
        }
        if !(self.max_noise.is_finite() && self.max_noise > 0.0) {
            return Err(ControlError::invalid_config(
                "max_noise must be positive and finite",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    #[test]
    fn test_plant_validation() {
        assert!(Plant::new(0.1, MotionLimits::default(), Workspace::default()).is_ok());
        assert!(Plant::new(0.0, MotionLimits::default(), Workspace::default()).is_err());
        assert!(Plant::new(0.1, MotionLimits::new(-1.0, 1.0), Workspace::default()).is_err());
        assert!(Plant::new(0.1, MotionLimits::default(), Workspace::cube(1.0, 1.0)).is_err());
    }

    #[test]
    fn test_plant_admits() {
        let plant = Plant::new(0.1, MotionLimits::new(1.0, 0.5), Workspace::cube(0.0, 1.0)).unwrap();
        assert!(plant.admits(&State::at_rest(Point3::new(0.5, 0.5, 0.5))));
        assert!(!plant.admits(&State::at_rest(Point3::new(1.5, 0.5, 0.5))));
        assert!(!plant.admits(&State::new(
            Point3::new(0.5, 0.5, 0.5),
            Vector3::new(0.0, 0.9, 0.0)
        )));
    }

    #[test]
    fn test_safety_distance() {
        let params = SafetyParams::new(3.0, 0.1);
        assert_relative_eq!(params.safety_distance(0.0), 0.1);
        assert_relative_eq!(params.safety_distance(0.25), 0.35);
        assert_relative_eq!(params.safety_distance(-1.0), 0.1);
    }

    #[test]
    fn test_safety_validation() {
        assert!(SafetyParams::default().validate().is_ok());
        assert!(SafetyParams::new(-1.0, 0.1).validate().is_err());
        assert!(SafetyParams::new(3.0, 0.0).validate().is_err());
    }
}
