//! Actuator, speed, and workspace limits.
//!
//! # Example
//!
//! ```
//! use control_types::{MotionLimits, Workspace};
//! use nalgebra::Point3;
//!
//! let limits = MotionLimits::new(2.0, 1.0);
//! assert!(limits.validate().is_ok());
//!
//! let workspace = Workspace::cube(-1.0, 2.0);
//! assert!(workspace.contains(&Point3::new(0.5, 0.5, 0.5)));
//! assert!(!workspace.contains(&Point3::new(3.0, 0.0, 0.0)));
//! ```

use nalgebra::{Point3, Vector3};

use crate::error::{ControlError, Result};
use crate::state::Control;

/// Per-axis acceleration and speed limits.
///
/// Both limits are symmetric boxes: every component of the control lies in
/// `[-max_acceleration, max_acceleration]` and every component of the
/// velocity in `[-max_speed, max_speed]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotionLimits {
    /// Actuator bound per axis.
    pub max_acceleration: f64,
    /// Velocity bound per axis.
    pub max_speed: f64,
}

impl Default for MotionLimits {
    fn default() -> Self {
        Self {
            max_acceleration: 1.0,
            max_speed: 0.5,
        }
    }
}

impl MotionLimits {
    /// Creates limits from an acceleration and speed bound.
    #[must_use]
    pub const fn new(max_acceleration: f64, max_speed: f64) -> Self {
        Self {
            max_acceleration,
            max_speed,
        }
    }

    /// Returns `true` if the control respects the actuator bound.
    #[must_use]
    pub fn control_within(&self, control: &Control) -> bool {
        control.within(self.max_acceleration)
    }

    /// Returns `true` if the velocity respects the speed bound.
    #[must_use]
    pub fn velocity_within(&self, velocity: &Vector3<f64>) -> bool {
        velocity.iter().all(|v| v.abs() <= self.max_speed)
    }

    /// Projects a velocity onto the speed box.
    #[must_use]
    pub fn project_velocity(&self, velocity: &Vector3<f64>) -> Vector3<f64> {
        velocity.map(|v| v.clamp(-self.max_speed, self.max_speed))
    }

    /// Validates the limits.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] if either bound is not a
    /// positive finite number.
    pub fn validate(&self) -> Result<()> {
        if !(self.max_acceleration.is_finite() && self.max_acceleration > 0.0) {
            return Err(ControlError::invalid_config(
                "max_acceleration must be positive and finite",
            ));
        }
        if !(self.max_speed.is_finite() && self.max_speed > 0.0) {
            return Err(ControlError::invalid_config(
                "max_speed must be positive and finite",
            ));
        }
        Ok(())
    }
}

/// Axis-aligned box the agent's position must stay inside.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Workspace {
    /// Minimum corner.
    pub min: Point3<f64>,
    /// Maximum corner.
    pub max: Point3<f64>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::cube(-1.0, 2.0)
    }
}

impl Workspace {
    /// Creates a workspace from two corners.
    ///
    /// The corners are reordered per axis so `min <= max` holds.
    #[must_use]
    pub fn new(a: Point3<f64>, b: Point3<f64>) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Creates a cube `[lo, hi]^3`.
    #[must_use]
    pub fn cube(lo: f64, hi: f64) -> Self {
        Self::new(Point3::new(lo, lo, lo), Point3::new(hi, hi, hi))
    }

    /// Returns `true` if the point is inside the box (boundary included).
    #[must_use]
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// Clamps a point into the box.
    #[must_use]
    pub fn clamp(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
            p.z.clamp(self.min.z, self.max.z),
        )
    }

    /// Extent of the box along each axis.
    #[must_use]
    pub fn extent(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Validates the box.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] if a corner is not finite or
    /// the box is degenerate along some axis.
    pub fn validate(&self) -> Result<()> {
        if !(self.min.iter().all(|c| c.is_finite()) && self.max.iter().all(|c| c.is_finite())) {
            return Err(ControlError::invalid_config(
                "workspace corners must be finite",
            ));
        }
        if self.extent().iter().any(|e| *e <= 0.0) {
            return Err(ControlError::invalid_config(
                "workspace must have positive extent on every axis",
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

    #[test]
    fn test_limits_validate() {
        assert!(MotionLimits::default().validate().is_ok());
        assert!(MotionLimits::new(0.0, 1.0).validate().is_err());
        assert!(MotionLimits::new(1.0, -1.0).validate().is_err());
        assert!(MotionLimits::new(f64::INFINITY, 1.0).validate().is_err());
    }

    #[test]
    fn test_velocity_projection() {
        let limits = MotionLimits::new(1.0, 0.5);
        let v = limits.project_velocity(&Vector3::new(0.7, -0.9, 0.1));
        assert_relative_eq!(v, Vector3::new(0.5, -0.5, 0.1));
        assert!(limits.velocity_within(&v));
        assert!(!limits.velocity_within(&Vector3::new(0.6, 0.0, 0.0)));
    }

    #[test]
    fn test_control_within() {
        let limits = MotionLimits::new(1.0, 0.5);
        assert!(limits.control_within(&Control::new(1.0, -1.0, 0.0)));
        assert!(!limits.control_within(&Control::new(1.01, 0.0, 0.0)));
    }

    #[test]
    fn test_workspace_reorders_corners() {
        let ws = Workspace::new(Point3::new(1.0, 0.0, 2.0), Point3::new(-1.0, 3.0, 0.0));
        assert_relative_eq!(ws.min, Point3::new(-1.0, 0.0, 0.0));
        assert_relative_eq!(ws.max, Point3::new(1.0, 3.0, 2.0));
    }

    #[test]
    fn test_workspace_contains_boundary() {
        let ws = Workspace::cube(0.0, 1.0);
        assert!(ws.contains(&Point3::new(0.0, 1.0, 0.5)));
        assert!(!ws.contains(&Point3::new(-1e-9, 0.5, 0.5)));
    }

    #[test]
    fn test_workspace_clamp() {
        let ws = Workspace::cube(0.0, 1.0);
        assert_relative_eq!(
            ws.clamp(&Point3::new(2.0, -1.0, 0.5)),
            Point3::new(1.0, 0.0, 0.5)
        );
    }

    #[test]
    fn test_workspace_validate() {
        assert!(Workspace::default().validate().is_ok());
        assert!(Workspace::cube(1.0, 1.0).validate().is_err());
        assert!(Workspace::cube(0.0, f64::NAN).validate().is_err());
    }
}
