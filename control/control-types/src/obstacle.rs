//! Obstacle observations.

use nalgebra::{Point3, Vector3};

/// Snapshot of the single obstacle at one tick.
///
/// A radius of zero describes a point obstacle. The velocity is the
/// provider's estimate and is used both to predict the obstacle over the
/// horizon and as the speed input of the safety margin.
///
/// # Example
///
/// ```
/// use control_types::ObstacleObservation;
/// use nalgebra::{Point3, Vector3};
///
/// let obs = ObstacleObservation::point(Point3::new(1.0, 0.0, 0.0))
///     .with_velocity(Vector3::new(0.0, 1.0, 0.0));
///
/// let later = obs.predicted_center(2.0);
/// assert_eq!(later, Point3::new(1.0, 2.0, 0.0));
/// assert_eq!(obs.surface_distance(&Point3::origin()), 1.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObstacleObservation {
    /// Obstacle center.
    pub center: Point3<f64>,
    /// Effective radius (0 for a point obstacle).
    pub radius: f64,
    /// Estimated velocity of the center.
    pub velocity: Vector3<f64>,
    /// Trust in the observation, in `[0, 1]`.
    pub confidence: f64,
}

impl ObstacleObservation {
    /// A stationary, fully trusted point obstacle.
    #[must_use]
    pub fn point(center: Point3<f64>) -> Self {
        Self {
            center,
            radius: 0.0,
            velocity: Vector3::zeros(),
            confidence: 1.0,
        }
    }

    /// A stationary, fully trusted spherical obstacle.
    #[must_use]
    pub fn sphere(center: Point3<f64>, radius: f64) -> Self {
        Self {
            radius: radius.max(0.0),
            ..Self::point(center)
        }
    }

    /// Sets the velocity estimate.
    #[must_use]
    pub const fn with_velocity(mut self, velocity: Vector3<f64>) -> Self {
        self.velocity = velocity;
        self
    }

    /// Sets the confidence, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Obstacle speed.
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    /// Center extrapolated `elapsed` seconds ahead at constant velocity.
    #[must_use]
    pub fn predicted_center(&self, elapsed: f64) -> Point3<f64> {
        self.center + self.velocity * elapsed
    }

    /// Distance from a point to the obstacle surface (negative inside).
    #[must_use]
    pub fn surface_distance(&self, p: &Point3<f64>) -> f64 {
        (p - self.center).norm() - self.radius
    }

    /// Surface distance to the obstacle extrapolated `elapsed` seconds ahead.
    #[must_use]
    pub fn predicted_surface_distance(&self, p: &Point3<f64>, elapsed: f64) -> f64 {
        (p - self.predicted_center(elapsed)).norm() - self.radius
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_defaults() {
        let obs = ObstacleObservation::point(Point3::new(0.5, 0.5, 0.5));
        assert_relative_eq!(obs.radius, 0.0);
        assert_relative_eq!(obs.confidence, 1.0);
        assert_relative_eq!(obs.speed(), 0.0);
    }

    #[test]
    fn test_sphere_surface_distance() {
        let obs = ObstacleObservation::sphere(Point3::origin(), 0.5);
        assert_relative_eq!(obs.surface_distance(&Point3::new(2.0, 0.0, 0.0)), 1.5);
        assert!(obs.surface_distance(&Point3::new(0.1, 0.0, 0.0)) < 0.0);
    }

    #[test]
    fn test_negative_radius_clamped() {
        let obs = ObstacleObservation::sphere(Point3::origin(), -1.0);
        assert_relative_eq!(obs.radius, 0.0);
    }

    #[test]
    fn test_confidence_clamped() {
        let obs = ObstacleObservation::point(Point3::origin()).with_confidence(1.7);
        assert_relative_eq!(obs.confidence, 1.0);
        let obs = obs.with_confidence(-0.2);
        assert_relative_eq!(obs.confidence, 0.0);
    }

    #[test]
    fn test_predicted_surface_distance() {
        let obs = ObstacleObservation::point(Point3::origin())
            .with_velocity(Vector3::new(1.0, 0.0, 0.0));
        let p = Point3::new(2.0, 0.0, 0.0);
        assert_relative_eq!(obs.predicted_surface_distance(&p, 0.0), 2.0);
        assert_relative_eq!(obs.predicted_surface_distance(&p, 1.5), 0.5);
    }
}
