//! Obstacle state providers.
//!
//! The control loop asks an [`ObstacleProvider`] for one observation per
//! tick. How the obstacle moves is up to the provider; how much the
//! observation is trusted comes from its [`ConfidenceSource`].

use std::f64::consts::TAU;

use control_types::{ControlError, ObstacleObservation, Result};
use nalgebra::{Point3, Vector3};

use crate::margin::SensorNoise;

/// Supplies the obstacle observation for a tick.
pub trait ObstacleProvider {
    /// Observation at `tick` (ticks start at zero).
    fn observe(&mut self, tick: usize) -> ObstacleObservation;
}

impl<P: ObstacleProvider + ?Sized> ObstacleProvider for Box<P> {
    fn observe(&mut self, tick: usize) -> ObstacleObservation {
        (**self).observe(tick)
    }
}

/// Where observation confidence comes from.
#[derive(Debug, Clone)]
pub enum ConfidenceSource {
    /// A constant confidence in `[0, 1]`.
    Fixed(f64),
    /// Confidence derived from a bounded noise sample each tick.
    Noise(SensorNoise),
}

impl Default for ConfidenceSource {
    fn default() -> Self {
        Self::Fixed(1.0)
    }
}

impl ConfidenceSource {
    /// Confidence for the next observation.
    pub fn next_confidence(&mut self) -> f64 {
        match self {
            Self::Fixed(confidence) => confidence.clamp(0.0, 1.0),
            Self::Noise(noise) => noise.sample().confidence,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn elapsed(tick: usize, dt: f64) -> f64 {
    tick as f64 * dt
}

/// An obstacle that never moves.
#[derive(Debug, Clone)]
pub struct StaticObstacle {
    center: Point3<f64>,
    radius: f64,
    confidence: ConfidenceSource,
}

impl StaticObstacle {
    /// Creates a stationary obstacle with full confidence.
    #[must_use]
    pub fn new(center: Point3<f64>, radius: f64) -> Self {
        Self {
            center,
            radius,
            confidence: ConfidenceSource::default(),
        }
    }

    /// Sets the confidence source.
    #[must_use]
    pub fn with_confidence(mut self, confidence: ConfidenceSource) -> Self {
        self.confidence = confidence;
        self
    }
}

impl ObstacleProvider for StaticObstacle {
    fn observe(&mut self, _tick: usize) -> ObstacleObservation {
        ObstacleObservation::sphere(self.center, self.radius)
            .with_confidence(self.confidence.next_confidence())
    }
}

/// An obstacle moving at constant velocity.
#[derive(Debug, Clone)]
pub struct LinearObstacle {
    start: Point3<f64>,
    velocity: Vector3<f64>,
    radius: f64,
    dt: f64,
    confidence: ConfidenceSource,
}

impl LinearObstacle {
    /// Creates an obstacle at `start` moving with `velocity`; `dt` converts
    /// ticks to seconds.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] for a non-positive `dt`.
    pub fn new(start: Point3<f64>, velocity: Vector3<f64>, radius: f64, dt: f64) -> Result<Self> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ControlError::invalid_config(
                "obstacle dt must be positive",
            ));
        }
        Ok(Self {
            start,
            velocity,
            radius,
            dt,
            confidence: ConfidenceSource::default(),
        })
    }

    /// Sets the confidence source.
    #[must_use]
    pub fn with_confidence(mut self, confidence: ConfidenceSource) -> Self {
        self.confidence = confidence;
        self
    }
}

impl ObstacleProvider for LinearObstacle {
    fn observe(&mut self, tick: usize) -> ObstacleObservation {
        let center = self.start + self.velocity * elapsed(tick, self.dt);
        ObstacleObservation::sphere(center, self.radius)
            .with_velocity(self.velocity)
            .with_confidence(self.confidence.next_confidence())
    }
}

/// An obstacle sweeping sinusoidally about an anchor.
///
/// `center(t) = anchor + amplitude · sin(2π t / period)`.
#[derive(Debug, Clone)]
pub struct OscillatingObstacle {
    anchor: Point3<f64>,
    amplitude: Vector3<f64>,
    period: f64,
    radius: f64,
    dt: f64,
    confidence: ConfidenceSource,
}

impl OscillatingObstacle {
    /// Creates an oscillating obstacle.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] for a non-positive period or `dt`.
    pub fn new(
        anchor: Point3<f64>,
        amplitude: Vector3<f64>,
        period: f64,
        radius: f64,
        dt: f64,
    ) -> Result<Self> {
        if !(period.is_finite() && period > 0.0 && dt.is_finite() && dt > 0.0) {
            return Err(ControlError::invalid_config(
                "oscillation period and dt must be positive",
            ));
        }
        Ok(Self {
            anchor,
            amplitude,
            period,
            radius,
            dt,
            confidence: ConfidenceSource::default(),
        })
    }

    /// Sets the confidence source.
    #[must_use]
    pub fn with_confidence(mut self, confidence: ConfidenceSource) -> Self {
        self.confidence = confidence;
        self
    }
}

impl ObstacleProvider for OscillatingObstacle {
    fn observe(&mut self, tick: usize) -> ObstacleObservation {
        let omega = TAU / self.period;
        let phase = omega * elapsed(tick, self.dt);
        ObstacleObservation::sphere(self.anchor + self.amplitude * phase.sin(), self.radius)
            .with_velocity(self.amplitude * (omega * phase.cos()))
            .with_confidence(self.confidence.next_confidence())
    }
}

/// Replays a fixed list of observations; the last one repeats forever.
#[derive(Debug, Clone)]
pub struct ScriptedObstacle {
    observations: Vec<ObstacleObservation>,
}

impl ScriptedObstacle {
    /// Creates a scripted provider.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] if `observations` is empty.
    pub fn new(observations: Vec<ObstacleObservation>) -> Result<Self> {
        if observations.is_empty() {
            return Err(ControlError::invalid_config(
                "scripted obstacle needs at least one observation",
            ));
        }
        Ok(Self { observations })
    }
}

impl ObstacleProvider for ScriptedObstacle {
    fn observe(&mut self, tick: usize) -> ObstacleObservation {
        let index = tick.min(self.observations.len() - 1);
        self.observations[index]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_static() {
        let mut provider = StaticObstacle::new(Point3::new(0.5, 0.5, 0.5), 0.1);
        let a = provider.observe(0);
        let b = provider.observe(100);
        assert_eq!(a, b);
        assert_relative_eq!(a.speed(), 0.0);
        assert_relative_eq!(a.confidence, 1.0);
    }

    #[test]
    fn test_linear() {
        let mut provider =
            LinearObstacle::new(Point3::origin(), Vector3::new(1.0, 0.0, 0.0), 0.0, 0.1).unwrap();
        let obs = provider.observe(5);
        assert_relative_eq!(obs.center, Point3::new(0.5, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(obs.speed(), 1.0);
    }

    #[test]
    fn test_oscillating() {
        let mut provider = OscillatingObstacle::new(
            Point3::origin(),
            Vector3::new(0.0, 1.0, 0.0),
            4.0,
            0.0,
            0.1,
        )
        .unwrap();
        let start = provider.observe(0);
        assert_relative_eq!(start.center, Point3::origin());
        assert_relative_eq!(start.velocity.y, TAU / 4.0, epsilon = 1e-12);

        // Quarter period: peak displacement, zero velocity.
        let peak = provider.observe(10);
        assert_relative_eq!(peak.center.y, 1.0, epsilon = 1e-12);
        assert!(peak.speed() < 1e-9);
    }

    #[test]
    fn test_scripted_repeats_last() {
        let script = vec![
            ObstacleObservation::point(Point3::origin()),
            ObstacleObservation::point(Point3::new(1.0, 0.0, 0.0)),
        ];
        let mut provider = ScriptedObstacle::new(script.clone()).unwrap();
        assert_eq!(provider.observe(0), script[0]);
        assert_eq!(provider.observe(1), script[1]);
        assert_eq!(provider.observe(7), script[1]);
        assert!(ScriptedObstacle::new(Vec::new()).is_err());
    }

    #[test]
    fn test_noisy_confidence() {
        let noise = SensorNoise::new(0.1, Some(3)).unwrap();
        let mut provider = StaticObstacle::new(Point3::origin(), 0.0)
            .with_confidence(ConfidenceSource::Noise(noise));
        for tick in 0..50 {
            let c = provider.observe(tick).confidence;
            assert!((0.0..=1.0).contains(&c));
        }
    }

    #[test]
    fn test_boxed_provider() {
        let mut provider: Box<dyn ObstacleProvider> =
            Box::new(StaticObstacle::new(Point3::new(1.0, 2.0, 3.0), 0.0));
        assert_relative_eq!(provider.observe(0).center, Point3::new(1.0, 2.0, 3.0));
    }
}
