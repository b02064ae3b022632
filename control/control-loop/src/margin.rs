//! Adaptive safety margin.
//!
//! The margin grows with how far the obstacle can move in one tick and with
//! how little the observation is trusted:
//!
//! ```text
//! ε = k · |dt · v_obstacle · (1 − confidence)|
//! ```
//!
//! Confidence itself is derived from a bounded sensing perturbation,
//! `confidence = clamp(1 − |noise| / max_noise, 0, 1)`, so a larger noise
//! sample never yields a smaller margin.

use control_types::{ControlError, Result, SafetyParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Confidence implied by a noise sample bounded by `max_noise`.
///
/// # Example
///
/// ```
/// use control_loop::margin::confidence_from_noise;
///
/// assert_eq!(confidence_from_noise(0.0, 0.1), 1.0);
/// assert!((confidence_from_noise(-0.05, 0.1) - 0.5).abs() < 1e-12);
/// assert_eq!(confidence_from_noise(0.3, 0.1), 0.0);
/// ```
#[must_use]
pub fn confidence_from_noise(noise: f64, max_noise: f64) -> f64 {
    if max_noise <= 0.0 {
        return if noise == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - noise.abs() / max_noise).clamp(0.0, 1.0)
}

/// A noise draw and the confidence it implies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseSample {
    /// Signed perturbation in `[-max_noise, max_noise]`.
    pub noise: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

fn draw<R: Rng>(max_noise: f64, rng: &mut R) -> NoiseSample {
    let noise = rng.gen_range(-max_noise..=max_noise);
    NoiseSample {
        noise,
        confidence: confidence_from_noise(noise, max_noise),
    }
}

/// Computes ε and the inflated separation each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginEstimator {
    dt: f64,
    params: SafetyParams,
}

impl MarginEstimator {
    /// Creates an estimator for timestep `dt`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] for a non-positive `dt` or
    /// invalid safety parameters.
    pub fn new(dt: f64, params: SafetyParams) -> Result<Self> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ControlError::invalid_config(
                "margin estimator dt must be positive",
            ));
        }
        params.validate()?;
        Ok(Self { dt, params })
    }

    /// Safety parameters.
    #[must_use]
    pub const fn params(&self) -> &SafetyParams {
        &self.params
    }

    /// Margin ε for an observation with `confidence` and obstacle speed.
    ///
    /// Confidence is clamped to `[0, 1]`; the result is never negative.
    #[must_use]
    pub fn estimate_margin(&self, confidence: f64, obstacle_speed: f64) -> f64 {
        let distrust = 1.0 - confidence.clamp(0.0, 1.0);
        self.params.margin_gain * (self.dt * obstacle_speed * distrust).abs()
    }

    /// Margin implied directly by a noise sample.
    #[must_use]
    pub fn margin_for_noise(&self, noise: f64, obstacle_speed: f64) -> f64 {
        self.estimate_margin(
            confidence_from_noise(noise, self.params.max_noise),
            obstacle_speed,
        )
    }

    /// Inflated separation `ε + max_noise`.
    #[must_use]
    pub fn safety_distance(&self, epsilon: f64) -> f64 {
        self.params.safety_distance(epsilon)
    }
}

/// Seeded, bounded, uniform sensing perturbation.
#[derive(Debug, Clone)]
pub struct SensorNoise {
    max_noise: f64,
    rng: StdRng,
}

impl SensorNoise {
    /// Creates a noise source (`seed = None` seeds from entropy).
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] if `max_noise` is not positive.
    pub fn new(max_noise: f64, seed: Option<u64>) -> Result<Self> {
        if !(max_noise.is_finite() && max_noise > 0.0) {
            return Err(ControlError::invalid_config(
                "sensor max_noise must be positive",
            ));
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self { max_noise, rng })
    }

    /// Bound on the perturbation magnitude.
    #[must_use]
    pub const fn max_noise(&self) -> f64 {
        self.max_noise
    }

    /// Draws the next sample.
    pub fn sample(&mut self) -> NoiseSample {
        draw(self.max_noise, &mut self.rng)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn estimator() -> MarginEstimator {
        MarginEstimator::new(0.1, SafetyParams::new(3.0, 0.1)).unwrap()
    }

    #[test]
    fn test_full_confidence_has_no_margin() {
        assert_relative_eq!(estimator().estimate_margin(1.0, 2.0), 0.0);
    }

    #[test]
    fn test_zero_confidence() {
        // 3 · 0.1 · 2 · 1
        assert_relative_eq!(estimator().estimate_margin(0.0, 2.0), 0.6);
    }

    #[test]
    fn test_linear_in_speed_and_distrust() {
        let e = estimator();
        assert_relative_eq!(e.estimate_margin(0.5, 2.0), 2.0 * e.estimate_margin(0.5, 1.0));
        assert_relative_eq!(e.estimate_margin(0.5, 1.0), 0.5 * e.estimate_margin(0.0, 1.0));
    }

    #[test]
    fn test_out_of_range_confidence_clamped() {
        let e = estimator();
        assert_relative_eq!(e.estimate_margin(1.5, 1.0), 0.0);
        assert_relative_eq!(e.estimate_margin(-1.0, 1.0), e.estimate_margin(0.0, 1.0));
    }

    #[test]
    fn test_stationary_obstacle_has_no_margin() {
        assert_relative_eq!(estimator().margin_for_noise(0.1, 0.0), 0.0);
    }

    #[test]
    fn test_safety_distance() {
        assert_relative_eq!(estimator().safety_distance(0.2), 0.3);
    }

    #[test]
    fn test_noise_bounded_and_reproducible() {
        let mut a = SensorNoise::new(0.1, Some(5)).unwrap();
        let mut b = SensorNoise::new(0.1, Some(5)).unwrap();
        for _ in 0..100 {
            let s = a.sample();
            assert!(s.noise.abs() <= 0.1);
            assert!((0.0..=1.0).contains(&s.confidence));
            assert_eq!(s, b.sample());
        }
    }

    #[test]
    fn test_validation() {
        assert!(MarginEstimator::new(0.0, SafetyParams::default()).is_err());
        assert!(MarginEstimator::new(0.1, SafetyParams::new(3.0, -1.0)).is_err());
        assert!(SensorNoise::new(0.0, None).is_err());
    }
}
