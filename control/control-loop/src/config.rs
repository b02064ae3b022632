//! Controller configuration.

use control_optimize::{BarrierConfig, ConvexConfig, HeuristicConfig, QpSettings};
use control_types::{ControlError, CostWeights, MotionLimits, Plant, Result, SafetyParams, Workspace};

use crate::policy::DispatchPolicy;

/// Control applied when the selected optimizer fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FallbackControl {
    /// Coast with zero acceleration.
    #[default]
    Zero,
    /// Repeat the last applied control.
    Previous,
}

/// Complete configuration of a [`crate::ControlLoop`].
///
/// # Example
///
/// ```
/// use control_loop::{ControllerConfig, DispatchPolicy, FallbackControl};
///
/// let config = ControllerConfig::default()
///     .with_policy(DispatchPolicy::FilteredConvex)
///     .with_fallback(FallbackControl::Previous)
///     .with_max_steps(200);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControllerConfig {
    /// Control period in seconds.
    pub dt: f64,
    /// Actuator and speed bounds.
    pub limits: MotionLimits,
    /// Position box.
    pub workspace: Workspace,
    /// Tracking cost weights.
    pub weights: CostWeights,
    /// Margin gain and noise bound.
    pub safety: SafetyParams,
    /// Convex optimizer settings.
    pub convex: ConvexConfig,
    /// Safety heuristic settings.
    pub heuristic: HeuristicConfig,
    /// Barrier filter settings.
    pub barrier: BarrierConfig,
    /// Regime selection.
    pub policy: DispatchPolicy,
    /// Control used when an optimizer fails.
    pub fallback: FallbackControl,
    /// Distance to the target at which the run counts as reached.
    pub tolerance: f64,
    /// Tick budget.
    pub max_steps: usize,
    /// Whether the propagated velocity is projected back into the speed box.
    pub project_velocity: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            dt: 0.1,
            limits: MotionLimits::default(),
            workspace: Workspace::default(),
            weights: CostWeights::default(),
            safety: SafetyParams::default(),
            convex: ConvexConfig::default(),
            heuristic: HeuristicConfig::default(),
            barrier: BarrierConfig::default(),
            policy: DispatchPolicy::default(),
            fallback: FallbackControl::Zero,
            tolerance: 0.05,
            max_steps: 400,
            project_velocity: true,
        }
    }
}

impl ControllerConfig {
    /// Loose solver tolerances and a smaller search for fast loops.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            convex: ConvexConfig::default().with_qp(QpSettings::realtime()),
            heuristic: HeuristicConfig::realtime(),
            ..Self::default()
        }
    }

    /// Wider switching clearance, filtered convex ticks and a larger margin.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            safety: SafetyParams::new(5.0, SafetyParams::default().max_noise),
            policy: DispatchPolicy::Switched {
                clearance: 0.8,
                filter: true,
            },
            ..Self::default()
        }
    }

    /// Sets the control period.
    #[must_use]
    pub const fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    /// Sets the motion limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: MotionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the workspace.
    #[must_use]
    pub const fn with_workspace(mut self, workspace: Workspace) -> Self {
        self.workspace = workspace;
        self
    }

    /// Sets the cost weights.
    #[must_use]
    pub const fn with_weights(mut self, weights: CostWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Sets the safety parameters.
    #[must_use]
    pub const fn with_safety(mut self, safety: SafetyParams) -> Self {
        self.safety = safety;
        self
    }

    /// Sets both horizon lengths.
    #[must_use]
    pub const fn with_horizons(mut self, convex: usize, heuristic: usize) -> Self {
        self.convex.horizon = convex;
        self.heuristic.horizon = heuristic;
        self
    }

    /// Sets the dispatch policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the fallback control.
    #[must_use]
    pub const fn with_fallback(mut self, fallback: FallbackControl) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sets the target tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the tick budget.
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Sets the heuristic's RNG seed, the only random source the loop owns.
    ///
    /// Shorthand for replacing `heuristic.seed`.
    #[must_use]
    pub const fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.heuristic.seed = seed;
        self
    }

    /// Builds the plant described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] for an invalid `dt`, limits or
    /// workspace.
    pub fn plant(&self) -> Result<Plant> {
        Plant::new(self.dt, self.limits, self.workspace)
    }

    /// Validates every part of the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ControlError::InvalidConfig`] encountered.
    pub fn validate(&self) -> Result<()> {
        self.plant()?;
        self.weights.validate()?;
        self.safety.validate()?;
        self.convex.validate()?;
        self.heuristic.validate()?;
        self.barrier.validate()?;
        self.policy.validate()?;

        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ControlError::invalid_config(
                "target tolerance must be positive",
            ));
        }
        if self.max_steps == 0 {
            return Err(ControlError::invalid_config(
                "max_steps must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_valid() {
        assert!(ControllerConfig::default().validate().is_ok());
        assert!(ControllerConfig::realtime().validate().is_ok());
        assert!(ControllerConfig::conservative().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(ControllerConfig::default().with_dt(0.0).validate().is_err());
        assert!(ControllerConfig::default().with_tolerance(0.0).validate().is_err());
        assert!(ControllerConfig::default().with_max_steps(0).validate().is_err());
        assert!(ControllerConfig::default().with_horizons(0, 5).validate().is_err());
        assert!(ControllerConfig::default().with_horizons(10, 0).validate().is_err());
        assert!(
            ControllerConfig::default()
                .with_safety(SafetyParams::new(3.0, 0.0))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_seed_lives_in_heuristic_config() {
        assert_eq!(ControllerConfig::default().heuristic.seed, Some(42));
        let config = ControllerConfig::realtime().with_seed(Some(7));
        assert_eq!(config.heuristic.seed, Some(7));
        assert_eq!(config.with_seed(None).heuristic.seed, None);
    }

    #[test]
    fn test_fallback_default() {
        assert_eq!(ControllerConfig::default().fallback, FallbackControl::Zero);
    }
}
