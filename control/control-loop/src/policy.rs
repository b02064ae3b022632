//! Regime selection.
//!
//! Each tick the [`DispatchPolicy`] decides whether the convex optimizer may
//! ignore the obstacle, or whether the safety heuristic has to run, and
//! whether the barrier filter post-processes the result. Selection is a pure
//! function of the state, the observation and the safety distance.

use control_optimize::Regime;
use control_types::{ControlError, ObstacleObservation, Result, State};

/// The decision for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dispatch {
    /// Optimizer to run.
    pub regime: Regime,
    /// Whether the barrier filter corrects the optimizer's control.
    pub filter: bool,
}

impl Dispatch {
    /// Runs `regime` without the filter.
    #[must_use]
    pub const fn plain(regime: Regime) -> Self {
        Self {
            regime,
            filter: false,
        }
    }
}

/// How the optimizer is chosen each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DispatchPolicy {
    /// Always the convex optimizer, unfiltered.
    ConvexOnly,
    /// Always the safety heuristic.
    HeuristicOnly,
    /// Always the convex optimizer, followed by the barrier filter.
    FilteredConvex,
    /// Convex while the obstacle surface is farther than the safety distance
    /// plus `clearance`, the heuristic otherwise.
    Switched {
        /// Extra distance beyond the safety distance that keeps the convex regime.
        clearance: f64,
        /// Whether convex ticks are filtered.
        filter: bool,
    },
    /// Convex once `position[axis]` exceeds `threshold`, the heuristic before.
    AxisThreshold {
        /// Coordinate index (0, 1 or 2).
        axis: usize,
        /// Switching coordinate.
        threshold: f64,
    },
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::Switched {
            clearance: 0.5,
            filter: false,
        }
    }
}

impl DispatchPolicy {
    /// Chooses the regime for this tick.
    ///
    /// # Example
    ///
    /// ```
    /// use control_loop::DispatchPolicy;
    /// use control_optimize::Regime;
    /// use control_types::{ObstacleObservation, State};
    /// use nalgebra::Point3;
    ///
    /// let policy = DispatchPolicy::Switched { clearance: 0.5, filter: false };
    /// let obstacle = ObstacleObservation::point(Point3::origin());
    ///
    /// let far = State::at_rest(Point3::new(2.0, 0.0, 0.0));
    /// let near = State::at_rest(Point3::new(0.3, 0.0, 0.0));
    /// assert_eq!(policy.select(&far, &obstacle, 0.1).regime, Regime::Convex);
    /// assert_eq!(policy.select(&near, &obstacle, 0.1).regime, Regime::SafetyHeuristic);
    /// ```
    #[must_use]
    pub fn select(
        &self,
        state: &State,
        obstacle: &ObstacleObservation,
        safety_distance: f64,
    ) -> Dispatch {
        match *self {
            Self::ConvexOnly => Dispatch::plain(Regime::Convex),
            Self::HeuristicOnly => Dispatch::plain(Regime::SafetyHeuristic),
            Self::FilteredConvex => Dispatch {
                regime: Regime::Convex,
                filter: true,
            },
            Self::Switched { clearance, filter } => {
                if obstacle.surface_distance(&state.position) > safety_distance + clearance {
                    Dispatch {
                        regime: Regime::Convex,
                        filter,
                    }
                } else {
                    Dispatch::plain(Regime::SafetyHeuristic)
                }
            }
            Self::AxisThreshold { axis, threshold } => {
                if state.position[axis.min(2)] > threshold {
                    Dispatch::plain(Regime::Convex)
                } else {
                    Dispatch::plain(Regime::SafetyHeuristic)
                }
            }
        }
    }

    /// Validates the policy parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] for a negative clearance or an
    /// axis outside 0..=2.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Switched { clearance, .. } if !(clearance.is_finite() && clearance >= 0.0) => {
                Err(ControlError::invalid_config(
                    "switching clearance must be non-negative",
                ))
            }
            Self::AxisThreshold { axis, .. } if axis > 2 => Err(ControlError::invalid_config(
                format!("threshold axis must be 0, 1 or 2, got {axis}"),
            )),
            _ => Ok(()),
        }
    }
}
