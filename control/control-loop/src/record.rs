//! Per-tick trajectory history.

use control_optimize::{Regime, SolveStatus};
use control_types::{Control, ObstacleObservation, State};

use crate::orchestrator::LoopStatus;

/// Number of columns produced by [`TrajectoryRecord::to_rows`].
pub const ROW_WIDTH: usize = 16;

/// Column names of [`TrajectoryRecord::to_rows`], in order.
pub const ROW_COLUMNS: [&str; ROW_WIDTH] = [
    "tick", "px", "py", "pz", "vx", "vy", "vz", "ux", "uy", "uz", "ox", "oy", "oz", "epsilon",
    "distance", "regime",
];

/// Everything that happened during one tick.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TickRecord {
    /// Tick index, counted from one after the first step.
    pub tick: usize,
    /// State after applying the control.
    pub state: State,
    /// Control applied.
    pub control: Control,
    /// Observation used for the decision.
    pub obstacle: ObstacleObservation,
    /// Safety margin ε.
    pub epsilon: f64,
    /// Inflated separation `ε + max_noise`.
    pub safety_distance: f64,
    /// Surface distance from the new state to the obstacle.
    pub distance: f64,
    /// Optimizer that produced the control.
    pub regime: Regime,
    /// Solve quality.
    pub solve: SolveStatus,
    /// Whether the barrier filter modified the control.
    pub filtered: bool,
    /// Loop status after the tick.
    pub status: LoopStatus,
}

impl TickRecord {
    /// Returns `true` if the optimizer failed or returned an unsafe plan.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        !self.solve.is_acceptable()
    }
}

/// Append-only sequence of [`TickRecord`]s.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrajectoryRecord {
    initial: Option<State>,
    ticks: Vec<TickRecord>,
}

impl TrajectoryRecord {
    /// Creates an empty record starting at `initial`.
    #[must_use]
    pub const fn new(initial: State) -> Self {
        Self {
            initial: Some(initial),
            ticks: Vec::new(),
        }
    }

    /// Appends a tick.
    pub fn push(&mut self, record: TickRecord) {
        self.ticks.push(record);
    }

    /// Number of recorded ticks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// All ticks in order.
    #[must_use]
    pub fn ticks(&self) -> &[TickRecord] {
        &self.ticks
    }

    /// Iterates over the ticks.
    pub fn iter(&self) -> std::slice::Iter<'_, TickRecord> {
        self.ticks.iter()
    }

    /// The most recent tick.
    #[must_use]
    pub fn last(&self) -> Option<&TickRecord> {
        self.ticks.last()
    }

    /// Smallest obstacle surface distance over the run.
    #[must_use]
    pub fn min_clearance(&self) -> Option<f64> {
        self.ticks.iter().map(|t| t.distance).min_by(f64::total_cmp)
    }

    /// Distance travelled, including the leg from the initial state.
    #[must_use]
    pub fn path_length(&self) -> f64 {
        let mut previous = match (self.initial, self.ticks.first()) {
            (Some(initial), _) => initial.position,
            (None, Some(first)) => first.state.position,
            (None, None) => return 0.0,
        };
        self.ticks
            .iter()
            .map(|t| {
                let step = (t.state.position - previous).norm();
                previous = t.state.position;
                step
            })
            .sum()
    }

    /// Number of ticks whose optimizer failed or was unsafe.
    #[must_use]
    pub fn degraded_ticks(&self) -> usize {
        self.ticks.iter().filter(|t| t.is_degraded()).count()
    }

    /// Number of ticks that ran the given regime.
    #[must_use]
    pub fn regime_ticks(&self, regime: Regime) -> usize {
        self.ticks.iter().filter(|t| t.regime == regime).count()
    }

    /// Ticks where the distance fell below the margin ε.
    pub fn margin_violations(&self) -> impl Iterator<Item = &TickRecord> {
        self.ticks.iter().filter(|t| t.distance < t.epsilon)
    }

    /// Plain numeric rows (see [`ROW_COLUMNS`]); the regime column is 0 for
    /// convex and 1 for the safety heuristic.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_rows(&self) -> Vec<[f64; ROW_WIDTH]> {
        self.ticks
            .iter()
            .map(|t| {
                let p = t.state.position;
                let v = t.state.velocity;
                let u = t.control.acceleration;
                let o = t.obstacle.center;
                let regime = match t.regime {
                    Regime::Convex => 0.0,
                    Regime::SafetyHeuristic => 1.0,
                };
                [
                    t.tick as f64,
                    p.x,
                    p.y,
                    p.z,
                    v.x,
                    v.y,
                    v.z,
                    u.x,
                    u.y,
                    u.z,
                    o.x,
                    o.y,
                    o.z,
                    t.epsilon,
                    t.distance,
                    regime,
                ]
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a TrajectoryRecord {
    type Item = &'a TickRecord;
    type IntoIter = std::slice::Iter<'a, TickRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.ticks.iter()
    }
}
