//! Horizon optimizers for safety-aware receding-horizon control.
//!
//! This crate turns a [`HorizonProblem`] into a bounded control:
//!
//! - [`qp`]: convex quadratic programs on top of `osqp`
//! - [`convex`]: the condensed tracking MPC ([`ConvexHorizonSolver`]), used
//!   when the obstacle is far enough to be ignored
//! - [`heuristic`]: particle swarm + simulated annealing with hard clearance
//!   checks ([`SafetyHeuristicSolver`]), used near the obstacle
//! - [`barrier`]: a second-order barrier-function filter that minimally
//!   corrects a nominal control ([`BarrierFilter`])
//!
//! Both horizon solvers implement [`HorizonSolver`], so callers can dispatch
//! on [`Regime`] without caring which one runs.
//!
//! # Example
//!
//! ```
//! use control_optimize::{ConvexConfig, ConvexHorizonSolver, HorizonProblem, HorizonSolver};
//! use control_types::{CostWeights, MotionLimits, ObstacleObservation, Plant, State, Workspace};
//! use nalgebra::Point3;
//!
//! let plant = Plant::new(0.1, MotionLimits::new(1.0, 0.5), Workspace::cube(-1.0, 2.0))?;
//! let mut solver: Box<dyn HorizonSolver> = Box::new(ConvexHorizonSolver::new(
//!     plant,
//!     CostWeights::default(),
//!     ConvexConfig::default(),
//! )?);
//!
//! let problem = HorizonProblem::new(
//!     State::at_rest(Point3::origin()),
//!     State::at_rest(Point3::new(1.0, 1.0, 1.0)),
//!     ObstacleObservation::point(Point3::new(5.0, 5.0, 5.0)),
//!     0.0,
//! );
//! let outcome = solver.solve(&problem);
//! assert!(outcome.status.is_acceptable());
//! # Ok::<(), control_types::ControlError>(())
//! ```
//!
//! # Feature Flags
//!
//! - `serde`: Enables serialization/deserialization for configuration types

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod barrier;
pub mod convex;
pub mod heuristic;
pub mod qp;
pub mod solver;

pub use barrier::{BarrierConfig, BarrierConstraint, BarrierFilter, FilterOutcome};
pub use convex::{ConvexConfig, ConvexHorizonSolver};
pub use heuristic::{
    AnnealConfig, HeuristicConfig, SafetyHeuristicSolver, SwarmConfig, braking_sequence,
};
pub use qp::{QpProblem, QpSettings, QpSolution, QpSolver, QpStatus};
pub use solver::{HorizonPlan, HorizonProblem, HorizonSolver, Regime, SolveOutcome, SolveStatus};
