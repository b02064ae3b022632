//! Core types for safety-aware receding-horizon control.
//!
//! This crate provides the foundational types shared by the optimizers and
//! the control loop:
//!
//! - **State and control**: [`State`] (position + velocity) and [`Control`]
//!   (acceleration command)
//! - **Dynamics**: the discrete double integrator [`DoubleIntegrator`], used
//!   bit-for-bit identically for prediction and for propagation
//! - **Limits**: actuator/speed bounds ([`MotionLimits`]) and the position
//!   box ([`Workspace`]), bundled with the dynamics into a [`Plant`]
//! - **Obstacles**: the per-tick [`ObstacleObservation`]
//! - **Costs**: quadratic [`CostWeights`] (`Q`, `R`, `Qf`)
//! - **Safety**: adaptive margin parameters ([`SafetyParams`])
//! - **Errors**: [`ControlError`]
//!
//! # Example
//!
//! ```
//! use control_types::{Control, CostWeights, MotionLimits, Plant, State, Workspace};
//! use nalgebra::Point3;
//!
//! let plant = Plant::new(0.1, MotionLimits::new(1.0, 0.5), Workspace::cube(-1.0, 2.0))?;
//! let weights = CostWeights::default();
//! weights.validate()?;
//!
//! let state = State::at_rest(Point3::origin());
//! let next = plant.dynamics.propagate(&state, &Control::new(1.0, 0.0, 0.0));
//! assert!(plant.admits(&next));
//! # Ok::<(), control_types::ControlError>(())
//! ```
//!
//! # Feature Flags
//!
//! - `serde`: Enables serialization/deserialization for all types

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dynamics;
pub mod error;
pub mod limits;
pub mod obstacle;
pub mod plant;
pub mod state;
pub mod weights;

pub use dynamics::{CONTROL_DIM, DoubleIntegrator, STATE_DIM};
pub use error::{ControlError, Result};
pub use limits::{MotionLimits, Workspace};
pub use obstacle::ObstacleObservation;
pub use plant::{Plant, SafetyParams};
pub use state::{Control, State};
pub use weights::CostWeights;
