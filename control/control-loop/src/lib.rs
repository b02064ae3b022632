//! Safety-aware receding-horizon control loop.
//!
//! Every tick the [`ControlLoop`] observes the obstacle through an
//! [`ObstacleProvider`], sizes the safety margin with a
//! [`MarginEstimator`], lets the [`DispatchPolicy`] pick the convex
//! optimizer or the safety heuristic, optionally corrects the result with
//! the barrier filter, and applies the first control of the plan.
//!
//! # Modules
//!
//! - [`config`]: [`ControllerConfig`] and its presets
//! - [`margin`]: the adaptive margin and sensing noise
//! - [`obstacle`]: obstacle providers
//! - [`policy`]: regime selection
//! - [`orchestrator`]: the loop itself
//! - [`record`]: per-tick trajectory history
//!
//! # Example
//!
//! ```
//! use control_loop::{ControlLoop, ControllerConfig, LoopStatus, StaticObstacle};
//! use control_types::{State, Workspace};
//! use nalgebra::Point3;
//!
//! let config = ControllerConfig::realtime().with_workspace(Workspace::cube(-0.5, 1.5));
//! let obstacle = StaticObstacle::new(Point3::new(0.5, 0.5, 0.5), 0.0);
//!
//! let mut control = ControlLoop::new(
//!     config,
//!     State::at_rest(Point3::origin()),
//!     Point3::new(1.0, 1.0, 1.0),
//!     Box::new(obstacle),
//! )?;
//! let status = control.run();
//! assert!(status.is_terminal());
//!
//! let history = control.history();
//! assert!(history.iter().all(|tick| tick.distance >= tick.epsilon));
//! # Ok::<(), control_types::ControlError>(())
//! ```
//!
//! # Feature Flags
//!
//! - `serde`: Enables serialization/deserialization for configuration and
//!   record types

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod margin;
pub mod obstacle;
pub mod orchestrator;
pub mod policy;
pub mod record;

pub use config::{ControllerConfig, FallbackControl};
pub use margin::{MarginEstimator, NoiseSample, SensorNoise, confidence_from_noise};
pub use obstacle::{
    ConfidenceSource, LinearObstacle, ObstacleProvider, OscillatingObstacle, ScriptedObstacle,
    StaticObstacle,
};
pub use orchestrator::{ControlLoop, LoopStatus};
pub use policy::{Dispatch, DispatchPolicy};
pub use record::{ROW_COLUMNS, ROW_WIDTH, TickRecord, TrajectoryRecord};
