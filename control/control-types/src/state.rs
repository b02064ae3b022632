//! Agent state and control input.
//!
//! The agent is a point mass in 3D. Its [`State`] is position plus velocity
//! (six reals) and its [`Control`] is an acceleration command (three reals).

use nalgebra::{Point3, Vector3, Vector6};

/// Position and velocity of the agent.
///
/// # Example
///
/// ```
/// use control_types::State;
/// use nalgebra::{Point3, Vector3};
///
/// let state = State::new(Point3::new(1.0, 2.0, 3.0), Vector3::new(0.1, 0.0, 0.0));
/// let v = state.to_vector();
/// assert_eq!(v[0], 1.0);
/// assert_eq!(v[3], 0.1);
/// assert_eq!(State::from_vector(&v), state);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct State {
    /// Position in world coordinates.
    pub position: Point3<f64>,
    /// Velocity in world coordinates.
    pub velocity: Vector3<f64>,
}

impl State {
    /// Creates a state from position and velocity.
    #[must_use]
    pub const fn new(position: Point3<f64>, velocity: Vector3<f64>) -> Self {
        Self { position, velocity }
    }

    /// Creates a state at rest at the given position.
    #[must_use]
    pub fn at_rest(position: Point3<f64>) -> Self {
        Self::new(position, Vector3::zeros())
    }

    /// Stacks the state as `[px, py, pz, vx, vy, vz]`.
    #[must_use]
    pub fn to_vector(&self) -> Vector6<f64> {
        Vector6::new(
            self.position.x,
            self.position.y,
            self.position.z,
            self.velocity.x,
            self.velocity.y,
            self.velocity.z,
        )
    }

    /// Inverse of [`State::to_vector`].
    #[must_use]
    pub fn from_vector(v: &Vector6<f64>) -> Self {
        Self::new(Point3::new(v[0], v[1], v[2]), Vector3::new(v[3], v[4], v[5]))
    }

    /// Speed (velocity magnitude).
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    /// Euclidean distance between the positions of two states.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        (self.position - other.position).norm()
    }

    /// Returns `true` if every component is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|c| c.is_finite()) && self.velocity.iter().all(|c| c.is_finite())
    }
}

impl Default for State {
    fn default() -> Self {
        Self::at_rest(Point3::origin())
    }
}

/// Acceleration command applied for one tick.
///
/// # Example
///
/// ```
/// use control_types::Control;
///
/// let u = Control::new(3.0, -0.5, 0.0).clamped(1.0);
/// assert_eq!(u.acceleration.x, 1.0);
/// assert_eq!(u.acceleration.y, -0.5);
/// assert!(u.within(1.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Control {
    /// Commanded acceleration.
    pub acceleration: Vector3<f64>,
}

impl Control {
    /// Creates a control from its three components.
    #[must_use]
    pub fn new(ax: f64, ay: f64, az: f64) -> Self {
        Self {
            acceleration: Vector3::new(ax, ay, az),
        }
    }

    /// Wraps an acceleration vector.
    #[must_use]
    pub const fn from_vector(acceleration: Vector3<f64>) -> Self {
        Self { acceleration }
    }

    /// The zero control.
    #[must_use]
    pub fn zero() -> Self {
        Self::from_vector(Vector3::zeros())
    }

    /// Clamps every component to `[-limit, limit]`.
    #[must_use]
    pub fn clamped(&self, limit: f64) -> Self {
        Self::from_vector(self.acceleration.map(|a| a.clamp(-limit, limit)))
    }

    /// Returns `true` if every component lies in `[-limit, limit]`.
    #[must_use]
    pub fn within(&self, limit: f64) -> bool {
        self.acceleration.iter().all(|a| a.abs() <= limit)
    }

    /// Squared Euclidean norm of the command.
    #[must_use]
    pub fn norm_squared(&self) -> f64 {
        self.acceleration.norm_squared()
    }
}

impl Default for Control {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<Vector3<f64>> for Control {
    fn from(acceleration: Vector3<f64>) -> Self {
        Self::from_vector(acceleration)
    }
}
