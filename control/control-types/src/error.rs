//! Error types for control operations.
//!
//! Most failures inside the control loop are recovered locally (a fallback
//! control is substituted and the tick is marked as degraded). The variants
//! here exist so those degradations can be named and logged, and so that
//! construction-time validation can reject a malformed configuration before
//! the loop starts.

/// Errors that can occur while configuring or running the controller.
///
/// # Example
///
/// ```
/// use control_types::ControlError;
///
/// let error = ControlError::invalid_config("dt must be positive");
/// assert!(error.to_string().contains("dt must be positive"));
/// assert!(error.is_config_error());
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ControlError {
    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A matrix or vector has the wrong shape.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The quantity whose shape is wrong.
        what: &'static str,
        /// Expected length or row count.
        expected: usize,
        /// Actual length or row count.
        actual: usize,
    },

    /// A quadratic program did not reach an optimal status.
    ///
    /// Recovered by substituting a fallback control.
    #[error("solver did not reach an optimal status: {status}")]
    SolverInfeasible {
        /// Human-readable solver status.
        status: String,
    },

    /// The safety heuristic found no candidate satisfying every constraint.
    ///
    /// Recovered by applying the least-penalised candidate.
    #[error("no safe candidate found (best cost {best_cost:.3e})")]
    AllCandidatesUnsafe {
        /// Cost of the least-penalised candidate.
        best_cost: f64,
    },
}

impl ControlError {
    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Creates a solver-infeasible error from a status description.
    #[must_use]
    pub fn solver_infeasible(status: impl Into<String>) -> Self {
        Self::SolverInfeasible {
            status: status.into(),
        }
    }

    /// Returns `true` for construction-time validation failures.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_) | Self::DimensionMismatch { .. }
        )
    }

    /// Returns `true` for errors the control loop recovers from locally.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SolverInfeasible { .. } | Self::AllCandidatesUnsafe { .. }
        )
    }
}

/// Result type for control operations.
pub type Result<T> = std::result::Result<T, ControlError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display() {
        let error = ControlError::invalid_config("horizon must be positive");
        assert!(error.to_string().contains("invalid configuration"));
        assert!(error.to_string().contains("horizon"));
        assert!(error.is_config_error());
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let error = ControlError::DimensionMismatch {
            what: "control sequence",
            expected: 30,
            actual: 29,
        };
        let msg = error.to_string();
        assert!(msg.contains("control sequence"));
        assert!(msg.contains("30"));
        assert!(msg.contains("29"));
        assert!(error.is_config_error());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(ControlError::solver_infeasible("primal infeasible").is_recoverable());
        assert!(ControlError::AllCandidatesUnsafe { best_cost: 1e6 }.is_recoverable());
    }

    #[test]
    fn test_unsafe_display_has_cost() {
        let error = ControlError::AllCandidatesUnsafe { best_cost: 2.5e6 };
        assert!(error.to_string().contains("2.500e6"));
    }
}
