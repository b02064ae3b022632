//! Simulated annealing refinement.
//!
//! Perturbations are uniform per component with a width proportional to the
//! current temperature, so the walk narrows as it cools. A worse neighbour is
//! accepted with probability `exp(−Δ/T)`; the temperature then cools
//! geometrically. The best point ever visited is returned, not the final one.

use control_types::{ControlError, Result};
use rand::Rng;

use super::swarm::Candidate;

/// Annealing schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnnealConfig {
    /// Number of proposals.
    pub iterations: usize,
    /// Starting temperature, in cost units.
    pub initial_temperature: f64,
    /// Geometric cooling factor in (0, 1).
    pub cooling: f64,
    /// Temperature floor.
    pub min_temperature: f64,
    /// Perturbation width at the initial temperature, as a fraction of the bound.
    pub step_scale: f64,
}

impl Default for AnnealConfig {
    fn default() -> Self {
        Self {
            iterations: 400,
            initial_temperature: 10.0,
            cooling: 0.98,
            min_temperature: 1e-4,
            step_scale: 0.5,
        }
    }
}

impl AnnealConfig {
    /// Sets the number of proposals.
    #[must_use]
    pub const fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Sets the starting temperature.
    #[must_use]
    pub const fn with_initial_temperature(mut self, temperature: f64) -> Self {
        self.initial_temperature = temperature;
        self
    }

    /// Validates the schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] for a non-positive temperature
    /// or a cooling factor outside (0, 1).
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_temperature > 0.0 && self.min_temperature > 0.0) {
            return Err(ControlError::invalid_config(
                "annealing temperatures must be positive",
            ));
        }
        if !(self.cooling > 0.0 && self.cooling < 1.0) {
            return Err(ControlError::invalid_config(
                "annealing cooling factor must be in (0, 1)",
            ));
        }
        if !(self.step_scale > 0.0) {
            return Err(ControlError::invalid_config(
                "annealing step_scale must be positive",
            ));
        }
        Ok(())
    }
}

/// Simulated annealing over `[-bound, bound]^dimension`.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedAnnealing {
    config: AnnealConfig,
    bound: f64,
}

impl SimulatedAnnealing {
    /// Creates the annealer for the box `[-bound, bound]` per component.
    #[must_use]
    pub const fn new(config: AnnealConfig, bound: f64) -> Self {
        Self { config, bound }
    }

    /// Refines `start` and returns the best candidate visited.
    pub fn refine<R, F>(&self, start: Candidate, mut objective: F, rng: &mut R) -> Candidate
    where
        R: Rng,
        F: FnMut(&[f64]) -> f64,
    {
        let config = &self.config;
        let bound = self.bound;

        let mut current = start;
        let mut best = current.clone();
        let mut temperature = config.initial_temperature;
        let mut proposal = current.decision.clone();

        for _ in 0..config.iterations {
            let width = config.step_scale * bound * (temperature / config.initial_temperature);
            for (p, &x) in proposal.iter_mut().zip(&current.decision) {
                *p = (x + rng.gen_range(-1.0..=1.0) * width).clamp(-bound, bound);
            }

            let cost = objective(&proposal);
            let delta = cost - current.cost;
            if delta < 0.0 || rng.r#gen::<f64>() < (-delta / temperature).exp() {
                current.decision.copy_from_slice(&proposal);
                current.cost = cost;
                if cost < best.cost {
                    best = current.clone();
                }
            }

            temperature = (temperature * config.cooling).max(config.min_temperature);
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn bowl(x: &[f64]) -> f64 {
        x.iter().map(|v| (v + 0.2).powi(2)).sum()
    }

    fn start(decision: Vec<f64>) -> Candidate {
        let cost = bowl(&decision);
        Candidate { decision, cost }
    }

    #[test]
    fn test_improves_on_start() {
        let annealer = SimulatedAnnealing::new(
            AnnealConfig::default().with_initial_temperature(0.1),
            1.0,
        );
        let initial = start(vec![0.8, 0.8]);
        let initial_cost = initial.cost;
        let best = annealer.refine(initial, bowl, &mut StdRng::seed_from_u64(1));
        assert!(best.cost < initial_cost);
        assert!(best.cost < 0.05);
    }

    #[test]
    fn test_never_worse_than_start() {
        let annealer = SimulatedAnnealing::new(AnnealConfig::default(), 1.0);
        // Start at the optimum: every proposal is worse or equal.
        let best = annealer.refine(start(vec![-0.2, -0.2]), bowl, &mut StdRng::seed_from_u64(5));
        assert!(best.cost <= 1e-15);
    }

    #[test]
    fn test_stays_in_box() {
        let annealer = SimulatedAnnealing::new(AnnealConfig::default(), 0.1);
        let best = annealer.refine(
            Candidate {
                decision: vec![0.0; 3],
                cost: 1.0,
            },
            |x| -x.iter().sum::<f64>(),
            &mut StdRng::seed_from_u64(9),
        );
        assert!(best.decision.iter().all(|v| v.abs() <= 0.1 + 1e-12));
    }

    #[test]
    fn test_validation() {
        assert!(AnnealConfig::default().validate().is_ok());
        let bad = AnnealConfig {
            cooling: 1.0,
            ..AnnealConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
