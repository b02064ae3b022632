//! Particle swarm search over a symmetric box.
//!
//! Each particle keeps a position, a velocity and its personal best. The
//! velocity update is the standard inertia form
//!
//! ```text
//! v ← w v + c₁ r₁ (p_best − x) + c₂ r₂ (g_best − x)
//! ```
//!
//! with `r₁, r₂ ~ U(0, 1)` drawn per component. Velocities are clamped to a
//! fraction of the box width and positions to the box itself.

use control_types::{ControlError, Result};
use rand::Rng;

/// A point in decision space and its cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Decision vector.
    pub decision: Vec<f64>,
    /// Objective value.
    pub cost: f64,
}

/// Swarm parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SwarmConfig {
    /// Number of particles (seeded candidates included).
    pub particles: usize,
    /// Number of velocity/position updates.
    pub iterations: usize,
    /// Inertia weight `w`.
    pub inertia: f64,
    /// Attraction to the personal best `c₁`.
    pub cognitive: f64,
    /// Attraction to the global best `c₂`.
    pub social: f64,
    /// Velocity clamp as a fraction of the box half-width.
    pub max_velocity_fraction: f64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            particles: 30,
            iterations: 40,
            inertia: 0.7,
            cognitive: 1.5,
            social: 1.5,
            max_velocity_fraction: 0.5,
        }
    }
}

impl SwarmConfig {
    /// Sets the population size.
    #[must_use]
    pub const fn with_particles(mut self, particles: usize) -> Self {
        self.particles = particles;
        self
    }

    /// Sets the number of iterations.
    #[must_use]
    pub const fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] for an empty swarm or
    /// negative coefficients.
    pub fn validate(&self) -> Result<()> {
        if self.particles == 0 {
            return Err(ControlError::invalid_config(
                "swarm needs at least one particle",
            ));
        }
        if !(self.inertia >= 0.0 && self.cognitive >= 0.0 && self.social >= 0.0) {
            return Err(ControlError::invalid_config(
                "swarm coefficients must be non-negative",
            ));
        }
        if !(self.max_velocity_fraction > 0.0) {
            return Err(ControlError::invalid_config(
                "swarm max_velocity_fraction must be positive",
            ));
        }
        Ok(())
    }
}

struct Particle {
    position: Vec<f64>,
    velocity: Vec<f64>,
    best: Candidate,
}

/// Particle swarm optimizer over `[-bound, bound]^dimension`.
#[derive(Debug, Clone, Copy)]
pub struct ParticleSwarm {
    config: SwarmConfig,
    bound: f64,
}

impl ParticleSwarm {
    /// Creates a swarm searching the box `[-bound, bound]` per component.
    #[must_use]
    pub const fn new(config: SwarmConfig, bound: f64) -> Self {
        Self { config, bound }
    }

    /// Minimizes `objective` and returns the best candidate seen.
    ///
    /// `seeds` become the first particles (clamped to the box); the rest
    /// start uniformly at random. Every seed is evaluated, so the result is
    /// never worse than the best seed.
    pub fn search<R, F>(
        &self,
        dimension: usize,
        seeds: &[Vec<f64>],
        mut objective: F,
        rng: &mut R,
    ) -> Candidate
    where
        R: Rng,
        F: FnMut(&[f64]) -> f64,
    {
        let bound = self.bound;
        let vmax = self.config.max_velocity_fraction * bound;
        let count = self.config.particles.max(seeds.len());

        let mut swarm: Vec<Particle> = (0..count)
            .map(|i| {
                let position: Vec<f64> = match seeds.get(i) {
                    Some(seed) => (0..dimension)
                        .map(|d| seed.get(d).copied().unwrap_or(0.0).clamp(-bound, bound))
                        .collect(),
                    None => (0..dimension).map(|_| rng.gen_range(-bound..=bound)).collect(),
                };
                let velocity = (0..dimension).map(|_| rng.gen_range(-vmax..=vmax)).collect();
                let cost = objective(&position);
                Particle {
                    best: Candidate {
                        decision: position.clone(),
                        cost,
                    },
                    position,
                    velocity,
                }
            })
            .collect();

        let mut global = best_of(&swarm);

        for _ in 0..self.config.iterations {
            for particle in &mut swarm {
                for d in 0..dimension {
                    let r1: f64 = rng.r#gen();
                    let r2: f64 = rng.r#gen();
                    let x = particle.position[d];
                    let v = self.config.inertia * particle.velocity[d]
                        + self.config.cognitive * r1 * (particle.best.decision[d] - x)
                        + self.config.social * r2 * (global.decision[d] - x);
                    particle.velocity[d] = v.clamp(-vmax, vmax);
                    particle.position[d] = (x + particle.velocity[d]).clamp(-bound, bound);
                }

                let cost = objective(&particle.position);
                if cost < particle.best.cost {
                    particle.best = Candidate {
                        decision: particle.position.clone(),
                        cost,
                    };
                    if cost < global.cost {
                        global = particle.best.clone();
                    }
                }
            }
        }

        global
    }
}

fn best_of(swarm: &[Particle]) -> Candidate {
    swarm
        .iter()
        .map(|p| &p.best)
        .min_by(|a, b| a.cost.total_cmp(&b.cost))
        .cloned()
        .unwrap_or(Candidate {
            decision: Vec::new(),
            cost: f64::INFINITY,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|v| (v - 0.3).powi(2)).sum()
    }

    #[test]
    fn test_finds_sphere_minimum() {
        let swarm = ParticleSwarm::new(SwarmConfig::default().with_iterations(100), 1.0);
        let mut rng = StdRng::seed_from_u64(42);
        let best = swarm.search(4, &[], sphere, &mut rng);
        assert_eq!(best.decision.len(), 4);
        assert!(best.cost < 1e-3);
    }

    #[test]
    fn test_never_worse_than_seed() {
        let swarm = ParticleSwarm::new(SwarmConfig::default().with_iterations(0), 1.0);
        let mut rng = StdRng::seed_from_u64(7);
        let seed = vec![0.3, 0.3, 0.3];
        let best = swarm.search(3, &[seed.clone()], sphere, &mut rng);
        assert!(best.cost <= sphere(&seed));
    }

    #[test]
    fn test_positions_stay_in_box() {
        let swarm = ParticleSwarm::new(SwarmConfig::default(), 0.5);
        let mut rng = StdRng::seed_from_u64(3);
        // Minimum lies outside the box; the search must stop at the edge.
        let best = swarm.search(2, &[], |x| x.iter().map(|v| (v - 2.0).powi(2)).sum(), &mut rng);
        for v in &best.decision {
            assert!(v.abs() <= 0.5 + 1e-12);
        }
        assert!((best.decision[0] - 0.5).abs() < 1e-2);
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let swarm = ParticleSwarm::new(SwarmConfig::default(), 1.0);
        let a = swarm.search(3, &[], sphere, &mut StdRng::seed_from_u64(11));
        let b = swarm.search(3, &[], sphere, &mut StdRng::seed_from_u64(11));
        assert_eq!(a, b);
    }

    #[test]
    fn test_validation() {
        assert!(SwarmConfig::default().validate().is_ok());
        assert!(SwarmConfig::default().with_particles(0).validate().is_err());
    }
}
