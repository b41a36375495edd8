//! Evolution parameters.

use crate::{CoreError, Result, RunParameters};
use serde::{Deserialize, Serialize};

/// Default population size.
pub const DEFAULT_POP_SIZE: usize = 50;
/// Default crossover probability.
pub const DEFAULT_CROSSOVER_RATE: f64 = 0.8;
/// Default mutation probability.
pub const DEFAULT_MUTATION_RATE: f64 = 0.1;
/// Default number of generations after the initial one.
pub const DEFAULT_GENERATIONS: usize = 100;
/// Default random seed.
pub const DEFAULT_SEED: u64 = 42;

/// Smallest population that can be paired for crossover.
pub const MIN_POP_SIZE: usize = 2;
/// Smallest instance worth solving.
pub const MIN_CITIES: usize = 3;

/// Parameters of one evolutionary run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Individuals per generation
    pub pop_size: usize,
    /// Probability a pair of offspring is recombined
    pub crossover_rate: f64,
    /// Probability an offspring is mutated
    pub mutation_rate: f64,
    /// Generations evolved after generation 0
    pub generations: usize,
    /// Seed for the run's random source
    pub seed: u64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            pop_size: DEFAULT_POP_SIZE,
            crossover_rate: DEFAULT_CROSSOVER_RATE,
            mutation_rate: DEFAULT_MUTATION_RATE,
            generations: DEFAULT_GENERATIONS,
            seed: DEFAULT_SEED,
        }
    }
}

impl EvolutionConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set population size.
    pub fn with_pop_size(mut self, pop_size: usize) -> Self {
        self.pop_size = pop_size;
        self
    }

    /// Set crossover probability.
    pub fn with_crossover_rate(mut self, rate: f64) -> Self {
        self.crossover_rate = rate;
        self
    }

    /// Set mutation probability.
    pub fn with_mutation_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = rate;
        self
    }

    /// Set number of generations.
    pub fn with_generations(mut self, generations: usize) -> Self {
        self.generations = generations;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the parameters against an instance of `num_cities` cities.
    pub fn validate(&self, num_cities: usize) -> Result<()> {
        if num_cities < MIN_CITIES {
            return Err(CoreError::TooFewCities {
                got: num_cities,
                min: MIN_CITIES,
            });
        }
        if self.pop_size < MIN_POP_SIZE {
            return Err(CoreError::PopulationTooSmall {
                got: self.pop_size,
                min: MIN_POP_SIZE,
            });
        }
        check_rate("crossover_rate", self.crossover_rate)?;
        check_rate("mutation_rate", self.mutation_rate)?;
        Ok(())
    }

    /// The parameter block recorded alongside a finished run.
    pub fn parameters(&self, num_cities: usize) -> RunParameters {
        RunParameters {
            pop_size: self.pop_size,
            crossover_rate: self.crossover_rate,
            mutation_rate: self.mutation_rate,
            generations: self.generations,
            num_cities,
        }
    }
}

fn check_rate(name: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::RateOutOfRange { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EvolutionConfig::default();
        assert_eq!(config.pop_size, 50);
        assert_eq!(config.crossover_rate, 0.8);
        assert_eq!(config.mutation_rate, 0.1);
        assert_eq!(config.generations, 100);
        assert!(config.validate(17).is_ok());
    }

    #[test]
    fn test_validate_rejects_small_instances() {
        let config = EvolutionConfig::default();
        assert_eq!(
            config.validate(2),
            Err(CoreError::TooFewCities { got: 2, min: 3 })
        );

        let config = EvolutionConfig::default().with_pop_size(1);
        assert_eq!(
            config.validate(10),
            Err(CoreError::PopulationTooSmall { got: 1, min: 2 })
        );
    }

    #[test]
    fn test_validate_rates() {
        let config = EvolutionConfig::default().with_mutation_rate(1.5);
        assert!(matches!(
            config.validate(5),
            Err(CoreError::RateOutOfRange { name: "mutation_rate", .. })
        ));
    }

    #[test]
    fn test_partial_params_use_defaults() {
        let config: EvolutionConfig = serde_json::from_str(r#"{"pop_size": 10, "seed": 7}"#).unwrap();
        assert_eq!(config.pop_size, 10);
        assert_eq!(config.seed, 7);
        assert_eq!(config.generations, DEFAULT_GENERATIONS);
    }
}
