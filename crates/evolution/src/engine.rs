//! The generational loop.
//!
//! ```text
//! init -> evaluate -> [select -> crossover -> mutate -> evaluate -> record]*
//! ```
//!
//! Randomness comes from a single generator seeded from the config, and all
//! of it is drawn here, never on the workers, so a run is reproducible for a
//! given seed regardless of how evaluation is spread.

use crate::{HallOfFame, Operators, ProgressObserver};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use salesman_core::{
    CoreError, DistanceMatrix, EvolutionConfig, FitnessFn, GenerationRecord, Individual,
    Population, RunParameters, RunRecord, UNFIT,
};
use salesman_execution::{DistributedTransport, EvaluationError, EvaluationTransport, LocalTransport};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Result alias for evolution runs.
pub type Result<T> = std::result::Result<T, EvolutionError>;

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum EvolutionError {
    /// Invalid configuration for this instance
    #[error("invalid configuration: {0}")]
    Config(#[from] CoreError),

    /// Evaluation backend failed
    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),

    /// An individual stopped being a permutation
    #[error("generation {generation}: individual {index} is not a permutation of 0..{cities}")]
    InvalidIndividual {
        /// Generation the violation was found in
        generation: usize,
        /// Position in the population
        index: usize,
        /// Expected tour length
        cities: usize,
    },

    /// The transport returned the wrong number of results
    #[error("generation {generation}: sent {expected} tours, got {got} results")]
    ResultCount {
        /// Generation of the batch
        generation: usize,
        /// Tours sent
        expected: usize,
        /// Results returned
        got: usize,
    },

    /// Nothing was evaluated
    #[error("population is empty")]
    EmptyPopulation,
}

/// What a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Cheapest tour found
    pub best_route: Vec<usize>,
    /// Its cost
    pub best_distance: f64,
    /// Wall time for the run
    pub elapsed: Duration,
    /// One record per generation, generation 0 first
    pub history: Vec<GenerationRecord>,
}

impl RunOutcome {
    /// Turn the outcome into a storable record.
    pub fn into_record(self, parameters: RunParameters) -> RunRecord {
        RunRecord::new(self.best_route, self.best_distance, parameters, self.elapsed)
    }
}

/// Pick the evaluation backend for a pool of `workers`: in-process
/// evaluation for zero, otherwise that many in-process workers.
pub fn transport_for(workers: usize, fitness: FitnessFn) -> Box<dyn EvaluationTransport> {
    if workers == 0 {
        Box::new(LocalTransport::new())
    } else {
        Box::new(DistributedTransport::spawn_local(workers, fitness))
    }
}

/// Evolves tours for a distance matrix.
pub struct EvolutionEngine {
    transport: Box<dyn EvaluationTransport>,
    config: EvolutionConfig,
    operators: Operators,
    observers: Vec<Box<dyn ProgressObserver>>,
}

impl EvolutionEngine {
    /// Create an engine over `transport` with default operators.
    pub fn new(transport: Box<dyn EvaluationTransport>, config: EvolutionConfig) -> Self {
        Self {
            transport,
            config,
            operators: Operators::default(),
            observers: Vec::new(),
        }
    }

    /// Set the operators.
    pub fn with_operators(mut self, operators: Operators) -> Self {
        self.operators = operators;
        self
    }

    /// Add a progress observer.
    pub fn with_observer(mut self, observer: Box<dyn ProgressObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// The configuration.
    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Replace the configuration for following runs.
    pub fn set_config(&mut self, config: EvolutionConfig) {
        self.config = config;
    }

    /// The evaluation backend.
    pub fn transport(&self) -> &dyn EvaluationTransport {
        self.transport.as_ref()
    }

    /// Run the full evolution against `matrix`.
    ///
    /// The matrix is installed on the transport first, and the transport is
    /// told the run is over even when the run fails.
    pub async fn run(&mut self, matrix: Arc<DistanceMatrix>) -> Result<RunOutcome> {
        let cities = matrix.size();
        self.config.validate(cities)?;

        info!(
            "Starting evolution: {} cities, pop {}, {} generations, {} evaluation ({} workers)",
            cities,
            self.config.pop_size,
            self.config.generations,
            self.transport.name(),
            self.transport.worker_count()
        );

        let started = Instant::now();
        self.transport.install_matrix(matrix).await?;
        let evolved = self.evolve(cities).await;
        let finished = self.transport.finish_run().await;

        let (best, history) = evolved?;
        finished?;

        let best_distance = best.fitness().unwrap_or(UNFIT);
        let elapsed = started.elapsed();
        info!(
            "Evolution finished in {:.2}s: best distance {:.2}",
            elapsed.as_secs_f64(),
            best_distance
        );

        Ok(RunOutcome {
            best_route: best.into_genes(),
            best_distance,
            elapsed,
            history,
        })
    }

    async fn evolve(&mut self, cities: usize) -> Result<(Individual, Vec<GenerationRecord>)> {
        let config = self.config.clone();
        let operators = self.operators;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut hall_of_fame = HallOfFame::new();
        let mut history = Vec::with_capacity(config.generations + 1);

        let mut population: Population = (0..config.pop_size)
            .map(|_| Individual::random(cities, &mut rng))
            .collect();
        self.evaluate_invalid(&mut population, cities, 0).await?;
        hall_of_fame.update(&population);
        history.push(self.record(0, &population)?);

        for generation in 1..=config.generations {
            let mut offspring = (operators.select)(&population, population.len(), &mut rng);

            for pair in offspring.chunks_exact_mut(2) {
                if rng.gen::<f64>() < config.crossover_rate {
                    let (first, second) = pair.split_at_mut(1);
                    (operators.crossover)(&mut first[0], &mut second[0], &mut rng);
                }
            }

            for individual in offspring.iter_mut() {
                if rng.gen::<f64>() < config.mutation_rate {
                    (operators.mutate)(individual, &mut rng);
                }
            }

            let evaluated = self
                .evaluate_invalid(&mut offspring, cities, generation)
                .await?;
            debug!("Generation {}: evaluated {} offspring", generation, evaluated);

            population = offspring;
            hall_of_fame.update(&population);
            history.push(self.record(generation, &population)?);
        }

        let best = hall_of_fame.into_best().ok_or(EvolutionError::EmptyPopulation)?;
        Ok((best, history))
    }

    /// Score every individual without a valid fitness. Returns how many
    /// were sent out.
    async fn evaluate_invalid(
        &mut self,
        population: &mut [Individual],
        cities: usize,
        generation: usize,
    ) -> Result<usize> {
        for (index, individual) in population.iter().enumerate() {
            if individual.len() != cities || !individual.is_valid_permutation() {
                return Err(EvolutionError::InvalidIndividual {
                    generation,
                    index,
                    cities,
                });
            }
        }

        let pending: Vec<usize> = population
            .iter()
            .enumerate()
            .filter(|(_, individual)| !individual.is_evaluated())
            .map(|(index, _)| index)
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let tours: Vec<&[usize]> = pending.iter().map(|&i| population[i].genes()).collect();
        let fitnesses = self.transport.map(self.operators.evaluate, &tours).await?;
        if fitnesses.len() != pending.len() {
            return Err(EvolutionError::ResultCount {
                generation,
                expected: pending.len(),
                got: fitnesses.len(),
            });
        }

        for (&index, fitness) in pending.iter().zip(fitnesses) {
            population[index].set_fitness(fitness);
        }
        Ok(pending.len())
    }

    fn record(&mut self, generation: usize, population: &[Individual]) -> Result<GenerationRecord> {
        let fitnesses: Vec<f64> = population
            .iter()
            .map(|individual| individual.fitness().unwrap_or(UNFIT))
            .collect();
        let record = GenerationRecord::from_fitnesses(generation, &fitnesses)
            .ok_or(EvolutionError::EmptyPopulation)?;

        for observer in &mut self.observers {
            observer.on_generation(&record, self.config.generations);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelObserver;
    use async_trait::async_trait;
    use salesman_core::tour_cost;

    fn square() -> Arc<DistanceMatrix> {
        Arc::new(
            DistanceMatrix::from_rows(vec![
                vec![0.0, 10.0, 15.0, 20.0],
                vec![10.0, 0.0, 35.0, 25.0],
                vec![15.0, 35.0, 0.0, 30.0],
                vec![20.0, 25.0, 30.0, 0.0],
            ])
            .unwrap(),
        )
    }

    fn random_matrix(cities: usize, seed: u64) -> Arc<DistanceMatrix> {
        let mut rng = StdRng::seed_from_u64(seed);
        Arc::new(DistanceMatrix::random_euclidean(cities, &mut rng))
    }

    fn small_config() -> EvolutionConfig {
        EvolutionConfig::new()
            .with_pop_size(10)
            .with_generations(20)
            .with_crossover_rate(0.8)
            .with_mutation_rate(0.1)
            .with_seed(42)
    }

    #[tokio::test]
    async fn test_four_city_run_finds_optimum() {
        let mut engine = EvolutionEngine::new(Box::new(LocalTransport::new()), small_config());
        let outcome = engine.run(square()).await.unwrap();

        assert_eq!(outcome.best_distance, 80.0);
        assert_eq!(tour_cost(&outcome.best_route, &square()), 80.0);
        assert_eq!(outcome.history.len(), 21);
    }

    #[tokio::test]
    async fn test_history_covers_every_generation() {
        let (observer, mut rx) = ChannelObserver::channel();
        let mut engine = EvolutionEngine::new(
            Box::new(LocalTransport::new()),
            small_config().with_generations(7),
        )
        .with_observer(Box::new(observer));

        let outcome = engine.run(random_matrix(12, 1)).await.unwrap();

        let generations: Vec<usize> = outcome.history.iter().map(|r| r.generation).collect();
        assert_eq!(generations, (0..=7).collect::<Vec<_>>());

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.total_generations, 7);
            seen.push(event.record);
        }
        assert_eq!(seen, outcome.history);

        let best_ever = outcome
            .history
            .iter()
            .map(|r| r.best)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(outcome.best_distance, best_ever);
        for record in &outcome.history {
            assert!(record.best <= record.mean && record.mean <= record.worst);
        }
    }

    #[tokio::test]
    async fn test_same_seed_same_result() {
        let matrix = random_matrix(15, 3);
        let config = small_config().with_pop_size(30).with_generations(25);

        let mut first = EvolutionEngine::new(Box::new(LocalTransport::new()), config.clone());
        let mut second = EvolutionEngine::new(Box::new(LocalTransport::new()), config);
        let a = first.run(matrix.clone()).await.unwrap();
        let b = second.run(matrix).await.unwrap();

        assert_eq!(a.best_route, b.best_route);
        assert_eq!(a.best_distance, b.best_distance);
    }

    #[tokio::test]
    async fn test_distributed_matches_local() {
        let matrix = random_matrix(10, 9);
        let config = small_config().with_pop_size(16);

        let mut local = EvolutionEngine::new(transport_for(0, tour_cost), config.clone());
        let mut distributed = EvolutionEngine::new(transport_for(3, tour_cost), config);
        assert_eq!(distributed.transport().worker_count(), 3);

        let a = local.run(matrix.clone()).await.unwrap();
        let b = distributed.run(matrix).await.unwrap();
        assert_eq!(a.best_route, b.best_route);
        assert_eq!(a.history, b.history);
    }

    #[tokio::test]
    async fn test_engine_reusable_across_runs() {
        let mut engine = EvolutionEngine::new(transport_for(2, tour_cost), small_config());
        let first = engine.run(square()).await.unwrap();
        let second = engine.run(random_matrix(6, 5)).await.unwrap();

        assert_eq!(first.best_distance, 80.0);
        assert_eq!(second.best_route.len(), 6);
    }

    #[tokio::test]
    async fn test_rejects_bad_config() {
        let mut engine = EvolutionEngine::new(
            Box::new(LocalTransport::new()),
            EvolutionConfig::new().with_pop_size(1),
        );
        let err = engine.run(square()).await.unwrap_err();
        assert!(matches!(
            err,
            EvolutionError::Config(CoreError::PopulationTooSmall { got: 1, .. })
        ));

        let tiny = Arc::new(DistanceMatrix::from_rows(vec![vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap());
        let mut engine = EvolutionEngine::new(Box::new(LocalTransport::new()), EvolutionConfig::new());
        let err = engine.run(tiny).await.unwrap_err();
        assert!(matches!(err, EvolutionError::Config(CoreError::TooFewCities { got: 2, .. })));
    }

    /// Drops the last result of every batch.
    struct ShortTransport(LocalTransport);

    #[async_trait]
    impl EvaluationTransport for ShortTransport {
        fn name(&self) -> &'static str {
            "short"
        }

        fn worker_count(&self) -> usize {
            0
        }

        async fn install_matrix(
            &mut self,
            matrix: Arc<DistanceMatrix>,
        ) -> std::result::Result<(), EvaluationError> {
            self.0.install_matrix(matrix).await
        }

        async fn map(
            &mut self,
            fitness: FitnessFn,
            tours: &[&[usize]],
        ) -> std::result::Result<Vec<f64>, EvaluationError> {
            let mut results = self.0.map(fitness, tours).await?;
            results.pop();
            Ok(results)
        }

        async fn finish_run(&mut self) -> std::result::Result<(), EvaluationError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_result_count_mismatch_is_fatal() {
        let mut engine = EvolutionEngine::new(
            Box::new(ShortTransport(LocalTransport::new())),
            small_config(),
        );
        let err = engine.run(square()).await.unwrap_err();
        assert!(matches!(
            err,
            EvolutionError::ResultCount { generation: 0, expected: 10, got: 9 }
        ));
    }

    fn broken_mutation(individual: &mut Individual, _rng: &mut StdRng) -> bool {
        let genes = individual.genes_mut();
        genes[0] = genes[1];
        true
    }

    #[tokio::test]
    async fn test_non_permutation_is_fatal() {
        let operators = Operators {
            mutate: broken_mutation,
            ..Operators::default()
        };
        let mut engine = EvolutionEngine::new(
            Box::new(LocalTransport::new()),
            small_config().with_mutation_rate(1.0),
        )
        .with_operators(operators);

        let err = engine.run(square()).await.unwrap_err();
        assert!(matches!(err, EvolutionError::InvalidIndividual { generation: 1, .. }));
    }
}
