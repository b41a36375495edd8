//! Best-so-far tracker.

use salesman_core::Individual;

/// Keeps the single cheapest evaluated individual seen across all
/// generations. Ties keep the earlier one.
#[derive(Debug, Clone, Default)]
pub struct HallOfFame {
    best: Option<Individual>,
}

impl HallOfFame {
    /// Create an empty hall of fame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consider every evaluated individual in `population`.
    pub fn update(&mut self, population: &[Individual]) {
        for candidate in population {
            let Some(fitness) = candidate.fitness() else { continue };
            let better = match self.best.as_ref().and_then(Individual::fitness) {
                Some(current) => fitness < current,
                None => true,
            };
            if better {
                self.best = Some(candidate.clone());
            }
        }
    }

    /// The best individual so far.
    pub fn best(&self) -> Option<&Individual> {
        self.best.as_ref()
    }

    /// Take the best individual out.
    pub fn into_best(self) -> Option<Individual> {
        self.best
    }
}
