//! Genetic operators over permutation-encoded tours.
//!
//! Operators are plain function pointers collected in [`Operators`] and
//! handed to the engine at construction; nothing is registered at runtime.

use rand::rngs::StdRng;
use rand::Rng;
use salesman_core::{tour_cost, FitnessFn, Individual, Population, UNFIT};

/// Individuals sampled per tournament.
pub const TOURNAMENT_SIZE: usize = 3;

/// Per-gene probability that [`shuffle_indexes`] swaps a position.
pub const GENE_SWAP_PROBABILITY: f64 = 0.05;

/// Picks `count` parents from a population, with replacement.
pub type SelectFn = fn(&[Individual], usize, &mut StdRng) -> Population;

/// Recombines two parents in place into two children.
pub type CrossoverFn = fn(&mut Individual, &mut Individual, &mut StdRng);

/// Mutates one individual in place. Returns whether any gene moved.
pub type MutateFn = fn(&mut Individual, &mut StdRng) -> bool;

/// The operator set the engine evolves with.
#[derive(Clone, Copy)]
pub struct Operators {
    /// Parent selection
    pub select: SelectFn,
    /// Recombination
    pub crossover: CrossoverFn,
    /// Mutation
    pub mutate: MutateFn,
    /// Fitness
    pub evaluate: FitnessFn,
}

impl Default for Operators {
    fn default() -> Self {
        Self {
            select: select_tournament,
            crossover: ordered_crossover,
            mutate: shuffle_indexes,
            evaluate: tour_cost,
        }
    }
}

impl Operators {
    /// Replace the fitness function.
    pub fn with_evaluate(mut self, evaluate: FitnessFn) -> Self {
        self.evaluate = evaluate;
        self
    }
}

fn cost(individual: &Individual) -> f64 {
    individual.fitness().unwrap_or(UNFIT)
}

/// Tournament selection: for each slot, sample [`TOURNAMENT_SIZE`]
/// individuals uniformly and keep a copy of the cheapest.
pub fn select_tournament(population: &[Individual], count: usize, rng: &mut StdRng) -> Population {
    if population.is_empty() {
        return Vec::new();
    }

    (0..count)
        .map(|_| {
            let mut winner = &population[rng.gen_range(0..population.len())];
            for _ in 1..TOURNAMENT_SIZE {
                let challenger = &population[rng.gen_range(0..population.len())];
                if cost(challenger) < cost(winner) {
                    winner = challenger;
                }
            }
            winner.clone()
        })
        .collect()
}

/// Ordered crossover.
///
/// A random slice `lo..=hi` is kept positionally from one parent; the other
/// positions are filled, starting after the slice and wrapping around, with
/// the remaining genes in the order they appear in the other parent.
pub fn ordered_crossover(first: &mut Individual, second: &mut Individual, rng: &mut StdRng) {
    let len = first.len();
    if len < 2 || second.len() != len {
        return;
    }

    let mut lo = rng.gen_range(0..len);
    let mut hi = rng.gen_range(0..len - 1);
    if hi >= lo {
        hi += 1;
    } else {
        std::mem::swap(&mut lo, &mut hi);
    }

    let child_a = ordered_child(first.genes(), second.genes(), lo, hi);
    let child_b = ordered_child(second.genes(), first.genes(), lo, hi);
    first.genes_mut().copy_from_slice(&child_a);
    second.genes_mut().copy_from_slice(&child_b);
}

fn ordered_child(keep: &[usize], fill: &[usize], lo: usize, hi: usize) -> Vec<usize> {
    let len = keep.len();
    let mut taken = vec![false; len];
    for &gene in &keep[lo..=hi] {
        taken[gene] = true;
    }

    let mut child = keep.to_vec();
    let mut slot = (hi + 1) % len;
    for offset in 0..len {
        let gene = fill[(hi + 1 + offset) % len];
        if taken[gene] {
            continue;
        }
        child[slot] = gene;
        taken[gene] = true;
        slot = (slot + 1) % len;
    }
    child
}

/// Index-shuffling mutation with the default per-gene probability.
pub fn shuffle_indexes(individual: &mut Individual, rng: &mut StdRng) -> bool {
    shuffle_indexes_with(individual, GENE_SWAP_PROBABILITY, rng)
}

/// Swap each position, with probability `per_gene`, with a different
/// random position. The cached fitness survives if nothing moved.
pub fn shuffle_indexes_with(individual: &mut Individual, per_gene: f64, rng: &mut StdRng) -> bool {
    let len = individual.len();
    if len < 2 {
        return false;
    }

    let mut swaps = Vec::new();
    for i in 0..len {
        if rng.gen::<f64>() < per_gene {
            let mut j = rng.gen_range(0..len - 1);
            if j >= i {
                j += 1;
            }
            swaps.push((i, j));
        }
    }

    if swaps.is_empty() {
        return false;
    }
    let genes = individual.genes_mut();
    for (i, j) in swaps {
        genes.swap(i, j);
    }
    true
}
