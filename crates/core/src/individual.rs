//! Candidate tours and the population that holds them.

use crate::{CoreError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A working set of individuals, evolved in place generation to generation.
pub type Population = Vec<Individual>;

/// A candidate tour: a permutation of `0..n` plus its cached fitness.
///
/// The cached fitness is dropped whenever the genes are borrowed mutably,
/// so a present fitness always belongs to the current tour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    genes: Vec<usize>,
    fitness: Option<f64>,
}

impl Individual {
    /// Wrap `genes`, rejecting anything that is not a permutation.
    pub fn from_genes(genes: Vec<usize>) -> Result<Self> {
        if !is_permutation(&genes, genes.len()) {
            return Err(CoreError::NotAPermutation { len: genes.len() });
        }
        Ok(Self { genes, fitness: None })
    }

    /// A uniformly random tour over `num_cities` cities.
    pub fn random<R: Rng + ?Sized>(num_cities: usize, rng: &mut R) -> Self {
        let mut genes: Vec<usize> = (0..num_cities).collect();
        genes.shuffle(rng);
        Self { genes, fitness: None }
    }

    /// The tour.
    pub fn genes(&self) -> &[usize] {
        &self.genes
    }

    /// Mutable access to the tour. Invalidates the cached fitness.
    pub fn genes_mut(&mut self) -> &mut [usize] {
        self.fitness = None;
        &mut self.genes
    }

    /// Take the tour out.
    pub fn into_genes(self) -> Vec<usize> {
        self.genes
    }

    /// Number of cities visited.
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    /// True for the empty tour.
    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Cached fitness, if still valid.
    pub fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    /// Whether the cached fitness is valid.
    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    /// Record an evaluation result.
    pub fn set_fitness(&mut self, fitness: f64) {
        self.fitness = Some(fitness);
    }

    /// Drop the cached fitness.
    pub fn invalidate(&mut self) {
        self.fitness = None;
    }

    /// Whether the genes still form a permutation of `0..len`.
    pub fn is_valid_permutation(&self) -> bool {
        is_permutation(&self.genes, self.genes.len())
    }
}

/// True if `genes` holds every value of `0..n` exactly once.
pub fn is_permutation(genes: &[usize], n: usize) -> bool {
    if genes.len() != n {
        return false;
    }
    let mut seen = vec![false; n];
    for &gene in genes {
        if gene >= n || seen[gene] {
            return false;
        }
        seen[gene] = true;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_is_permutation() {
        let mut rng = StdRng::seed_from_u64(1);
        for n in [1, 3, 17, 64] {
            let individual = Individual::random(n, &mut rng);
            assert!(individual.is_valid_permutation());
            assert_eq!(individual.len(), n);
            assert!(!individual.is_evaluated());
        }
    }

    #[test]
    fn test_from_genes_validates() {
        assert!(Individual::from_genes(vec![2, 0, 1]).is_ok());
        assert_eq!(
            Individual::from_genes(vec![0, 0, 1]),
            Err(CoreError::NotAPermutation { len: 3 })
        );
        assert!(Individual::from_genes(vec![0, 3, 1]).is_err());
    }

    #[test]
    fn test_genes_mut_invalidates_fitness() {
        let mut individual = Individual::from_genes(vec![0, 1, 2]).unwrap();
        individual.set_fitness(12.0);
        assert_eq!(individual.fitness(), Some(12.0));

        individual.genes_mut().swap(0, 2);
        assert_eq!(individual.fitness(), None);
        assert_eq!(individual.genes(), &[2, 1, 0]);
    }

    #[test]
    fn test_is_permutation_length_mismatch() {
        assert!(!is_permutation(&[0, 1], 3));
        assert!(is_permutation(&[], 0));
    }
}
