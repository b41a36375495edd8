//! Tour cost - the quantity the search minimises.

use crate::DistanceMatrix;

/// Signature of a fitness function: tour + matrix → cost.
pub type FitnessFn = fn(&[usize], &DistanceMatrix) -> f64;

/// Fitness reported for a tour that could not be evaluated.
pub const UNFIT: f64 = f64::INFINITY;

/// Closed-cycle cost: every consecutive leg plus the leg from the last city
/// back to the first.
pub fn tour_cost(tour: &[usize], matrix: &DistanceMatrix) -> f64 {
    let (Some(&first), Some(&last)) = (tour.first(), tour.last()) else {
        return 0.0;
    };

    tour.windows(2)
        .fold(matrix.distance(last, first), |total, leg| total + matrix.distance(leg[0], leg[1]))
}
