//! Distance matrix - the read-only cost grid shared by every node of a run.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Side length of the square random cities are scattered in.
pub const MAP_SIZE: f64 = 1000.0;

/// Errors raised while building a distance matrix.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatrixError {
    /// No rows at all
    #[error("distance matrix is empty")]
    Empty,

    /// A row whose length differs from the number of rows
    #[error("distance matrix is not square: row {row} has {len} columns, expected {expected}")]
    NotSquare {
        /// Offending row
        row: usize,
        /// Its length
        len: usize,
        /// Number of rows
        expected: usize,
    },

    /// Negative, NaN or infinite distance
    #[error("invalid distance {value} at ({row}, {col})")]
    InvalidEntry {
        /// Row of the entry
        row: usize,
        /// Column of the entry
        col: usize,
        /// The rejected value
        value: f64,
    },
}

/// Square, non-negative travel cost grid. `distance(i, j)` is the cost of
/// going from city `i` to city `j`; the grid need not be symmetric.
///
/// Serialized as a list of rows so it travels over the wire unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct DistanceMatrix {
    size: usize,
    cells: Vec<f64>,
}

impl DistanceMatrix {
    /// Build a matrix from rows, rejecting anything that is not square or
    /// holds a negative / non-finite value.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, MatrixError> {
        let size = rows.len();
        if size == 0 {
            return Err(MatrixError::Empty);
        }

        let mut cells = Vec::with_capacity(size * size);
        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != size {
                return Err(MatrixError::NotSquare {
                    row,
                    len: values.len(),
                    expected: size,
                });
            }
            for (col, value) in values.into_iter().enumerate() {
                if !value.is_finite() || value < 0.0 {
                    return Err(MatrixError::InvalidEntry { row, col, value });
                }
                cells.push(value);
            }
        }

        Ok(Self { size, cells })
    }

    /// Scatter `num_cities` cities uniformly over a `MAP_SIZE` square and
    /// use their Euclidean distances.
    pub fn random_euclidean<R: Rng + ?Sized>(num_cities: usize, rng: &mut R) -> Self {
        let coords: Vec<(f64, f64)> = (0..num_cities)
            .map(|_| (rng.gen::<f64>() * MAP_SIZE, rng.gen::<f64>() * MAP_SIZE))
            .collect();

        let mut cells = Vec::with_capacity(num_cities * num_cities);
        for &(xi, yi) in &coords {
            for &(xj, yj) in &coords {
                cells.push(((xi - xj).powi(2) + (yi - yj).powi(2)).sqrt());
            }
        }

        Self {
            size: num_cities,
            cells,
        }
    }

    /// Number of cities.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Cost of travelling `from` → `to`.
    ///
    /// Panics if either index is out of range.
    pub fn distance(&self, from: usize, to: usize) -> f64 {
        assert!(from < self.size && to < self.size, "city index out of range");
        self.cells[from * self.size + to]
    }

    /// Copy the grid back out as rows.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.cells.chunks(self.size).map(<[f64]>::to_vec).collect()
    }
}

impl TryFrom<Vec<Vec<f64>>> for DistanceMatrix {
    type Error = MatrixError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

impl From<DistanceMatrix> for Vec<Vec<f64>> {
    fn from(matrix: DistanceMatrix) -> Self {
        matrix.to_rows()
    }
}
