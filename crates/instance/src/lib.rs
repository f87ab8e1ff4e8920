//! TSP instance model.
//!
//! A [`Tsp`] bundles everything the solver needs to know about one problem
//! instance: the dense weight matrix and a per-city nearest-neighbour table
//! sorted by weight. Instances are built either from city coordinates (with
//! one of the TSPLIB distance functions) or from an explicit weight matrix,
//! or read from a TSPLIB file via [`load_tsp`].

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use thiserror::Error;

pub mod loader;
pub mod population;
pub mod two_opt;

pub use crate::loader::load_tsp;
pub use crate::population::PopulationInitializer;
pub use crate::two_opt::TwoOpt;

#[derive(Error, Debug)]
pub enum Error {
    #[error("error while reading TSP file")]
    IoError {
        #[from]
        source: std::io::Error,
    },
    #[error("malformed TSP input at line {line}: {message}")]
    ParseError { line: usize, message: String },
    #[error("unsupported edge weight type: {0}")]
    UnsupportedWeightType(String),
    #[error("expected {expected} cities, found {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// TSPLIB edge weight function.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DistanceType {
    Euc2d,
    Att,
    /// Weights were given directly, not derived from coordinates.
    Explicit,
}

impl fmt::Display for DistanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistanceType::Euc2d => "EUC_2D",
            DistanceType::Att => "ATT",
            DistanceType::Explicit => "EXPLICIT",
        };
        f.write_str(name)
    }
}

impl FromStr for DistanceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "EUC_2D" => Ok(DistanceType::Euc2d),
            "ATT" => Ok(DistanceType::Att),
            "EXPLICIT" => Ok(DistanceType::Explicit),
            other => Err(Error::UnsupportedWeightType(other.to_string())),
        }
    }
}

/// Rounded Euclidean distance (TSPLIB `EUC_2D`).
pub fn euc_2d(x1: f64, y1: f64, x2: f64, y2: f64) -> i64 {
    let dx = x1 - x2;
    let dy = y1 - y2;
    ((dx * dx + dy * dy).sqrt() + 0.5) as i64
}

/// Pseudo-Euclidean distance (TSPLIB `ATT`).
pub fn att(x1: f64, y1: f64, x2: f64, y2: f64) -> i64 {
    let dx = x1 - x2;
    let dy = y1 - y2;
    let rij = ((dx * dx + dy * dy) / 10.0).sqrt();
    let tij = (rij + 0.5).floor() as i64;
    if (tij as f64) < rij {
        tij + 1
    } else {
        tij
    }
}

/// One TSP instance: weights plus the derived nearest-neighbour table.
pub struct Tsp {
    pub name: String,
    pub distance_type: DistanceType,
    city_count: usize,
    weights: Vec<i64>,
    nn_list: Vec<Vec<usize>>,
}

impl Tsp {
    /// Builds an instance from city coordinates, applying `distance_type`
    /// to every pair. Matrix and neighbour rows are filled in parallel.
    pub fn from_coords(
        name: impl Into<String>,
        distance_type: DistanceType,
        coords: &[(f64, f64)],
    ) -> Self {
        let n = coords.len();
        let weights: Vec<i64> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                let (x1, y1) = coords[i];
                (0..n).map(move |j| {
                    if i == j {
                        0
                    } else {
                        let (x2, y2) = coords[j];
                        match distance_type {
                            DistanceType::Euc2d => euc_2d(x1, y1, x2, y2),
                            DistanceType::Att => att(x1, y1, x2, y2),
                            DistanceType::Explicit => 0,
                        }
                    }
                })
            })
            .collect();

        Self::from_weights(name, distance_type, n, weights)
    }

    /// Builds an instance from an explicit row-major weight matrix.
    pub fn from_matrix(name: impl Into<String>, n: usize, weights: Vec<i64>) -> Self {
        assert_eq!(weights.len(), n * n, "weight matrix must be n x n");
        Self::from_weights(name, DistanceType::Explicit, n, weights)
    }

    fn from_weights(
        name: impl Into<String>,
        distance_type: DistanceType,
        n: usize,
        weights: Vec<i64>,
    ) -> Self {
        // Full rows, sorted by weight with the city index as tie-breaker so
        // identical inputs always produce identical tables.
        let nn_list: Vec<Vec<usize>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let mut row: Vec<usize> = (0..n).filter(|&j| j != i).collect();
                row.sort_by_key(|&j| (weights[i * n + j], j));
                row
            })
            .collect();

        Tsp {
            name: name.into(),
            distance_type,
            city_count: n,
            weights,
            nn_list,
        }
    }

    pub fn city_count(&self) -> usize {
        self.city_count
    }

    #[inline]
    pub fn weight(&self, i: usize, j: usize) -> i64 {
        self.weights[i * self.city_count + j]
    }

    /// All other cities, nearest first.
    #[inline]
    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.nn_list[i]
    }

    /// The k-th nearest neighbour of city `i`.
    #[inline]
    pub fn nn(&self, i: usize, k: usize) -> usize {
        self.nn_list[i][k]
    }

    /// Length of the closed tour visiting `path` in order.
    pub fn tour_length(&self, path: &[usize]) -> i64 {
        let n = path.len();
        (0..n).map(|i| self.weight(path[i], path[(i + 1) % n])).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euc_2d_rounds_to_nearest() {
        assert_eq!(euc_2d(0.0, 0.0, 3.0, 4.0), 5);
        assert_eq!(euc_2d(0.0, 0.0, 1.0, 1.0), 1); // sqrt(2) = 1.41 rounds down
        assert_eq!(euc_2d(0.0, 0.0, 1.2, 1.2), 2); // 1.697 rounds up
    }

    #[test]
    fn att_rounds_up_when_below_radius() {
        // r = sqrt(100/10) = sqrt(10) = 3.162..., t = 3 < r => 4
        assert_eq!(att(0.0, 0.0, 10.0, 0.0), 4);
        // r = sqrt(40/10) = 2.0, t = 2 => 2
        assert_eq!(att(0.0, 0.0, 2.0, 6.0), 2);
    }

    #[test]
    fn nn_table_is_sorted_by_weight() {
        let coords = [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (5.0, 5.0)];
        let tsp = Tsp::from_coords("square", DistanceType::Euc2d, &coords);

        assert_eq!(tsp.city_count(), 4);
        assert_eq!(tsp.neighbors(0).len(), 3);
        assert_eq!(tsp.nn(0, 0), 1);
        let row = tsp.neighbors(0);
        for w in row.windows(2) {
            assert!(tsp.weight(0, w[0]) <= tsp.weight(0, w[1]));
        }
    }

    #[test]
    fn tour_length_closes_the_cycle() {
        let coords = [(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)];
        let tsp = Tsp::from_coords("square", DistanceType::Euc2d, &coords);
        assert_eq!(tsp.tour_length(&[0, 1, 2, 3]), 40);
        // crossing tour pays two rounded diagonals
        assert_eq!(tsp.tour_length(&[0, 2, 1, 3]), 48);
    }
}
