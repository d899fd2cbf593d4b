//! C/F splitting of a level operator
//!
//! The splitting marks every row either as a coarse point (kept on the next
//! level) or a fine point (interpolated from coarse neighbours). It is an
//! intermediate artifact: once the prolongator has been built it is released
//! and, unless kept, evicted from the level.

use crate::parallel::parallel_map_indexed;
use crate::sparse::CsrMatrix;
use crate::traits::ComplexField;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Coarsening algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoarseningKind {
    /// Classical Ruge-Stüben coarsening
    #[default]
    RugeStuben,

    /// Parallel Modified Independent Set (PMIS).
    /// Better parallel scalability, may produce slightly larger coarse grids
    Pmis,
}

/// Point classification in coarsening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointType {
    /// Not classified yet
    Undecided,
    /// Coarse point (C-point)
    Coarse,
    /// Fine point (F-point)
    Fine,
}

/// Result of coarsening one level
#[derive(Debug, Clone)]
pub struct CoarseSplitting {
    /// Classification of every fine row
    pub point_types: Vec<PointType>,
    /// Fine index of each coarse point, in coarse order
    pub coarse_to_fine: Vec<usize>,
    /// Strong connections of every row
    pub strong: Vec<Vec<usize>>,
}

impl CoarseSplitting {
    /// Number of coarse points
    pub fn num_coarse(&self) -> usize {
        self.coarse_to_fine.len()
    }

    /// Number of fine rows the splitting was computed for
    pub fn num_fine(&self) -> usize {
        self.point_types.len()
    }

    /// Coarse index of each fine row (`None` for F-points)
    pub fn fine_to_coarse(&self) -> Vec<Option<usize>> {
        let mut map = vec![None; self.num_fine()];
        for (coarse, &fine) in self.coarse_to_fine.iter().enumerate() {
            map[fine] = Some(coarse);
        }
        map
    }
}

/// Split `matrix` into coarse and fine points
pub fn split<T: ComplexField>(
    matrix: &CsrMatrix<T>,
    kind: CoarseningKind,
    strong_threshold: f64,
) -> CoarseSplitting {
    let strong = strength_of_connection(matrix, strong_threshold);
    let point_types = match kind {
        CoarseningKind::RugeStuben => ruge_stuben(&strong),
        CoarseningKind::Pmis => pmis(&strong),
    };

    let coarse_to_fine = point_types
        .iter()
        .enumerate()
        .filter(|(_, pt)| **pt == PointType::Coarse)
        .map(|(i, _)| i)
        .collect();

    CoarseSplitting {
        point_types,
        coarse_to_fine,
        strong,
    }
}

/// Entry (i,j) is strong if |a_ij| >= θ * max_k!=i |a_ik|
pub fn strength_of_connection<T: ComplexField>(
    matrix: &CsrMatrix<T>,
    theta: f64,
) -> Vec<Vec<usize>> {
    let theta = T::real(theta);
    parallel_map_indexed(matrix.num_rows, |i| {
        let max_off_diag = matrix
            .row_entries(i)
            .filter(|&(j, _)| j != i)
            .map(|(_, val)| val.norm())
            .fold(T::Real::zero(), |a, b| if b > a { b } else { a });

        if max_off_diag == T::Real::zero() {
            return Vec::new();
        }

        let threshold = theta * max_off_diag;
        matrix
            .row_entries(i)
            .filter(|&(j, val)| j != i && val.norm() >= threshold)
            .map(|(j, _)| j)
            .collect()
    })
}

/// Classical Ruge-Stüben first pass
fn ruge_stuben(strong: &[Vec<usize>]) -> Vec<PointType> {
    let n = strong.len();
    let mut point_types = vec![PointType::Undecided; n];

    // Transposed strength: dependents[j] lists the rows that strongly depend on j
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, row) in strong.iter().enumerate() {
        for &j in row {
            dependents[j].push(i);
        }
    }

    // Influence measure λ_j = |S_j^T|, processed by decreasing value
    let lambda: Vec<usize> = dependents.iter().map(Vec::len).collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| lambda[b].cmp(&lambda[a]));

    for &i in &order {
        if point_types[i] != PointType::Undecided {
            continue;
        }
        point_types[i] = PointType::Coarse;

        for &j in &dependents[i] {
            if point_types[j] == PointType::Undecided {
                point_types[j] = PointType::Fine;
            }
        }
    }

    point_types
}

/// Parallel Modified Independent Set
fn pmis(strong: &[Vec<usize>]) -> Vec<PointType> {
    const MAX_ITERATIONS: usize = 100;

    let n = strong.len();
    let mut point_types = vec![PointType::Undecided; n];

    // |S_i| plus a deterministic tie-breaker
    let weights: Vec<f64> = (0..n)
        .map(|i| strong[i].len() as f64 + (i as f64 * 0.0001) % 0.001)
        .collect();

    for _ in 0..MAX_ITERATIONS {
        let previous = point_types.clone();
        let updates = parallel_map_indexed(n, |i| {
            if previous[i] != PointType::Undecided {
                return previous[i];
            }
            if strong[i].iter().any(|&j| previous[j] == PointType::Coarse) {
                return PointType::Fine;
            }
            let is_max = strong[i]
                .iter()
                .all(|&j| previous[j] != PointType::Undecided || weights[j] <= weights[i]);
            if is_max {
                PointType::Coarse
            } else {
                PointType::Undecided
            }
        });

        if updates == previous {
            break;
        }
        point_types = updates;
    }

    for pt in &mut point_types {
        if *pt == PointType::Undecided {
            *pt = PointType::Coarse;
        }
    }

    point_types
}
