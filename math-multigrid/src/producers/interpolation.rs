//! Prolongator construction from a C/F splitting

use super::coarsening::{CoarseSplitting, PointType};
use crate::sparse::CsrMatrix;
use crate::traits::ComplexField;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Interpolation operator type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterpolationKind {
    /// Direct interpolation from strong C-neighbours, with weak connections
    /// lumped into the weights
    #[default]
    Standard,

    /// Adds distance-2 contributions through strong F-neighbours
    Extended,

    /// Only immediate strong C-neighbours
    Direct,
}

/// Settings consumed by [`build_prolongator`]
#[derive(Debug, Clone, Copy)]
pub struct InterpolationSettings {
    /// Interpolation formula
    pub kind: InterpolationKind,
    /// Drop weights below `trunc_factor * max |w|`
    pub trunc_factor: f64,
    /// Maximum stencil size per row
    pub max_elements: usize,
}

/// Build P (fine rows × coarse columns)
pub fn build_prolongator<T: ComplexField>(
    matrix: &CsrMatrix<T>,
    splitting: &CoarseSplitting,
    settings: &InterpolationSettings,
) -> CsrMatrix<T> {
    let n_fine = matrix.num_rows;
    let fine_to_coarse = splitting.fine_to_coarse();
    let tol = T::real(1e-15);

    let mut triplets: Vec<(usize, usize, T)> = Vec::new();

    for i in 0..n_fine {
        match splitting.point_types[i] {
            PointType::Coarse => {
                if let Some(coarse) = fine_to_coarse[i] {
                    triplets.push((i, coarse, T::one()));
                }
            }
            PointType::Fine => {
                let a_ii = matrix.get(i, i);
                if a_ii.norm() <= tol {
                    continue;
                }
                let a_ii_inv = a_ii.inv();

                let c_neighbors: Vec<usize> = splitting.strong[i]
                    .iter()
                    .copied()
                    .filter(|&j| splitting.point_types[j] == PointType::Coarse)
                    .collect();

                let mut weights: Vec<(usize, T)> = c_neighbors
                    .iter()
                    .filter_map(|&j| fine_to_coarse[j].map(|c| (c, -matrix.get(i, j) * a_ii_inv)))
                    .collect();

                match settings.kind {
                    InterpolationKind::Direct => {}
                    InterpolationKind::Standard => {
                        let sum_weights = weights.iter().fold(T::zero(), |acc, (_, w)| acc + *w);
                        let weak_sum = matrix
                            .row_entries(i)
                            .filter(|(j, _)| *j != i && !c_neighbors.contains(j))
                            .fold(T::zero(), |acc, (_, v)| acc + v);

                        // a_ii * sum_weights == -sum_C a_ij, so scale == 1 + weak / sum_C
                        if sum_weights.norm() > tol && weak_sum.norm() > tol {
                            let scale = T::one() - weak_sum * (a_ii * sum_weights).inv();
                            for (_, w) in &mut weights {
                                *w *= scale;
                            }
                        }
                    }
                    InterpolationKind::Extended => {
                        add_distance_two(matrix, splitting, &fine_to_coarse, i, &mut weights);
                    }
                }

                truncate(&mut weights, settings);
                for (coarse, w) in weights {
                    triplets.push((i, coarse, w));
                }
            }
            PointType::Undecided => {}
        }
    }

    CsrMatrix::from_triplets(n_fine, splitting.num_coarse(), triplets)
}

/// F-neighbours k of i contribute `-a_ik a_kj / (a_ii a_kk)` for each strong C-point j of k
fn add_distance_two<T: ComplexField>(
    matrix: &CsrMatrix<T>,
    splitting: &CoarseSplitting,
    fine_to_coarse: &[Option<usize>],
    i: usize,
    weights: &mut Vec<(usize, T)>,
) {
    let tol = T::real(1e-15);
    let a_ii = matrix.get(i, i);

    for &k in &splitting.strong[i] {
        if splitting.point_types[k] != PointType::Fine {
            continue;
        }
        let a_kk = matrix.get(k, k);
        if a_kk.norm() < tol {
            continue;
        }
        let a_ik = matrix.get(i, k);
        let denom_inv = (a_ii * a_kk).inv();

        for &j in &splitting.strong[k] {
            let Some(coarse_j) = fine_to_coarse[j] else {
                continue;
            };
            let w = -a_ik * matrix.get(k, j) * denom_inv;
            match weights.iter_mut().find(|(idx, _)| *idx == coarse_j) {
                Some((_, existing)) => *existing += w,
                None => weights.push((coarse_j, w)),
            }
        }
    }
}

/// Drop small weights, then keep at most `max_elements` of the largest
fn truncate<T: ComplexField>(weights: &mut Vec<(usize, T)>, settings: &InterpolationSettings) {
    if settings.trunc_factor > 0.0 {
        let max_w = weights
            .iter()
            .map(|(_, w)| w.norm())
            .fold(T::Real::zero(), |a, b| if b > a { b } else { a });
        let threshold = T::real(settings.trunc_factor) * max_w;
        weights.retain(|(_, w)| w.norm() >= threshold);
    }

    if weights.len() > settings.max_elements {
        weights.sort_by(|a, b| {
            b.1.norm()
                .partial_cmp(&a.1.norm())
                .unwrap_or(Ordering::Equal)
        });
        weights.truncate(settings.max_elements);
    }
}
