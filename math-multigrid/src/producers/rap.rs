//! Restriction and Galerkin coarse operator

use crate::sparse::CsrMatrix;
use crate::traits::ComplexField;

/// R = P^T
pub fn build_restrictor<T: ComplexField>(p: &CsrMatrix<T>) -> CsrMatrix<T> {
    p.transpose()
}

/// Galerkin coarse operator A_c = R * A * P.
///
/// Without an explicit restrictor, P^T takes its place.
pub fn galerkin_product<T: ComplexField>(
    a: &CsrMatrix<T>,
    p: &CsrMatrix<T>,
    r: Option<&CsrMatrix<T>>,
) -> CsrMatrix<T> {
    let ap = a.matmul(p);
    match r {
        Some(r) => r.matmul(&ap),
        None => p.transpose().matmul(&ap),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producers::coarsening::tests::create_1d_laplacian;
    use approx::assert_relative_eq;

    fn injection(n_fine: usize) -> CsrMatrix<f64> {
        // Piecewise-constant aggregation of pairs
        let triplets = (0..n_fine).map(|i| (i, i / 2, 1.0)).collect();
        CsrMatrix::from_triplets(n_fine, n_fine / 2, triplets)
    }

    #[test]
    fn test_explicit_and_implicit_agree() {
        let a = create_1d_laplacian(8);
        let p = injection(8);
        let r = build_restrictor(&p);

        let explicit = galerkin_product(&a, &p, Some(&r)).to_dense();
        let implicit = galerkin_product(&a, &p, None).to_dense();
        for (x, y) in explicit.iter().zip(implicit.iter()) {
            assert_relative_eq!(*x, *y);
        }
    }

    #[test]
    fn test_pairwise_aggregation_of_laplacian() {
        let a = create_1d_laplacian(8);
        let ac = galerkin_product(&a, &injection(8), None);

        assert_eq!(ac.num_rows, 4);
        assert_relative_eq!(ac.get(0, 0), 2.0);
        assert_relative_eq!(ac.get(1, 1), 2.0);
        assert_relative_eq!(ac.get(1, 0), -1.0);
        assert_relative_eq!(ac.get(0, 2), 0.0);
        assert_relative_eq!(ac.get(3, 3), 2.0);
    }
}
