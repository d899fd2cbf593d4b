//! Core traits for linear algebra operations
//!
//! The hierarchy consumes the algebra through three abstractions:
//! - [`ComplexField`]: scalar types (complex and real numbers)
//! - [`LinearOperator`]: matrix-like objects with map-aware, scaled products
//! - [`Preconditioner`]: anything approximating A^(-1), including a full hierarchy

use crate::error::{MultigridError, Result};
use crate::map::Map;
use crate::vector::Vector;
use ndarray::{Array1, Zip};
use num_complex::{Complex, Complex32, Complex64};
use num_traits::{Float, FromPrimitive, NumAssign, One, ToPrimitive, Zero};
use std::fmt::Debug;
use std::ops::Neg;

/// Trait for scalar types that can be used in linear algebra operations.
///
/// Provided for `Complex64`, `Complex32`, `f64` and `f32`.
pub trait ComplexField:
    NumAssign + Clone + Copy + Send + Sync + Debug + Zero + One + Neg<Output = Self> + 'static
{
    /// The real number type underlying this field
    type Real: Float + NumAssign + FromPrimitive + ToPrimitive + Send + Sync + Debug + 'static;

    /// Complex conjugate
    fn conj(&self) -> Self;

    /// Squared magnitude |z|²
    fn norm_sqr(&self) -> Self::Real;

    /// Magnitude |z|
    fn norm(&self) -> Self::Real {
        self.norm_sqr().sqrt()
    }

    /// Create from a real value
    fn from_real(r: Self::Real) -> Self;

    /// Real part
    fn re(&self) -> Self::Real;

    /// Imaginary part
    fn im(&self) -> Self::Real;

    /// Multiplicative inverse (1/z)
    fn inv(&self) -> Self;

    /// Convert an `f64` constant into the real type
    fn real(value: f64) -> Self::Real {
        Self::Real::from_f64(value).unwrap_or_else(Self::Real::zero)
    }
}

macro_rules! impl_real_field {
    ($($t:ty),*) => {$(
        impl ComplexField for $t {
            type Real = $t;

            #[inline]
            fn conj(&self) -> Self {
                *self
            }

            #[inline]
            fn norm_sqr(&self) -> $t {
                *self * *self
            }

            #[inline]
            fn norm(&self) -> $t {
                self.abs()
            }

            #[inline]
            fn from_real(r: $t) -> Self {
                r
            }

            #[inline]
            fn re(&self) -> $t {
                *self
            }

            #[inline]
            fn im(&self) -> $t {
                0.0
            }

            #[inline]
            fn inv(&self) -> Self {
                self.recip()
            }
        }
    )*};
}

macro_rules! impl_complex_field {
    ($($t:ty => $r:ty),*) => {$(
        impl ComplexField for $t {
            type Real = $r;

            #[inline]
            fn conj(&self) -> Self {
                Complex::<$r>::conj(self)
            }

            #[inline]
            fn norm_sqr(&self) -> $r {
                Complex::<$r>::norm_sqr(self)
            }

            #[inline]
            fn from_real(r: $r) -> Self {
                Complex::<$r>::new(r, 0.0)
            }

            #[inline]
            fn re(&self) -> $r {
                self.re
            }

            #[inline]
            fn im(&self) -> $r {
                self.im
            }

            #[inline]
            fn inv(&self) -> Self {
                Complex::<$r>::inv(self)
            }
        }
    )*};
}

impl_real_field!(f64, f32);
impl_complex_field!(Complex64 => f64, Complex32 => f32);

/// Whether an operator is applied as is or transposed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    /// y = A x
    NoTrans,
    /// y = A^T x
    Trans,
}

/// Trait for linear operators (matrices) that can perform matrix-vector products.
///
/// Besides the raw products on `Array1`, an operator exposes the maps describing
/// the layout of its domain and range. The map-aware entry points check those
/// maps against the vectors they are handed before touching any data.
pub trait LinearOperator<T: ComplexField>: Send + Sync {
    /// Number of rows in the operator
    fn num_rows(&self) -> usize;

    /// Number of columns in the operator
    fn num_cols(&self) -> usize;

    /// Apply the operator: y = A * x
    fn apply(&self, x: &Array1<T>) -> Array1<T>;

    /// Apply the transpose: y = A^T * x
    fn apply_transpose(&self, x: &Array1<T>) -> Array1<T>;

    /// Layout of the vectors this operator acts on
    fn domain_map(&self) -> Map {
        Map::contiguous(self.num_cols())
    }

    /// Layout of the vectors this operator produces
    fn range_map(&self) -> Map {
        Map::contiguous(self.num_rows())
    }

    /// Check if the operator is square
    fn is_square(&self) -> bool {
        self.num_rows() == self.num_cols()
    }

    /// Scaled product `y = alpha * op(A) * x + beta * y`.
    ///
    /// With `beta == 0` the previous content of `y` is ignored entirely.
    fn apply_scaled(
        &self,
        x: &Vector<T>,
        y: &mut Vector<T>,
        mode: Transpose,
        alpha: T,
        beta: T,
    ) -> Result<()> {
        let (input, output) = match mode {
            Transpose::NoTrans => (self.domain_map(), self.range_map()),
            Transpose::Trans => (self.range_map(), self.domain_map()),
        };
        if !input.is_compatible(x.map()) {
            return Err(MultigridError::IncompatibleOperands(format!(
                "operator input map {input:?} is not compatible with x map {:?}",
                x.map()
            )));
        }
        if !output.is_compatible(y.map()) {
            return Err(MultigridError::IncompatibleOperands(format!(
                "operator output map {output:?} is not compatible with y map {:?}",
                y.map()
            )));
        }

        let ax = match mode {
            Transpose::NoTrans => self.apply(x.values()),
            Transpose::Trans => self.apply_transpose(x.values()),
        };

        if beta == T::zero() {
            Zip::from(y.values_mut())
                .and(&ax)
                .for_each(|yi, &axi| *yi = alpha * axi);
        } else {
            Zip::from(y.values_mut())
                .and(&ax)
                .for_each(|yi, &axi| *yi = alpha * axi + beta * *yi);
        }
        Ok(())
    }

    /// Residual `r = b - A * x`, laid out like `b`
    fn residual(&self, x: &Vector<T>, b: &Vector<T>) -> Result<Vector<T>> {
        let mut r = b.clone();
        self.apply_scaled(x, &mut r, Transpose::NoTrans, -T::one(), T::one())?;
        Ok(r)
    }
}

/// Trait for preconditioners used in iterative solvers.
///
/// A preconditioner M approximates A^(-1), so that M*A is better conditioned
/// than A alone.
pub trait Preconditioner<T: ComplexField>: Send + Sync {
    /// Apply the preconditioner: y = M * r
    fn apply(&self, r: &Array1<T>) -> Array1<T>;
}

/// Identity preconditioner (no preconditioning)
#[derive(Clone, Debug, Default)]
pub struct IdentityPreconditioner;

impl<T: ComplexField> Preconditioner<T> for IdentityPreconditioner {
    fn apply(&self, r: &Array1<T>) -> Array1<T> {
        r.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::CsrMatrix;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_complex64_field() {
        let z = Complex64::new(3.0, 4.0);
        assert_relative_eq!(ComplexField::norm_sqr(&z), 25.0);
        assert_relative_eq!(ComplexField::norm(&z), 5.0);

        let z_conj = ComplexField::conj(&z);
        assert_relative_eq!(z_conj.im, -4.0);

        let product = z * ComplexField::inv(&z);
        assert_relative_eq!(product.re, 1.0, epsilon = 1e-12);
        assert_relative_eq!(product.im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_real_field() {
        let x: f64 = -3.0;
        assert_relative_eq!(ComplexField::norm(&x), 3.0);
        assert_relative_eq!(ComplexField::inv(&x), -1.0 / 3.0);
        assert_relative_eq!(<f32 as ComplexField>::real(0.5), 0.5f32);
    }

    #[test]
    fn test_apply_scaled_accumulates() {
        let a = CsrMatrix::from_diagonal(&array![2.0, 3.0]);
        let x = Vector::from_values(array![1.0, 1.0]);
        let mut y = Vector::from_values(array![10.0, 20.0]);

        a.apply_scaled(&x, &mut y, Transpose::NoTrans, 1.0, 1.0)
            .unwrap();
        assert_eq!(y.values(), &array![12.0, 23.0]);

        a.apply_scaled(&x, &mut y, Transpose::NoTrans, 2.0, 0.0)
            .unwrap();
        assert_eq!(y.values(), &array![4.0, 6.0]);
    }

    #[test]
    fn test_apply_scaled_checks_maps() {
        let a = CsrMatrix::<f64>::identity(3);
        let x = Vector::zeros(Map::contiguous(2));
        let mut y = Vector::zeros(Map::contiguous(3));

        let err = a
            .apply_scaled(&x, &mut y, Transpose::NoTrans, 1.0, 0.0)
            .unwrap_err();
        assert!(matches!(err, MultigridError::IncompatibleOperands(_)));
    }

    #[test]
    fn test_residual() {
        let a = CsrMatrix::from_diagonal(&array![2.0, 4.0]);
        let x = Vector::from_values(array![1.0, 1.0]);
        let b = Vector::from_values(array![3.0, 3.0]);

        let r = a.residual(&x, &b).unwrap();
        assert_eq!(r.values(), &array![1.0, -1.0]);
    }
}
