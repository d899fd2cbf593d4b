//! Map-aware vectors
//!
//! [`Vector`] pairs an `ndarray` buffer with the [`Map`] describing its layout.
//! All in-place operations check map compatibility first.

use crate::error::{MultigridError, Result};
use crate::map::Map;
use crate::traits::ComplexField;
use ndarray::{Array1, Zip};
use num_traits::{Float, Zero};

/// Dense vector laid out according to a [`Map`]
#[derive(Debug, Clone, PartialEq)]
pub struct Vector<T: ComplexField> {
    map: Map,
    values: Array1<T>,
}

impl<T: ComplexField> Vector<T> {
    /// Zero vector on `map`
    pub fn zeros(map: Map) -> Self {
        let values = Array1::from_elem(map.local_len(), T::zero());
        Self { map, values }
    }

    /// Wrap existing values on a contiguous map
    pub fn from_values(values: Array1<T>) -> Self {
        Self {
            map: Map::contiguous(values.len()),
            values,
        }
    }

    /// Wrap existing values on `map`
    pub fn with_map(map: Map, values: Array1<T>) -> Result<Self> {
        if values.len() != map.local_len() {
            return Err(MultigridError::IncompatibleOperands(format!(
                "{} values cannot be laid out on a map with {} local entries",
                values.len(),
                map.local_len()
            )));
        }
        Ok(Self { map, values })
    }

    /// Layout of this vector
    pub fn map(&self) -> &Map {
        &self.map
    }

    /// Local values
    pub fn values(&self) -> &Array1<T> {
        &self.values
    }

    /// Mutable local values
    pub fn values_mut(&mut self) -> &mut Array1<T> {
        &mut self.values
    }

    /// Consume the vector and return its values
    pub fn into_values(self) -> Array1<T> {
        self.values
    }

    /// Number of local entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no local entries
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Set every entry to `value`
    pub fn put_scalar(&mut self, value: T) {
        self.values.fill(value);
    }

    /// `self = alpha * x + beta * self`
    pub fn update(&mut self, alpha: T, x: &Vector<T>, beta: T) -> Result<()> {
        if !self.map.is_compatible(&x.map) {
            return Err(MultigridError::IncompatibleOperands(format!(
                "cannot update a vector on {:?} with a vector on {:?}",
                self.map, x.map
            )));
        }
        Zip::from(&mut self.values)
            .and(&x.values)
            .for_each(|yi, &xi| *yi = alpha * xi + beta * *yi);
        Ok(())
    }

    /// Euclidean norm
    pub fn norm2(&self) -> T::Real {
        self.values
            .iter()
            .fold(T::Real::zero(), |acc, v| acc + v.norm_sqr())
            .sqrt()
    }

    /// Relabel the layout without moving data.
    ///
    /// The new map must own the same number of local entries.
    pub fn replace_map(&mut self, map: Map) -> Result<()> {
        if map.local_len() != self.values.len() {
            return Err(MultigridError::IncompatibleOperands(format!(
                "cannot replace map {:?} by {:?}: local lengths differ",
                self.map, map
            )));
        }
        self.map = map;
        Ok(())
    }
}
