//! Recursive multigrid cycle

use super::Hierarchy;
use crate::error::{MultigridError, Result};
use crate::level::Level;
use crate::producers::{OPERATOR, POST_SMOOTHER, PRE_SMOOTHER, PROLONGATOR, RESTRICTOR};
use crate::smoothers::LevelSmoother;
use crate::sparse::CsrMatrix;
use crate::traits::{ComplexField, LinearOperator, Transpose};
use crate::vector::Vector;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shape of the recursion below each level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CycleType {
    /// One coarse correction per level
    #[default]
    V,
    /// Two coarse corrections per level
    W,
}

impl CycleType {
    fn coarse_visits(self) -> usize {
        match self {
            CycleType::V => 1,
            CycleType::W => 2,
        }
    }
}

impl<T: ComplexField> Hierarchy<T> {
    /// Apply `num_iterations` cycles starting at `start_level` to improve `x`
    /// as an approximate solution of `A x = b`.
    ///
    /// With `initial_guess_is_zero` the first smoother application ignores
    /// the content of `x`. A level holding a null operator returns at once.
    pub fn iterate(
        &self,
        b: &Vector<T>,
        num_iterations: usize,
        x: &mut Vector<T>,
        initial_guess_is_zero: bool,
        cycle: CycleType,
        start_level: usize,
    ) -> Result<()> {
        let fine = self.chain.get(start_level)?;
        let Some(a) = fine.get_operator(OPERATOR)? else {
            return Ok(());
        };

        let report = start_level == 0 && !self.is_preconditioner;
        if report && log::log_enabled!(log::Level::Info) {
            log::info!("iter:    0  residual = {:e}", residual_norm(&a, x, b)?);
        }

        let mut zero_guess = initial_guess_is_zero;
        for iteration in 1..=num_iterations {
            check_maps(start_level, &a, x, b)?;

            if start_level == self.chain.last_id() {
                self.coarse_solve(fine, x, b, zero_guess)?;
            } else {
                self.two_grid_step(fine, &a, x, b, zero_guess, cycle, start_level)?;
            }

            zero_guess = false;
            if report && log::log_enabled!(log::Level::Info) {
                log::info!(
                    "iter: {iteration:4}  residual = {:e}",
                    residual_norm(&a, x, b)?
                );
            }
        }
        Ok(())
    }

    fn coarse_solve(
        &self,
        level: &Level<T>,
        x: &mut Vector<T>,
        b: &Vector<T>,
        mut zero_guess: bool,
    ) -> Result<()> {
        let pre = smoother(level, PRE_SMOOTHER)?;
        let post = smoother(level, POST_SMOOTHER)?;

        if let Some(pre) = &pre {
            pre.apply(x, b, zero_guess)?;
            zero_guess = false;
        }
        if let Some(post) = &post {
            post.apply(x, b, zero_guess)?;
        }
        if pre.is_none() && post.is_none() {
            log::warn!("No coarse grid solver");
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn two_grid_step(
        &self,
        fine: &Level<T>,
        a: &CsrMatrix<T>,
        x: &mut Vector<T>,
        b: &Vector<T>,
        zero_guess: bool,
        cycle: CycleType,
        start_level: usize,
    ) -> Result<()> {
        let coarse_id = start_level + 1;
        let coarse = self.chain.get(coarse_id)?;

        match smoother(fine, PRE_SMOOTHER)? {
            Some(pre) => pre.apply(x, b, zero_guess)?,
            None => log::warn!("Level {start_level}: No PreSmoother!"),
        }

        let residual = a.residual(x, b)?;

        let p = required_operator(coarse, PROLONGATOR, coarse_id)?;
        let (orig_map, mut coarse_rhs) = if self.implicit_transpose {
            let map = p.domain_map();
            let mut rhs = Vector::zeros(map.clone());
            p.apply_scaled(&residual, &mut rhs, Transpose::Trans, T::one(), T::zero())?;
            (map, rhs)
        } else {
            let r = required_operator(coarse, RESTRICTOR, coarse_id)?;
            let map = r.range_map();
            let mut rhs = Vector::zeros(map.clone());
            r.apply_scaled(&residual, &mut rhs, Transpose::NoTrans, T::one(), T::zero())?;
            (map, rhs)
        };

        let mut coarse_x = Vector::zeros(orig_map.clone());
        let ac = if coarse.is_available(OPERATOR) {
            coarse.get_operator(OPERATOR)?
        } else {
            None
        };
        if let Some(ac) = ac {
            coarse_rhs.replace_map(ac.range_map())?;
            coarse_x.replace_map(ac.domain_map())?;
            coarse_x.put_scalar(T::zero());

            for visit in 0..cycle.coarse_visits() {
                self.iterate(&coarse_rhs, 1, &mut coarse_x, visit == 0, cycle, coarse_id)?;
            }
            coarse_x.replace_map(orig_map)?;
        }

        let mut correction = Vector::zeros(p.range_map());
        p.apply_scaled(&coarse_x, &mut correction, Transpose::NoTrans, T::one(), T::zero())?;
        x.update(T::one(), &correction, T::one())?;

        match smoother(fine, POST_SMOOTHER)? {
            Some(post) => post.apply(x, b, false)?,
            None => log::warn!("Level {start_level}: No PostSmoother!"),
        }
        Ok(())
    }
}

/// Smoother stored under `name`, if any
pub(super) fn smoother<T: ComplexField>(
    level: &Level<T>,
    name: &str,
) -> Result<Option<Arc<LevelSmoother<T>>>> {
    if level.is_available(name) {
        level.get_smoother(name).map(Some)
    } else {
        Ok(None)
    }
}

fn required_operator<T: ComplexField>(
    level: &Level<T>,
    name: &str,
    level_id: usize,
) -> Result<Arc<CsrMatrix<T>>> {
    level.get_operator(name)?.ok_or_else(|| {
        MultigridError::PreconditionViolation(format!("Level {level_id}: '{name}' is a null operator"))
    })
}

fn check_maps<T: ComplexField>(
    level_id: usize,
    a: &CsrMatrix<T>,
    x: &Vector<T>,
    b: &Vector<T>,
) -> Result<()> {
    if !a.domain_map().is_compatible(x.map()) {
        return Err(MultigridError::IncompatibleOperands(format!(
            "Level {level_id}: level A's domain map is not compatible with X"
        )));
    }
    if !a.range_map().is_compatible(b.map()) {
        return Err(MultigridError::IncompatibleOperands(format!(
            "Level {level_id}: level A's range map is not compatible with B"
        )));
    }
    Ok(())
}

fn residual_norm<T: ComplexField>(a: &CsrMatrix<T>, x: &Vector<T>, b: &Vector<T>) -> Result<f64> {
    Ok(a.residual(x, b)?.norm2().to_f64().unwrap_or(f64::NAN))
}
