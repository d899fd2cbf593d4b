//! Request / release / build protocol between levels and producers
//!
//! Requesting an output of a producer that has not run yet declares the
//! producer's inputs, recursively. Building a producer builds the inputs that
//! are not available, computes, stores its outputs and releases its inputs.
//! Releasing the last request on a producer that never ran withdraws its
//! declared inputs in turn.

use super::Hierarchy;
use crate::error::{MultigridError, Result};
use crate::level::ArtifactValue;
use crate::producers::{
    InputLevel, LevelManager, OPERATOR, POST_SMOOTHER, PRE_SMOOTHER, PROLONGATOR, ProducerId,
    RESTRICTOR, SPLITTING, coarsening, interpolation, rap,
};
use crate::smoothers::{CoarseSolverKind, LevelSmoother};
use crate::sparse::CsrMatrix;
use crate::traits::ComplexField;
use std::sync::Arc;

impl<T: ComplexField> Hierarchy<T> {
    /// Request `name` generated by `producer` on level `level_id`
    pub fn request(&mut self, level_id: usize, name: &str, producer: ProducerId) -> Result<()> {
        let level = self.chain.get_mut(level_id)?;
        level.request_from(name, producer);

        let first_need = producer != ProducerId::NoFactory
            && !level.is_declared(producer)
            && !level.was_built(producer);
        if first_need {
            self.declare_inputs(level_id, producer)?;
        }
        Ok(())
    }

    /// Release one request on `name` generated by `producer`
    pub fn release(&mut self, level_id: usize, name: &str, producer: ProducerId) -> Result<()> {
        let level = self.chain.get_mut(level_id)?;
        level.release_from(name, producer)?;

        if producer != ProducerId::NoFactory && level.demand(producer) == 0 {
            self.withdraw_inputs(level_id, producer)?;
        }
        Ok(())
    }

    /// Run `producer` on level `level_id`, building missing inputs first
    pub fn build(&mut self, level_id: usize, producer: ProducerId) -> Result<()> {
        if producer == ProducerId::NoFactory {
            return Err(MultigridError::PreconditionViolation(
                "user data cannot be built".to_string(),
            ));
        }
        if !self.chain.get(level_id)?.is_declared(producer) {
            self.declare_inputs(level_id, producer)?;
        }

        let mut built: Vec<(usize, ProducerId)> = Vec::new();
        for input in producer.inputs(self.implicit_transpose) {
            let at = self.input_level(level_id, input.at)?;
            if self.chain.get(at)?.is_available_from(input.name, input.producer) {
                continue;
            }
            if input.producer == ProducerId::NoFactory {
                return Err(MultigridError::NotAvailable {
                    name: input.name.to_string(),
                    producer: input.producer,
                    level: Some(at),
                });
            }
            if !built.contains(&(at, input.producer)) {
                self.build(at, input.producer)?;
                built.push((at, input.producer));
            }
        }

        log::debug!("Level {level_id}: building {}", producer.label());
        self.produce(level_id, producer)?;
        self.chain.get_mut(level_id)?.mark_built(producer);

        self.withdraw_inputs(level_id, producer)
    }

    fn declare_inputs(&mut self, level_id: usize, producer: ProducerId) -> Result<()> {
        let inputs = producer.inputs(self.implicit_transpose);
        self.chain
            .get_mut(level_id)?
            .declare(producer, inputs.clone());
        for input in inputs {
            let at = self.input_level(level_id, input.at)?;
            self.request(at, input.name, input.producer)?;
        }
        Ok(())
    }

    fn withdraw_inputs(&mut self, level_id: usize, producer: ProducerId) -> Result<()> {
        let Some(inputs) = self.chain.get_mut(level_id)?.take_declared(producer) else {
            return Ok(());
        };
        for input in inputs {
            let at = self.input_level(level_id, input.at)?;
            self.release(at, input.name, input.producer)?;
        }
        Ok(())
    }

    fn input_level(&self, level_id: usize, at: InputLevel) -> Result<usize> {
        match at {
            InputLevel::Same => Ok(level_id),
            InputLevel::Fine => self.chain.get(level_id)?.previous().ok_or_else(|| {
                MultigridError::PreconditionViolation(format!(
                    "Level {level_id} has no finer level to read inputs from"
                ))
            }),
        }
    }

    fn manager(&self, level_id: usize) -> Result<LevelManager> {
        self.chain.get(level_id)?.manager().cloned().ok_or_else(|| {
            MultigridError::PreconditionViolation(format!(
                "Level {level_id} has no level manager attached"
            ))
        })
    }

    fn operator_on(
        &self,
        level_id: usize,
        name: &str,
        producer: ProducerId,
    ) -> Result<Arc<CsrMatrix<T>>> {
        self.chain
            .get(level_id)?
            .get_operator_from(name, producer)?
            .ok_or_else(|| {
                MultigridError::PreconditionViolation(format!(
                    "Level {level_id}: '{name}' is a null operator"
                ))
            })
    }

    /// Compute the outputs of `producer` and store them on `level_id`
    fn produce(&mut self, level_id: usize, producer: ProducerId) -> Result<()> {
        match producer {
            ProducerId::NoFactory => Ok(()),
            ProducerId::Coarsening => {
                let manager = self.manager(level_id)?;
                let a = self.operator_on(level_id, OPERATOR, ProducerId::NoFactory)?;
                let splitting =
                    coarsening::split(&a, manager.coarsening, manager.strong_threshold);
                log::debug!(
                    "Level {level_id}: {:?} selected {} coarse points out of {}",
                    manager.coarsening,
                    splitting.num_coarse(),
                    splitting.num_fine()
                );
                self.store(level_id, SPLITTING, producer, splitting)
            }
            ProducerId::Prolongator => {
                let manager = self.manager(level_id)?;
                let fine = self.input_level(level_id, InputLevel::Fine)?;
                let a = self.operator_on(fine, OPERATOR, ProducerId::NoFactory)?;
                let splitting = self
                    .chain
                    .get(fine)?
                    .get_splitting_from(SPLITTING, ProducerId::Coarsening)?;
                let p = interpolation::build_prolongator(
                    &a,
                    &splitting,
                    &manager.interpolation_settings(),
                );
                self.store(level_id, PROLONGATOR, producer, p)
            }
            ProducerId::Restrictor => {
                let p = self.operator_on(level_id, PROLONGATOR, ProducerId::Prolongator)?;
                self.store(level_id, RESTRICTOR, producer, rap::build_restrictor(&p))
            }
            ProducerId::Rap => {
                let fine = self.input_level(level_id, InputLevel::Fine)?;
                let a = self.operator_on(fine, OPERATOR, ProducerId::NoFactory)?;
                let p = self.operator_on(level_id, PROLONGATOR, ProducerId::Prolongator)?;
                let ac = if self.implicit_transpose {
                    rap::galerkin_product(&a, &p, None)
                } else {
                    let r = self.operator_on(level_id, RESTRICTOR, ProducerId::Restrictor)?;
                    rap::galerkin_product(&a, &p, Some(&r))
                };
                self.store(level_id, OPERATOR, producer, ac)
            }
            ProducerId::Smoother => {
                let Some(config) = self.manager(level_id)?.smoother else {
                    log::debug!("Level {level_id}: no smoother configured");
                    return Ok(());
                };
                let a = self.operator_on(level_id, OPERATOR, ProducerId::NoFactory)?;
                let smoother = Arc::new(LevelSmoother::relaxation(a, &config));
                self.store(level_id, PRE_SMOOTHER, producer, smoother.clone())?;
                self.store(level_id, POST_SMOOTHER, producer, smoother)
            }
            ProducerId::CoarseSolver => {
                let manager = self.manager(level_id)?;
                let Some(mut kind) = manager.coarse_solver else {
                    log::debug!("Level {level_id}: no coarse solver configured");
                    return Ok(());
                };
                let a = self.operator_on(level_id, OPERATOR, ProducerId::NoFactory)?;
                if kind == CoarseSolverKind::Direct && a.num_rows > manager.max_direct_size {
                    log::warn!(
                        "Level {level_id}: coarse operator has {} rows (max_direct_size = {}), relaxing instead of factoring",
                        a.num_rows,
                        manager.max_direct_size
                    );
                    kind = CoarseSolverKind::Smoother(manager.smoother.unwrap_or_default());
                }
                let solver = LevelSmoother::coarse_solver(a, &kind)?;
                self.store(level_id, PRE_SMOOTHER, producer, solver)
            }
            ProducerId::TopRap => {
                let mut names = vec![
                    (OPERATOR, ProducerId::Rap),
                    (PROLONGATOR, ProducerId::Prolongator),
                ];
                if !self.implicit_transpose {
                    names.push((RESTRICTOR, ProducerId::Restrictor));
                }
                self.publish_from(level_id, &names)
            }
            ProducerId::TopSmoother => self.publish_from(
                level_id,
                &[
                    (PRE_SMOOTHER, ProducerId::Smoother),
                    (POST_SMOOTHER, ProducerId::Smoother),
                ],
            ),
            ProducerId::TopCoarseSolver => {
                self.publish_from(level_id, &[(PRE_SMOOTHER, ProducerId::CoarseSolver)])
            }
        }
    }

    fn store(
        &mut self,
        level_id: usize,
        name: &str,
        producer: ProducerId,
        value: impl Into<ArtifactValue<T>>,
    ) -> Result<()> {
        if !self.chain.get_mut(level_id)?.store_from(name, producer, value) {
            log::trace!(
                "Level {level_id}: '{name}' generated by {} is not requested, dropped",
                producer.label()
            );
        }
        Ok(())
    }

    /// Copy available intermediate outputs to their final slots
    fn publish_from(&mut self, level_id: usize, names: &[(&str, ProducerId)]) -> Result<()> {
        let level = self.chain.get_mut(level_id)?;
        for &(name, producer) in names {
            if level.is_available_from(name, producer) {
                let value = level.get_from(name, producer)?;
                level.publish(name, value);
            }
        }
        Ok(())
    }
}
