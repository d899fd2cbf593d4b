//! Level-by-level construction

use super::Hierarchy;
use crate::error::{MultigridError, Result};
use crate::parallel::is_parallel_available;
use crate::producers::{LevelManager, OPERATOR, ProducerId};
use crate::traits::ComplexField;

impl<T: ComplexField> Hierarchy<T> {
    /// Build the level `coarse_id` and prepare the next one.
    ///
    /// `fine` is `None` on the finest level; `next` is `None` when no further
    /// coarsening is wanted. Returns whether `coarse_id` ended up being the
    /// coarsest level.
    pub fn setup_level(
        &mut self,
        coarse_id: usize,
        fine: Option<&LevelManager>,
        coarse: &LevelManager,
        next: Option<&LevelManager>,
    ) -> Result<bool> {
        if self.chain.last_id() < coarse_id {
            return Err(MultigridError::PreconditionViolation(format!(
                "Hierarchy::setup(): level {coarse_id} must be built before calling this function"
            )));
        }
        self.chain.check_level(coarse_id)?;

        let is_finest = fine.is_none();
        let mut is_last = next.is_none();

        self.chain.get_mut(coarse_id)?.set_manager(coarse.clone());
        if let Some(fine) = fine {
            let fine_id = self.fine_id(coarse_id)?;
            self.chain.get_mut(fine_id)?.set_manager(fine.clone());
        }

        // Both are requested on the finest level even when it turns out to be
        // the only one; the unused request stays outstanding.
        if is_finest {
            self.request_top(coarse_id, ProducerId::TopSmoother)?;
            self.request_top(coarse_id, ProducerId::TopCoarseSolver)?;
        }

        if self.dump_level == Some(0) && coarse_id == 1 {
            self.dump_current_graph();
        }

        let next_id = coarse_id + 1;
        if let Some(next) = next {
            if next_id > self.chain.last_id() {
                self.chain.add_new_level();
            }
            self.chain.check_level(next_id)?;
            self.chain.get_mut(next_id)?.set_manager(next.clone());

            log::debug!("Level {next_id}: request A, Smoother, CoarseSolver");
            self.request_final_artifacts(next_id)?;
        }

        log::info!("Level {coarse_id}");

        if !is_finest {
            self.build(coarse_id, ProducerId::TopRap)?;
            self.release_top(coarse_id, ProducerId::TopRap)?;
        }

        if self.dump_level.is_some_and(|dump| dump > 0 && dump == coarse_id) {
            self.dump_current_graph();
        }

        let level = self.chain.get(coarse_id)?;
        let ac = if level.is_available(OPERATOR) {
            level.get_operator(OPERATOR)?
        } else {
            None
        };

        let coarse_enough = match &ac {
            None => true,
            Some(ac) => {
                if ac.num_rows <= self.max_coarse_size {
                    true
                } else if is_finest {
                    false
                } else {
                    self.coarsening_stalled(coarse_id, ac.num_rows)?
                }
            }
        };

        if coarse_enough {
            if !is_last {
                log::debug!("Level {next_id}: release A, Smoother, CoarseSolver");
                self.release_final_artifacts(next_id)?;
                self.chain.truncate_last()?;
            }
            is_last = true;
        }

        if !is_last {
            self.build(coarse_id, ProducerId::TopSmoother)?;
            self.release_top(coarse_id, ProducerId::TopSmoother)?;
        } else if ac.is_some() {
            self.build(coarse_id, ProducerId::TopCoarseSolver)?;
            self.release_top(coarse_id, ProducerId::TopCoarseSolver)?;
        }

        Ok(is_last)
    }

    /// Build levels `start_level ..` until the coarsest level is small
    /// enough or `num_desired_levels` levels exist.
    pub fn setup(
        &mut self,
        manager: &LevelManager,
        start_level: usize,
        num_desired_levels: usize,
    ) -> Result<()> {
        log::info!("Setup ({})", self.description());

        if num_desired_levels < 2 {
            return Err(MultigridError::PreconditionViolation(format!(
                "Hierarchy::setup(): num_desired_levels < 2 (got {num_desired_levels})"
            )));
        }
        manager.validate()?;

        if !self.chain.get(start_level)?.is_available(OPERATOR) {
            return Err(MultigridError::PreconditionViolation(
                "Hierarchy::setup(): no fine level matrix A! Set fine level matrix A using Level::set()"
                    .to_string(),
            ));
        }

        let last_level = start_level + num_desired_levels - 1;
        log::info!(
            "Loop: start_level={start_level}, last_level={last_level} (stop if num_levels = {num_desired_levels} or Ac.size() = {}), rayon: {}",
            self.max_coarse_size,
            is_parallel_available()
        );

        let mut i_level = start_level;
        let mut is_last = self.setup_level(start_level, None, manager, Some(manager))?;
        if !is_last {
            i_level = start_level + 1;
            while i_level < last_level {
                is_last = self.setup_level(i_level, Some(manager), manager, Some(manager))?;
                if is_last {
                    break;
                }
                i_level += 1;
            }
            if !is_last {
                self.setup_level(last_level, Some(manager), manager, None)?;
            }
        }

        if self.chain.len() != i_level + 1 {
            return Err(MultigridError::StructuralInconsistency(format!(
                "Hierarchy::setup(): number of levels is {}, expected {}",
                self.chain.len(),
                i_level + 1
            )));
        }

        log::info!("{}", self.description());
        Ok(())
    }

    fn request_final_artifacts(&mut self, level_id: usize) -> Result<()> {
        for producer in TOP_PRODUCERS {
            self.request_top(level_id, producer)?;
        }
        Ok(())
    }

    fn release_final_artifacts(&mut self, level_id: usize) -> Result<()> {
        for producer in TOP_PRODUCERS {
            self.release_top(level_id, producer)?;
        }
        Ok(())
    }

    fn request_top(&mut self, level_id: usize, producer: ProducerId) -> Result<()> {
        self.request(level_id, top_handle(producer)?, producer)
    }

    fn release_top(&mut self, level_id: usize, producer: ProducerId) -> Result<()> {
        self.release(level_id, top_handle(producer)?, producer)
    }

    fn fine_id(&self, coarse_id: usize) -> Result<usize> {
        self.chain.get(coarse_id)?.previous().ok_or_else(|| {
            MultigridError::PreconditionViolation(format!(
                "Hierarchy::setup(): level {coarse_id} has no finer level"
            ))
        })
    }

    /// The coarse operator did not shrink: further levels would repeat it
    fn coarsening_stalled(&self, coarse_id: usize, coarse_rows: usize) -> Result<bool> {
        let fine = self.chain.get(self.fine_id(coarse_id)?)?;
        let fine_rows = match fine.get_operator(OPERATOR) {
            Ok(Some(a)) => a.num_rows,
            _ => return Ok(false),
        };
        if coarse_rows >= fine_rows {
            log::warn!(
                "Level {coarse_id}: coarsening stalled at {coarse_rows} rows, stopping here"
            );
            return Ok(true);
        }
        Ok(false)
    }
}

/// Producers whose outputs the cycle reads, in request order
const TOP_PRODUCERS: [ProducerId; 3] = [
    ProducerId::TopRap,
    ProducerId::TopSmoother,
    ProducerId::TopCoarseSolver,
];

fn top_handle(producer: ProducerId) -> Result<&'static str> {
    producer.handle().ok_or_else(|| {
        MultigridError::StructuralInconsistency(format!(
            "{} has no request handle",
            producer.label()
        ))
    })
}
