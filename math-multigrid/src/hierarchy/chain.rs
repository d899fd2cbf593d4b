//! Ordered chain of levels
//!
//! Levels live in a vector; the link to the finer neighbour is an index into
//! it. The chain is never empty, ids are contiguous from 0, and the only
//! removal is truncation of the last level.

use crate::error::{MultigridError, Result};
use crate::level::Level;
use crate::traits::ComplexField;

/// Levels from finest (0) to coarsest
#[derive(Debug, Clone)]
pub struct LevelChain<T: ComplexField> {
    levels: Vec<Level<T>>,
}

impl<T: ComplexField> LevelChain<T> {
    /// Chain holding only the finest level
    pub fn new(finest: Level<T>) -> Self {
        let mut chain = Self {
            levels: Vec::with_capacity(8),
        };
        chain.add_level(finest);
        chain
    }

    /// Number of levels
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Never true once constructed: the finest level cannot be removed
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Id of the coarsest level
    pub fn last_id(&self) -> usize {
        self.levels.len() - 1
    }

    /// Append `level` as the new coarsest level and return its id
    pub fn add_level(&mut self, mut level: Level<T>) -> usize {
        let id = self.levels.len();
        if let Some(old) = level.level_id().filter(|&old| old != id) {
            log::warn!("Hierarchy::add_level(): level {old} is renumbered to {id}");
        }
        level.set_level_id(id);
        level.set_previous(id.checked_sub(1));
        self.levels.push(level);
        id
    }

    /// Derive a new empty level from the coarsest one and append it
    pub fn add_new_level(&mut self) -> usize {
        let level = self.levels[self.last_id()].build();
        self.add_level(level)
    }

    /// Remove the coarsest level. The finest level cannot be removed.
    pub fn truncate_last(&mut self) -> Result<Level<T>> {
        if self.levels.len() < 2 {
            return Err(MultigridError::StructuralInconsistency(
                "cannot remove the finest level".to_string(),
            ));
        }
        self.levels
            .pop()
            .ok_or_else(|| MultigridError::StructuralInconsistency("empty level chain".to_string()))
    }

    /// Verify that level `id` knows its position and its parent
    pub fn check_level(&self, id: usize) -> Result<()> {
        let level = self.get(id)?;
        if level.level_id() != Some(id) {
            return Err(MultigridError::StructuralInconsistency(format!(
                "Hierarchy::setup(): wrong level ID (level at position {id} reports {:?})",
                level.level_id()
            )));
        }
        if level.previous() != id.checked_sub(1) {
            return Err(MultigridError::StructuralInconsistency(format!(
                "Hierarchy::setup(): wrong level parent (level {id} points to {:?})",
                level.previous()
            )));
        }
        Ok(())
    }

    /// Level `id`
    pub fn get(&self, id: usize) -> Result<&Level<T>> {
        let len = self.levels.len();
        self.levels.get(id).ok_or_else(|| {
            MultigridError::PreconditionViolation(format!(
                "level {id} does not exist (hierarchy has {len} levels)"
            ))
        })
    }

    /// Mutable level `id`
    pub fn get_mut(&mut self, id: usize) -> Result<&mut Level<T>> {
        let len = self.levels.len();
        self.levels.get_mut(id).ok_or_else(|| {
            MultigridError::PreconditionViolation(format!(
                "level {id} does not exist (hierarchy has {len} levels)"
            ))
        })
    }

    /// Levels from finest to coarsest
    pub fn iter(&self) -> impl Iterator<Item = &Level<T>> {
        self.levels.iter()
    }

    /// Mutable levels from finest to coarsest
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Level<T>> {
        self.levels.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_and_parents() {
        let mut chain = LevelChain::<f64>::new(Level::new());
        chain.add_new_level();
        chain.add_new_level();

        assert_eq!(chain.len(), 3);
        for (i, level) in chain.iter().enumerate() {
            assert_eq!(level.level_id(), Some(i));
            assert_eq!(level.previous(), i.checked_sub(1));
            chain.check_level(i).unwrap();
        }
    }

    #[test]
    fn test_renumbering() {
        let mut chain = LevelChain::<f64>::new(Level::new());
        let mut stray = Level::new();
        stray.set_level_id(7);
        assert_eq!(chain.add_level(stray), 1);
        chain.check_level(1).unwrap();
    }

    #[test]
    fn test_corrupted_level_is_detected() {
        let mut chain = LevelChain::<f64>::new(Level::new());
        chain.add_new_level();

        chain.get_mut(1).unwrap().set_level_id(5);
        assert!(matches!(
            chain.check_level(1),
            Err(MultigridError::StructuralInconsistency(msg)) if msg.contains("wrong level ID")
        ));

        chain.get_mut(1).unwrap().set_level_id(1);
        chain.get_mut(1).unwrap().set_previous(None);
        assert!(matches!(
            chain.check_level(1),
            Err(MultigridError::StructuralInconsistency(msg)) if msg.contains("wrong level parent")
        ));
    }

    #[test]
    fn test_truncation_keeps_finest() {
        let mut chain = LevelChain::<f64>::new(Level::new());
        chain.add_new_level();
        chain.truncate_last().unwrap();
        assert_eq!(chain.len(), 1);
        assert!(chain.truncate_last().is_err());
    }

    #[test]
    fn test_bad_id() {
        let chain = LevelChain::<f64>::new(Level::new());
        assert!(matches!(
            chain.get(3),
            Err(MultigridError::PreconditionViolation(_))
        ));
    }
}
