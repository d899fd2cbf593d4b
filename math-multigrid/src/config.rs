//! JSON configuration for a whole hierarchy

use crate::error::{MultigridError, Result};
use crate::hierarchy::{CycleType, DEFAULT_MAX_COARSE_SIZE, Hierarchy};
use crate::level::ArtifactValue;
use crate::producers::LevelManager;
use crate::traits::ComplexField;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Hierarchy options plus the level manager applied to every level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Row count at or below which coarsening stops
    pub max_coarse_size: usize,
    /// Restrict with P^T instead of building R
    pub implicit_transpose: bool,
    /// Silence residual reporting in `iterate`
    pub is_preconditioner: bool,
    /// Upper bound on the number of levels (at least 2)
    pub max_levels: usize,
    /// Cycle used when the hierarchy is wrapped as a preconditioner
    pub cycle: CycleType,
    /// Producer strategies
    pub manager: LevelManager,
    /// Level whose dependency graph is written during setup
    pub dump_level: Option<usize>,
    /// Where the dependency graph goes
    pub dump_file: Option<PathBuf>,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_coarse_size: DEFAULT_MAX_COARSE_SIZE,
            implicit_transpose: false,
            is_preconditioner: true,
            max_levels: 10,
            cycle: CycleType::V,
            manager: LevelManager::default(),
            dump_level: None,
            dump_file: None,
        }
    }
}

impl HierarchyConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: HierarchyConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Reject option combinations `setup` cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.max_levels < 2 {
            return Err(MultigridError::PreconditionViolation(format!(
                "max_levels must be at least 2, got {}",
                self.max_levels
            )));
        }
        self.manager.validate()
    }

    /// Copy the hierarchy-wide options onto `hierarchy`
    pub fn apply_to<T: ComplexField>(&self, hierarchy: &mut Hierarchy<T>) {
        hierarchy.set_max_coarse_size(self.max_coarse_size);
        hierarchy.set_implicit_transpose(self.implicit_transpose);
        hierarchy.set_is_preconditioner(self.is_preconditioner);
        match self.dump_level {
            Some(level) => {
                let file = self
                    .dump_file
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("dep_graph.dot"));
                hierarchy.enable_graph_dump(level, file);
            }
            None => hierarchy.disable_graph_dump(),
        }
    }

    /// Build a complete hierarchy for the operator `a`
    pub fn build_hierarchy<T: ComplexField>(
        &self,
        a: impl Into<ArtifactValue<T>>,
    ) -> Result<Hierarchy<T>> {
        self.validate()?;
        let mut hierarchy = Hierarchy::from_operator(a);
        self.apply_to(&mut hierarchy);
        hierarchy.setup(&self.manager, 0, self.max_levels)?;
        Ok(hierarchy)
    }
}
