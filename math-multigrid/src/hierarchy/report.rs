//! Summaries, dependency graphs and matrix export

use super::Hierarchy;
use super::iterate::smoother;
use crate::error::{MultigridError, Result};
use crate::level::Level;
use crate::producers::{OPERATOR, POST_SMOOTHER, PRE_SMOOTHER, PROLONGATOR, RESTRICTOR};
use crate::traits::ComplexField;
use std::fmt::{self, Write as _};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Statistics of one level
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSummary {
    /// Level id
    pub level: usize,
    /// Global rows of `A` (0 for a null operator)
    pub rows: usize,
    /// Stored entries of `A`
    pub nnz: usize,
    /// Smoother (or coarse solver) applied before the coarse correction
    pub pre_smoother: Option<String>,
    /// Smoother applied after it
    pub post_smoother: Option<String>,
    /// Pre and post smoothers are the same object
    pub shared_smoother: bool,
}

impl LevelSummary {
    /// Average entries per row
    pub fn nnz_per_row(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.nnz as f64 / self.rows as f64
        }
    }
}

/// Hierarchy statistics
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchySummary {
    /// Per-level statistics, finest first
    pub levels: Vec<LevelSummary>,
    /// Σ nnz / nnz of the finest operator
    pub operator_complexity: f64,
    /// Σ rows / rows of the finest operator
    pub grid_complexity: f64,
    /// Coarse-enough threshold the hierarchy was built with
    pub max_coarse_size: usize,
    /// Whether restriction uses P^T
    pub implicit_transpose: bool,
}

impl HierarchySummary {
    /// Number of levels
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }
}

impl fmt::Display for HierarchySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Multigrid Summary")?;
        writeln!(f, "Number of levels    = {}", self.num_levels())?;
        writeln!(f, "Operator complexity = {:.2}", self.operator_complexity)?;
        writeln!(f, "Grid complexity     = {:.2}", self.grid_complexity)?;
        writeln!(f, "Max coarse size     = {}", self.max_coarse_size)?;
        writeln!(f, "Implicit transpose  = {}", self.implicit_transpose)?;
        writeln!(f)?;
        writeln!(f, "{:>5} {:>10} {:>12} {:>9}", "level", "rows", "nnz", "nnz/row")?;
        for level in &self.levels {
            writeln!(
                f,
                "{:>5} {:>10} {:>12} {:>9.2}",
                level.level,
                level.rows,
                level.nnz,
                level.nnz_per_row()
            )?;
        }
        writeln!(f)?;
        for level in &self.levels {
            let none = "none".to_string();
            let pre = level.pre_smoother.as_ref().unwrap_or(&none);
            let post = level.post_smoother.as_ref().unwrap_or(&none);
            if level.shared_smoother {
                writeln!(f, "Smoother (level {}) both : {}", level.level, pre)?;
            } else {
                writeln!(f, "Smoother (level {}) pre  : {}", level.level, pre)?;
                writeln!(f, "Smoother (level {}) post : {}", level.level, post)?;
            }
        }
        Ok(())
    }
}

impl<T: ComplexField> Hierarchy<T> {
    /// Collect per-level statistics.
    ///
    /// Fails when some level has no `A`, since the complexities are
    /// meaningless then.
    pub fn summary(&self) -> Result<HierarchySummary> {
        let mut levels = Vec::with_capacity(self.num_levels());
        for (id, level) in self.chain.iter().enumerate() {
            if !level.is_available(OPERATOR) {
                return Err(MultigridError::PreconditionViolation(format!(
                    "Operator complexity cannot be calculated because A is unavailable on level {id}"
                )));
            }
            let (rows, nnz) = match level.get_operator(OPERATOR)? {
                Some(a) => (a.num_rows, a.nnz()),
                None => (0, 0),
            };

            let pre = smoother(level, PRE_SMOOTHER)?;
            let post = smoother(level, POST_SMOOTHER)?;
            let shared_smoother = match (&pre, &post) {
                (Some(pre), Some(post)) => Arc::ptr_eq(pre, post),
                _ => false,
            };
            levels.push(LevelSummary {
                level: id,
                rows,
                nnz,
                pre_smoother: pre.map(|s| s.description()),
                post_smoother: post.map(|s| s.description()),
                shared_smoother,
            });
        }

        let ratio = |total: usize, finest: usize| {
            if finest == 0 {
                0.0
            } else {
                total as f64 / finest as f64
            }
        };
        let total_nnz = levels.iter().map(|l| l.nnz).sum();
        let total_rows = levels.iter().map(|l| l.rows).sum();
        let (rows0, nnz0) = levels.first().map_or((0, 0), |l| (l.rows, l.nnz));

        Ok(HierarchySummary {
            operator_complexity: ratio(total_nnz, nnz0),
            grid_complexity: ratio(total_rows, rows0),
            levels,
            max_coarse_size: self.max_coarse_size,
            implicit_transpose: self.implicit_transpose,
        })
    }

    /// Write the operators of levels `start..=end` as Matrix Market files
    /// `A_i.m`, `P_i.m` and `R_i.m` into `dir`.
    ///
    /// Transfer operators are written for every level after `start`; `R` is
    /// skipped with implicit transpose. `None` bounds mean the finest and the
    /// coarsest level.
    pub fn write(&self, start: Option<usize>, end: Option<usize>, dir: &Path) -> Result<()> {
        let start = start.unwrap_or(0);
        let end = end.unwrap_or(self.chain.last_id());
        if start > end || end > self.chain.last_id() {
            return Err(MultigridError::PreconditionViolation(format!(
                "Hierarchy::write(): invalid level range {start}..={end} for {} levels",
                self.num_levels()
            )));
        }

        fs::create_dir_all(dir)?;
        for id in start..=end {
            let level = self.chain.get(id)?;
            write_operator(level, OPERATOR, id, dir)?;
            if id > start {
                write_operator(level, PROLONGATOR, id, dir)?;
                if !self.implicit_transpose {
                    write_operator(level, RESTRICTOR, id, dir)?;
                }
            }
        }
        log::info!("Wrote levels {start}..={end} to {}", dir.display());
        Ok(())
    }

    /// Dependency graph of the dumped level and its coarse neighbour, in DOT
    pub fn dependency_graph(&self, level_id: usize) -> String {
        let mut dot = String::from("digraph dependencies {\n  node [shape=box];\n");
        for (id, color) in [(level_id, "red"), (level_id + 1, "blue")] {
            let Ok(level) = self.chain.get(id) else {
                continue;
            };
            let _ = writeln!(dot, "  subgraph cluster_{id} {{\n    label=\"Level {id}\";\n    color={color};");
            for edge in level.dependency_edges() {
                if !edge.from_fine {
                    let _ = writeln!(dot, "    \"{id}:{}\";", edge.from.label());
                }
                let _ = writeln!(dot, "    \"{id}:{}\";", edge.to.label());
            }
            dot.push_str("  }\n");

            for edge in level.dependency_edges() {
                let from_id = if edge.from_fine { id.saturating_sub(1) } else { id };
                let _ = writeln!(
                    dot,
                    "  \"{from_id}:{}\" -> \"{id}:{}\" [label=\"{}\", color={color}];",
                    edge.from.label(),
                    edge.to.label(),
                    edge.name
                );
            }
        }
        dot.push_str("}\n");
        dot
    }

    /// Write the dependency graph to the configured dump file.
    ///
    /// Failures are logged only; the dump never stops a setup.
    pub(crate) fn dump_current_graph(&self) {
        let Some(level_id) = self.dump_level else {
            return;
        };
        match fs::write(&self.dump_file, self.dependency_graph(level_id)) {
            Ok(()) => log::info!(
                "Dependency graph of level {level_id} written to {}",
                self.dump_file.display()
            ),
            Err(err) => log::warn!(
                "Could not write dependency graph to {}: {err}",
                self.dump_file.display()
            ),
        }
    }
}

fn write_operator<T: ComplexField>(level: &Level<T>, name: &str, id: usize, dir: &Path) -> Result<()> {
    match level.get_operator(name)? {
        Some(op) => op.write_matrix_market(dir.join(format!("{name}_{id}.m")))?,
        None => log::debug!("Level {id}: '{name}' is a null operator, not written"),
    }
    Ok(())
}
