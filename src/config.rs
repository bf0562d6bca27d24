//! Fuzzing configuration.
//!
//! Defaults cover a short SQLite session; a JSON5 file may override any
//! field, and the command line overrides the file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context as _};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::policy::Policy;
use crate::scheduler::{Action, RepeatBounds};

/// Run-wide fuzzing knobs, loadable from a JSON5 file.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct FuzzConfig {
    /// Tables created at the start of every round.
    #[garde(range(min = 1, max = 64))]
    pub max_initial_tables: usize,
    /// `CreateTable` actions are skipped once this many base tables exist.
    #[garde(range(min = 1, max = 256))]
    pub max_tables: usize,
    #[garde(range(min = 1, max = 64))]
    pub max_columns: usize,
    #[garde(range(min = 1, max = 1000))]
    pub max_insert_rows: usize,
    /// Upper bound of oracle checks per round unless `actions` overrides it.
    #[garde(range(min = 1, max = 100_000))]
    pub max_queries: usize,
    #[garde(range(max = 16))]
    pub max_expr_depth: usize,
    #[garde(length(min = 1))]
    pub oracles: Vec<String>,
    #[garde(skip)]
    pub actions: BTreeMap<Action, RepeatBounds>,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        let actions = [
            (Action::Insert, RepeatBounds::new(1, 30)),
            (Action::CreateTable, RepeatBounds::new(0, 1)),
            (Action::AlterTable, RepeatBounds::new(0, 1)),
            (Action::CreateIndex, RepeatBounds::new(0, 2)),
            (Action::CreateView, RepeatBounds::new(0, 2)),
            (Action::Delete, RepeatBounds::new(0, 2)),
            (Action::DropTable, RepeatBounds::new(0, 1)),
            (Action::Explain, RepeatBounds::new(0, 1)),
        ]
        .into_iter()
        .collect();
        Self {
            max_initial_tables: 2,
            max_tables: 10,
            max_columns: 5,
            max_insert_rows: 5,
            max_queries: 100,
            max_expr_depth: 3,
            oracles: vec!["tlp-where".to_string()],
            actions,
        }
    }
}

impl FuzzConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        // json5 so configs may carry comments and trailing commas
        let config: FuzzConfig = json5::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.check()?;
        Ok(config)
    }

    /// Validate field ranges and every repeat bound.
    pub fn check(&self) -> anyhow::Result<()> {
        self.validate()?;
        for (action, bounds) in &self.actions {
            if !bounds.is_valid() {
                bail!(
                    "invalid bounds for {action}: [{}, {}] (need min <= max <= {})",
                    bounds.min,
                    bounds.max,
                    RepeatBounds::MAX_REPEAT
                );
            }
        }
        Ok(())
    }

    /// How often `action` runs per round.
    pub fn bounds(&self, action: Action) -> RepeatBounds {
        match self.actions.get(&action) {
            Some(bounds) => *bounds,
            None if action == Action::Query => RepeatBounds::new(1, self.max_queries),
            None => RepeatBounds::new(0, 0),
        }
    }

    /// Generation policy derived from this configuration.
    pub fn policy(&self) -> Policy {
        Policy {
            max_columns: self.max_columns,
            max_insert_rows: self.max_insert_rows,
            ..Policy::default()
        }
        .with_max_expr_depth(self.max_expr_depth)
    }
}
