//! Registry of searchable tables.
//!
//! Table configs are hand-authored YAML, one document listing every
//! table:
//!
//! ```yaml
//! tables:
//!   - table_name: divisions
//!     search_fields:
//!       - { name: name, type: text, label: Name }
//! ```
//!
//! Every config is validated at load time and gets its own
//! [`SearchEngine`] over the shared data source.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::search::{ConfigError, EngineSettings, SearchEngine, TableConfig};
use crate::source::DataSource;

/// Top-level shape of a tables file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TablesFile {
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

/// Parse a tables file from YAML text.
pub fn parse_tables(yaml: &str) -> Result<Vec<TableConfig>> {
    let file: TablesFile = serde_yml::from_str(yaml).context("failed to parse tables YAML")?;
    Ok(file.tables)
}

/// Read and parse the tables file at `path`.
pub fn load_tables(path: &Path) -> Result<Vec<TableConfig>> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read tables file {}", path.display()))?;
    parse_tables(&yaml).with_context(|| format!("invalid tables file {}", path.display()))
}

/// Every problem across `tables`, including duplicate names.
pub fn check_tables(tables: &[TableConfig]) -> Vec<ConfigError> {
    let mut problems = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for table in tables {
        if !seen.insert(table.table_name.as_str()) {
            problems.push(ConfigError::DuplicateTable(table.table_name.clone()));
        }
        problems.extend(table.problems());
    }
    problems
}

/// One engine per configured table.
#[derive(Clone, Default)]
pub struct TableRegistry {
    engines: BTreeMap<String, SearchEngine>,
}

impl TableRegistry {
    /// Validate `tables` and build an engine for each.
    pub fn new(
        tables: Vec<TableConfig>,
        source: Arc<dyn DataSource>,
        settings: EngineSettings,
    ) -> Result<Self, ConfigError> {
        let mut engines = BTreeMap::new();
        for table in tables {
            let name = table.table_name.clone();
            if engines.contains_key(&name) {
                return Err(ConfigError::DuplicateTable(name));
            }
            let engine = SearchEngine::new(table, source.clone())?.with_settings(settings);
            engines.insert(name, engine);
        }

        info!(tables = engines.len(), "table registry ready");
        Ok(Self { engines })
    }

    /// Load, validate and build from a tables file.
    pub fn from_file(
        path: &Path,
        source: Arc<dyn DataSource>,
        settings: EngineSettings,
    ) -> Result<Self> {
        let tables = load_tables(path)?;
        Self::new(tables, source, settings)
            .with_context(|| format!("invalid table config in {}", path.display()))
    }

    pub fn get(&self, table: &str) -> Option<&SearchEngine> {
        self.engines.get(table)
    }

    /// Registered table names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
