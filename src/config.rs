//! Engine configuration loaded from YAML.
//!
//! ```yaml
//! staging_dir: /var/lib/tables/staging
//! block_size: 1000
//! workers: 2
//! default_limit: 100
//! column_types:
//!   - id: 20
//!     name: Postcode
//!     regexp: '\d{6}'
//!     required: true
//! ```
//!
//! Every field is optional. `column_types` entries are merged over the
//! built-in catalog by id.

use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{column_type::builtin_catalog, model::ColumnType, query::DEFAULT_LIMIT};

pub const DEFAULT_BLOCK_SIZE: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub staging_dir: PathBuf,
    pub block_size: usize,
    pub workers: usize,
    pub default_limit: u64,
    pub column_types: Vec<ColumnType>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            staging_dir: std::env::temp_dir().join("table-engine"),
            block_size: DEFAULT_BLOCK_SIZE,
            workers: 2,
            default_limit: DEFAULT_LIMIT,
            column_types: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: EngineConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config file {path:?}"))?;
        config.ensure_valid()?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn ensure_valid(&self) -> Result<()> {
        ensure!(self.block_size > 0, "block_size must be positive");
        ensure!(self.workers > 0, "workers must be positive");
        ensure!(
            self.column_types.iter().all(|t| t.id != crate::model::DEFAULT_COLUMN_TYPE_ID),
            "column type {} is reserved for the default type",
            crate::model::DEFAULT_COLUMN_TYPE_ID
        );
        Ok(())
    }

    /// Built-in column types with configured ones merged in by id.
    pub fn catalog(&self) -> Vec<ColumnType> {
        let mut merged = builtin_catalog()
            .into_iter()
            .map(|t| (t.id, t))
            .collect::<BTreeMap<_, _>>();
        for column_type in &self.column_types {
            merged.insert(column_type.id, column_type.clone());
        }
        merged.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::model::ValueParser;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "block_size: 250").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.block_size, 250);
        assert_eq!(config.workers, 2);
        assert_eq!(config.default_limit, DEFAULT_LIMIT);
    }

    #[test]
    fn configured_types_override_builtins() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "column_types:").unwrap();
        writeln!(file, "  - id: 7").unwrap();
        writeln!(file, "    name: Mobile").unwrap();
        writeln!(file, "    regexp: '\\+?\\d{{11}}'").unwrap();
        writeln!(file, "    parser: phone").unwrap();
        writeln!(file, "  - id: 20").unwrap();
        writeln!(file, "    name: Postcode").unwrap();
        writeln!(file, "    required: true").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        let catalog = config.catalog();
        let mobile = catalog.iter().find(|t| t.id == 7).unwrap();
        assert_eq!(mobile.name, "Mobile");
        assert_eq!(mobile.regexp, r"\+?\d{11}");
        assert_eq!(mobile.parser, ValueParser::Phone);
        let postcode = catalog.iter().find(|t| t.id == 20).unwrap();
        assert!(postcode.required);
        assert!(postcode.active);
        assert_eq!(catalog.len(), builtin_catalog().len() + 1);
    }

    #[test]
    fn default_type_id_is_reserved() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "column_types:\n  - id: 1\n    name: Mine").unwrap();
        assert!(EngineConfig::load(file.path()).is_err());
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "block_size: 0").unwrap();
        assert!(EngineConfig::load(file.path()).is_err());
    }
}
