//! `data.yaml`: where the data files live and how to clean them.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::data::clean::{CleaningRules, DatasetKind, MissingPolicy};
use crate::error::{IngestError, Result};

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/data.yaml";

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_ENV: &str = "PHM_ML_CONFIG";

fn default_preview_rows() -> usize {
    50
}

/// Top-level contents of `data.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    pub path: PathConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    /// Rows printed by the preview.
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
    /// Log lines are appended here as well as printed.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathConfig {
    pub base_directory: PathBuf,
    #[serde(default)]
    pub train_data: Option<PathBuf>,
    #[serde(default)]
    pub test_data: Option<PathBuf>,
}

/// Which cleaning rules to apply.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    /// Dataset identifier, e.g. `backblaze hard drive`.
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Overrides the rule set's own missing-value policy.
    #[serde(default)]
    pub missing: Option<MissingPolicy>,
    /// Keep only records of this drive model.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub drop_empty_columns: bool,
}

fn default_kind() -> String {
    DatasetKind::BackblazeHardDrive.to_string()
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            missing: None,
            model: None,
            drop_empty_columns: false,
        }
    }
}

/// Logical role of a data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRole {
    Train,
    Test,
}

impl DataRole {
    fn key(self) -> &'static str {
        match self {
            DataRole::Train => "train_data",
            DataRole::Test => "test_data",
        }
    }
}

impl DataConfig {
    /// Read and parse a YAML configuration file.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| IngestError::from_io(path, e))?;
        Self::from_yaml_str(&text)
            .map_err(|e| IngestError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_yaml_str(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Full path of the file playing `role`: `base_directory` joined with the
    /// role's entry.  An absolute entry is used as is.
    pub fn resolve(&self, role: DataRole) -> Result<PathBuf> {
        let entry = match role {
            DataRole::Train => self.path.train_data.as_ref(),
            DataRole::Test => self.path.test_data.as_ref(),
        };
        match entry {
            Some(p) if !p.as_os_str().is_empty() => Ok(self.path.base_directory.join(p)),
            _ => Err(IngestError::Config(format!("path.{} is not set", role.key()))),
        }
    }

    /// The dataset kind named by `dataset.kind`.
    pub fn kind(&self) -> Result<DatasetKind> {
        self.dataset.kind.parse()
    }

    /// The kind's rule set with the configured overrides applied.
    pub fn cleaning_rules(&self) -> Result<CleaningRules> {
        let mut rules = self.kind()?.rules();
        if let Some(missing) = self.dataset.missing {
            rules = rules.with_missing(missing);
        }
        if let Some(model) = &self.dataset.model {
            rules = rules.with_model(model.clone());
        }
        if self.dataset.drop_empty_columns {
            rules = rules.with_empty_columns_dropped();
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = "
path:
  base_directory: /data/backblaze
  train_data: 2017/train.parquet
  test_data: /elsewhere/test.parquet
";

    #[test]
    fn resolves_roles_against_base_directory() {
        let config = DataConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(
            config.resolve(DataRole::Train).unwrap(),
            PathBuf::from("/data/backblaze/2017/train.parquet")
        );
        assert_eq!(
            config.resolve(DataRole::Test).unwrap(),
            PathBuf::from("/elsewhere/test.parquet")
        );
        assert_eq!(config.preview_rows, 50);
        assert_eq!(config.log_file, None);
        assert_eq!(config.kind().unwrap(), DatasetKind::BackblazeHardDrive);
        assert_eq!(config.cleaning_rules().unwrap(), CleaningRules::backblaze());
    }

    #[test]
    fn missing_role_is_a_config_error() {
        let config = DataConfig::from_yaml_str("path:\n  base_directory: .\n").unwrap();
        assert!(matches!(
            config.resolve(DataRole::Test),
            Err(IngestError::Config(msg)) if msg.contains("test_data")
        ));
    }

    #[test]
    fn dataset_section_overrides_rules() {
        let config = DataConfig::from_yaml_str(
            "path:\n  base_directory: .\ndataset:\n  kind: backblaze hard drive\n  missing: drop\n  model: ST4000DM000\npreview_rows: 5\nlog_file: logs/phm.log\n",
        )
        .unwrap();
        let rules = config.cleaning_rules().unwrap();
        assert_eq!(rules.missing, MissingPolicy::Drop);
        assert_eq!(rules.retain.len(), 1);
        assert_eq!(config.preview_rows, 5);
        assert_eq!(config.log_file, Some(PathBuf::from("logs/phm.log")));
    }

    #[test]
    fn unknown_kind_and_missing_file_fail() {
        let config =
            DataConfig::from_yaml_str("path:\n  base_directory: .\ndataset:\n  kind: jet engine\n")
                .unwrap();
        assert!(matches!(config.kind(), Err(IngestError::Config(_))));
        assert!(matches!(
            DataConfig::from_yaml(Path::new("/nonexistent/data.yaml")),
            Err(IngestError::NotFound(_))
        ));
        assert!(DataConfig::from_yaml_str("path: 3").is_err());
    }
}
