//! Grading engine configuration
//!
//! Configuration lives in `plgrade.toml`. Resolution order: explicit path,
//! `$PLGRADE_CONFIG`, `plgrade.toml` in the root directory, defaults.

pub mod types;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{GradeError, Result};

pub use types::{
    DataQualityConfig, GradingConfig, RubricConfig, ScoringConfig, DEFAULT_MAX_DESCRIPTION_LENGTH,
    MAX_CREDIT,
};

/// Default configuration file name
pub const CONFIG_FILE: &str = "plgrade.toml";

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "PLGRADE_CONFIG";

impl GradingConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            GradeError::db_operation(&format!("read config {}", path.display()), e)
        })?;
        let config: GradingConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GradeError::Other(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Resolve and load the configuration for a root directory.
    ///
    /// A missing default file yields the default configuration; a missing
    /// explicit file is an error.
    pub fn resolve(explicit: Option<&Path>, root: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load(&PathBuf::from(env_path));
        }

        let default_path = root.join(CONFIG_FILE);
        if default_path.exists() {
            Self::load(&default_path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = GradingConfig::default();
        assert!(!config.scoring.enforce_credit_range);
        assert_eq!(config.rubric.max_description_length, 100);
        assert!(config.data_quality.report_nan);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[scoring]\nenforce_credit_range = true\n").unwrap();

        let config = GradingConfig::load(&path).unwrap();
        assert!(config.scoring.enforce_credit_range);
        assert_eq!(
            config.rubric.max_description_length,
            DEFAULT_MAX_DESCRIPTION_LENGTH
        );
    }

    #[test]
    fn test_save_and_resolve_from_root() {
        let dir = tempdir().unwrap();
        let mut config = GradingConfig::default();
        config.rubric.max_description_length = 40;
        config.save(&dir.path().join(CONFIG_FILE)).unwrap();

        let resolved = GradingConfig::resolve(None, dir.path()).unwrap();
        assert_eq!(resolved.rubric.max_description_length, 40);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(GradingConfig::resolve(Some(&missing), dir.path()).is_err());
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[scoring\n").unwrap();
        assert!(matches!(
            GradingConfig::load(&path),
            Err(GradeError::Toml(_))
        ));
    }
}
