//! Configuration type definitions

use serde::{Deserialize, Serialize};

/// Upper bound accepted for credit when range enforcement is enabled
pub const MAX_CREDIT: i64 = 1000;

/// Default maximum length of a rubric item description
pub const DEFAULT_MAX_DESCRIPTION_LENGTH: usize = 100;

/// Grading engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Assessment score aggregation settings
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Rubric definition settings
    #[serde(default)]
    pub rubric: RubricConfig,

    /// Handling of bad historical values
    #[serde(default)]
    pub data_quality: DataQualityConfig,
}

/// Assessment score aggregation settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Reject credit values outside `0..=MAX_CREDIT`
    #[serde(default)]
    pub enforce_credit_range: bool,
}

/// Rubric definition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricConfig {
    /// Maximum length of a rubric item description
    #[serde(default = "default_max_description_length")]
    pub max_description_length: usize,
}

impl Default for RubricConfig {
    fn default() -> Self {
        Self {
            max_description_length: default_max_description_length(),
        }
    }
}

/// Handling of bad historical values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityConfig {
    /// Log and count NaN values coerced to zero on read
    #[serde(default = "default_report_nan")]
    pub report_nan: bool,
}

impl Default for DataQualityConfig {
    fn default() -> Self {
        Self {
            report_nan: default_report_nan(),
        }
    }
}

fn default_max_description_length() -> usize {
    DEFAULT_MAX_DESCRIPTION_LENGTH
}

fn default_report_nan() -> bool {
    true
}
