use crate::error::{ConsolidationError, Result};
use crate::utils::YearMatcher;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_YEAR_PATTERN: &str = r"\b(201[5-9]|202[0-4])\b";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyConfig {
    pub name: String,
    pub ticker: String,
    /// Where the annual reports were published. Informational only; reports
    /// are read from the ticker's `annual_reports/` directory.
    #[serde(default)]
    pub investor_relations_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root under which every ticker gets its own subtree.
    pub output_dir: PathBuf,
    /// Budget for both local oracle attempts and validation passes.
    pub max_retries: usize,
    /// Allowed slack in Assets = Liabilities + Equity.
    pub tolerance: f64,
    /// Report years accepted during discovery.
    pub year_pattern: String,
    /// Fixed pause between oracle attempts.
    pub retry_delay_secs: u64,
    /// Maximum number of labels sent to the schema oracle.
    pub schema_label_limit: usize,
    pub companies: Vec<CompanyConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            max_retries: 2,
            tolerance: 2.0,
            year_pattern: DEFAULT_YEAR_PATTERN.to_string(),
            retry_delay_secs: 3,
            schema_label_limit: 150,
            companies: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(ConsolidationError::InvalidConfig(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConsolidationError::InvalidConfig(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        if self.schema_label_limit == 0 {
            return Err(ConsolidationError::InvalidConfig(
                "schema_label_limit must be at least 1".to_string(),
            ));
        }
        for company in &self.companies {
            if company.ticker.trim().is_empty() {
                return Err(ConsolidationError::InvalidConfig(format!(
                    "company '{}' has an empty ticker",
                    company.name
                )));
            }
        }
        self.year_matcher()?;
        Ok(())
    }

    pub fn year_matcher(&self) -> Result<YearMatcher> {
        YearMatcher::new(&self.year_pattern)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}
