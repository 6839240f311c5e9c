use crate::models::{EligibilityFilter, RecordSchema};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_ELIGIBLE_STATUS: &str = "PENDING_DECISION";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub schema: RecordSchema,
    #[serde(default)]
    pub dedupe: DedupeConfig,
    pub report: Option<ReportConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory" | "json" | "data_api"
    #[serde(rename = "type")]
    pub storage_type: Option<String>,
    /// Only for json
    pub path: Option<String>,
    /// Only for `data_api`
    pub endpoint: Option<String>,
    /// Only for `data_api`
    pub api_key: Option<String>,
    pub data_source: Option<String>,
    pub database: Option<String>,
    pub collection: Option<String>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeConfig {
    pub eligible_statuses: Option<Vec<String>>,
    pub dry_run: Option<bool>,
    pub deadline_seconds: Option<u64>,
    pub run_once: Option<bool>,
    pub interval_minutes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub webhooks: Option<Vec<WebhookEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEntry {
    pub name: Option<String>,
    pub url: String,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            eligible_statuses: Some(vec![DEFAULT_ELIGIBLE_STATUS.to_string()]),
            dry_run: Some(false),
            deadline_seconds: None,
            run_once: Some(true),
            interval_minutes: Some(60),
        }
    }
}

impl Config {
    /// Load configuration from `config.toml`.
    ///
    /// # Errors
    /// Returns `ConfigError` if file not found, IO fails, parsing fails, or
    /// the content does not describe a usable store.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_toml("config.toml")
    }

    /// Load configuration from an explicit path.
    ///
    /// # Errors
    /// Same as [`Config::load`].
    pub fn load_from_toml(path: &str) -> Result<Self, ConfigError> {
        if !Path::new(path).exists() {
            return Err(ConfigError::FileNotFound(path.to_string()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration text.
    ///
    /// # Errors
    /// Returns `ConfigError::ParseError` or `ConfigError::Invalid`.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // normalize store type to lowercase
        if let Some(kind) = &mut config.store.storage_type {
            *kind = kind.trim().to_lowercase();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.schema.key_fields.is_empty() {
            return Err(ConfigError::Invalid(
                "schema.key_fields must name at least one field".to_string(),
            ));
        }

        if self.eligible_statuses().is_empty() {
            return Err(ConfigError::Invalid(
                "dedupe.eligible_statuses must name at least one status".to_string(),
            ));
        }

        if self.storage_type() == "data_api" {
            let endpoint = self.store.endpoint.as_deref().unwrap_or_default();
            if endpoint.is_empty() || endpoint == "your_data_api_endpoint" {
                return Err(ConfigError::Invalid(
                    "store.endpoint is missing or not configured".to_string(),
                ));
            }
            let key = self.store.api_key.as_deref().unwrap_or_default();
            if key.is_empty() || key == "your_api_key" {
                return Err(ConfigError::Invalid(
                    "store.api_key is missing or not configured".to_string(),
                ));
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn storage_type(&self) -> &str {
        self.store.storage_type.as_deref().unwrap_or("json")
    }

    #[must_use]
    pub fn storage_path(&self) -> &str {
        self.store.path.as_deref().unwrap_or("./kpi-alerts.json")
    }

    #[must_use]
    pub fn data_source(&self) -> &str {
        self.store.data_source.as_deref().unwrap_or("Cluster0")
    }

    #[must_use]
    pub fn database(&self) -> &str {
        self.store.database.as_deref().unwrap_or("demo_db")
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        self.store.collection.as_deref().unwrap_or("kpiAlerts")
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.store.page_size.unwrap_or(1000).max(1)
    }

    #[must_use]
    pub fn eligible_statuses(&self) -> Vec<String> {
        self.dedupe
            .eligible_statuses
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_ELIGIBLE_STATUS.to_string()])
    }

    #[must_use]
    pub fn eligibility_filter(&self) -> EligibilityFilter {
        EligibilityFilter::new(self.eligible_statuses())
    }

    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.dedupe.dry_run.unwrap_or(false)
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.dedupe.deadline_seconds.map(Duration::from_secs)
    }

    #[must_use]
    pub fn run_once(&self) -> bool {
        self.dedupe.run_once.unwrap_or(true)
    }

    #[must_use]
    pub fn interval_minutes(&self) -> u64 {
        self.dedupe.interval_minutes.unwrap_or(60)
    }

    /// Pause between passes when not in run-once mode.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes().saturating_mul(60))
    }

    #[must_use]
    pub fn webhooks(&self) -> &[WebhookEntry] {
        self.report
            .as_ref()
            .and_then(|r| r.webhooks.as_deref())
            .unwrap_or(&[])
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
