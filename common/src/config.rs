use config::{Config, ConfigError};
use serde::Deserialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub source: SourceConfig,
    pub sink: SinkConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub normalization: NormalizationConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Deserialize, Clone)]
pub struct SourceConfig {
    /// Path of the source SQLite database.
    pub endpoint: String,
    #[serde(default = "default_source_schema")]
    pub schema: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Deserialize, Clone)]
pub struct SinkConfig {
    /// Path of the sink SQLite database.
    pub endpoint: String,
    #[serde(default = "default_sink_table")]
    pub table: String,
    /// Persist the dimensions and curated facts as replace-per-run tables.
    #[serde(default = "default_staging")]
    pub staging: bool,
    #[serde(default = "default_staging_prefix")]
    pub staging_prefix: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

// Credentials never reach the logs.
impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("endpoint", &self.endpoint)
            .field("schema", &self.schema)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkConfig")
            .field("endpoint", &self.endpoint)
            .field("table", &self.table)
            .field("staging", &self.staging)
            .field("staging_prefix", &self.staging_prefix)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ValidationConfig {
    #[serde(default)]
    pub mode: ValidationMode,
    /// Checks that halt the run on failure even in advisory mode.
    #[serde(default)]
    pub blocking_checks: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    #[default]
    Advisory,
    Blocking,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NormalizationConfig {
    #[serde(default)]
    pub on_conflict: ConflictPolicy,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    Warn,
    Fail,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AggregationConfig {
    #[serde(default)]
    pub week_convention: WeekConvention,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeekConvention {
    /// ISO 8601 week of year, 1..=53.
    #[default]
    IsoWeek,
    /// ISO year * 100 + ISO week, e.g. 202452.
    IsoYearWeek,
    /// Weeks start on Sunday; week 1 contains January 1st.
    SundayWeek,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_source_schema() -> String {
    "main".to_string()
}

fn default_sink_table() -> String {
    "mview_weekly_sales".to_string()
}

fn default_staging() -> bool {
    true
}

fn default_staging_prefix() -> String {
    "staging_".to_string()
}

fn default_timeout_secs() -> u64 {
    3600
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        // Build the configuration
        let config = builder.build()?;

        let settings: Settings = config.try_deserialize()?;

        debug!(
            source = ?settings.source,
            sink = ?settings.sink,
            "Parsed pipeline settings"
        );

        Ok(settings)
    }
}
