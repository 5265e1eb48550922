use crate::delivery::RetryPolicy;
use crate::keys::KeyLayout;
use crate::placement::TransferContext;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while reading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Unknown instrument {instrument}; configured instruments: {known:?}")]
    UnknownInstrument {
        instrument: String,
        known: Vec<String>,
    },

    #[error("Missing required configuration: {0}")]
    MissingRequired(&'static str),
}

/// Main configuration for the pipeline service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Mission and deployment identity
    pub mission: MissionConfig,
    /// S3 configuration
    #[serde(default)]
    pub s3: S3Config,
    /// Pipeline event ledger configuration
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Chat notification configuration
    #[serde(default)]
    pub slack: SlackConfig,
    /// Transfer switches
    #[serde(default)]
    pub transfer: TransferConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Deployment environment. Development resources carry a `dev-` prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Apply the environment prefix to a resource name
    pub fn prefixed(&self, name: &str) -> String {
        match self {
            Environment::Development => format!("dev-{name}"),
            Environment::Production => name.to_string(),
        }
    }
}

/// Mission identity and bucket naming
#[derive(Debug, Clone, Deserialize)]
pub struct MissionConfig {
    /// Mission name, also the filename prefix
    pub mission_name: String,
    /// Instrument short names, in bucket probing order
    #[serde(default)]
    pub inst_names: Vec<String>,
    /// Deployment environment
    #[serde(default)]
    pub environment: Environment,
    /// Explicit incoming bucket name (environment prefix still applies)
    pub incoming_bucket: Option<String>,
}

impl MissionConfig {
    /// Bucket names cannot contain underscores
    pub fn bucket_mission_name(&self) -> String {
        self.mission_name.replace('_', "-")
    }

    pub fn incoming_bucket(&self) -> String {
        let bucket = self
            .incoming_bucket
            .clone()
            .unwrap_or_else(|| format!("{}-incoming", self.bucket_mission_name()));
        self.environment.prefixed(&bucket)
    }

    pub fn instrument_bucket(&self, instrument: &str) -> Result<String, ConfigError> {
        let known = self
            .inst_names
            .iter()
            .find(|name| name.eq_ignore_ascii_case(instrument))
            .ok_or_else(|| ConfigError::UnknownInstrument {
                instrument: instrument.to_string(),
                known: self.inst_names.clone(),
            })?;

        Ok(self
            .environment
            .prefixed(&format!("{}-{}", self.bucket_mission_name(), known)))
    }

    pub fn all_instrument_buckets(&self) -> Vec<String> {
        self.inst_names
            .iter()
            .map(|name| {
                self.environment
                    .prefixed(&format!("{}-{}", self.bucket_mission_name(), name))
            })
            .collect()
    }
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Directory downloads land in and uploads are read from
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Directory layout of derived keys
    #[serde(default)]
    pub key_layout: KeyLayout,
}

/// Timestream ledger configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerConfig {
    /// Disable ledger writes entirely
    #[serde(default)]
    pub disabled: bool,
}

impl LedgerConfig {
    /// Dry runs never write, so they never connect either
    pub fn enabled_for(&self, dry_run: bool) -> bool {
        !self.disabled && !dry_run
    }
}

/// Slack notification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    /// Bot token; notifications are skipped when absent
    pub token: Option<String>,
    /// Channel receiving pipeline messages
    pub channel: Option<String>,
    /// Slack Web API base URL
    #[serde(default = "default_slack_api_url")]
    pub api_url: String,
    /// Attempts per message before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between attempts in seconds
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

/// Switches controlling whether bytes move at all
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransferConfig {
    /// Local test data is already present; never touch the store
    #[serde(default)]
    pub use_fixture_data: bool,
    /// Use this local file instead of transferring
    pub local_file_path: Option<PathBuf>,
}

// Default value functions
fn default_service_name() -> String {
    "sdc-pipeline".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_slack_api_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay_secs() -> u64 {
    5
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
            staging_dir: default_staging_dir(),
            key_layout: KeyLayout::default(),
        }
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            token: None,
            channel: None,
            api_url: default_slack_api_url(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl Config {
    /// Load configuration from config files and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", default_service_name())?
            .set_default("service.log_level", default_log_level())?
            // Add config file if present
            .add_source(config::File::with_name("config/sdc-pipeline").required(false))
            .add_source(config::File::with_name("/etc/sdc/pipeline").required(false))
            // Override with environment variables
            // SDC__S3__STAGING_DIR -> s3.staging_dir
            .add_source(
                config::Environment::with_prefix("SDC")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("mission.inst_names")
                    .try_parsing(true),
            )
            // Variables the processing deployments already set
            .set_override_option("mission.mission_name", env_var("SWXSOC_MISSION"))?
            .set_override_option("mission.incoming_bucket", env_var("SWXSOC_INCOMING_BUCKET"))?
            .set_override_option("s3.region", env_var("AWS_REGION"))?
            .set_override_option("slack.token", env_var("SLACK_TOKEN"))?
            .set_override_option("transfer.local_file_path", env_var("SDC_AWS_FILE_PATH"))?
            .set_override_option(
                "transfer.use_fixture_data",
                env_var("USE_INSTRUMENT_TEST_DATA").map(|v| v == "True"),
            )?
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Fixed-delay retry policy for chat delivery
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.slack.max_retries,
            Duration::from_secs(self.slack.retry_delay_secs),
        )
    }

    /// Transfer switches as handed to the placement orchestrator
    pub fn transfer_context(&self) -> TransferContext {
        TransferContext {
            use_fixture_data: self.transfer.use_fixture_data,
            local_file_path: self.transfer.local_file_path.clone(),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
