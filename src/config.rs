use crate::error::{IngestError, Result};
use crate::models::Mode;
use crate::processors::orchestrator::PipelineConfig;
use crate::utils::constants::{
    API_KEY_LENGTH, CONFIG_FILE, DEFAULT_FORECAST_HOURS, DEFAULT_HTTP_MAX_RETRIES,
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_LOCAL_OUTPUT_DIR, DEFAULT_MAX_CONFLICT_RETRIES,
    DEFAULT_REQUEST_SPACING_MS, DEFAULT_S3_PREFIX, DEFAULT_UTC_OFFSET_HOURS, KEY_FILE,
    MAX_FORECAST_HOURS, MIN_FORECAST_HOURS,
};
use chrono::FixedOffset;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use validator::Validate;

/// Where partitions are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Aws,
    Local,
}

/// Process-wide settings, resolved once at startup.
///
/// Sources in increasing priority: built-in defaults, an optional JSON file,
/// then environment variables (`WEATHERBIT_API_KEY`, `S3_BUCKET`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Settings {
    pub weatherbit_api_key: Option<String>,
    pub execution_mode: ExecutionMode,
    pub data_mode: Mode,

    pub s3_bucket: Option<String>,
    pub s3_prefix: Option<String>,
    pub local_output_dir: PathBuf,

    pub verify_ssl: bool,
    pub proxy_url: Option<String>,

    #[validate(range(min = 1, max = 240))]
    pub forecast_hours: u32,

    pub request_spacing_ms: u64,

    #[validate(range(max = 20))]
    pub max_conflict_retries: u32,

    #[validate(range(min = -12, max = 14))]
    pub utc_offset_hours: i32,

    #[validate(range(min = 1, max = 300))]
    pub http_timeout_secs: u64,

    #[validate(range(min = 1, max = 10))]
    pub http_max_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            weatherbit_api_key: None,
            execution_mode: ExecutionMode::Local,
            data_mode: Mode::Forecast,
            s3_bucket: None,
            s3_prefix: None,
            local_output_dir: PathBuf::from(DEFAULT_LOCAL_OUTPUT_DIR),
            verify_ssl: true,
            proxy_url: None,
            forecast_hours: DEFAULT_FORECAST_HOURS,
            request_spacing_ms: DEFAULT_REQUEST_SPACING_MS,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            http_max_retries: DEFAULT_HTTP_MAX_RETRIES,
        }
    }
}

impl Settings {
    /// Load from `config_path` (default `config.json`), the environment and `key.txt`
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let file = config_path.unwrap_or_else(|| Path::new(CONFIG_FILE));
        Self::from_sources(Some(file), Environment::default(), Some(Path::new(KEY_FILE)))
    }

    pub fn from_sources(
        config_file: Option<&Path>,
        environment: Environment,
        key_file: Option<&Path>,
    ) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_file {
            debug!("Reading configuration file {}", path.display());
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Json)
                    .required(false),
            );
        }
        builder = builder.add_source(environment.try_parsing(true));

        let mut settings: Settings = builder.build()?.try_deserialize()?;

        settings.weatherbit_api_key = settings
            .weatherbit_api_key
            .take()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        if settings.weatherbit_api_key.is_none() {
            if let Some(path) = key_file {
                settings.weatherbit_api_key = read_key_file(path);
            }
        }

        settings.finalize()?;
        Ok(settings)
    }

    fn finalize(&mut self) -> Result<()> {
        self.validate()?;

        self.s3_bucket = self.s3_bucket.take().filter(|b| !b.trim().is_empty());
        self.s3_prefix = self.s3_prefix.take().filter(|p| !p.trim().is_empty());
        self.proxy_url = self.proxy_url.take().filter(|p| !p.trim().is_empty());

        match self.execution_mode {
            ExecutionMode::Aws => {
                if self.s3_bucket.is_none() {
                    return Err(IngestError::Config(
                        "S3_BUCKET is required when EXECUTION_MODE=aws".to_string(),
                    ));
                }
                if self.s3_prefix.is_none() {
                    return Err(IngestError::Config(
                        "S3_PREFIX is required when EXECUTION_MODE=aws".to_string(),
                    ));
                }
                if !self.verify_ssl {
                    warn!("VERIFY_SSL=false is ignored in aws mode");
                    self.verify_ssl = true;
                }
            }
            ExecutionMode::Local => {
                if self.s3_prefix.is_none() {
                    self.s3_prefix = Some(DEFAULT_S3_PREFIX.to_string());
                }
            }
        }

        self.utc_offset()?;
        Ok(())
    }

    pub fn api_key(&self) -> Result<&str> {
        self.weatherbit_api_key.as_deref().ok_or_else(|| {
            IngestError::Config(format!(
                "WEATHERBIT_API_KEY is not set and no usable key was found in {}",
                KEY_FILE
            ))
        })
    }

    pub fn prefix(&self) -> &str {
        self.s3_prefix.as_deref().unwrap_or(DEFAULT_S3_PREFIX)
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            IngestError::Config(format!("invalid UTC offset {}h", self.utc_offset_hours))
        })
    }

    pub fn with_data_mode(mut self, mode: Mode) -> Self {
        self.data_mode = mode;
        self
    }

    pub fn with_forecast_hours(mut self, hours: u32) -> Result<Self> {
        if !(MIN_FORECAST_HOURS..=MAX_FORECAST_HOURS).contains(&hours) {
            return Err(IngestError::Config(format!(
                "forecast hours must be within {}..={}, got {}",
                MIN_FORECAST_HOURS, MAX_FORECAST_HOURS, hours
            )));
        }
        self.forecast_hours = hours;
        Ok(self)
    }

    /// The slice of settings the orchestrator needs
    pub fn pipeline(&self) -> Result<PipelineConfig> {
        Ok(PipelineConfig {
            mode: self.data_mode,
            forecast_hours: self.forecast_hours,
            request_spacing: Duration::from_millis(self.request_spacing_ms),
            max_conflict_retries: self.max_conflict_retries,
            utc_offset: self.utc_offset()?,
        })
    }
}

// First whitespace-separated token that looks like a Weatherbit key.
fn read_key_file(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let key = content
        .split_whitespace()
        .find(|token| {
            token.len() == API_KEY_LENGTH && token.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(str::to_string);

    match &key {
        Some(_) => debug!("Loaded API key from {}", path.display()),
        None => warn!("{} does not contain a valid API key", path.display()),
    }
    key
}
