use crate::colorizer::ColorStrategy;
use crate::error::{AppError, Result};
use crate::models::StationRecord;
use crate::projection::Projector;
use crate::reconciler::{JoinStrategy, ReconcileOptions, WeatherPolicy, DEFAULT_MAX_AGE_HOURS};
use crate::render::{MapView, MarkerStyle};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub projection: Projector,
    #[serde(default)]
    pub stations: StationFilter,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    #[serde(default = "default_feed_path")]
    pub feed_path: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_feed_path() -> String {
    "/Moduli/refx.php".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("cml-map/", env!("CARGO_PKG_VERSION")).to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default)]
    pub initial_delay_seconds: u64,
}

fn default_interval_seconds() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            initial_delay_seconds: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub weather_policy: WeatherPolicy,
    #[serde(default)]
    pub recency: RecencyConfig,
    #[serde(default)]
    pub join: JoinStrategy,
    #[serde(default)]
    pub colorizer: ColorStrategy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecencyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: i64,
    #[serde(default = "default_timezone", deserialize_with = "deserialize_timezone")]
    pub timezone: Tz,
}

fn default_true() -> bool {
    true
}

fn default_max_age_hours() -> i64 {
    DEFAULT_MAX_AGE_HOURS
}

fn default_timezone() -> Tz {
    chrono_tz::Europe::Rome
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_hours: DEFAULT_MAX_AGE_HOURS,
            timezone: default_timezone(),
        }
    }
}

/// Accepts an IANA zone name such as `Europe/Rome`.
fn deserialize_timezone<'de, D>(deserializer: D) -> std::result::Result<Tz, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    name.parse::<Tz>()
        .map_err(|_| serde::de::Error::custom(format!("Unknown timezone: '{}'", name)))
}

impl PipelineConfig {
    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            weather_policy: self.weather_policy,
            join: self.join,
            max_age: if self.recency.enabled {
                chrono::Duration::try_hours(self.recency.max_age_hours)
            } else {
                None
            },
            timezone: self.recency.timezone,
        }
    }
}

/// Narrows the displayed stations. An empty filter keeps everything; a
/// station is kept when it matches any configured criterion.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StationFilter {
    #[serde(default)]
    pub provinces: Vec<String>,
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl StationFilter {
    pub fn is_empty(&self) -> bool {
        self.provinces.is_empty() && self.ids.is_empty() && self.patterns.is_empty()
    }

    pub fn matches(&self, station: &StationRecord) -> bool {
        if self.is_empty() {
            return true;
        }

        if self
            .provinces
            .iter()
            .any(|p| p.eq_ignore_ascii_case(&station.province))
        {
            return true;
        }

        if self.ids.contains(&station.id) {
            return true;
        }

        self.patterns.iter().any(|pattern| {
            glob::Pattern::new(pattern)
                .map(|p| p.matches(&station.name))
                .unwrap_or(false)
        })
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FallbackConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub map: MapView,
    #[serde(default)]
    pub marker: MarkerStyle,
}

fn default_output_path() -> PathBuf {
    PathBuf::from("public/stations.json")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            map: MapView::default(),
            marker: MarkerStyle::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration text, expanding `${VAR}` references first.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Checks for:
    /// - Unexpanded environment variables
    /// - An http(s) source URL
    /// - Positive time intervals
    /// - Two-letter province codes
    /// - Finite projection constants
    fn validate(&self) -> Result<()> {
        if self.source.base_url.contains("${") {
            return Err(AppError::Config(
                "Source base_url references an environment variable that is not set".to_string(),
            ));
        }

        let parsed = url::Url::parse(&self.source.base_url).map_err(|e| {
            AppError::Config(format!(
                "Invalid source base_url '{}': {}",
                self.source.base_url, e
            ))
        })?;

        // The upstream origin only speaks plain HTTP, so both schemes are allowed
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(AppError::Config(format!(
                "Source base_url must use http or https, got: {}",
                parsed.scheme()
            )));
        }

        if self.source.timeout_seconds == 0 {
            return Err(AppError::Config(
                "Source timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.scheduler.interval_seconds == 0 {
            return Err(AppError::Config(
                "Scheduler interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.scheduler.interval_seconds < 30 {
            tracing::warn!(
                "Scheduler interval of {} seconds is very short for the upstream site, consider at least 60",
                self.scheduler.interval_seconds
            );
        }

        if self.scheduler.interval_seconds <= self.source.timeout_seconds {
            tracing::warn!(
                "Request timeout ({}s) is not shorter than the refresh interval ({}s); ticks will be skipped while a fetch hangs",
                self.source.timeout_seconds,
                self.scheduler.interval_seconds
            );
        }

        if self.pipeline.recency.enabled {
            let hours = self.pipeline.recency.max_age_hours;
            if hours <= 0 {
                return Err(AppError::Config(
                    "Pipeline recency max_age_hours must be greater than 0".to_string(),
                ));
            }
            if chrono::Duration::try_hours(hours).is_none() {
                return Err(AppError::Config(format!(
                    "Pipeline recency max_age_hours {} is out of range",
                    hours
                )));
            }
        }

        if !self.projection.is_finite() {
            return Err(AppError::Config(
                "Projection constants must be finite numbers".to_string(),
            ));
        }

        for province in &self.stations.provinces {
            if province.len() != 2 {
                return Err(AppError::Config(format!(
                    "Province code '{}' must be exactly 2 characters (e.g., 'BG', 'MI')",
                    province
                )));
            }
        }

        for pattern in &self.stations.patterns {
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(AppError::Config(format!(
                    "Invalid station name pattern '{}': {}",
                    pattern, e
                )));
            }
        }

        if self.pipeline.join == JoinStrategy::ById && self.fallback.path.is_none() {
            return Err(AppError::Config(
                "Pipeline join 'by_id' needs a station catalog: set fallback.path".to_string(),
            ));
        }

        Ok(())
    }
}

fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}").unwrap();

    let mut missing_vars = Vec::new();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&cap[0], &value);
            }
            Err(_) => {
                missing_vars.push(var_name.to_string());
            }
        }
    }

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}\n\n\
             To fix this:\n\
             1. Create a .env file in the project root (copy .env.example)\n\
             2. Set the missing variable{}: export {}=<value>\n\
             3. Or set {} in your environment before running",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars[0],
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}
