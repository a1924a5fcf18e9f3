use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::requirement::PipelineStage;

/// Main configuration structure for reqforge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Verification loop and stage settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Generation oracle endpoint
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Retry policy for oracle calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Document ingestion settings
    #[serde(default)]
    pub documents: DocumentConfig,

    /// Role instruction overrides
    #[serde(default)]
    pub prompts: PromptConfig,
}

/// Per-stage oracle call timeouts, keyed by stage number.
///
/// Serialized as a map with string keys (`"1": 300`) so it survives YAML and
/// environment layering; keys must parse as integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, u64>",
    into = "BTreeMap<String, u64>"
)]
pub struct StageTimeouts(BTreeMap<u8, u64>);

impl StageTimeouts {
    pub fn new(entries: impl IntoIterator<Item = (u8, u64)>) -> Self {
        Self(entries.into_iter().collect())
    }

    /// Timeout for one stage, if configured.
    pub fn get(&self, stage: PipelineStage) -> Option<Duration> {
        self.0.get(&stage.get()).map(|secs| Duration::from_secs(*secs))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, u64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self::new([(1, 300), (2, 240), (3, 180), (4, 120), (5, 240), (6, 60)])
    }
}

impl TryFrom<BTreeMap<String, u64>> for StageTimeouts {
    type Error = String;

    fn try_from(raw: BTreeMap<String, u64>) -> Result<Self, Self::Error> {
        raw.into_iter()
            .map(|(key, secs)| {
                key.trim()
                    .parse::<u8>()
                    .map(|stage| (stage, secs))
                    .map_err(|_| format!("stage timeout key '{key}' is not a stage number"))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Self)
    }
}

impl From<StageTimeouts> for BTreeMap<String, u64> {
    fn from(timeouts: StageTimeouts) -> Self {
        timeouts
            .0
            .into_iter()
            .map(|(stage, secs)| (stage.to_string(), secs))
            .collect()
    }
}

/// Verification loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Maximum verification iterations (1-10)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Consecutive clean verifications needed to converge (1-5)
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: u32,

    /// Run the stage 4 review hook between verification and fixing
    #[serde(default)]
    pub enable_stage4_review: bool,

    /// Oracle call timeout per stage, in seconds
    #[serde(default)]
    pub stage_timeouts: StageTimeouts,
}

const fn default_max_iterations() -> u32 {
    5
}

const fn default_acceptance_threshold() -> u32 {
    3
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            acceptance_threshold: default_acceptance_threshold(),
            enable_stage4_review: false,
            stage_timeouts: StageTimeouts::default(),
        }
    }
}

/// OpenAI-compatible oracle endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OracleConfig {
    /// Base URL of the chat completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// API key; falls back to `OPENAI_API_KEY` when unset
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Sampling temperature (0.0-2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per reply
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Client-side request rate limit
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Transport-level timeout for one HTTP request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

const fn default_temperature() -> f32 {
    0.1
}

const fn default_max_tokens() -> u32 {
    4000
}

const fn default_requests_per_second() -> u32 {
    5
}

const fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            requests_per_second: default_requests_per_second(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total attempts per oracle call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Random spread applied to each delay, as a fraction (0.0-1.0)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    1000
}

const fn default_max_delay_ms() -> u64 {
    30_000
}

const fn default_jitter() -> f64 {
    0.1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation of log files (daily, hourly, never)
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Document ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DocumentConfig {
    /// Characters of each document included in a drafting payload
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

const fn default_excerpt_chars() -> usize {
    2000
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

/// Role instruction configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PromptConfig {
    /// Directory holding `drafting_prompt.txt` and `verifying_prompt.txt`
    #[serde(default)]
    pub directory: Option<PathBuf>,
}
