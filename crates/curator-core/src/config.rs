//! Run configuration.
//!
//! A single [`CuratorConfig`] value is built once at startup (TOML file, then
//! environment overrides for secrets) and threaded into each component at
//! construction. There is no ambient global configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classifier::MAX_SELECTION_ATTEMPTS;
use crate::self_healing::MAX_HEAL_ATTEMPTS;

/// Fatal configuration errors. These abort the run with no retry.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("required input not found: {0}")]
    MissingInput(PathBuf),
}

/// Completion service endpoint and model routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// OpenAI-compatible API base, without the `/chat/completions` suffix.
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub primary_model: String,
    pub fallback_model: String,
    /// Model used for per-item summaries.
    pub summary_model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Transport-level attempts per call (timeouts, 429/5xx).
    pub call_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            primary_model: "anthropic/claude-3.5-sonnet".to_string(),
            fallback_model: "openai/gpt-4-turbo".to_string(),
            summary_model: "anthropic/claude-3-haiku".to_string(),
            timeout_secs: 60,
            temperature: 0.3,
            max_tokens: 2000,
            call_attempts: 3,
            initial_backoff_ms: 1000,
        }
    }
}

/// Attempt ceilings and concurrency knobs for the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_selection_attempts: u32,
    pub max_heal_attempts: u32,
    /// Candidates sent to the completion service per segment.
    pub max_candidates: usize,
    /// Minimum spacing between segment-level completion calls.
    pub segment_call_spacing_ms: u64,
    pub enrichment_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_selection_attempts: MAX_SELECTION_ATTEMPTS,
            max_heal_attempts: MAX_HEAL_ATTEMPTS,
            max_candidates: 50,
            segment_call_spacing_ms: 5000,
            enrichment_workers: 3,
        }
    }
}

/// Branding, legal footer and link-tracking endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrandConfig {
    pub newsletter_name: String,
    pub website_url: String,
    pub tracking_base_url: String,
    pub unsubscribe_url: String,
}

impl Default for BrandConfig {
    fn default() -> Self {
        Self {
            newsletter_name: "Brief Delights".to_string(),
            website_url: "https://brief.delights.pro".to_string(),
            tracking_base_url: "https://brief.delights.pro/api/track".to_string(),
            unsubscribe_url: "mailto:hello@brief.delights.pro?subject=Unsubscribe".to_string(),
        }
    }
}

/// Human-visible ticketing surface for escalations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub api_base: String,
    #[serde(skip_serializing)]
    pub github_token: Option<String>,
    /// `owner/name`.
    pub github_repository: Option<String>,
    pub labels: Vec<String>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            github_token: None,
            github_repository: None,
            labels: vec!["bug".to_string(), "pipeline".to_string()],
        }
    }
}

/// On-disk locations for run outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Passing artifacts are written here by the file outbox.
    pub outbox_dir: PathBuf,
    /// Patched selections and escalation artifacts.
    pub runs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            outbox_dir: PathBuf::from(".curator/outbox"),
            runs_dir: PathBuf::from(".curator/runs"),
        }
    }
}

/// Complete configuration for one curator run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuratorConfig {
    pub completion: CompletionConfig,
    pub pipeline: PipelineConfig,
    pub brand: BrandConfig,
    pub escalation: EscalationConfig,
    pub paths: PathsConfig,
}

impl CuratorConfig {
    /// Parse TOML text and validate it. Environment overrides are not applied.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: CuratorConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML config file. A missing file is fatal.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load from `path` when given, otherwise start from defaults; then apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Secrets and deployment-specific values from the environment.
    ///
    /// `CURATOR_API_KEY` (or `OPENROUTER_API_KEY`), `GITHUB_TOKEN`,
    /// `GITHUB_REPOSITORY`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) =
            std::env::var("CURATOR_API_KEY").or_else(|_| std::env::var("OPENROUTER_API_KEY"))
        {
            if !key.trim().is_empty() {
                self.completion.api_key = Some(key);
            }
        }
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.trim().is_empty() {
                self.escalation.github_token = Some(token);
            }
        }
        if let Ok(repo) = std::env::var("GITHUB_REPOSITORY") {
            if !repo.trim().is_empty() {
                self.escalation.github_repository = Some(repo);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if p.max_selection_attempts == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_selection_attempts must be at least 1".into(),
            ));
        }
        if p.enrichment_workers == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.enrichment_workers must be at least 1".into(),
            ));
        }
        if p.max_candidates == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_candidates must be at least 1".into(),
            ));
        }
        let c = &self.completion;
        if c.call_attempts == 0 {
            return Err(ConfigError::Invalid(
                "completion.call_attempts must be at least 1".into(),
            ));
        }
        if c.timeout_secs == 0 {
            return Err(ConfigError::Invalid("completion.timeout_secs must be non-zero".into()));
        }
        if c.primary_model.trim().is_empty() || c.fallback_model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "completion.primary_model and completion.fallback_model are required".into(),
            ));
        }
        let b = &self.brand;
        if b.newsletter_name.trim().is_empty() || b.unsubscribe_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "brand.newsletter_name and brand.unsubscribe_url are required".into(),
            ));
        }
        if reqwest::Url::parse(&b.tracking_base_url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "brand.tracking_base_url is not an absolute URL: {}",
                b.tracking_base_url
            )));
        }
        Ok(())
    }
}

/// Fail fast when a required input file is absent.
pub fn require_input(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        Ok(())
    } else {
        Err(ConfigError::MissingInput(path.to_path_buf()))
    }
}
