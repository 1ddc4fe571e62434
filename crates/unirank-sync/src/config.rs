//! Environment configuration and the `sources.yaml` registry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use unirank_adapters::{adapter_for_source, SourceKind, BUILTIN_SOURCE_IDS};
use unirank_core::ScoreScale;
use unirank_storage::DelayPolicy;

use crate::persist::DEFAULT_BATCH_SIZE;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database_url: Option<String>,
    pub cache_path: PathBuf,
    pub reports_dir: PathBuf,
    pub user_agent: Option<String>,
    pub http_timeout_secs: u64,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub batch_size: usize,
    pub scheduler_enabled: bool,
    pub sync_cron: String,
    pub scheduled_countries: Vec<String>,
    pub web_port: u16,
    pub use_mock_data: bool,
    pub workspace_root: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            cache_path: PathBuf::from("./data/universities.json"),
            reports_dir: PathBuf::from("./reports"),
            user_agent: None,
            http_timeout_secs: 20,
            delay_min_ms: 2000,
            delay_max_ms: 5000,
            batch_size: DEFAULT_BATCH_SIZE,
            scheduler_enabled: false,
            sync_cron: "0 0 3 * * *".to_string(),
            scheduled_countries: Vec::new(),
            web_port: 8000,
            use_mock_data: false,
            workspace_root: PathBuf::from("."),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True" | "yes"))
        .unwrap_or(false)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub fn split_countries(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            cache_path: std::env::var("UNIRANK_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_path),
            reports_dir: std::env::var("UNIRANK_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.reports_dir),
            user_agent: std::env::var("UNIRANK_USER_AGENT").ok(),
            http_timeout_secs: env_parse("UNIRANK_HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
            delay_min_ms: env_parse("UNIRANK_DELAY_MIN_MS", defaults.delay_min_ms),
            delay_max_ms: env_parse("UNIRANK_DELAY_MAX_MS", defaults.delay_max_ms),
            batch_size: env_parse("UNIRANK_BATCH_SIZE", defaults.batch_size),
            scheduler_enabled: env_flag("UNIRANK_SCHEDULER_ENABLED"),
            sync_cron: std::env::var("UNIRANK_SYNC_CRON").unwrap_or(defaults.sync_cron),
            scheduled_countries: std::env::var("UNIRANK_SCHEDULED_COUNTRIES")
                .map(|v| split_countries(&v))
                .unwrap_or_default(),
            web_port: env_parse("UNIRANK_WEB_PORT", defaults.web_port),
            use_mock_data: env_flag("UNIRANK_USE_MOCK_DATA"),
            workspace_root: defaults.workspace_root,
        }
    }

    pub fn delay_policy(&self) -> DelayPolicy {
        DelayPolicy::new(
            Duration::from_millis(self.delay_min_ms),
            Duration::from_millis(self.delay_max_ms),
        )
    }

    pub fn sources_path(&self) -> PathBuf {
        self.workspace_root.join("sources.yaml")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub kind: SourceKind,
    #[serde(default)]
    pub score_scale: Option<ScoreScale>,
    #[serde(default)]
    pub delay_min_ms: Option<u64>,
    #[serde(default)]
    pub delay_max_ms: Option<u64>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn enabled_by_default() -> bool {
    true
}

impl SourceConfig {
    /// Per-source override of the global politeness window.
    pub fn delay_policy(&self, fallback: DelayPolicy) -> DelayPolicy {
        match (self.delay_min_ms, self.delay_max_ms) {
            (None, None) => fallback,
            (min, max) => DelayPolicy::new(
                min.map(Duration::from_millis).unwrap_or(fallback.min_delay),
                max.map(Duration::from_millis).unwrap_or(fallback.max_delay),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    /// Every built-in adapter, enabled, in registry order.
    pub fn builtin() -> Self {
        let sources = BUILTIN_SOURCE_IDS
            .iter()
            .filter_map(|id| adapter_for_source(id))
            .map(|adapter| SourceConfig {
                source_id: adapter.source_id().to_string(),
                display_name: adapter.source_id().to_string(),
                enabled: true,
                kind: adapter.kind(),
                score_scale: None,
                delay_min_ms: None,
                delay_max_ms: None,
                notes: None,
            })
            .collect();
        Self { sources }
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing source registry yaml")
    }

    /// Reads `path`; a missing file yields the built-in registry.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::from_yaml(&text).with_context(|| format!("parsing {}", path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no source registry file; using built-in sources");
                Ok(Self::builtin())
            }
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}
