use crate::errors::ConfigError;
use crate::ingest::{AbsentTestPolicy, NormalizerConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

pub const DEFAULT_DB_PATH: &str = "testpulse.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub version: u32,
    pub db: PathBuf,
    pub log_level: String,
    pub ingest: IngestConfig,
    pub analysis: AnalysisConfig,
    /// Keys present in the file that no field consumed. Empty in strict mode.
    #[serde(skip)]
    pub unknown_fields: Vec<String>,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            db: PathBuf::from(DEFAULT_DB_PATH),
            log_level: "info".to_string(),
            ingest: IngestConfig::default(),
            analysis: AnalysisConfig::default(),
            unknown_fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub absent_policy: AbsentTestPolicy,
    pub key_normalizer: NormalizerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisProvider {
    #[default]
    Openai,
    /// Analysis requests fail with a marker instead of calling out.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub provider: AnalysisProvider,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Never read from the file; only from the environment.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: AnalysisProvider::Openai,
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 60,
            api_key: None,
        }
    }
}

impl PulseConfig {
    /// Applies `PULSE_*` environment overrides. Values that fail to parse are
    /// ignored.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|k| std::env::var(k).ok())
    }

    pub fn apply_env_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("PULSE_DB") {
            self.db = PathBuf::from(v);
        }
        if let Some(v) = var("PULSE_LOG") {
            self.log_level = v;
        }
        if let Some(v) = var("PULSE_ANALYSIS_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.analysis.timeout_secs = n;
            }
        }
        if let Some(v) = var("PULSE_ANALYSIS_MODEL") {
            self.analysis.model = v;
        }
        if let Some(v) = var("PULSE_ANALYSIS_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            if !v.trim().is_empty() {
                self.analysis.api_key = Some(v);
            }
        }
    }
}

/// Loads a YAML config. Unknown keys fail the load in strict mode and are
/// recorded in [`PulseConfig::unknown_fields`] otherwise.
pub fn load_config(path: &Path, strict: bool) -> Result<PulseConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    parse_config(&raw, strict)
        .map_err(|e| ConfigError(format!("{} (file: {})", e.0, path.display())))
}

pub fn parse_config(raw: &str, strict: bool) -> Result<PulseConfig, ConfigError> {
    let mut ignored_keys = BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);
    let mut cfg: PulseConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    // anchors and extension keys are allowed anywhere
    let unknown: Vec<String> = ignored_keys
        .into_iter()
        .filter(|k| !k.starts_with('_') && !k.starts_with("x-"))
        .collect();
    if strict && !unknown.is_empty() {
        return Err(ConfigError(format!(
            "Unknown fields detected in strict mode: {:?}",
            unknown
        )));
    }
    cfg.unknown_fields = unknown;

    if cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(ConfigError(format!(
            "unsupported config version {} (supported: {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }
    if cfg.analysis.timeout_secs == 0 {
        return Err(ConfigError("analysis.timeout_secs must be > 0".into()));
    }
    cfg.ingest.key_normalizer.build()?;

    Ok(cfg)
}
