use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub vault: VaultConfig,
    pub data_lake: DataLakeConfig,
    pub watch: WatchConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    pub path: PathBuf,
    #[serde(default = "default_notes_subdir")]
    pub notes_subdir: String,
    /// Optional path to a note template overriding the built-in one.
    #[serde(default)]
    pub template: Option<PathBuf>,
}

fn default_notes_subdir() -> String {
    "sources/file".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataLakeConfig {
    pub path: PathBuf,
    /// Metadata database location. Defaults to `<data_lake.path>/meta.db`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl DataLakeConfig {
    pub fn raw_dir(&self) -> PathBuf {
        self.path.join("raw")
    }

    pub fn extracted_dir(&self) -> PathBuf {
        self.path.join("extracted")
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.path.join("meta.db"))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    pub paths: Vec<PathBuf>,
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Directory names pruned from scans and ignored by the watcher,
    /// matched case-insensitively against every path component.
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
    /// Filename glob patterns that are never ingested.
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_exclude_dirs() -> Vec<String> {
    [".git", "node_modules", ".venv", "target", ".obsidian"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude_globs() -> Vec<String> {
    [
        "*.tmp", "*.log", "*.exe", "*.dll", "*.zip", "*.7z", "*.rar", "*.png", "*.jpg", "*.jpeg",
        "*.gif", "*.mp4", "*.mov",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_scan_interval_secs() -> u64 {
    60
}

fn default_debounce_ms() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_max_file_mb")]
    pub max_file_mb: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_mb: default_max_file_mb(),
        }
    }
}

impl LimitsConfig {
    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_mb * 1024 * 1024
    }
}

fn default_max_file_mb() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct NormalizerConfig {
    /// OpenAI-compatible endpoint root, e.g. a local LM Studio server.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_language")]
    pub language: String,
    /// Ask the endpoint for `response_format: json_object`. Disable for
    /// servers that reject the parameter.
    #[serde(default = "default_true")]
    pub json_mode: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            max_input_chars: default_max_input_chars(),
            language: default_language(),
            json_mode: true,
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:1234/v1".to_string()
}

fn default_model() -> String {
    "local-model".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_max_input_chars() -> usize {
    8000
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_true")]
    pub log_events: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { log_events: true }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.watch.paths.is_empty() {
        anyhow::bail!("watch.paths must list at least one directory or file");
    }

    if config.watch.debounce_ms == 0 {
        anyhow::bail!("watch.debounce_ms must be > 0");
    }

    if config.watch.scan_interval_secs == 0 {
        anyhow::bail!("watch.scan_interval_secs must be >= 1");
    }

    if config.limits.max_file_mb == 0 {
        anyhow::bail!("limits.max_file_mb must be > 0");
    }

    if config.normalizer.max_input_chars == 0 {
        anyhow::bail!("normalizer.max_input_chars must be > 0");
    }

    Ok(config)
}
