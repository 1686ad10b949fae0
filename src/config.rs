//! TOML configuration.
//!
//! Every section is optional; a file containing only `[db] path = "..."`
//! is a complete configuration. [`load_config`] parses and validates,
//! [`Config::minimal`] is the in-code default used when no file exists.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::synthesis::LibraryProfile;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub duplicates: DuplicateConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/kb.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Knowledge-repository files smaller than this are treated as noise.
    #[serde(default = "default_min_file_bytes")]
    pub min_file_bytes: u64,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            min_file_bytes: default_min_file_bytes(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}
fn default_min_file_bytes() -> u64 {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_pattern_limit")]
    pub pattern_limit: i64,
    #[serde(default = "default_reference_limit")]
    pub reference_limit: i64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_snippet_tokens")]
    pub snippet_tokens: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            pattern_limit: default_pattern_limit(),
            reference_limit: default_reference_limit(),
            cache_capacity: default_cache_capacity(),
            snippet_tokens: default_snippet_tokens(),
        }
    }
}

fn default_pattern_limit() -> i64 {
    3
}
fn default_reference_limit() -> i64 {
    5
}
fn default_cache_capacity() -> usize {
    50
}
fn default_snippet_tokens() -> i64 {
    32
}

#[derive(Debug, Deserialize, Clone)]
pub struct DuplicateConfig {
    /// Documents sampled per existing library for topic-overlap scoring.
    #[serde(default = "default_sample_size")]
    pub sample_size: i64,
    #[serde(default = "default_report_threshold")]
    pub report_threshold: f64,
    #[serde(default = "default_redundant_threshold")]
    pub redundant_threshold: f64,
    #[serde(default = "default_library_conflict_threshold")]
    pub library_conflict_threshold: f64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            report_threshold: default_report_threshold(),
            redundant_threshold: default_redundant_threshold(),
            library_conflict_threshold: default_library_conflict_threshold(),
        }
    }
}

fn default_sample_size() -> i64 {
    5
}
fn default_report_threshold() -> f64 {
    0.3
}
fn default_redundant_threshold() -> f64 {
    0.7
}
fn default_library_conflict_threshold() -> f64 {
    0.5
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SynthesisConfig {
    #[serde(default)]
    pub profiles: Vec<LibraryProfile>,
}

impl SynthesisConfig {
    /// Resolve the profile for a library: configured, then built-in, then generic.
    pub fn profile_for(&self, library: &str) -> LibraryProfile {
        self.profiles
            .iter()
            .find(|p| p.library == library)
            .cloned()
            .map(LibraryProfile::normalized)
            .or_else(|| LibraryProfile::builtin(library))
            .unwrap_or_else(|| LibraryProfile::generic(library))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidationConfig {
    #[serde(default)]
    pub scripts: Vec<ScriptConfig>,
    #[serde(default = "default_script_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            scripts: Vec::new(),
            timeout_secs: default_script_timeout_secs(),
        }
    }
}

fn default_script_timeout_secs() -> u64 {
    120
}

/// An external validation command, run with the library name appended.
#[derive(Debug, Deserialize, Clone)]
pub struct ScriptConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Config {
    pub fn minimal() -> Self {
        Self {
            db: DbConfig::default(),
            import: ImportConfig::default(),
            search: SearchConfig::default(),
            duplicates: DuplicateConfig::default(),
            synthesis: SynthesisConfig::default(),
            validation: ValidationConfig::default(),
        }
    }

    /// Minimal configuration pointing at a specific database file.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        let mut config = Self::minimal();
        config.db.path = path.into();
        config
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Search
    if config.search.pattern_limit < 1 {
        anyhow::bail!("search.pattern_limit must be >= 1");
    }
    if config.search.reference_limit < 1 {
        anyhow::bail!("search.reference_limit must be >= 1");
    }
    if config.search.cache_capacity == 0 {
        anyhow::bail!("search.cache_capacity must be > 0");
    }
    if !(1..=64).contains(&config.search.snippet_tokens) {
        anyhow::bail!("search.snippet_tokens must be in [1, 64]");
    }

    // Duplicates
    let dup = &config.duplicates;
    if dup.sample_size < 1 {
        anyhow::bail!("duplicates.sample_size must be >= 1");
    }
    for (name, value) in [
        ("report_threshold", dup.report_threshold),
        ("redundant_threshold", dup.redundant_threshold),
        ("library_conflict_threshold", dup.library_conflict_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            anyhow::bail!("duplicates.{} must be in [0.0, 1.0]", name);
        }
    }
    if dup.report_threshold > dup.redundant_threshold {
        anyhow::bail!("duplicates.report_threshold must not exceed duplicates.redundant_threshold");
    }

    // Synthesis
    for profile in &config.synthesis.profiles {
        if profile.library.trim().is_empty() {
            anyhow::bail!("synthesis.profiles entries need a non-empty library name");
        }
    }

    // Validation
    if !(1..=300).contains(&config.validation.timeout_secs) {
        anyhow::bail!("validation.timeout_secs must be in [1, 300]");
    }
    for script in &config.validation.scripts {
        if script.command.trim().is_empty() {
            anyhow::bail!("validation script '{}' has an empty command", script.name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_only_config_fills_defaults() {
        let config: Config = toml::from_str("[db]\npath = \"/tmp/kb.sqlite\"\n").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.db.path, PathBuf::from("/tmp/kb.sqlite"));
        assert_eq!(config.import.min_file_bytes, 200);
        assert_eq!(config.search.cache_capacity, 50);
        assert_eq!(config.duplicates.sample_size, 5);
        assert_eq!(config.validation.timeout_secs, 120);
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let config: Config = toml::from_str(
            "[duplicates]\nreport_threshold = 0.8\nredundant_threshold = 0.5\n",
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_long_script_timeout() {
        let config: Config = toml::from_str("[validation]\ntimeout_secs = 900\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_configured_profile_overrides_builtin() {
        let config: Config = toml::from_str(
            r#"
[[synthesis.profiles]]
library = "SwiftSharing"
slug = "sharing"
display_name = "Sharing"
markers = ["@Shared"]
"#,
        )
        .unwrap();
        let profile = config.synthesis.profile_for("SwiftSharing");
        assert_eq!(profile.slug, "sharing");
        assert_eq!(profile.markers, vec!["@Shared".to_string()]);
    }

    #[test]
    fn test_unknown_library_gets_generic_profile() {
        let profile = Config::minimal().synthesis.profile_for("Tokio");
        assert_eq!(profile.library, "Tokio");
        assert_eq!(profile.slug, "tokio");
    }
}
