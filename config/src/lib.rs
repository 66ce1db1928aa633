//! Lintel configuration: `~/.lintel/config.toml`.
//!
//! Every section is optional; a missing file or section yields the built-in
//! defaults. The loaded [`LintelConfig`] converts into the settings types the
//! engine and runner consume.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lintel_engine::{
    AnalyzerRegistry, AnalyzerSettings, DiscoveryPolicy, RegistryError, SchedulerConfig,
    ScriptAnalyzer, StyleAnalyzer,
};
use lintel_runner::{RunnerSettings, Shell, ShellConfig};
use lintel_types::AnalyzerKind;
use serde::Deserialize;

const fn default_true() -> bool {
    true
}

const fn default_quiet_period_ms() -> u64 {
    500
}

const fn default_process_timeout_secs() -> u64 {
    120
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LintelConfig {
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
    /// Launch shell override.
    pub shell: Option<ShellConfig>,
    #[serde(default)]
    pub analyzers: AnalyzersSection,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct SchedulerSection {
    /// Debounce quiet period after the last edit.
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
    /// Bounded wait for an analyzer process. 0 disables the limit.
    #[serde(default = "default_process_timeout_secs")]
    pub process_timeout_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            quiet_period_ms: default_quiet_period_ms(),
            process_timeout_secs: default_process_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct DiscoverySection {
    /// Only run an analyzer where one of its marker config files exists.
    #[serde(default)]
    pub require_config_file: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzersSection {
    #[serde(default)]
    pub style: AnalyzerConfig,
    #[serde(default)]
    pub script: AnalyzerConfig,
}

/// Per-analyzer overrides. Unset fields keep the analyzer's defaults.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AnalyzerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Shell command line; `${VAR}` references are expanded.
    pub command: Option<String>,
    pub config_files: Option<Vec<String>>,
    #[serde(default)]
    pub ignored_rules: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
            config_files: None,
            ignored_rules: Vec::new(),
        }
    }
}

impl AnalyzerConfig {
    /// Merge these overrides onto the defaults for `kind`.
    #[must_use]
    pub fn settings(&self, kind: AnalyzerKind) -> AnalyzerSettings {
        let mut settings = AnalyzerSettings::for_kind(kind);
        if let Some(command) = &self.command {
            settings.command = expand_env_vars(command);
        }
        if let Some(files) = &self.config_files {
            settings.config_files.clone_from(files);
        }
        settings.ignored_rules.clone_from(&self.ignored_rules);
        settings
    }
}

/// Replace `${VAR}` with the variable's value; unset variables become empty.
/// An unterminated `${` is kept literally.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

impl LintelConfig {
    /// Load from `path`, or from [`config_path`] when `None`.
    ///
    /// A missing default file yields the defaults; an explicitly named file
    /// must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match config_path() {
                Some(path) if path.exists() => path,
                _ => {
                    tracing::debug!("No config file; using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read { path, source: err });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "Loaded config");
                Ok(config)
            }
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse { path, source: err })
            }
        }
    }

    /// Registry holding every enabled analyzer.
    pub fn build_registry(&self) -> Result<AnalyzerRegistry, RegistryError> {
        let mut registry = AnalyzerRegistry::new();
        let style = &self.analyzers.style;
        if style.enabled {
            registry.register(Arc::new(StyleAnalyzer::new(
                style.settings(AnalyzerKind::Style),
            )))?;
        }
        let script = &self.analyzers.script;
        if script.enabled {
            registry.register(Arc::new(ScriptAnalyzer::new(
                script.settings(AnalyzerKind::Script),
            )))?;
        }
        Ok(registry)
    }

    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            quiet_period: Duration::from_millis(self.scheduler.quiet_period_ms),
        }
    }

    #[must_use]
    pub fn runner_settings(&self) -> RunnerSettings {
        let timeout = match self.scheduler.process_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        RunnerSettings::new(Shell::detect(self.shell.as_ref())).with_timeout(timeout)
    }

    #[must_use]
    pub fn discovery_policy(&self) -> DiscoveryPolicy {
        DiscoveryPolicy {
            require_config_file: self.discovery.require_config_file,
        }
    }
}

/// `~/.lintel/config.toml`, or `None` without a home directory.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".lintel").join("config.toml"))
}
