/// Configuration for synchronization groups
use crate::pattern::{relative_slash_path, PatternError, SourcePattern};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.crowdin.com";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid configuration {name}: {reason}")]
    Invalid { name: String, reason: String },
    #[error("Invalid source pattern in configuration {name}: {source}")]
    Pattern {
        name: String,
        #[source]
        source: PatternError,
    },
    #[error("No API token for configuration {0}: set api_token or api_token_env")]
    MissingToken(String),
}

/// A `files` entry as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRule {
    pub source: String,
    pub translation: String,
    /// Overrides the group-level flag for this entry
    #[serde(default)]
    pub preserve_hierarchy: Option<bool>,
}

/// Resolved, immutable source rule for one run.
#[derive(Debug, Clone)]
pub struct SourceRule {
    pub source: SourcePattern,
    pub translation: String,
    pub preserve_hierarchy: bool,
}

impl SourceRule {
    pub fn new(
        source: &str,
        translation: impl Into<String>,
        preserve_hierarchy: bool,
    ) -> Result<Self, PatternError> {
        Ok(Self {
            source: SourcePattern::parse(source)?,
            translation: translation.into(),
            preserve_hierarchy,
        })
    }
}

/// First rule whose source pattern selects `file`.
pub fn find_rule_for<'a>(
    root: &Path,
    rules: &'a [SourceRule],
    file: &Path,
) -> Option<&'a SourceRule> {
    let relative = relative_slash_path(root, file)?;
    rules.iter().find(|rule| rule.source.matches(&relative))
}

/// One configuration group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub name: String,
    pub project_id: u64,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub api_token_env: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    #[serde(default)]
    pub preserve_hierarchy: bool,
    #[serde(default)]
    pub disable_branches: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub files: Vec<FileRule>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_base_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_poll_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConfigDocument {
    Many(Vec<SyncConfig>),
    One(Box<SyncConfig>),
}

impl SyncConfig {
    /// Load every configuration group from a YAML file.
    ///
    /// `base_path` is resolved against the directory holding the file.
    pub fn load_all<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config_dir = path.parent().unwrap_or(Path::new("."));
        Self::from_yaml(&content, config_dir)
    }

    pub fn from_yaml(content: &str, config_dir: &Path) -> Result<Vec<Self>, ConfigError> {
        let mut configs = match serde_yaml::from_str::<ConfigDocument>(content)? {
            ConfigDocument::Many(configs) => configs,
            ConfigDocument::One(config) => vec![*config],
        };

        let single = configs.len() == 1;
        let mut names = HashSet::new();
        for (position, config) in configs.iter_mut().enumerate() {
            if config.name.trim().is_empty() {
                config.name = if single {
                    "default".to_string()
                } else {
                    format!("config-{}", position + 1)
                };
            }
            if !names.insert(config.name.clone()) {
                return Err(ConfigError::Invalid {
                    name: config.name.clone(),
                    reason: "configuration names must be unique".into(),
                });
            }

            let joined = config_dir.join(&config.base_path);
            config.base_path = dunce::canonicalize(&joined).unwrap_or(joined);
            config.validate()?;
        }

        Ok(configs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.files.is_empty() {
            return Err(self.invalid("at least one files entry is required"));
        }
        for (position, file) in self.files.iter().enumerate() {
            if file.source.trim().is_empty() {
                return Err(self.invalid(&format!("files[{position}].source is empty")));
            }
            if file.translation.trim().is_empty() {
                return Err(self.invalid(&format!("files[{position}].translation is empty")));
            }
        }
        if self.base_url.trim().is_empty() {
            return Err(self.invalid("base_url is empty"));
        }
        if !self.has_token_source() {
            return Err(ConfigError::MissingToken(self.name.clone()));
        }
        self.rules().map(|_| ())
    }

    fn invalid(&self, reason: &str) -> ConfigError {
        ConfigError::Invalid {
            name: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    /// Resolves every `files` entry, applying the group-level
    /// `preserve_hierarchy` where an entry does not set its own.
    pub fn rules(&self) -> Result<Vec<SourceRule>, ConfigError> {
        self.files
            .iter()
            .map(|file| {
                SourceRule::new(
                    &file.source,
                    file.translation.clone(),
                    file.preserve_hierarchy.unwrap_or(self.preserve_hierarchy),
                )
                .map_err(|source| ConfigError::Pattern {
                    name: self.name.clone(),
                    source,
                })
            })
            .collect()
    }

    /// A literal token or an environment variable to read it from. The
    /// variable itself is only read by [`Self::api_token`].
    fn has_token_source(&self) -> bool {
        let literal = self.api_token.as_deref().is_some_and(|t| !t.trim().is_empty());
        let env = self.api_token_env.as_deref().is_some_and(|v| !v.trim().is_empty());
        literal || env
    }

    pub fn api_token(&self) -> Result<String, ConfigError> {
        if let Some(token) = self.api_token.as_deref().map(str::trim) {
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }
        self.api_token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ConfigError::MissingToken(self.name.clone()))
    }

    /// Branch the group synchronizes against, if branches are enabled.
    pub fn branch_name(&self, current: Option<&str>) -> Option<String> {
        if self.disable_branches {
            return None;
        }
        current
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Branch checked out in the git work tree containing `dir`.
///
/// `None` outside a work tree, on a detached HEAD, or without git.
pub fn current_git_branch(dir: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(dir)
        .output()
        .ok()?;
    if !output.status.success() {
        log::debug!("no git branch for {}", dir.display());
        return None;
    }
    let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!branch.is_empty() && branch != "HEAD").then_some(branch)
}
