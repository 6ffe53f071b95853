use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::template::{DuplicatePolicy, RenameRule};

pub const DEFAULT_TARGET_TEMPLATE: &str = "Template name";
pub const DEFAULT_REQUEST_OLDID: &str = "999999999";

pub const TARGET_TEMPLATE_ENV: &str = "EXTLINKS_TARGET_TEMPLATE";
pub const REQUEST_OLDID_ENV: &str = "EXTLINKS_REQUEST_OLDID";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ExtlinksConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub task: TaskConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    #[serde(default)]
    pub custom_namespaces: Vec<CustomNamespace>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CustomNamespace {
    pub name: String,
    pub id: i32,
    pub folder: Option<String>,
}

impl CustomNamespace {
    pub fn folder(&self) -> &str {
        self.folder.as_deref().unwrap_or(&self.name)
    }
}

/// One parameter-migration task: which template to rewrite and how.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaskConfig {
    pub target_template: String,
    /// Redirect names that also invoke the target template.
    pub aliases: Vec<String>,
    pub remove_parameters: Vec<String>,
    /// Parameters dropped when their value equals the page name without its disambiguator.
    pub pagename_parameters: Vec<String>,
    pub rename: Vec<RenameRule>,
    /// Revision of the request page linked from the edit summary.
    pub request_oldid: Option<String>,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            target_template: DEFAULT_TARGET_TEMPLATE.to_string(),
            aliases: Vec::new(),
            remove_parameters: vec!["id".to_string(), "1".to_string()],
            pagename_parameters: vec!["name".to_string(), "2".to_string()],
            rename: vec![RenameRule::new("1", "id"), RenameRule::new("2", "name")],
            request_oldid: Some(DEFAULT_REQUEST_OLDID.to_string()),
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl TaskConfig {
    /// Target template first, then its aliases.
    pub fn template_names(&self) -> Vec<&str> {
        std::iter::once(self.target_template.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .collect()
    }

    pub fn request_oldid(&self) -> Option<&str> {
        self.request_oldid
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

impl ExtlinksConfig {
    /// Apply environment overrides: env > config > default.
    pub fn resolved(&self) -> Self {
        self.resolved_with_lookup(|key| env::var(key).ok())
    }

    pub fn resolved_with_lookup<F>(&self, lookup_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut resolved = self.clone();
        if let Some(value) = env_value(&lookup_env, TARGET_TEMPLATE_ENV) {
            resolved.task.target_template = value;
        }
        if let Some(value) = env_value(&lookup_env, REQUEST_OLDID_ENV) {
            resolved.task.request_oldid = Some(value);
        }
        resolved
    }

    pub fn validate(&self) -> Result<()> {
        if self.task.target_template.trim().is_empty() {
            bail!("task.target_template cannot be empty");
        }
        for rule in &self.task.rename {
            if rule.from.trim().is_empty() || rule.to.trim().is_empty() {
                bail!(
                    "task.rename entries need both `from` and `to` (got {:?} -> {:?})",
                    rule.from,
                    rule.to
                );
            }
        }
        for namespace in &self.wiki.custom_namespaces {
            if namespace.name.trim().is_empty() {
                bail!("custom namespace name cannot be empty");
            }
        }
        Ok(())
    }
}

fn env_value<F>(lookup_env: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup_env(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Load and parse the config TOML. Returns the default config if the file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<ExtlinksConfig> {
    if !config_path.exists() {
        return Ok(ExtlinksConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: ExtlinksConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    parsed
        .validate()
        .with_context(|| format!("invalid config {}", config_path.display()))?;
    Ok(parsed)
}
