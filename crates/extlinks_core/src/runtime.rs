use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::config::{DEFAULT_REQUEST_OLDID, DEFAULT_TARGET_TEMPLATE};

pub const STATE_DIR_NAME: &str = ".extlinks";
pub const CONTENT_DIR_NAME: &str = "wiki_content";
pub const PROJECT_ROOT_ENV: &str = "EXTLINKS_PROJECT_ROOT";
pub const CONFIG_ENV: &str = "EXTLINKS_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
    pub executable_dir: Option<PathBuf>,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        let executable_dir = env::current_exe()
            .ok()
            .and_then(|path| path.parent().map(Path::to_path_buf));
        Ok(Self {
            cwd,
            executable_dir,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub wiki_content_dir: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nstate_dir={}\nwiki_content_dir={}\nconfig_path={} ({})",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.wiki_content_dir),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub wiki_content_exists: bool,
    pub state_dir_exists: bool,
    pub config_exists: bool,
    pub warnings: Vec<String>,
}

pub fn inspect_runtime(paths: &ResolvedPaths) -> RuntimeStatus {
    let wiki_content_exists = paths.wiki_content_dir.is_dir();
    let state_dir_exists = paths.state_dir.is_dir();
    let config_exists = paths.config_path.exists();

    let mut warnings = Vec::new();
    if !wiki_content_exists {
        warnings.push("wiki_content/ is missing; run `extlinks init` first".to_string());
    }
    if !config_exists {
        warnings.push("config file is missing; built-in task defaults apply".to_string());
    }

    RuntimeStatus {
        wiki_content_exists,
        state_dir_exists,
        config_exists,
        warnings,
    }
}

/// Batch runs need a content directory to walk.
pub fn ensure_runtime_ready_for_batch(paths: &ResolvedPaths, status: &RuntimeStatus) -> Result<()> {
    if !status.wiki_content_exists {
        bail!(
            "no content directory at {}\nRun: extlinks init --project-root {}",
            normalize_for_display(&paths.wiki_content_dir),
            normalize_for_display(&paths.project_root)
        );
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub created_dirs: Vec<PathBuf>,
    pub wrote_config: bool,
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = resolve_project_root(context, overrides, &lookup_env)
        .context("failed to resolve project root")?;
    let state_dir = project_root.join(STATE_DIR_NAME);
    let wiki_content_dir = project_root.join(CONTENT_DIR_NAME);

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (
            absolutize(path, &project_root),
            ValueSource::Flag,
        )
    } else if let Some(value) = non_empty_env(&lookup_env, CONFIG_ENV) {
        (
            absolutize(Path::new(&value), &project_root),
            ValueSource::Env,
        )
    } else {
        (state_dir.join("config.toml"), ValueSource::Default)
    };

    Ok(ResolvedPaths {
        project_root,
        wiki_content_dir,
        state_dir,
        config_path,
        root_source,
        config_source,
    })
}

pub fn init_layout(paths: &ResolvedPaths, options: &InitOptions) -> Result<InitReport> {
    let mut created_dirs = Vec::new();
    let required_dirs = [
        paths.wiki_content_dir.join("Main"),
        paths.state_dir.clone(),
    ];
    for dir in &required_dirs {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            created_dirs.push(dir.clone());
        }
    }

    let wrote_config = write_text_file(&paths.config_path, &render_default_config(), options.force)?;
    Ok(InitReport {
        created_dirs,
        wrote_config,
    })
}

/// Commented config matching the built-in defaults.
pub fn render_default_config() -> String {
    format!(
        "# extlinks task configuration (materialized by `extlinks init`)\n\n[wiki]\n# Extra namespaces whose pages are never edited:\n# [[wiki.custom_namespaces]]\n# name = \"Lore\"\n# id = 3000\n# folder = \"Lore\"\n\n[task]\ntarget_template = \"{DEFAULT_TARGET_TEMPLATE}\"\n# Redirects to the target template:\naliases = []\nremove_parameters = [\"id\", \"1\"]\n# Removed when equal to the page title without its disambiguator:\npagename_parameters = [\"name\", \"2\"]\nrequest_oldid = \"{DEFAULT_REQUEST_OLDID}\"\n# keep-last | keep-first\nduplicate_policy = \"keep-last\"\n\n[[task.rename]]\nfrom = \"1\"\nto = \"id\"\n\n[[task.rename]]\nfrom = \"2\"\nto = \"name\"\n",
    )
}

fn resolve_project_root<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: &F,
) -> Result<(PathBuf, ValueSource)>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.project_root.as_deref() {
        return Ok((absolutize(path, &context.cwd), ValueSource::Flag));
    }

    if let Some(value) = non_empty_env(lookup_env, PROJECT_ROOT_ENV) {
        return Ok((absolutize(Path::new(&value), &context.cwd), ValueSource::Env));
    }

    let root = detect_project_root_heuristic(&context.cwd, context.executable_dir.as_deref());
    Ok((root, ValueSource::Heuristic))
}

fn non_empty_env<F>(lookup_env: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup_env(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn detect_project_root_heuristic(cwd: &Path, executable_dir: Option<&Path>) -> PathBuf {
    let mut seen = HashSet::new();
    let candidates = cwd
        .ancestors()
        .chain(executable_dir.into_iter().flat_map(Path::ancestors));
    for candidate in candidates {
        if !seen.insert(normalize_for_display(candidate)) {
            continue;
        }
        if candidate.join(CONTENT_DIR_NAME).is_dir() {
            return candidate.to_path_buf();
        }
    }
    cwd.to_path_buf()
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use tempfile::tempdir;

    use super::{
        CONFIG_ENV, InitOptions, PROJECT_ROOT_ENV, PathOverrides, ResolutionContext, ValueSource,
        ensure_runtime_ready_for_batch, init_layout, inspect_runtime, resolve_paths_with_lookup,
    };
    use crate::config::{ExtlinksConfig, load_config};

    #[test]
    fn resolve_paths_prefers_flag_over_env() {
        let temp = tempdir().expect("tempdir");
        let cwd = temp.path().join("cwd");
        let from_flag = temp.path().join("flag-root");
        fs::create_dir_all(&cwd).expect("create cwd");

        let overrides = PathOverrides {
            project_root: Some(from_flag.clone()),
            ..PathOverrides::default()
        };
        let context = ResolutionContext {
            cwd: cwd.clone(),
            executable_dir: None,
        };
        let env = HashMap::from([(
            PROJECT_ROOT_ENV.to_string(),
            temp.path().join("env-root").to_string_lossy().to_string(),
        )]);

        let resolved = resolve_paths_with_lookup(&context, &overrides, |key| env.get(key).cloned())
            .expect("resolve paths");
        assert_eq!(resolved.project_root, from_flag);
        assert_eq!(resolved.root_source, ValueSource::Flag);
        assert_eq!(resolved.config_path, from_flag.join(".extlinks/config.toml"));
        assert_eq!(resolved.config_source, ValueSource::Default);
    }

    #[test]
    fn resolve_paths_uses_env_then_heuristic() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("project");
        let nested = root.join("wiki_content").join("Main");
        fs::create_dir_all(&nested).expect("create nested");
        let context = ResolutionContext {
            cwd: nested.clone(),
            executable_dir: None,
        };

        let detected = resolve_paths_with_lookup(&context, &PathOverrides::default(), |_| None)
            .expect("resolve");
        assert_eq!(detected.project_root, root);
        assert_eq!(detected.root_source, ValueSource::Heuristic);

        let env = HashMap::from([
            (PROJECT_ROOT_ENV.to_string(), "elsewhere".to_string()),
            (CONFIG_ENV.to_string(), "custom.toml".to_string()),
        ]);
        let from_env =
            resolve_paths_with_lookup(&context, &PathOverrides::default(), |key| {
                env.get(key).cloned()
            })
            .expect("resolve");
        assert_eq!(from_env.project_root, nested.join("elsewhere"));
        assert_eq!(from_env.root_source, ValueSource::Env);
        assert_eq!(from_env.config_path, nested.join("elsewhere").join("custom.toml"));
        assert_eq!(from_env.config_source, ValueSource::Env);
    }

    #[test]
    fn init_layout_writes_a_config_that_loads_as_defaults() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("project");
        fs::create_dir_all(&root).expect("create root");
        let context = ResolutionContext {
            cwd: root.clone(),
            executable_dir: None,
        };
        let overrides = PathOverrides {
            project_root: Some(root.clone()),
            ..PathOverrides::default()
        };
        let paths = resolve_paths_with_lookup(&context, &overrides, |_| None).expect("resolve");

        let report = init_layout(&paths, &InitOptions::default()).expect("init");
        assert!(report.wrote_config);
        assert!(!report.created_dirs.is_empty());
        assert!(paths.wiki_content_dir.join("Main").is_dir());
        assert!(paths.state_dir.is_dir());

        let config = load_config(&paths.config_path).expect("load config");
        assert_eq!(config, ExtlinksConfig::default());

        let again = init_layout(&paths, &InitOptions::default()).expect("init again");
        assert!(!again.wrote_config);
        assert!(again.created_dirs.is_empty());
        let forced = init_layout(&paths, &InitOptions { force: true }).expect("force");
        assert!(forced.wrote_config);
    }

    #[test]
    fn batch_readiness_fails_without_content_dir() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("project");
        fs::create_dir_all(&root).expect("create root");
        let context = ResolutionContext {
            cwd: root.clone(),
            executable_dir: None,
        };
        let overrides = PathOverrides {
            project_root: Some(root.clone()),
            ..PathOverrides::default()
        };
        let paths = resolve_paths_with_lookup(&context, &overrides, |_| None).expect("resolve");
        let status = inspect_runtime(&paths);
        assert!(!status.wiki_content_exists);
        assert_eq!(status.warnings.len(), 2);
        let err = ensure_runtime_ready_for_batch(&paths, &status).expect_err("must fail");
        assert!(err.to_string().contains("no content directory"));
    }
}
