//! Configuration for materialization sessions.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (applied by the CLI on top of this)
//! 2. Environment variables (EMBEDSTAGE_BASE_DIR, EMBEDSTAGE_HIDDEN_PREFIX, EMBEDSTAGE_STRICT)
//! 3. Config file (.embedstage/config.yaml, or the user config directory)
//! 4. Defaults (current directory, `~$` prefix, `--keep`)
//!
//! Config file discovery:
//! - Searches current directory and parents for .embedstage/config.yaml
//! - Falls back to <config_dir>/embedstage/config.yaml
//! - Relative `base_dir` in a config file is resolved against the directory holding `.embedstage/`

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::{
    FailurePolicy, ImageHandling, MaterializerOptions, SessionOptions, HIDDEN_PREFIX, KEEP_FLAG,
};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub materializer: Option<MaterializerConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Directory the hidden root is created in
    pub base_dir: Option<String>,
    pub hidden_prefix: Option<String>,
    pub keep_flag: Option<String>,
    /// Always retain materialized files
    pub keep: Option<bool>,
    pub failure_policy: Option<FailurePolicy>,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaterializerConfig {
    pub image_handling: Option<ImageHandling>,
    pub strict_missing: Option<bool>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute directory the session root is created in
    pub base_dir: PathBuf,
    pub hidden_prefix: String,
    pub keep_flag: String,
    pub keep: bool,
    pub failure_policy: FailurePolicy,
    pub concurrency: usize,
    pub materializer: MaterializerOptions,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Defaults rooted at `base_dir`
    pub fn defaults(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            hidden_prefix: HIDDEN_PREFIX.to_string(),
            keep_flag: KEEP_FLAG.to_string(),
            keep: false,
            failure_policy: FailurePolicy::default(),
            concurrency: 1,
            materializer: MaterializerOptions::default(),
            config_file: None,
        }
    }

    /// Session options carrying this configuration
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            base_dir: self.base_dir.clone(),
            hidden_prefix: self.hidden_prefix.clone(),
            keep_flag: self.keep_flag.clone(),
            keep: self.keep,
            materializer: self.materializer.clone(),
            failure_policy: self.failure_policy,
            concurrency: self.concurrency.max(1),
        }
    }
}

/// Find config file by searching `start` and its parents, then the user config dir
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".embedstage").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    dirs::config_dir()
        .map(|dir| dir.join("embedstage").join("config.yaml"))
        .filter(|path| path.exists())
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Build configuration from an optional file, the working directory and an env lookup
fn load_config_from<F>(config_file: Option<PathBuf>, cwd: &Path, env: F) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut resolved = ResolvedConfig::defaults(cwd.to_path_buf());

    if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;

        // Base directory is the parent of .embedstage/
        let project_dir = config_path
            .parent()
            .and_then(|p| p.parent())
            .unwrap_or(cwd);

        let session = config.session;
        if let Some(ref base_dir) = session.base_dir {
            resolved.base_dir = resolve_path(project_dir, base_dir);
        }
        if let Some(prefix) = session.hidden_prefix {
            resolved.hidden_prefix = prefix;
        }
        if let Some(flag) = session.keep_flag {
            resolved.keep_flag = flag;
        }
        resolved.keep = session.keep.unwrap_or(false);
        resolved.failure_policy = session.failure_policy.unwrap_or_default();
        resolved.concurrency = session.concurrency.unwrap_or(1);

        if let Some(materializer) = config.materializer {
            resolved.materializer = MaterializerOptions {
                image_handling: materializer.image_handling.unwrap_or_default(),
                strict_missing: materializer.strict_missing.unwrap_or(false),
            };
        }
    }

    if let Some(base_dir) = env("EMBEDSTAGE_BASE_DIR") {
        resolved.base_dir = resolve_path(cwd, &base_dir);
    }
    if let Some(prefix) = env("EMBEDSTAGE_HIDDEN_PREFIX") {
        resolved.hidden_prefix = prefix;
    }
    if let Some(strict) = env("EMBEDSTAGE_STRICT") {
        resolved.materializer.strict_missing = parse_flag(&strict);
    }

    resolved.config_file = config_file;
    Ok(resolved)
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let config_file = find_config_file(&cwd);
    load_config_from(config_file, &cwd, |key| std::env::var(key).ok())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let temp = TempDir::new().unwrap();
        let config = load_config_from(None, temp.path(), no_env).unwrap();

        assert_eq!(config.base_dir, temp.path());
        assert_eq!(config.hidden_prefix, "~$");
        assert_eq!(config.keep_flag, "--keep");
        assert!(!config.keep);
        assert_eq!(config.failure_policy, FailurePolicy::Leave);
        assert_eq!(config.materializer, MaterializerOptions::default());
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let dot_dir = temp.path().join(".embedstage");
        std::fs::create_dir_all(&dot_dir).unwrap();

        let config_path = dot_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
session:
  base_dir: ./staging
  hidden_prefix: ".stage-"
  failure_policy: rollback
  concurrency: 4
materializer:
  image_handling: verbatim
  strict_missing: true
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version, "1.0");
        assert_eq!(parsed.session.hidden_prefix, Some(".stage-".to_string()));

        let config = load_config_from(Some(config_path.clone()), temp.path(), no_env).unwrap();
        assert_eq!(config.base_dir, temp.path().join("staging"));
        assert_eq!(config.hidden_prefix, ".stage-");
        assert_eq!(config.failure_policy, FailurePolicy::Rollback);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.materializer.image_handling, ImageHandling::Verbatim);
        assert!(config.materializer.strict_missing);
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        let env: HashMap<&str, &str> = [
            ("EMBEDSTAGE_HIDDEN_PREFIX", "_"),
            ("EMBEDSTAGE_STRICT", "yes"),
            ("EMBEDSTAGE_BASE_DIR", "/absolute/base"),
        ]
        .into_iter()
        .collect();

        let config = load_config_from(None, temp.path(), |key| {
            env.get(key).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(config.hidden_prefix, "_");
        assert!(config.materializer.strict_missing);
        assert_eq!(config.base_dir, PathBuf::from("/absolute/base"));
    }

    #[test]
    fn test_session_options_clamp_concurrency() {
        let mut config = ResolvedConfig::defaults(PathBuf::from("/work"));
        config.concurrency = 0;

        let options = config.session_options();
        assert_eq!(options.concurrency, 1);
        assert_eq!(options.base_dir, PathBuf::from("/work"));
        assert_eq!(options.keep_flag, "--keep");
    }

    #[test]
    fn test_find_config_file_walks_parents() {
        let temp = TempDir::new().unwrap();
        let dot_dir = temp.path().join(".embedstage");
        std::fs::create_dir_all(&dot_dir).unwrap();
        std::fs::write(dot_dir.join("config.yaml"), "version: \"1.0\"\n").unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_config_file(&nested),
            Some(dot_dir.join("config.yaml"))
        );
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("off"));
    }
}
