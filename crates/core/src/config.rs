//! Configuration for a guard run.
//!
//! Three sources feed one [`GuardConfig`] value, resolved once at startup and
//! passed explicitly to every component:
//!
//! 1. [`Settings`]: the optional `ruleidguard.toml` file in the repository
//!    root (rules directory, remote name, fallback branch, CI identity).
//! 2. [`EnvVars`]: a snapshot of the CI environment variables.
//! 3. [`GuardOptions`]: command-line options.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::ConfigError;

/// Settings file looked up in the repository root when no explicit path is given.
pub const DEFAULT_SETTINGS_FILE: &str = "ruleidguard.toml";

/// Explicit merge/pull-request target branch.
pub const ENV_MERGE_REQUEST_TARGET: &str = "CI_MERGE_REQUEST_TARGET_BRANCH_NAME";
/// Project default branch as advertised by CI.
pub const ENV_DEFAULT_BRANCH: &str = "CI_DEFAULT_BRANCH";
/// Set when running inside CI.
pub const ENV_CI: &str = "CI";
/// Check every rule file when the diff finds none.
pub const ENV_FORCE_CHECK_ALL: &str = "FORCE_CHECK_ALL_RULES";
pub const ENV_COMMIT_REF_NAME: &str = "CI_COMMIT_REF_NAME";
pub const ENV_COMMIT_SHA: &str = "CI_COMMIT_SHA";

// ---------------------------------------------------------------------------
// Settings file
// ---------------------------------------------------------------------------

/// Contents of the optional TOML settings file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Where rule files live.
    #[serde(default)]
    pub rules: RulesConfig,

    /// Remote and branch naming.
    #[serde(default)]
    pub git: GitConfig,

    /// Commit identity configured during CI setup.
    #[serde(default)]
    pub ci: CiConfig,
}

/// Rule file location settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RulesConfig {
    /// Rules directory, relative to the repository root (default `rules`).
    #[serde(default = "default_rules_dir")]
    pub dir: String,

    /// Rule file extension without the dot (default `xml`).
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_rules_dir() -> String {
    "rules".into()
}
fn default_extension() -> String {
    "xml".into()
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            dir: default_rules_dir(),
            extension: default_extension(),
        }
    }
}

/// Remote and branch settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GitConfig {
    /// Remote whose branches are compared against (default `origin`).
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch used when CI does not name one (default `main`).
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_remote() -> String {
    "origin".into()
}
fn default_branch() -> String {
    "main".into()
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            default_branch: default_branch(),
        }
    }
}

/// Commit identity written to the local git config in CI.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CiConfig {
    #[serde(default = "default_ci_user_name")]
    pub user_name: String,

    #[serde(default = "default_ci_user_email")]
    pub user_email: String,
}

fn default_ci_user_name() -> String {
    "GitLab CI".into()
}
fn default_ci_user_email() -> String {
    "ci@gitlab.com".into()
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            user_name: default_ci_user_name(),
            user_email: default_ci_user_email(),
        }
    }
}

impl Settings {
    /// Load [`Settings`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading settings");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let settings: Settings =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("settings parsed successfully");
        Ok(settings)
    }

    /// Load settings for a repository.
    ///
    /// An explicit path must exist. Without one, `ruleidguard.toml` in the
    /// repository root is used when present and defaults otherwise.
    pub fn discover(repo_root: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let candidate = repo_root.join(DEFAULT_SETTINGS_FILE);
                if candidate.exists() {
                    Self::load_from_file(candidate)?
                } else {
                    debug!("no settings file, using defaults");
                    Self::default()
                }
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validate that all fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dir = self.rules.dir.trim_end_matches('/');
        if dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "rules.dir".into(),
                detail: "rules directory must not be empty".into(),
            });
        }
        if Path::new(dir).is_absolute() {
            return Err(ConfigError::InvalidValue {
                field: "rules.dir".into(),
                detail: "rules directory must be relative to the repository root".into(),
            });
        }
        if self.rules.extension.is_empty() || self.rules.extension.contains('.') {
            return Err(ConfigError::InvalidValue {
                field: "rules.extension".into(),
                detail: "extension must be non-empty and given without a dot".into(),
            });
        }
        if self.git.remote.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "git.remote".into(),
                detail: "remote name must not be empty".into(),
            });
        }
        if self.git.default_branch.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "git.default_branch".into(),
                detail: "default branch must not be empty".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Environment snapshot
// ---------------------------------------------------------------------------

/// The environment variables the guard reacts to, read once.
///
/// Empty values count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    pub merge_request_target_branch: Option<String>,
    pub default_branch: Option<String>,
    pub ci: bool,
    pub force_check_all: bool,
    pub commit_ref_name: Option<String>,
    pub commit_sha: Option<String>,
}

impl EnvVars {
    /// Snapshot the current process environment.
    pub fn from_process() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a snapshot from an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            merge_request_target_branch: get(ENV_MERGE_REQUEST_TARGET),
            default_branch: get(ENV_DEFAULT_BRANCH),
            ci: get(ENV_CI).is_some(),
            force_check_all: get(ENV_FORCE_CHECK_ALL).is_some(),
            commit_ref_name: get(ENV_COMMIT_REF_NAME),
            commit_sha: get(ENV_COMMIT_SHA),
        }
    }
}

/// Pick the comparison base: merge-request target, then CI default branch,
/// then the configured default, prefixed with the remote name.
pub fn resolve_target_branch(env: &EnvVars, git: &GitConfig) -> String {
    let branch = env
        .merge_request_target_branch
        .as_deref()
        .or(env.default_branch.as_deref())
        .unwrap_or(&git.default_branch);
    format!("{}/{}", git.remote, branch)
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Command-line options that feed the resolved configuration.
#[derive(Debug, Clone)]
pub struct GuardOptions {
    pub repo_root: PathBuf,
    pub force: bool,
    /// Explicit target ref, used verbatim.
    pub target: Option<String>,
    pub verbose: bool,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            force: false,
            target: None,
            verbose: false,
        }
    }
}

/// Everything a guard run needs to know, resolved once.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub repo_root: PathBuf,
    /// Rules directory relative to the repository root, without trailing slash.
    pub rules_dir: String,
    pub extension: String,
    pub remote: String,
    /// Ref every comparison is made against, e.g. `origin/main`.
    pub target_ref: String,
    pub ci: bool,
    pub force: bool,
    pub verbose: bool,
    pub ci_identity: CiConfig,
    pub env: EnvVars,
}

impl GuardConfig {
    pub fn resolve(settings: &Settings, env: EnvVars, options: GuardOptions) -> Self {
        let target_ref = options
            .target
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| resolve_target_branch(&env, &settings.git));
        Self {
            repo_root: options.repo_root,
            rules_dir: settings.rules.dir.trim_end_matches('/').to_string(),
            extension: settings.rules.extension.clone(),
            remote: settings.git.remote.clone(),
            target_ref,
            ci: env.ci,
            force: options.force || env.force_check_all,
            verbose: options.verbose,
            ci_identity: settings.ci.clone(),
            env,
        }
    }

    /// `true` if `path` (repository-relative, `/`-separated) is a rule file.
    pub fn is_rule_path(&self, path: &str) -> bool {
        let under_dir = path
            .strip_prefix(self.rules_dir.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|rest| !rest.is_empty());
        under_dir
            && path
                .rsplit_once('.')
                .is_some_and(|(_, ext)| ext == self.extension)
    }

    /// Absolute-or-relative on-disk location of the rules directory.
    pub fn rules_path(&self) -> PathBuf {
        self.repo_root.join(&self.rules_dir)
    }
}
