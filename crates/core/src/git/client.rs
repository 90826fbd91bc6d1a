//! Blocking `git` CLI client.
//!
//! Everything the guard asks of version control goes through the [`Vcs`]
//! trait: a text query interface that takes `git` arguments and returns
//! stdout. [`GitCli`] runs the real binary; tests substitute a canned backend.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::errors::GitError;

/// Text query interface over version control.
pub trait Vcs {
    /// Run `git <args>` and return its stdout.
    fn run(&self, args: &[&str]) -> Result<String, GitError>;

    /// All paths tracked at `rev`.
    fn ls_tree(&self, rev: &str) -> Result<Vec<String>, GitError> {
        let output = self.run(&["ls-tree", "-r", "--name-only", rev])?;
        Ok(output
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Content of `path` as stored at `rev`.
    fn show(&self, rev: &str, path: &str) -> Result<String, GitError> {
        self.run(&["show", &format!("{rev}:{path}")])
    }

    /// `git fetch <remote>`.
    fn fetch(&self, remote: &str) -> Result<(), GitError> {
        self.run(&["fetch", remote])?;
        info!(remote, "fetch completed");
        Ok(())
    }

    /// Set the commit identity in the repository-local config.
    fn set_identity(&self, name: &str, email: &str) -> Result<(), GitError> {
        self.run(&["config", "user.email", email])?;
        self.run(&["config", "user.name", name])?;
        debug!(name, email, "commit identity configured");
        Ok(())
    }
}

/// [`Vcs`] backed by the `git` binary, run inside a repository root.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_root: PathBuf,
}

impl GitCli {
    pub fn new<P: AsRef<Path>>(repo_root: P) -> Self {
        let repo_root = repo_root.as_ref().to_path_buf();
        debug!(path = %repo_root.display(), "created GitCli");
        Self { repo_root }
    }

    /// Check that a `git` binary can be executed and that the repository
    /// root is inside a work tree. Returns the git version.
    pub fn ensure_available(&self) -> Result<String, GitError> {
        let version = self.run(&["--version"])?;
        let version = version.trim().to_string();
        info!(%version, "git available");

        let inside = self.run(&["rev-parse", "--is-inside-work-tree"])?;
        if inside.trim() != "true" {
            return Err(GitError::NotAWorkTree(self.repo_root.display().to_string()));
        }
        Ok(version)
    }
}

impl Vcs for GitCli {
    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.repo_root)
            .args(["-c", "core.quotepath=off"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(cmd = %format!("git {}", args.join(" ")), "running git command");
        let output = cmd.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GitError::BinaryNotFound("git".into())
            } else {
                GitError::IoError(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(exit_code, %stderr, "git command failed");
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                exit_code,
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeVcs;
    use super::*;

    #[test]
    fn test_ls_tree_splits_lines() {
        let vcs = FakeVcs::new().respond(
            "ls-tree -r --name-only origin/main",
            "README.md\nrules/a.xml\n\nrules/b.xml\n",
        );
        let files = vcs.ls_tree("origin/main").unwrap();
        assert_eq!(files, vec!["README.md", "rules/a.xml", "rules/b.xml"]);
    }

    #[test]
    fn test_show_builds_rev_path_spec() {
        let vcs = FakeVcs::new().blob("origin/main", "rules/a.xml", "<rule id=\"1\"/>");
        assert_eq!(
            vcs.show("origin/main", "rules/a.xml").unwrap(),
            "<rule id=\"1\"/>"
        );
        assert!(matches!(
            vcs.show("origin/main", "rules/missing.xml"),
            Err(GitError::CommandFailed { exit_code: 128, .. })
        ));
    }

    #[test]
    fn test_ensure_available_rejects_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new(dir.path());
        match git.ensure_available() {
            // No git installed: the failure must still be a typed error.
            Err(GitError::BinaryNotFound(_)) => {}
            Err(GitError::CommandFailed { command, exit_code, .. }) => {
                assert_eq!(command, "rev-parse --is-inside-work-tree");
                assert_ne!(exit_code, 0);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_ensure_available_accepts_work_tree() {
        let dir = tempfile::tempdir().unwrap();
        git2::Repository::init(dir.path()).unwrap();
        let git = GitCli::new(dir.path());
        match git.ensure_available() {
            Err(GitError::BinaryNotFound(_)) => {}
            Ok(version) => assert!(version.starts_with("git version")),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
