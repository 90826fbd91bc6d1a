//! Changed rule file discovery.
//!
//! Diff queries are tried in the order of [`DiffQuery::ORDER`]; the first one
//! that produces output wins. When none does, every rule file on disk is
//! treated as added.

use std::path::Path;

use tracing::{debug, info, warn};

use super::client::Vcs;
use crate::config::GuardConfig;
use crate::report::Reporter;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How a rule file differs from the target branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Modified,
    /// Moved from another path; see [`ChangeRecord::previous_path`].
    Renamed,
    /// Untracked, copied, deleted or any other status letter.
    Unknown,
}

impl ChangeStatus {
    /// Map a `git diff --name-status` letter (e.g. `A`, `M`, `R100`).
    pub fn from_letter(letter: &str) -> Self {
        match letter {
            "A" => Self::Added,
            "M" => Self::Modified,
            l if l.starts_with('R') => Self::Renamed,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Renamed => write!(f, "renamed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A rule file and how it changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub status: ChangeStatus,
    /// Repository-relative path with `/` separators.
    pub path: String,
    /// Path in the target branch when the file was renamed.
    pub previous_path: Option<String>,
}

impl ChangeRecord {
    pub fn new(status: ChangeStatus, path: impl Into<String>) -> Self {
        Self {
            status,
            path: path.into(),
            previous_path: None,
        }
    }

    pub fn renamed(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            status: ChangeStatus::Renamed,
            path: to.into(),
            previous_path: Some(from.into()),
        }
    }

    /// Path this file had in the target branch.
    pub fn target_path(&self) -> &str {
        self.previous_path.as_deref().unwrap_or(&self.path)
    }

    /// File name for display.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// One attempt at asking git what changed, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffQuery {
    /// `git diff --name-status <target>...HEAD`
    MergeBase,
    /// `git diff --name-status <target>..HEAD`
    Range,
    /// `git diff --name-status <target>` (working tree against the ref)
    WorkingTree,
    /// `git diff --name-status HEAD~1`
    ParentCommit,
    /// `git diff --name-status --cached`
    Staged,
    /// `git ls-files --others --exclude-standard`
    Untracked,
}

impl DiffQuery {
    pub const ORDER: [DiffQuery; 6] = [
        DiffQuery::MergeBase,
        DiffQuery::Range,
        DiffQuery::WorkingTree,
        DiffQuery::ParentCommit,
        DiffQuery::Staged,
        DiffQuery::Untracked,
    ];

    /// `git` arguments for this query against `target`.
    pub fn args(&self, target: &str) -> Vec<String> {
        let diff = |rev: String| -> Vec<String> {
            vec!["diff".into(), "--name-status".into(), rev]
        };
        match self {
            Self::MergeBase => diff(format!("{target}...HEAD")),
            Self::Range => diff(format!("{target}..HEAD")),
            Self::WorkingTree => diff(target.to_string()),
            Self::ParentCommit => diff("HEAD~1".into()),
            Self::Staged => diff("--cached".into()),
            Self::Untracked => vec![
                "ls-files".into(),
                "--others".into(),
                "--exclude-standard".into(),
            ],
        }
    }
}

/// Where the change list came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSource {
    Query(DiffQuery),
    /// No query produced output; all rule files on disk were listed.
    Disk,
}

/// Result of change enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub source: ChangeSource,
    pub records: Vec<ChangeRecord>,
}

// ---------------------------------------------------------------------------
// Enumeration
// ---------------------------------------------------------------------------

/// Run the diff queries in order and return the first non-empty answer.
pub fn first_diff_output<V, W>(
    vcs: &V,
    target: &str,
    reporter: &mut Reporter<W>,
) -> Option<(DiffQuery, String)>
where
    V: Vcs + ?Sized,
    W: std::io::Write,
{
    for query in DiffQuery::ORDER {
        let args = query.args(target);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        reporter.progress(&format!("Trying: git {}", args.join(" ")));
        match vcs.run(&arg_refs) {
            Ok(output) if !output.trim().is_empty() => {
                reporter.success("Command succeeded with output");
                debug!(?query, "diff query produced output");
                return Some((query, output));
            }
            Ok(_) => reporter.warn("Command succeeded but no output"),
            Err(e) => {
                warn!(?query, error = %e, "diff query failed");
                reporter.error(&format!("Command failed: {e}"));
            }
        }
    }
    None
}

/// Parse `--name-status` (or `ls-files`) output into rule file changes.
pub fn parse_name_status(output: &str, config: &GuardConfig) -> Vec<ChangeRecord> {
    let mut records = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // `ls-files` lines are a bare path; `--name-status` lines are tab separated.
        let parts: Vec<&str> = line.split('\t').collect();
        let record = match parts.as_slice() {
            [path] => ChangeRecord::new(ChangeStatus::Added, *path),
            [status, path] => ChangeRecord::new(ChangeStatus::from_letter(status), *path),
            [status, from, to] => match ChangeStatus::from_letter(status) {
                ChangeStatus::Renamed => ChangeRecord::renamed(*from, *to),
                // Copies keep their source, so the destination is new.
                _ => ChangeRecord::new(ChangeStatus::Unknown, *to),
            },
            _ => {
                debug!(line, "ignoring unrecognised status line");
                continue;
            }
        };
        if config.is_rule_path(&record.path) {
            records.push(record);
        } else {
            debug!(path = %record.path, "not a rule file");
        }
    }
    records
}

/// All rule files under the rules directory on disk, sorted, as
/// repository-relative paths.
pub fn rule_files_on_disk(config: &GuardConfig) -> Vec<String> {
    let mut files = Vec::new();
    collect_rule_files(&config.rules_path(), &config.rules_dir, config, &mut files);
    files.sort();
    files
}

fn collect_rule_files(dir: &Path, rel: &str, config: &GuardConfig, out: &mut Vec<String>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "cannot read directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let rel_path = format!("{rel}/{name}");
        let path = entry.path();
        if path.is_dir() {
            collect_rule_files(&path, &rel_path, config, out);
        } else if config.is_rule_path(&rel_path) {
            out.push(rel_path);
        }
    }
}

/// Determine which rule files changed relative to the target branch.
pub fn enumerate_changes<V, W>(vcs: &V, config: &GuardConfig, reporter: &mut Reporter<W>) -> ChangeSet
where
    V: Vcs + ?Sized,
    W: std::io::Write,
{
    reporter.progress(&format!("Comparing against: {}", config.target_ref));

    let Some((query, output)) = first_diff_output(vcs, &config.target_ref, reporter) else {
        reporter.progress(&format!(
            "No changes detected via git diff, checking all rule files in {}/",
            config.rules_dir
        ));
        let records: Vec<ChangeRecord> = rule_files_on_disk(config)
            .into_iter()
            .map(|path| ChangeRecord::new(ChangeStatus::Added, path))
            .collect();
        info!(count = records.len(), "falling back to rule files on disk");
        return ChangeSet {
            source: ChangeSource::Disk,
            records,
        };
    };

    let records = parse_name_status(&output, config);
    for record in &records {
        match &record.previous_path {
            Some(from) => reporter.progress(&format!(
                "Processing: {} {} -> {}",
                record.status, from, record.path
            )),
            None => reporter.progress(&format!("Processing: {} {}", record.status, record.path)),
        }
    }
    info!(count = records.len(), ?query, "changed rule files");
    ChangeSet {
        source: ChangeSource::Query(query),
        records,
    }
}
