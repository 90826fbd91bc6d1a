//! Per-file identifier conflict checks.
//!
//! A changed rule file fails when it declares the same identifier twice, or
//! when it introduces an identifier that another file already owns in the
//! target branch.

use std::collections::BTreeSet;
use std::io::ErrorKind;

use tracing::{debug, info};

use crate::config::GuardConfig;
use crate::errors::ExtractError;
use crate::git::changes::{ChangeRecord, ChangeStatus};
use crate::git::client::Vcs;
use crate::rules::extract::{find_duplicates, id_set, try_extract_rule_ids, RuleId};
use crate::rules::index::{target_ids_for, IdIndex};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An identifier introduced by a changed file that the target branch already
/// assigns elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdConflict {
    pub id: RuleId,
    /// Every target-branch file declaring `id`.
    pub owners: BTreeSet<String>,
}

/// Outcome of checking one changed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileVerdict {
    /// Not present in the working tree (deleted); nothing to check.
    Missing,
    /// Could not be read; skipped.
    Unreadable(String),
    /// Added or unknown file without conflicts.
    NoConflict,
    /// Modified or renamed file declaring exactly the identifiers it had in
    /// the target.
    IdsUnchanged,
    /// Modified or renamed file whose new identifiers are all free.
    ModifiedClean,
    /// Identifiers declared more than once in the file, sorted.
    Duplicates(Vec<RuleId>),
    /// Identifiers claimed by other target-branch files, sorted by id.
    Conflicts(Vec<IdConflict>),
}

impl FileVerdict {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Duplicates(_) | Self::Conflicts(_))
    }
}

/// Verdict plus any extraction problem worth reporting.
#[derive(Debug)]
pub struct FileCheck {
    pub verdict: FileVerdict,
    /// Set when the working copy could not be parsed (treated as no ids).
    pub parse_error: Option<ExtractError>,
}

// ---------------------------------------------------------------------------
// Set logic
// ---------------------------------------------------------------------------

/// Conflicts of a new file: every identifier another file owns.
pub fn added_conflicts(path: &str, ids: &BTreeSet<RuleId>, index: &IdIndex) -> Vec<IdConflict> {
    collect_conflicts(path, ids.iter().copied(), index)
}

/// Conflicts of a modified file, or `None` when its identifier set is
/// unchanged. Only identifiers the file gained are checked; dropping one is
/// never a conflict.
pub fn modified_conflicts(
    path: &str,
    current: &BTreeSet<RuleId>,
    target: &BTreeSet<RuleId>,
    index: &IdIndex,
) -> Option<Vec<IdConflict>> {
    if current == target {
        return None;
    }
    Some(collect_conflicts(path, current.difference(target).copied(), index))
}

fn collect_conflicts(
    path: &str,
    ids: impl Iterator<Item = RuleId>,
    index: &IdIndex,
) -> Vec<IdConflict> {
    ids.filter(|id| index.claimed_elsewhere(*id, path))
        .map(|id| IdConflict {
            id,
            owners: index.owners(id).cloned().unwrap_or_default(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Checker
// ---------------------------------------------------------------------------

/// Checks changed files against the target-branch index.
pub struct ConflictChecker<'a, V: Vcs + ?Sized> {
    vcs: &'a V,
    config: &'a GuardConfig,
    index: &'a IdIndex,
}

impl<'a, V: Vcs + ?Sized> ConflictChecker<'a, V> {
    pub fn new(vcs: &'a V, config: &'a GuardConfig, index: &'a IdIndex) -> Self {
        Self { vcs, config, index }
    }

    /// Check the working-tree version of `record`.
    pub fn check(&self, record: &ChangeRecord) -> FileCheck {
        let path = self.config.repo_root.join(&record.path);
        match std::fs::read_to_string(&path) {
            Ok(content) => self.check_content(record, &content),
            Err(e) if e.kind() == ErrorKind::NotFound => FileCheck {
                verdict: FileVerdict::Missing,
                parse_error: None,
            },
            Err(e) => FileCheck {
                verdict: FileVerdict::Unreadable(e.to_string()),
                parse_error: None,
            },
        }
    }

    /// Check `content` as the current version of `record`.
    pub fn check_content(&self, record: &ChangeRecord, content: &str) -> FileCheck {
        let (ids, parse_error) = match try_extract_rule_ids(content) {
            Ok(ids) => (ids, None),
            Err(e) => (Vec::new(), Some(e)),
        };

        let duplicates = find_duplicates(&ids);
        let verdict = if !duplicates.is_empty() {
            FileVerdict::Duplicates(duplicates)
        } else {
            self.verdict_for(record, &id_set(&ids))
        };
        debug!(path = %record.path, ?verdict, "file checked");
        FileCheck {
            verdict,
            parse_error,
        }
    }

    fn verdict_for(&self, record: &ChangeRecord, current: &BTreeSet<RuleId>) -> FileVerdict {
        match record.status {
            ChangeStatus::Added | ChangeStatus::Unknown => {
                let conflicts = added_conflicts(&record.path, current, self.index);
                if conflicts.is_empty() {
                    FileVerdict::NoConflict
                } else {
                    FileVerdict::Conflicts(conflicts)
                }
            }
            ChangeStatus::Modified | ChangeStatus::Renamed => {
                let target_path = record.target_path();
                let target = id_set(&target_ids_for(self.vcs, self.config, target_path));
                match modified_conflicts(&record.path, current, &target, self.index) {
                    None => {
                        info!(path = %record.path, "rule ids unchanged");
                        FileVerdict::IdsUnchanged
                    }
                    Some(conflicts) if conflicts.is_empty() => FileVerdict::ModifiedClean,
                    Some(conflicts) => FileVerdict::Conflicts(conflicts),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvVars, GuardOptions, Settings};
    use crate::git::client::fake::FakeVcs;

    fn config_at(root: &std::path::Path) -> GuardConfig {
        let options = GuardOptions {
            repo_root: root.to_path_buf(),
            ..GuardOptions::default()
        };
        GuardConfig::resolve(&Settings::default(), EnvVars::default(), options)
    }

    fn index(entries: Vec<(&str, Vec<RuleId>)>) -> IdIndex {
        entries.into_iter().collect()
    }

    fn owners(files: &[&str]) -> BTreeSet<String> {
        files.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_added_file_reusing_id_conflicts() {
        let index = index(vec![("a.xml", vec![1])]);
        let conflicts = added_conflicts("b.xml", &BTreeSet::from([1]), &index);
        assert_eq!(
            conflicts,
            vec![IdConflict {
                id: 1,
                owners: owners(&["a.xml"])
            }]
        );
        assert!(added_conflicts("b.xml", &BTreeSet::from([2]), &index).is_empty());
    }

    #[test]
    fn test_added_file_does_not_conflict_with_itself() {
        let index = index(vec![("rules/a.xml", vec![1, 2])]);
        assert!(added_conflicts("rules/a.xml", &BTreeSet::from([1, 2]), &index).is_empty());

        // Shared with another file: reported with every owner.
        let index = self::index(vec![("rules/a.xml", vec![1]), ("rules/b.xml", vec![1])]);
        let conflicts = added_conflicts("rules/a.xml", &BTreeSet::from([1]), &index);
        assert_eq!(conflicts[0].owners, owners(&["rules/a.xml", "rules/b.xml"]));
    }

    #[test]
    fn test_modified_with_same_ids_is_unchanged() {
        let index = index(vec![("a.xml", vec![1, 2])]);
        let result = modified_conflicts(
            "a.xml",
            &BTreeSet::from([2, 1]),
            &BTreeSet::from([1, 2]),
            &index,
        );
        assert_eq!(result, None);
    }

    #[test]
    fn test_modified_gaining_owned_id_conflicts() {
        let index = index(vec![("a.xml", vec![1, 2]), ("c.xml", vec![3])]);
        let result = modified_conflicts(
            "a.xml",
            &BTreeSet::from([1, 3]),
            &BTreeSet::from([1, 2]),
            &index,
        );
        assert_eq!(
            result,
            Some(vec![IdConflict {
                id: 3,
                owners: owners(&["c.xml"])
            }])
        );
    }

    #[test]
    fn test_modified_dropping_id_is_fine() {
        let index = index(vec![("a.xml", vec![1, 2])]);
        let result =
            modified_conflicts("a.xml", &BTreeSet::from([1]), &BTreeSet::from([1, 2]), &index);
        assert_eq!(result, Some(vec![]));
    }

    #[test]
    fn test_checker_flags_duplicates_before_anything_else() {
        let config = config_at(std::path::Path::new("."));
        let index = index(vec![("rules/other.xml", vec![7])]);
        let vcs = FakeVcs::new();
        let checker = ConflictChecker::new(&vcs, &config, &index);

        let record = ChangeRecord::new(ChangeStatus::Added, "rules/new.xml");
        let check = checker.check_content(
            &record,
            r#"<rule id="9"/><rule id="7"/><rule id="9"/><rule id="4"/><rule id="4"/>"#,
        );
        assert_eq!(check.verdict, FileVerdict::Duplicates(vec![4, 9]));
        assert!(check.verdict.is_failure());
    }

    #[test]
    fn test_checker_modified_uses_target_version() {
        let config = config_at(std::path::Path::new("."));
        let index = index(vec![("rules/a.xml", vec![1, 2]), ("rules/c.xml", vec![3])]);
        let vcs = FakeVcs::new().blob(
            "origin/main",
            "rules/a.xml",
            r#"<rule id="1"/><rule id="2"/>"#,
        );
        let checker = ConflictChecker::new(&vcs, &config, &index);
        let record = ChangeRecord::new(ChangeStatus::Modified, "rules/a.xml");

        let check = checker.check_content(&record, r#"<rule id="2" level="5"/><rule id="1"/>"#);
        assert_eq!(check.verdict, FileVerdict::IdsUnchanged);

        let check = checker.check_content(&record, r#"<rule id="1"/><rule id="4"/>"#);
        assert_eq!(check.verdict, FileVerdict::ModifiedClean);

        let check = checker.check_content(&record, r#"<rule id="1"/><rule id="3"/>"#);
        assert_eq!(
            check.verdict,
            FileVerdict::Conflicts(vec![IdConflict {
                id: 3,
                owners: owners(&["rules/c.xml"])
            }])
        );
    }

    #[test]
    fn test_checker_rename_compares_with_previous_path() {
        let config = config_at(std::path::Path::new("."));
        let index = index(vec![("rules/a.xml", vec![1, 2]), ("rules/c.xml", vec![3])]);
        let vcs = FakeVcs::new().blob(
            "origin/main",
            "rules/a.xml",
            r#"<rule id="1"/><rule id="2"/>"#,
        );
        let checker = ConflictChecker::new(&vcs, &config, &index);
        let record = ChangeRecord::renamed("rules/a.xml", "rules/renamed.xml");

        // The old path owning 1 and 2 is the same file, not a conflict.
        let check = checker.check_content(&record, r#"<rule id="1"/><rule id="2"/>"#);
        assert_eq!(check.verdict, FileVerdict::IdsUnchanged);

        let check = checker.check_content(&record, r#"<rule id="1"/><rule id="3"/>"#);
        assert_eq!(
            check.verdict,
            FileVerdict::Conflicts(vec![IdConflict {
                id: 3,
                owners: owners(&["rules/c.xml"])
            }])
        );
    }

    #[test]
    fn test_checker_unknown_status_behaves_like_added() {
        let config = config_at(std::path::Path::new("."));
        let index = index(vec![("rules/a.xml", vec![1])]);
        let vcs = FakeVcs::new();
        let checker = ConflictChecker::new(&vcs, &config, &index);

        let record = ChangeRecord::new(ChangeStatus::Unknown, "rules/b.xml");
        let check = checker.check_content(&record, r#"<rule id="1"/>"#);
        assert!(matches!(check.verdict, FileVerdict::Conflicts(_)));
    }

    #[test]
    fn test_checker_malformed_content_passes_with_parse_error() {
        let config = config_at(std::path::Path::new("."));
        let index = index(vec![("rules/a.xml", vec![1])]);
        let vcs = FakeVcs::new();
        let checker = ConflictChecker::new(&vcs, &config, &index);

        let record = ChangeRecord::new(ChangeStatus::Added, "rules/b.xml");
        let check = checker.check_content(&record, r#"<rule id="1">"#);
        assert_eq!(check.verdict, FileVerdict::NoConflict);
        assert!(check.parse_error.is_some());
    }

    #[test]
    fn test_checker_reads_working_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("rules")).unwrap();
        std::fs::write(dir.path().join("rules/b.xml"), r#"<rule id="2"/>"#).unwrap();

        let config = config_at(dir.path());
        let index = index(vec![("rules/a.xml", vec![1])]);
        let vcs = FakeVcs::new();
        let checker = ConflictChecker::new(&vcs, &config, &index);

        let present = ChangeRecord::new(ChangeStatus::Added, "rules/b.xml");
        assert_eq!(checker.check(&present).verdict, FileVerdict::NoConflict);

        let deleted = ChangeRecord::new(ChangeStatus::Unknown, "rules/gone.xml");
        assert_eq!(checker.check(&deleted).verdict, FileVerdict::Missing);
    }
}
