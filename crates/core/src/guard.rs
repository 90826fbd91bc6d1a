//! One guard run, from change discovery to verdict.
//!
//! 1. Announce the environment and, in CI, fetch the remote and set a commit
//!    identity.
//! 2. Enumerate changed rule files (or all of them in force mode).
//! 3. Build the target-branch identifier index.
//! 4. Check each changed file in order; the first failure ends the run.

use std::io::Write;

use tracing::{info, instrument, warn};

use crate::config::GuardConfig;
use crate::conflict::{ConflictChecker, FileVerdict};
use crate::git::changes::{enumerate_changes, rule_files_on_disk, ChangeRecord, ChangeStatus};
use crate::git::client::Vcs;
use crate::report::Reporter;
use crate::rules::build_target_index;

/// Final result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No changed rule files were found.
    NothingToCheck,
    /// Every changed file passed.
    Passed { checked: usize },
    /// `file` failed with a duplicate or conflict verdict.
    Failed { file: String, verdict: FileVerdict },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Runs the identifier conflict check for one configuration.
pub struct Guard<'a, V: Vcs + ?Sized> {
    vcs: &'a V,
    config: &'a GuardConfig,
}

impl<'a, V: Vcs + ?Sized> Guard<'a, V> {
    pub fn new(vcs: &'a V, config: &'a GuardConfig) -> Self {
        Self { vcs, config }
    }

    #[instrument(skip_all, fields(target = %self.config.target_ref))]
    pub fn run<W: Write>(&self, reporter: &mut Reporter<W>) -> RunOutcome {
        reporter.progress("Starting rule ID conflict checker...");
        self.announce(reporter);
        if self.config.ci {
            self.setup_ci(reporter);
        }
        if self.config.verbose {
            self.debug_info(reporter);
        }

        let changes = self.changed_files(reporter);
        if changes.is_empty() {
            reporter.success("No rule files to check.");
            return RunOutcome::NothingToCheck;
        }

        let index = build_target_index(self.vcs, self.config);
        let names: Vec<&str> = changes.iter().map(ChangeRecord::name).collect();
        reporter.progress(&format!(
            "Checking rule ID conflicts for files: [{}]",
            names.join(", ")
        ));

        let checker = ConflictChecker::new(self.vcs, self.config, &index);
        let mut checked = 0usize;
        for record in &changes {
            reporter.header(&format!("Checking file: {}", record.name()));
            let check = checker.check(record);
            if let Some(e) = &check.parse_error {
                reporter.warn(&format!("XML parse error in {}: {}", record.path, e));
            }

            match &check.verdict {
                FileVerdict::Missing => {
                    reporter.warn(&format!(
                        "File {} does not exist locally, skipping...",
                        record.name()
                    ));
                    continue;
                }
                FileVerdict::Unreadable(e) => {
                    reporter.warn(&format!("Could not read {}: {}", record.name(), e));
                    continue;
                }
                FileVerdict::Duplicates(ids) => reporter.duplicates(record.name(), ids),
                FileVerdict::Conflicts(conflicts) => reporter.conflicts(&record.path, conflicts),
                FileVerdict::NoConflict => {
                    reporter.success(&format!("No conflict in new file {}", record.name()))
                }
                FileVerdict::IdsUnchanged => reporter.progress(&format!(
                    "{} {} but rule IDs unchanged.",
                    record.name(),
                    record.status
                )),
                FileVerdict::ModifiedClean => reporter.success(&format!(
                    "Modified file {} has no conflicting rule IDs.",
                    record.name()
                )),
            }

            if check.verdict.is_failure() {
                warn!(file = %record.path, "rule id check failed");
                return RunOutcome::Failed {
                    file: record.path.clone(),
                    verdict: check.verdict,
                };
            }
            checked += 1;
        }

        reporter.success("All rule file changes passed conflict checks.");
        info!(checked, "run passed");
        RunOutcome::Passed { checked }
    }

    /// Changed rule files, widened to every rule file in force mode when the
    /// diff found none.
    fn changed_files<W: Write>(&self, reporter: &mut Reporter<W>) -> Vec<ChangeRecord> {
        let changes = enumerate_changes(self.vcs, self.config, reporter);
        let names: Vec<String> = changes
            .records
            .iter()
            .map(|r| format!("({}, {})", r.status, r.name()))
            .collect();
        reporter.progress(&format!("Final changed files: [{}]", names.join(", ")));
        info!(source = ?changes.source, count = names.len(), "changed rule files enumerated");
        if !changes.records.is_empty() {
            return changes.records;
        }

        reporter.warn("No rule files detected as changed via git diff.");
        if !self.config.force {
            return Vec::new();
        }
        reporter.progress(&format!(
            "Force checking all rule files in {}/",
            self.config.rules_dir
        ));
        rule_files_on_disk(self.config)
            .into_iter()
            .map(|path| ChangeRecord::new(ChangeStatus::Added, path))
            .collect()
    }

    fn announce<W: Write>(&self, reporter: &mut Reporter<W>) {
        let environment = if self.config.ci { "CI" } else { "Local" };
        reporter.progress(&format!("Environment: {environment}"));
        reporter.progress(&format!(
            "Working directory: {}",
            self.config.repo_root.display()
        ));

        let rules_path = self.config.rules_path();
        if rules_path.is_dir() {
            let files = rule_files_on_disk(self.config);
            reporter.progress(&format!(
                "Rule files in {}/: [{}]",
                self.config.rules_dir,
                files.join(", ")
            ));
        } else {
            reporter.error(&format!("{}/ directory not found!", self.config.rules_dir));
        }
    }

    fn setup_ci<W: Write>(&self, reporter: &mut Reporter<W>) {
        if let Err(e) = self.vcs.fetch(&self.config.remote) {
            reporter.warn(&format!("Warning during git setup: {e}"));
        }
        let identity = &self.config.ci_identity;
        if let Err(e) = self.vcs.set_identity(&identity.user_name, &identity.user_email) {
            reporter.warn(&format!("Warning during git setup: {e}"));
        }
    }

    fn debug_info<W: Write>(&self, reporter: &mut Reporter<W>) {
        let env = &self.config.env;
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "<unset>".into());
        reporter.header("Debug info:");
        reporter.detail(&format!("CI: {}", env.ci));
        reporter.detail(&format!(
            "CI_MERGE_REQUEST_TARGET_BRANCH_NAME: {}",
            show(&env.merge_request_target_branch)
        ));
        reporter.detail(&format!("CI_DEFAULT_BRANCH: {}", show(&env.default_branch)));
        reporter.detail(&format!("CI_COMMIT_REF_NAME: {}", show(&env.commit_ref_name)));
        reporter.detail(&format!("CI_COMMIT_SHA: {}", show(&env.commit_sha)));
        reporter.detail(&format!("Target ref: {}", self.config.target_ref));

        let queries: [(&str, &[&str]); 3] = [
            ("Git status", &["status", "--porcelain"]),
            ("Available branches", &["branch", "-a"]),
            ("Last commit", &["log", "--oneline", "-1"]),
        ];
        for (label, args) in queries {
            match self.vcs.run(args) {
                Ok(output) if output.trim().is_empty() => {
                    reporter.detail(&format!("{label}: clean"))
                }
                Ok(output) => reporter.detail(&format!("{label}: {}", output.trim())),
                Err(e) => reporter.warn(&format!("Debug git command failed: {e}")),
            }
        }
    }
}
