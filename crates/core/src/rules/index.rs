//! Reverse index of rule identifiers in the target branch.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, instrument, warn};

use super::extract::{extract_rule_ids, RuleId};
use crate::config::GuardConfig;
use crate::git::client::Vcs;

/// Identifier to the set of files declaring it in one branch snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdIndex {
    owners: BTreeMap<RuleId, BTreeSet<String>>,
}

impl IdIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `path` declares each of `ids`.
    pub fn insert_file(&mut self, path: &str, ids: &[RuleId]) {
        for id in ids {
            self.owners.entry(*id).or_default().insert(path.to_string());
        }
    }

    /// Files declaring `id`, if any.
    pub fn owners(&self, id: RuleId) -> Option<&BTreeSet<String>> {
        self.owners.get(&id)
    }

    /// `true` if some file other than `path` declares `id`.
    pub fn claimed_elsewhere(&self, id: RuleId, path: &str) -> bool {
        self.owners
            .get(&id)
            .is_some_and(|files| files.iter().any(|f| f != path))
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, Vec<RuleId>)> for IdIndex {
    fn from_iter<I: IntoIterator<Item = (&'a str, Vec<RuleId>)>>(iter: I) -> Self {
        let mut index = IdIndex::new();
        for (path, ids) in iter {
            index.insert_file(path, &ids);
        }
        index
    }
}

/// Build the identifier index of the target branch.
///
/// Files are listed at the target ref, or at `HEAD` when the target is not
/// reachable. Content always comes from the target ref; files missing there
/// contribute nothing.
#[instrument(skip(vcs, config), fields(target = %config.target_ref))]
pub fn build_target_index<V: Vcs + ?Sized>(vcs: &V, config: &GuardConfig) -> IdIndex {
    let files = match vcs.ls_tree(&config.target_ref) {
        Ok(files) => files,
        Err(e) => {
            warn!(error = %e, "cannot list target ref, using HEAD");
            vcs.ls_tree("HEAD").unwrap_or_else(|e| {
                warn!(error = %e, "cannot list HEAD either, target index is empty");
                Vec::new()
            })
        }
    };

    let mut index = IdIndex::new();
    let mut scanned = 0usize;
    for file in files.iter().filter(|f| config.is_rule_path(f)) {
        match vcs.show(&config.target_ref, file) {
            Ok(content) => {
                index.insert_file(file, &extract_rule_ids(&content));
                scanned += 1;
            }
            Err(e) => debug!(file = %file, error = %e, "not present in target, skipping"),
        }
    }
    info!(files = scanned, ids = index.len(), "built target index");
    index
}

/// Identifiers of one file as stored at the target ref; empty when absent.
pub fn target_ids_for<V: Vcs + ?Sized>(vcs: &V, config: &GuardConfig, path: &str) -> Vec<RuleId> {
    match vcs.show(&config.target_ref, path) {
        Ok(content) => extract_rule_ids(&content),
        Err(e) => {
            debug!(path, error = %e, "no target version");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvVars, GuardOptions, Settings};
    use crate::git::client::fake::FakeVcs;

    fn config() -> GuardConfig {
        GuardConfig::resolve(&Settings::default(), EnvVars::default(), GuardOptions::default())
    }

    #[test]
    fn test_builds_reverse_mapping() {
        let vcs = FakeVcs::new()
            .respond(
                "ls-tree -r --name-only origin/main",
                "README.md\nrules/a.xml\nrules/b.xml\nrules/notes.txt\n",
            )
            .blob("origin/main", "rules/a.xml", r#"<rule id="1"/><rule id="2"/>"#)
            .blob("origin/main", "rules/b.xml", r#"<rule id="2"/><rule id="3"/>"#);

        let index = build_target_index(&vcs, &config());

        assert_eq!(index.len(), 3);
        assert_eq!(index.owners(1), Some(&BTreeSet::from(["rules/a.xml".to_string()])));
        assert_eq!(
            index.owners(2),
            Some(&BTreeSet::from([
                "rules/a.xml".to_string(),
                "rules/b.xml".to_string()
            ]))
        );
        assert!(!vcs.calls().iter().any(|c| c.contains("README.md")));
    }

    #[test]
    fn test_falls_back_to_head_listing() {
        let vcs = FakeVcs::new()
            .respond("ls-tree -r --name-only HEAD", "rules/a.xml\nrules/new.xml\n")
            .blob("origin/main", "rules/a.xml", r#"<rule id="4"/>"#);

        let index = build_target_index(&vcs, &config());

        // rules/new.xml is absent from the target and skipped.
        assert_eq!(index.len(), 1);
        assert_eq!(index.owners(4), Some(&BTreeSet::from(["rules/a.xml".to_string()])));
    }

    #[test]
    fn test_unreachable_everything_gives_empty_index() {
        let index = build_target_index(&FakeVcs::new(), &config());
        assert!(index.is_empty());
    }

    #[test]
    fn test_malformed_target_file_contributes_nothing() {
        let vcs = FakeVcs::new()
            .respond("ls-tree -r --name-only origin/main", "rules/bad.xml\n")
            .blob("origin/main", "rules/bad.xml", "<rule id=\"1\">");
        assert!(build_target_index(&vcs, &config()).is_empty());
    }

    #[test]
    fn test_claimed_elsewhere() {
        let index: IdIndex = [("a.xml", vec![1, 2]), ("b.xml", vec![2])]
            .into_iter()
            .collect();
        assert!(!index.claimed_elsewhere(1, "a.xml"));
        assert!(index.claimed_elsewhere(1, "b.xml"));
        assert!(index.claimed_elsewhere(2, "a.xml"));
        assert!(!index.claimed_elsewhere(9, "a.xml"));
    }

    #[test]
    fn test_target_ids_for() {
        let vcs = FakeVcs::new().blob("origin/main", "rules/a.xml", r#"<rule id="8"/>"#);
        assert_eq!(target_ids_for(&vcs, &config(), "rules/a.xml"), vec![8]);
        assert!(target_ids_for(&vcs, &config(), "rules/b.xml").is_empty());
    }
}
