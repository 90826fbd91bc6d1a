//! Human-readable run diagnostics.
//!
//! Every line starts with a severity marker. Output is best effort: a failed
//! write never changes the outcome of a run.

use std::io::Write;

use console::Style;

use crate::conflict::IdConflict;
use crate::rules::RuleId;

/// Writes marked diagnostic lines to a stream.
pub struct Reporter<W: Write> {
    out: W,
}

impl Reporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, marker: &str, style: Style, msg: &str) {
        let _ = writeln!(self.out, "{} {}", style.apply_to(marker), msg);
    }

    /// Green check mark.
    pub fn success(&mut self, msg: &str) {
        self.line("✓", Style::new().green(), msg);
    }

    /// Red cross.
    pub fn error(&mut self, msg: &str) {
        self.line("✗", Style::new().red(), msg);
    }

    /// Yellow warning sign.
    pub fn warn(&mut self, msg: &str) {
        self.line("⚠", Style::new().yellow(), msg);
    }

    /// Progress and informational lines.
    pub fn progress(&mut self, msg: &str) {
        self.line("→", Style::new().cyan(), msg);
    }

    /// Bold section header preceded by a blank line.
    pub fn header(&mut self, msg: &str) {
        let _ = writeln!(self.out);
        let _ = writeln!(self.out, "{}", Style::new().bold().apply_to(msg));
    }

    /// Indented dim detail line.
    pub fn detail(&mut self, msg: &str) {
        let _ = writeln!(self.out, "    {}", Style::new().dim().apply_to(msg));
    }

    pub fn duplicates(&mut self, file: &str, ids: &[RuleId]) {
        self.error(&format!(
            "Duplicate rule IDs detected in {}: {}",
            file,
            format_ids(ids)
        ));
    }

    /// One block per conflicting identifier listing its owners.
    pub fn conflicts(&mut self, file: &str, conflicts: &[IdConflict]) {
        self.error(&format!("Conflicts detected in {file}:"));
        for conflict in conflicts {
            let _ = writeln!(self.out, "  - Rule ID {} found in:", conflict.id);
            for owner in &conflict.owners {
                let _ = writeln!(self.out, "    • {owner}");
            }
        }
    }
}

/// `[1, 2, 3]`
pub fn format_ids(ids: &[RuleId]) -> String {
    let joined: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    format!("[{}]", joined.join(", "))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn render(f: impl FnOnce(&mut Reporter<Vec<u8>>)) -> String {
        let mut reporter = Reporter::new(Vec::new());
        f(&mut reporter);
        console::strip_ansi_codes(&String::from_utf8(reporter.into_inner()).unwrap()).to_string()
    }

    #[test]
    fn test_severity_markers() {
        let out = render(|r| {
            r.success("ok");
            r.error("bad");
            r.warn("hmm");
            r.progress("going");
        });
        assert_eq!(out, "✓ ok\n✗ bad\n⚠ hmm\n→ going\n");
    }

    #[test]
    fn test_conflict_listing() {
        let conflicts = vec![IdConflict {
            id: 3,
            owners: BTreeSet::from(["rules/c.xml".to_string(), "rules/d.xml".to_string()]),
        }];
        let out = render(|r| r.conflicts("rules/a.xml", &conflicts));
        assert!(out.starts_with("✗ Conflicts detected in rules/a.xml:\n"));
        assert!(out.contains("  - Rule ID 3 found in:\n    • rules/c.xml\n    • rules/d.xml\n"));
    }

    #[test]
    fn test_duplicates_line() {
        let out = render(|r| r.duplicates("b.xml", &[4, 9]));
        assert_eq!(out, "✗ Duplicate rule IDs detected in b.xml: [4, 9]\n");
    }
}
