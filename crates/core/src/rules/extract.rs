//! Rule identifier extraction from XML content.
//!
//! Rule files may hold several top-level `<rule>` elements, which is not a
//! well-formed document on its own, so content is wrapped in a synthetic root
//! before parsing.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::errors::ExtractError;

/// Numeric rule identifier.
pub type RuleId = u64;

const SYNTHETIC_ROOT: &str = "ruleidguard-root";

/// Extract rule identifiers in document order, duplicates included.
///
/// Empty or whitespace-only content yields no identifiers. Malformed content
/// is an error.
pub fn try_extract_rule_ids(content: &str) -> Result<Vec<RuleId>, ExtractError> {
    let body = strip_prolog(content);
    if body.is_empty() {
        return Ok(Vec::new());
    }

    let wrapped = format!("<{SYNTHETIC_ROOT}>{body}</{SYNTHETIC_ROOT}>");
    let doc = roxmltree::Document::parse(&wrapped)
        .map_err(|e| ExtractError::XmlParseError(e.to_string()))?;

    let ids: Vec<RuleId> = doc
        .root_element()
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "rule")
        .filter_map(|node| node.attribute("id"))
        .filter_map(parse_rule_id)
        .collect();
    debug!(count = ids.len(), "extracted rule ids");
    Ok(ids)
}

/// Like [`try_extract_rule_ids`], but a parse failure is logged and yields
/// no identifiers.
pub fn extract_rule_ids(content: &str) -> Vec<RuleId> {
    try_extract_rule_ids(content).unwrap_or_else(|e| {
        warn!(error = %e, "treating malformed rule content as empty");
        Vec::new()
    })
}

/// Identifiers occurring more than once, sorted and deduplicated.
pub fn find_duplicates(ids: &[RuleId]) -> Vec<RuleId> {
    let mut counts: BTreeMap<RuleId, usize> = BTreeMap::new();
    for id in ids {
        *counts.entry(*id).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, _)| id)
        .collect()
}

/// Distinct identifiers as a set.
pub fn id_set(ids: &[RuleId]) -> BTreeSet<RuleId> {
    ids.iter().copied().collect()
}

/// Only plain ASCII digit strings are identifiers; signs, whitespace and
/// values beyond `u64` are not.
fn parse_rule_id(raw: &str) -> Option<RuleId> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match raw.parse::<RuleId>() {
        Ok(id) => Some(id),
        Err(_) => {
            warn!(raw, "rule id out of range, ignoring");
            None
        }
    }
}

/// Trim whitespace and drop a leading BOM and XML declaration, which cannot
/// appear inside the synthetic root.
fn strip_prolog(content: &str) -> &str {
    let body = content.trim_start_matches('\u{feff}').trim();
    if body.starts_with("<?xml") {
        if let Some(end) = body.find("?>") {
            return body[end + 2..].trim();
        }
    }
    body
}
