//! Rule identifiers: extraction from XML and the target-branch index.

pub mod extract;
pub mod index;

pub use extract::{extract_rule_ids, find_duplicates, try_extract_rule_ids, RuleId};
pub use index::{build_target_index, IdIndex};
