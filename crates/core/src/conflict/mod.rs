//! Identifier conflict detection for changed rule files.

pub mod checker;

pub use checker::{ConflictChecker, FileCheck, FileVerdict, IdConflict};
