//! Git access for ruleidguard.

pub mod changes;
pub mod client;

pub use changes::{enumerate_changes, ChangeRecord, ChangeSet, ChangeSource, ChangeStatus, DiffQuery};
pub use client::{GitCli, Vcs};
