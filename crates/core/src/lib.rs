//! ruleidguard core library.
//!
//! Guards a repository of XML rule files against numeric rule identifier
//! collisions: changed files are compared with the identifier space of a
//! target branch, and any identifier that a different file already owns
//! there fails the check.

pub mod config;
pub mod conflict;
pub mod errors;
pub mod git;
pub mod guard;
pub mod report;
pub mod rules;

// Re-exports for convenience.
pub use config::{EnvVars, GuardConfig, GuardOptions, Settings};
pub use git::{GitCli, Vcs};
pub use guard::{Guard, RunOutcome};
pub use report::Reporter;
