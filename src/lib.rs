//! starwatch - GitHub star notifications
//!
//! starwatch is meant to be run on a schedule. Each run compares the star counts of an
//! account's repositories against the previous run and emails a summary when
//! repositories gained stars.
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`state`]: Snapshot persistence between runs
//! - [`github`]: GitHub REST API access with Link-header pagination
//! - [`delta`]: Star deltas between runs
//! - [`notify`]: Email transports (SMTP, AWS SES)
//! - [`status_log`]: Capped run status log
//! - [`check`]: Orchestration of a single run

pub mod check;
pub mod config;
pub mod delta;
pub mod github;
pub mod notify;
pub mod state;
pub mod status_log;

pub use check::{run_recorded, CheckSummary, Credentials, RunOptions, StarChecker};
pub use config::Config;
pub use github::GitHubClient;
pub use status_log::StatusLog;
