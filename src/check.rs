//! Star check - orchestrates one run
//!
//! Load state → fetch from GitHub → diff → save state → notify. The run wrapper
//! [`run_recorded`] records the outcome in the status log and hands any error
//! back to the caller so the process exits non-zero.

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::config::{optional_var, require_var, Config, ConfigError, StateMode};
use crate::delta::{count_deltas, stargazer_deltas, StarReport};
use crate::github::GitHubClient;
use crate::notify::{build_notifier, compose_body, MailSettings, Notifier};
use crate::state::{Checkpoint, StarCounts, StateStore};
use crate::status_log::{Status, StatusLog};

/// Secrets needed by a run, resolved before any network call
#[derive(Clone)]
pub struct Credentials {
    pub token: Option<String>,
    pub mail: MailSettings,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("mail", &self.mail)
            .finish()
    }
}

impl Credentials {
    /// The token is required for snapshot runs and optional for timestamp runs
    pub fn resolve<F>(config: &Config, lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = match config.state.mode {
            StateMode::Counts => Some(require_var(lookup, &config.github.token_env)?),
            StateMode::Since => optional_var(lookup, &config.github.token_env),
        };
        let mail = MailSettings::resolve(&config.notify, lookup)?;

        Ok(Self { token, mail })
    }
}

/// Per-invocation switches
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Fetch and diff only; no state write, email or status log entry
    pub dry_run: bool,
}

/// Result of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub first_run: bool,
    pub report: StarReport,
    pub notified: bool,
}

impl CheckSummary {
    /// Status log message for a successful run
    pub fn status_message(&self) -> String {
        let mut message = format!(
            "Checked successfully - {} new stars found",
            self.report.total_new
        );
        if self.first_run {
            message.push_str(" (first run - email skipped)");
        }
        message
    }
}

/// Runs a single star check against GitHub
pub struct StarChecker {
    config: Config,
    github: GitHubClient,
    notifier: Box<dyn Notifier>,
    mail: MailSettings,
}

impl StarChecker {
    pub fn new(
        config: Config,
        github: GitHubClient,
        notifier: Box<dyn Notifier>,
        mail: MailSettings,
    ) -> Self {
        Self {
            config,
            github,
            notifier,
            mail,
        }
    }

    /// Build a checker with the configured GitHub client and mail transport
    pub async fn from_config(config: Config, credentials: Credentials) -> Result<Self> {
        let github = GitHubClient::new(&config.github, credentials.token.as_deref())?;
        let notifier = build_notifier(&config.notify, &credentials.mail)
            .await
            .context("Failed to set up notification transport")?;

        Ok(Self::new(config, github, notifier, credentials.mail))
    }

    pub async fn run(&self, options: RunOptions) -> Result<CheckSummary> {
        info!(
            "Checking stars for {} ({:?} mode)",
            self.config.github.account, self.config.state.mode
        );

        let (first_run, report) = match self.config.state.mode {
            StateMode::Counts => self.check_counts(options).await?,
            StateMode::Since => self.check_since(options).await?,
        };

        info!(
            "{} repositories gained {} stars",
            report.updates.len(),
            report.total_new
        );

        let notified = if options.dry_run {
            debug!("Dry run, notification skipped");
            false
        } else if first_run {
            info!("First run, state initialized without notification");
            false
        } else if report.is_empty() {
            debug!("No new stars, nothing to send");
            false
        } else {
            let message = self
                .mail
                .notification(&self.config.notify.subject, compose_body(&report.updates));
            self.notifier
                .send(&message)
                .await
                .context("Failed to send star notification")?;
            true
        };

        Ok(CheckSummary {
            first_run,
            report,
            notified,
        })
    }

    async fn check_counts(&self, options: RunOptions) -> Result<(bool, StarReport)> {
        let store: StateStore<StarCounts> = StateStore::new(self.config.state_path());
        let previous = store.load()?;

        let current = self.github.star_counts(&self.config.github.account).await?;
        let report = StarReport::new(count_deltas(&previous.snapshot, &current));

        if !options.dry_run {
            store.save(&current)?;
        }

        Ok((previous.first_run, report))
    }

    async fn check_since(&self, options: RunOptions) -> Result<(bool, StarReport)> {
        let store: StateStore<Checkpoint> = StateStore::new(self.config.state_path());
        let previous = store.load()?;
        // Upper bound of this run's window and lower bound of the next one
        let started = Checkpoint::now();

        let report = if previous.first_run {
            // Only the checkpoint needs initializing
            let repositories = self
                .github
                .list_repositories(&self.config.github.account)
                .await?;
            debug!("First run saw {} repositories", repositories.len());
            StarReport::default()
        } else {
            let repos = self
                .github
                .stargazers_since(&self.config.github.account, previous.snapshot.0, started.0)
                .await?;
            StarReport::new(stargazer_deltas(&repos))
        };

        if !options.dry_run {
            store.save(&started)?;
        }

        Ok((previous.first_run, report))
    }
}

/// Resolve credentials, build the checker and run it
pub async fn execute<F>(config: &Config, lookup: &F, options: RunOptions) -> Result<CheckSummary>
where
    F: Fn(&str) -> Option<String>,
{
    let credentials = Credentials::resolve(config, lookup)?;
    let checker = StarChecker::from_config(config.clone(), credentials).await?;
    checker.run(options).await
}

/// Run a check and record the outcome in the status log
///
/// Errors are logged as an ERROR entry and then returned. Dry runs leave the
/// status log untouched.
pub async fn run_recorded<F>(
    config: &Config,
    lookup: &F,
    options: RunOptions,
) -> Result<CheckSummary>
where
    F: Fn(&str) -> Option<String>,
{
    let log = StatusLog::new(&config.status_log.path, config.status_log.max_lines);
    let result = execute(config, lookup, options).await;

    if options.dry_run {
        return result;
    }

    match result {
        Ok(summary) => {
            log.record(Status::Success, &summary.status_message())?;
            Ok(summary)
        }
        Err(e) => {
            error!("Star check failed: {:#}", e);
            if let Err(log_err) = log.record(Status::Error, &format!("{:#}", e)) {
                warn!("Failed to record error in status log: {:#}", log_err);
            }
            Err(e)
        }
    }
}
