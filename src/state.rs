//! State Management - file-based persistence of the previous check
//!
//! Two snapshot kinds are supported:
//! - [`StarCounts`]: star count per repository, stored as a JSON object
//! - [`Checkpoint`]: the instant of the last check, stored as an RFC 3339 string
//!
//! The whole snapshot is replaced on every save. A missing file means this is the
//! first run, which callers use to suppress notifications.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Star count per repository name
pub type StarCounts = BTreeMap<String, u64>;

/// A persisted snapshot format
pub trait Snapshot: Default + Sized {
    fn decode(content: &str) -> Result<Self>;
    fn encode(&self) -> Result<String>;
}

impl Snapshot for StarCounts {
    fn decode(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse star count snapshot")
    }

    fn encode(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize star count snapshot")
    }
}

/// Instant of the last successful check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(pub DateTime<Utc>);

impl Checkpoint {
    /// Current time in whole seconds, matching the stored precision
    pub fn now() -> Self {
        Self(Utc::now().trunc_subsecs(0))
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Snapshot for Checkpoint {
    fn decode(content: &str) -> Result<Self> {
        let instant = DateTime::parse_from_rfc3339(content.trim())
            .with_context(|| format!("Invalid checkpoint timestamp: {:?}", content.trim()))?;
        Ok(Self(instant.with_timezone(&Utc)))
    }

    fn encode(&self) -> Result<String> {
        Ok(self.0.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

/// Snapshot read at the start of a run
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedState<S> {
    pub snapshot: S,
    /// No snapshot file existed
    pub first_run: bool,
}

/// Reads and overwrites a single snapshot file
#[derive(Debug, Clone)]
pub struct StateStore<S> {
    path: PathBuf,
    _snapshot: PhantomData<S>,
}

impl<S: Snapshot> StateStore<S> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _snapshot: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the previous snapshot, or the default one on first run
    pub fn load(&self) -> Result<LoadedState<S>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let snapshot = S::decode(&content)
                    .with_context(|| format!("Corrupt state file at {}", self.path.display()))?;
                debug!("Loaded state from {}", self.path.display());
                Ok(LoadedState {
                    snapshot,
                    first_run: false,
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "No state file at {}, treating this as the first run",
                    self.path.display()
                );
                Ok(LoadedState {
                    snapshot: S::default(),
                    first_run: true,
                })
            }
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read state file at {}", self.path.display())),
        }
    }

    /// Overwrite the snapshot file
    pub fn save(&self, snapshot: &S) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("Failed to create state directory")?;
            }
        }

        let content = snapshot.encode()?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write state file at {}", self.path.display()))?;

        debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}
