//! Star deltas between the previous snapshot and freshly fetched data

use std::collections::BTreeMap;

use crate::github::RepoStargazers;
use crate::state::StarCounts;

/// New stars of a single repository within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepoUpdate {
    pub new_stars: u64,
    pub current_total: u64,
}

/// Repositories that gained stars, keyed by name
pub type RepoUpdates = BTreeMap<String, RepoUpdate>;

/// Outcome of diffing one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StarReport {
    pub updates: RepoUpdates,
    pub total_new: u64,
}

impl StarReport {
    pub fn new(updates: RepoUpdates) -> Self {
        let total_new = updates.values().map(|u| u.new_stars).sum();
        Self { updates, total_new }
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Diff fresh counts against the stored snapshot
///
/// Repositories missing from `stored` count from zero. Unchanged repositories and
/// ones that lost stars are left out.
pub fn count_deltas(stored: &StarCounts, current: &StarCounts) -> RepoUpdates {
    current
        .iter()
        .filter_map(|(name, &current_total)| {
            let previous = stored.get(name).copied().unwrap_or(0);
            let new_stars = current_total.saturating_sub(previous);
            (new_stars > 0).then(|| {
                (
                    name.clone(),
                    RepoUpdate {
                        new_stars,
                        current_total,
                    },
                )
            })
        })
        .collect()
}

/// Turn per-repository stargazer lists into updates
pub fn stargazer_deltas(repos: &[RepoStargazers]) -> RepoUpdates {
    repos
        .iter()
        .filter(|repo| !repo.new_stargazers.is_empty())
        .map(|repo| {
            (
                repo.name.clone(),
                RepoUpdate {
                    new_stars: repo.new_stargazers.len() as u64,
                    current_total: repo.current_total,
                },
            )
        })
        .collect()
}
