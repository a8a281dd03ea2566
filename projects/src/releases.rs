//! Selection of the "current" documentation release of a project.
//!
//! The `current` flag is never edited directly. Whenever a project's release
//! list changes, the flag is derived again from the whole list.

use crate::types::{ProjectDocumentation, ReleaseStatus};
use std::cmp::Reverse;

/// Returns a copy of `releases`, in the same order, in which at most one
/// release is current: the generally available release with the greatest
/// version.
///
/// Versions are ranked by plain string comparison, so `"2.0"` ranks above
/// `"10.0"`. Among equal versions the earlier release wins.
pub fn recompute_current(releases: &[ProjectDocumentation]) -> Vec<ProjectDocumentation> {
    let mut recomputed: Vec<ProjectDocumentation> = releases
        .iter()
        .cloned()
        .map(|mut release| {
            release.current = false;
            release
        })
        .collect();

    let mut ranked: Vec<usize> = (0..recomputed.len()).collect();
    // Stable sort, ties keep insertion order
    ranked.sort_by_key(|&i| Reverse(recomputed[i].version.as_str()));

    if let Some(&index) = ranked
        .iter()
        .find(|&&i| recomputed[i].status == ReleaseStatus::GeneralAvailability)
    {
        recomputed[index].current = true;
    }

    recomputed
}

/// Appends `release` and recomputes the current release.
pub fn add_release(
    releases: &[ProjectDocumentation],
    release: ProjectDocumentation,
) -> Vec<ProjectDocumentation> {
    let mut updated = releases.to_vec();
    updated.push(release);
    recompute_current(&updated)
}

/// Removes every release with `version` and recomputes the current release.
/// Returns `None`, leaving the input alone, if no release has that version.
pub fn remove_release(
    releases: &[ProjectDocumentation],
    version: &str,
) -> Option<Vec<ProjectDocumentation>> {
    if !releases.iter().any(|r| r.version == version) {
        return None;
    }

    let remaining: Vec<ProjectDocumentation> = releases
        .iter()
        .filter(|r| r.version != version)
        .cloned()
        .collect();
    Some(recompute_current(&remaining))
}
