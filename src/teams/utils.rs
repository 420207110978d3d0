//! Internal utilities for the teams module.

use super::error::{Result, TeamError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum team name length in characters.
pub(crate) const MAX_TEAM_NAME_LENGTH: usize = 255;

/// Names that cannot be used for a team.
const RESERVED_TEAM_NAMES: &[&str] = &["new"];

/// Get current Unix timestamp in seconds.
#[inline]
pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Check that a team name is non-empty and usable.
///
/// A usable name has at most 255 characters, is made of ASCII alphanumerics,
/// `-`, `_` and `.`, and is not reserved.
pub(crate) fn validate_team_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TeamError::EmptyName);
    }

    let usable = name.chars().count() <= MAX_TEAM_NAME_LENGTH
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    let reserved = RESERVED_TEAM_NAMES
        .iter()
        .any(|r| r.eq_ignore_ascii_case(name));

    if !usable || reserved {
        return Err(TeamError::invalid_name(name));
    }
    Ok(())
}

/// Truncate to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

/// Remove every occurrence of `id` from `list`.
///
/// Returns the filtered list and whether anything was removed.
pub fn remove_id_from_list(list: &[i64], id: i64) -> (Vec<i64>, bool) {
    let filtered: Vec<i64> = list.iter().copied().filter(|&v| v != id).collect();
    let removed = filtered.len() != list.len();
    (filtered, removed)
}
