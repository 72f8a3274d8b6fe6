use crate::resolver::{ResolveError, ResolvedEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// What to do when two entries claim the same destination name.
///
/// Entries that freeze the same source the same way are always collapsed to
/// the first occurrence, whatever the policy; only conflicting entries reach it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    #[default]
    Error,
    FirstWins,
    LastWins,
}

impl DuplicatePolicy {
    pub const ALL: [DuplicatePolicy; 3] = [
        DuplicatePolicy::Error,
        DuplicatePolicy::FirstWins,
        DuplicatePolicy::LastWins,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DuplicatePolicy::Error => "error",
            DuplicatePolicy::FirstWins => "first-wins",
            DuplicatePolicy::LastWins => "last-wins",
        }
    }

    /// Deduplicate `entries` by destination name, preserving resolution order.
    ///
    /// Under `last-wins` the surviving entry keeps its own (later) position.
    pub fn apply(self, entries: Vec<ResolvedEntry>) -> Result<Vec<ResolvedEntry>, ResolveError> {
        let mut slots: Vec<Option<ResolvedEntry>> = Vec::with_capacity(entries.len());
        let mut by_dest: HashMap<String, usize> = HashMap::new();

        for entry in entries {
            let Some(&slot) = by_dest.get(entry.dest_name.as_str()) else {
                by_dest.insert(entry.dest_name.to_string(), slots.len());
                slots.push(Some(entry));
                continue;
            };
            let Some(kept) = slots[slot].as_ref() else {
                continue;
            };

            if kept.same_payload(&entry) {
                debug!(
                    "collapsing repeated entry '{}' from {}",
                    entry.dest_name, entry.origin
                );
                continue;
            }

            match self {
                DuplicatePolicy::Error => {
                    return Err(ResolveError::DuplicateDestination {
                        dest_name: entry.dest_name,
                        first: kept.origin.clone(),
                        second: entry.origin,
                    });
                }
                DuplicatePolicy::FirstWins => {
                    warn!(
                        "'{}' from {} shadowed by earlier {}",
                        entry.dest_name, entry.origin, kept.origin
                    );
                }
                DuplicatePolicy::LastWins => {
                    warn!(
                        "'{}' from {} replaces earlier {}",
                        entry.dest_name, entry.origin, kept.origin
                    );
                    slots[slot] = None;
                    by_dest.insert(entry.dest_name.to_string(), slots.len());
                    slots.push(Some(entry));
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(DuplicatePolicy::Error),
            "first-wins" | "first_wins" | "first" => Ok(DuplicatePolicy::FirstWins),
            "last-wins" | "last_wins" | "last" => Ok(DuplicatePolicy::LastWins),
            other => Err(format!(
                "invalid duplicate policy '{other}', expected one of: error, first-wins, last-wins"
            )),
        }
    }
}
