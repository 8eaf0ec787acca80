use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

/// Options the results page always shows, even before anyone votes for them.
pub const KNOWN_OPTIONS: [&str; 2] = ["cats", "dogs"];

/// One persisted ballot. Rows are append-only; the same `vote` appears once per cast ballot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteRecord {
    pub id: i32,
    pub vote: String,
}

/// Form body of `POST /vote`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "backend", derive(rocket::FromForm))]
pub struct VoteForm {
    pub vote: String,
}

/// Per-option counts computed on demand from the vote table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct TallySnapshot {
    counts: BTreeMap<String, i64>,
}

impl TallySnapshot {
    /// Builds a snapshot from grouped `(vote, count)` rows and fills in the known options.
    pub fn from_counts<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, i64)>,
    {
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for (vote, count) in rows {
            *counts.entry(vote).or_default() += count;
        }

        for option in KNOWN_OPTIONS {
            counts.entry(option.to_string()).or_insert(0);
        }

        Self { counts }
    }

    pub fn count(&self, option: &str) -> i64 {
        self.counts.get(option).copied().unwrap_or(0)
    }

    pub fn total_votes(&self) -> i64 {
        self.counts.values().sum()
    }

    pub fn options(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }
}
