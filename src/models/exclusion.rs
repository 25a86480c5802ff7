//! Exclusion reasons and the persistent `ExclusionCacheEntry` shape
//! (SPEC_FULL.md §3, C4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of reasons an artist can be excluded (§3). `Other` is an
/// in-memory-only signal (§9's design note) and is never persisted; the
/// validator and finder enforce that, not this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExclusionReason {
    TooManyFollowersListenersPlays,
    TooFewFollowersListenersPlays,
    RatioListenersToPlaysTooSmall,
    WrongLanguage,
    Other,
}

impl ExclusionReason {
    /// Exact textual form persisted in `requests_cache.excluded.reason_excluded` (§6).
    pub fn canonical_text(&self) -> &'static str {
        match self {
            ExclusionReason::TooManyFollowersListenersPlays => "Too Many Followers / Listeners / Plays",
            ExclusionReason::TooFewFollowersListenersPlays => "Too Few Followers / Listeners / Plays",
            ExclusionReason::RatioListenersToPlaysTooSmall => "Ratio of Listeners to Plays Too Small",
            ExclusionReason::WrongLanguage => "Artist Does Not Sing in the Requested Language",
            ExclusionReason::Other => "Other",
        }
    }

    /// Permanent reasons never re-expire (§4.4): only freshness-only reasons
    /// are subject to the 182-day window.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ExclusionReason::TooManyFollowersListenersPlays | ExclusionReason::WrongLanguage
        )
    }
}

/// One excluded artist within an `ExclusionCacheEntry`'s list (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Excluded {
    pub artist_name: String,
    pub metadata_id: String,
    pub reason: ExclusionReason,
    pub date_excluded: DateTime<Utc>,
}

impl Excluded {
    pub fn new(artist_name: impl Into<String>, metadata_id: impl Into<String>, reason: ExclusionReason) -> Self {
        Self {
            artist_name: artist_name.into(),
            metadata_id: metadata_id.into(),
            reason,
            date_excluded: Utc::now(),
        }
    }
}

/// Key identifying one `ExclusionCacheEntry`: `(language, genre, niche_level)` (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExclusionKey {
    pub language: String,
    pub genre: String,
    pub niche_level: String,
}

/// Persisted record backing the `requests_cache` collection (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionCacheEntry {
    pub id: Uuid,
    pub key: ExclusionKey,
    pub excluded: Vec<Excluded>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExclusionCacheEntry {
    pub fn empty(key: ExclusionKey) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            key,
            excluded: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Upsert by `metadata_id`; re-exclusion overwrites (latest wins, §3 invariant).
    pub fn put(&mut self, excluded: Excluded) {
        if let Some(existing) = self
            .excluded
            .iter_mut()
            .find(|e| e.metadata_id == excluded.metadata_id)
        {
            *existing = excluded;
        } else {
            self.excluded.push(excluded);
        }
        self.updated_at = Utc::now();
    }

    pub fn remove(&mut self, metadata_id: &str) {
        self.excluded.retain(|e| e.metadata_id != metadata_id);
        self.updated_at = Utc::now();
    }
}

/// `is_valid_exclusion` (§4.4): fresh if within `freshness_days`, or the
/// reason is permanent.
pub fn is_valid_exclusion(excluded: &Excluded, freshness_days: i64, now: DateTime<Utc>) -> bool {
    if excluded.reason.is_permanent() {
        return true;
    }
    let age = now.signed_duration_since(excluded.date_excluded);
    age.num_days() <= freshness_days
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn canonical_text_matches_spec_exact_strings() {
        assert_eq!(
            ExclusionReason::TooManyFollowersListenersPlays.canonical_text(),
            "Too Many Followers / Listeners / Plays"
        );
        assert_eq!(
            ExclusionReason::WrongLanguage.canonical_text(),
            "Artist Does Not Sing in the Requested Language"
        );
    }

    #[test]
    fn put_overwrites_by_metadata_id() {
        let mut entry = ExclusionCacheEntry::empty(ExclusionKey {
            language: "any".into(),
            genre: "k-pop".into(),
            niche_level: "moderately".into(),
        });
        entry.put(Excluded::new("A", "mid-1", ExclusionReason::Other));
        entry.put(Excluded::new("A", "mid-1", ExclusionReason::WrongLanguage));
        assert_eq!(entry.excluded.len(), 1);
        assert_eq!(entry.excluded[0].reason, ExclusionReason::WrongLanguage);
    }

    #[test]
    fn permanent_reason_is_always_fresh() {
        let stale = Excluded {
            artist_name: "A".into(),
            metadata_id: "mid-1".into(),
            reason: ExclusionReason::TooManyFollowersListenersPlays,
            date_excluded: Utc::now() - Duration::days(1000),
        };
        assert!(is_valid_exclusion(&stale, 182, Utc::now()));
    }

    #[test]
    fn freshness_only_reason_expires() {
        let stale = Excluded {
            artist_name: "A".into(),
            metadata_id: "mid-1".into(),
            reason: ExclusionReason::TooFewFollowersListenersPlays,
            date_excluded: Utc::now() - Duration::days(200),
        };
        assert!(!is_valid_exclusion(&stale, 182, Utc::now()));

        let fresh = Excluded {
            date_excluded: Utc::now() - Duration::days(10),
            ..stale
        };
        assert!(is_valid_exclusion(&fresh, 182, Utc::now()));
    }
}
