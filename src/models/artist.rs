//! Artist domain object and the read-only `ArtistCatalog` row shape
//! (SPEC_FULL.md §3, §4.3, C3).

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::OnceLock;

/// One `{name, count}` tag on a catalog artist (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenreTag {
    pub name: String,
    pub count: i32,
}

/// A row of the read-only `artists` collection (§3, §6), pre-populated by
/// ingestion scripts out of scope for this crate. Indexed on `genres.name`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ArtistCatalogRow {
    pub id: uuid::Uuid,
    pub metadata_id: String,
    pub name: String,
    #[sqlx(json)]
    pub genres: sqlx::types::Json<Vec<GenreTag>>,
}

impl ArtistCatalogRow {
    pub fn has_genre(&self, genre: &str) -> bool {
        self.genres.iter().any(|g| g.name == genre)
    }
}

/// The in-memory, lazily-enriched Artist carrier (§4.3, C3).
///
/// Enrichment precedence is fixed: metadata -> scrobble -> streaming. Each
/// enrichment method is idempotent; re-calling returns the cached
/// attachment rather than refetching.
#[derive(Debug, Clone, Default)]
pub struct Artist {
    pub name: String,
    pub metadata_id: String,

    // scrobble-service enrichment
    pub listeners: Option<i64>,
    pub playcount: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub biography: Option<String>,

    // streaming-service enrichment
    pub streaming_artist_id: Option<String>,
    pub streaming_followers: Option<i64>,
}

impl Artist {
    pub fn new(name: impl Into<String>, metadata_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata_id: metadata_id.into(),
            ..Default::default()
        }
    }

    pub fn from_catalog_row(row: &ArtistCatalogRow) -> Self {
        Self::new(row.name.clone(), row.metadata_id.clone())
    }

    pub fn is_scrobble_enriched(&self) -> bool {
        self.listeners.is_some() && self.playcount.is_some()
    }

    pub fn is_streaming_enriched(&self) -> bool {
        self.streaming_artist_id.is_some()
    }

    /// Idempotent: the first call wins.
    pub fn attach_scrobble(&mut self, listeners: i64, playcount: i64, tags: Vec<String>, biography: String) {
        if self.is_scrobble_enriched() {
            return;
        }
        self.listeners = Some(listeners);
        self.playcount = Some(playcount);
        self.tags = Some(tags);
        self.biography = Some(biography);
    }

    /// Idempotent, and validates that `streaming_name` matches `self.name`
    /// case- and whitespace-insensitively before committing (§4.3). Returns
    /// `false` without mutating if the name does not match.
    pub fn attach_streaming(&mut self, streaming_name: &str, streaming_artist_id: String, followers: i64) -> bool {
        if self.is_streaming_enriched() {
            return true;
        }
        if !names_match(&self.name, streaming_name) {
            return false;
        }
        self.streaming_artist_id = Some(streaming_artist_id);
        self.streaming_followers = Some(followers);
        true
    }

    /// `playcount / max(1, listeners)` (GLOSSARY: Likeness). Requires
    /// scrobble enrichment; returns 0.0 if not yet enriched.
    pub fn likeness(&self) -> f64 {
        let playcount = self.playcount.unwrap_or(0) as f64;
        let listeners = self.listeners.unwrap_or(0).max(1) as f64;
        playcount / listeners
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags
            .as_ref()
            .map(|tags| tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
            .unwrap_or(false)
    }
}

fn names_match(a: &str, b: &str) -> bool {
    normalize_name(a) == normalize_name(b)
}

fn normalize_name(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

static CONGLOMERATE_RE: OnceLock<Regex> = OnceLock::new();

fn conglomerate_re() -> &'static Regex {
    CONGLOMERATE_RE.get_or_init(|| {
        Regex::new(r"(?i)there (?:are|is)\s+\d+\s+(?:bands?|artists?|groups?|people|acts?)\b.*\bnamed\b")
            .expect("conglomerate regex is a valid pattern")
    })
}

/// `is_conglomerate_page(bio)` (§4.3, GLOSSARY: Conglomerate page). Matches
/// biography openers like "There are 14 bands / artists ... named X".
/// Conglomerate matches are excluded with reason `Other` (never persisted).
pub fn is_conglomerate_page(bio: &str) -> bool {
    conglomerate_re().is_match(bio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn likeness_matches_formula() {
        let mut a = Artist::new("A", "mid-1");
        a.attach_scrobble(1000, 4000, vec![], String::new());
        assert_eq!(a.likeness(), 4.0);
    }

    #[test]
    fn likeness_avoids_division_by_zero() {
        let mut a = Artist::new("A", "mid-1");
        a.attach_scrobble(0, 100, vec![], String::new());
        assert_eq!(a.likeness(), 100.0);
    }

    #[test]
    fn attach_streaming_rejects_name_mismatch() {
        let mut a = Artist::new("The Caretaker", "mid-1");
        assert!(!a.attach_streaming("Someone Else", "sid-1".into(), 500));
        assert!(!a.is_streaming_enriched());
    }

    #[test]
    fn attach_streaming_ignores_whitespace_and_case() {
        let mut a = Artist::new("The  Caretaker", "mid-1");
        assert!(a.attach_streaming("the caretaker", "sid-1".into(), 500));
        assert_eq!(a.streaming_artist_id, Some("sid-1".to_string()));
    }

    #[test]
    fn attach_scrobble_is_idempotent() {
        let mut a = Artist::new("A", "mid-1");
        a.attach_scrobble(100, 200, vec!["x".into()], "bio1".into());
        a.attach_scrobble(999, 999, vec!["y".into()], "bio2".into());
        assert_eq!(a.listeners, Some(100));
        assert_eq!(a.biography, Some("bio1".to_string()));
    }

    #[test]
    fn recognizes_conglomerate_biography() {
        let bio = "There are 14 bands/artists named Rush. 1) Canadian rock trio ...";
        assert!(is_conglomerate_page(bio));
    }

    #[test]
    fn ordinary_biography_is_not_conglomerate() {
        let bio = "Rush is a Canadian rock band formed in 1968.";
        assert!(!is_conglomerate_page(bio));
    }
}
