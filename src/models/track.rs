//! Track domain object (SPEC_FULL.md §4.3, C3).
//!
//! An in-memory, lazily-enriched carrier. Created from a scrobble-service top
//! track, then enriched with streaming-service identifiers as the pipeline
//! resolves the canonical recording.

/// Keywords that mark a track name as non-studio material (§4.3). Matching is
/// case-insensitive and looks for the keyword anywhere in the name.
const NON_ORIGINAL_KEYWORDS: &[&str] = &[
    "cover",
    "instrumental",
    "soundtrack",
    "theme",
    "karaoke",
    "tribute",
    "live at",
    "live from",
    "remix",
    "acoustic version",
    "version)",
    "- version",
];

/// A candidate track as it moves through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub name: String,
    pub artist_name: String,
    pub streaming_uri: Option<String>,
    pub streaming_url: Option<String>,
    pub duration_seconds: Option<i32>,
    pub release_year: Option<i32>,
    pub streaming_artist_ids: Vec<String>,
}

impl Track {
    pub fn new(name: impl Into<String>, artist_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artist_name: artist_name.into(),
            streaming_uri: None,
            streaming_url: None,
            duration_seconds: None,
            release_year: None,
            streaming_artist_ids: Vec::new(),
        }
    }

    /// Idempotent: attaches streaming-service fields once. Re-calling with
    /// the same values is a no-op; the precedence in §4.3 is metadata ->
    /// scrobble -> streaming, and streaming is the last enrichment a Track
    /// receives.
    pub fn attach_streaming_info(
        &mut self,
        uri: String,
        url: String,
        duration_seconds: i32,
        release_year: i32,
        artist_ids: Vec<String>,
    ) {
        if self.streaming_uri.is_some() {
            return;
        }
        self.streaming_uri = Some(uri);
        self.streaming_url = Some(url);
        self.duration_seconds = Some(duration_seconds);
        self.release_year = Some(release_year);
        self.streaming_artist_ids = artist_ids;
    }

    pub fn is_enriched(&self) -> bool {
        self.streaming_uri.is_some()
    }

    /// The core's heuristic for eliminating non-studio material without an
    /// external call (§4.3): rejects names containing any configured keyword.
    pub fn is_original_with_lyrics(&self) -> bool {
        let lowered = self.name.to_lowercase();
        !NON_ORIGINAL_KEYWORDS.iter().any(|kw| lowered.contains(kw))
    }
}

/// `track.album.release_date` is an ISO date string; the first four
/// characters are the year (§6).
pub fn release_year_from_date(release_date: &str) -> Option<i32> {
    release_date.get(0..4).and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_cover_and_instrumental() {
        assert!(!Track::new("Clair de Lune (Cover)", "A").is_original_with_lyrics());
        assert!(!Track::new("Song Title - Instrumental", "A").is_original_with_lyrics());
        assert!(Track::new("Clair de Lune", "A").is_original_with_lyrics());
    }

    #[test]
    fn rejects_case_insensitively() {
        assert!(!Track::new("SOUNDTRACK version", "A").is_original_with_lyrics());
    }

    #[test]
    fn attach_streaming_info_is_idempotent() {
        let mut t = Track::new("Song", "A");
        t.attach_streaming_info("uri1".into(), "url1".into(), 200, 2020, vec!["id1".into()]);
        t.attach_streaming_info("uri2".into(), "url2".into(), 999, 1999, vec!["id2".into()]);
        assert_eq!(t.streaming_uri, Some("uri1".to_string()));
        assert_eq!(t.duration_seconds, Some(200));
    }

    #[test]
    fn release_year_parses_leading_four_digits() {
        assert_eq!(release_year_from_date("2019-05-14"), Some(2019));
        assert_eq!(release_year_from_date("2004"), Some(2004));
        assert_eq!(release_year_from_date(""), None);
    }
}
