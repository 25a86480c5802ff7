//! Pure validation rules (SPEC_FULL.md §4.5, C5).
//!
//! Every function here is a plain decision function over already-enriched
//! `Artist`/`Track` values and a request's thresholds -- no I/O, no mutation.
//! The Finder is the only caller that owns side effects (cache writes,
//! adapter calls); this module just answers "accept or which reason".

use std::collections::HashMap;

use crate::models::exclusion::ExclusionReason;
use crate::models::request::{NicheBands, LIKENESS_MIN_DEFAULT};
use crate::models::{Artist, Language, RequestParams, Track};

/// Thresholds derived once per request from its niche-level bands plus the
/// hard-coded likeness floor (§4.5).
#[derive(Debug, Clone, Copy)]
pub struct ArtistThresholds {
    pub listeners_min: i64,
    pub listeners_max: i64,
    pub playcount_min: i64,
    pub playcount_max: i64,
    pub followers_min: i64,
    pub followers_max: i64,
    pub likeness_min: f64,
}

impl ArtistThresholds {
    pub fn from_bands(bands: NicheBands) -> Self {
        Self {
            listeners_min: bands.listeners.min,
            listeners_max: bands.listeners.max,
            playcount_min: bands.playcount.min,
            playcount_max: bands.playcount.max,
            followers_min: bands.followers.min,
            followers_max: bands.followers.max,
            likeness_min: LIKENESS_MIN_DEFAULT,
        }
    }
}

/// Rule 1: both listeners and playcount exceed the band ceiling.
pub fn too_popular_scrobble(a: &Artist, t: &ArtistThresholds) -> bool {
    let listeners = a.listeners.unwrap_or(0);
    let playcount = a.playcount.unwrap_or(0);
    listeners > t.listeners_max && playcount > t.playcount_max
}

/// Rule 2: both listeners and playcount fall below the band floor.
pub fn too_unknown_scrobble(a: &Artist, t: &ArtistThresholds) -> bool {
    let listeners = a.listeners.unwrap_or(0);
    let playcount = a.playcount.unwrap_or(0);
    listeners < t.listeners_min && playcount < t.playcount_min
}

/// Rule 3: playcount/listeners ratio below the likeness floor.
pub fn likeness_low(a: &Artist, t: &ArtistThresholds) -> bool {
    a.likeness() < t.likeness_min
}

/// Rule 4: the genre's scrobble-service tag is absent from the artist's tags.
pub fn not_in_genre(a: &Artist, scrobble_genre_tag: &str) -> bool {
    !a.has_tag(scrobble_genre_tag)
}

/// Rule 5: streaming followers above the band ceiling.
pub fn too_popular_streaming(a: &Artist, t: &ArtistThresholds) -> bool {
    a.streaming_followers.unwrap_or(0) > t.followers_max
}

/// Rule 6: streaming followers below the band floor.
pub fn too_unknown_streaming(a: &Artist, t: &ArtistThresholds) -> bool {
    a.streaming_followers.unwrap_or(0) < t.followers_min
}

/// Rule 7: the requested language is not the dominant language of the
/// artist's catalog of works, per the metadata service's distribution.
pub fn wrong_language(language: Language, artist_languages: &HashMap<Language, f64>) -> bool {
    if language == Language::Any {
        return false;
    }
    !artist_languages.contains_key(&language)
}

/// First-matching scrobble-side reason, in the order given by §4.5 (1,2,3,4).
pub fn artist_reason_scrobble(
    a: &Artist,
    t: &ArtistThresholds,
    scrobble_genre_tag: &str,
) -> Option<ExclusionReason> {
    if too_popular_scrobble(a, t) {
        return Some(ExclusionReason::TooManyFollowersListenersPlays);
    }
    if too_unknown_scrobble(a, t) {
        return Some(ExclusionReason::TooFewFollowersListenersPlays);
    }
    if likeness_low(a, t) {
        return Some(ExclusionReason::RatioListenersToPlaysTooSmall);
    }
    if not_in_genre(a, scrobble_genre_tag) {
        return Some(ExclusionReason::Other);
    }
    None
}

/// First-matching streaming-side reason, in the order given by §4.5 (5,6).
pub fn artist_reason_streaming(a: &Artist, t: &ArtistThresholds) -> Option<ExclusionReason> {
    if too_popular_streaming(a, t) {
        return Some(ExclusionReason::TooManyFollowersListenersPlays);
    }
    if too_unknown_streaming(a, t) {
        return Some(ExclusionReason::TooFewFollowersListenersPlays);
    }
    None
}

/// Evaluates rule 7 on its own, since it is skippable on the streaming-only
/// top-up path (§4.6 step 4) when no metadata id is available.
pub fn language_reason(
    language: Language,
    artist_languages: &HashMap<Language, f64>,
) -> Option<ExclusionReason> {
    if wrong_language(language, artist_languages) {
        Some(ExclusionReason::WrongLanguage)
    } else {
        None
    }
}

/// Track-side validation (§4.5): rejects non-studio material, out-of-range
/// duration, and tracks released before the requested floor year.
pub fn track_is_valid(t: &Track, params: &RequestParams) -> bool {
    if !t.is_original_with_lyrics() {
        return false;
    }
    let Some(duration) = t.duration_seconds else { return false };
    if duration < params.min_track_seconds || duration > params.max_track_seconds {
        return false;
    }
    let Some(release_year) = t.release_year else { return false };
    if release_year < params.min_release_year {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request::NicheLevel;

    fn thresholds() -> ArtistThresholds {
        ArtistThresholds::from_bands(NicheLevel::Moderately.bands())
    }

    fn artist(listeners: i64, playcount: i64) -> Artist {
        let mut a = Artist::new("Band", "mid-1");
        a.attach_scrobble(listeners, playcount, vec!["k-pop".to_string()], String::new());
        a
    }

    #[test]
    fn too_popular_requires_both_axes_over_ceiling() {
        let t = thresholds();
        let a = artist(200_000, 2_000_000);
        assert!(too_popular_scrobble(&a, &t));

        let lopsided = artist(200_000, 10);
        assert!(!too_popular_scrobble(&lopsided, &t));
    }

    #[test]
    fn too_unknown_requires_both_axes_under_floor() {
        let t = thresholds();
        let a = artist(100, 100);
        assert!(too_unknown_scrobble(&a, &t));
    }

    #[test]
    fn likeness_below_floor_is_rejected() {
        let t = thresholds();
        let a = artist(10_000, 10_000); // likeness = 1.0 < 3.5
        assert!(likeness_low(&a, &t));
    }

    #[test]
    fn not_in_genre_checks_exact_tag() {
        let a = artist(10_000, 40_000);
        assert!(!not_in_genre(&a, "k-pop"));
        assert!(not_in_genre(&a, "j-pop"));
    }

    #[test]
    fn wrong_language_accepts_any_unconditionally() {
        let map = HashMap::new();
        assert!(!wrong_language(Language::Any, &map));
    }

    #[test]
    fn wrong_language_rejects_missing_dominant_language() {
        let mut map = HashMap::new();
        map.insert(Language::Other, 90.0);
        assert!(wrong_language(Language::English, &map));

        let mut map2 = HashMap::new();
        map2.insert(Language::English, 80.0);
        assert!(!wrong_language(Language::English, &map2));
    }

    #[test]
    fn artist_reason_scrobble_returns_first_match_in_order() {
        let t = thresholds();
        let popular = artist(500_000, 5_000_000);
        assert_eq!(
            artist_reason_scrobble(&popular, &t, "k-pop"),
            Some(ExclusionReason::TooManyFollowersListenersPlays)
        );
    }

    #[test]
    fn track_rejects_release_year_below_floor() {
        let mut t = Track::new("Song", "Artist");
        t.attach_streaming_info("uri".into(), "url".into(), 200, 1990, vec![]);
        let params = RequestParams {
            genre: "k-pop".into(),
            language: Language::Any,
            niche_level: NicheLevel::Moderately,
            min_release_year: 2000,
            min_track_seconds: 60,
            max_track_seconds: 600,
            public: true,
        };
        assert!(!track_is_valid(&t, &params));
    }
}
