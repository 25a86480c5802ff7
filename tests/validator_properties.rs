//! Property-based tests for the pure decision functions in `validator`
//! (SPEC_FULL.md §4.5, §8 "Testable Properties").

use niche_playlist_forge::models::request::NicheLevel;
use niche_playlist_forge::models::Artist;
use niche_playlist_forge::services::validator::{artist_reason_scrobble, too_popular_scrobble, too_unknown_scrobble, ArtistThresholds};
use proptest::prelude::*;

fn scrobble_artist(listeners: i64, playcount: i64) -> Artist {
    let mut a = Artist::new("Test Artist", "mid-prop");
    a.attach_scrobble(listeners, playcount, vec!["k-pop".to_string()], String::new());
    a
}

proptest! {
    /// An artist can never be simultaneously "too popular" and "too unknown":
    /// the two bands are on the same axis and the thresholds never overlap.
    #[test]
    fn too_popular_and_too_unknown_are_mutually_exclusive(
        listeners in 0i64..10_000_000,
        playcount in 0i64..100_000_000,
    ) {
        let t = ArtistThresholds::from_bands(NicheLevel::Moderately.bands());
        let a = scrobble_artist(listeners, playcount);
        prop_assert!(!(too_popular_scrobble(&a, &t) && too_unknown_scrobble(&a, &t)));
    }

    /// Likeness is scale-invariant: doubling both listeners and playcount
    /// leaves the ratio, and therefore the rule-3 verdict, unchanged.
    #[test]
    fn likeness_is_invariant_under_uniform_scaling(
        listeners in 1i64..1_000_000,
        playcount in 1i64..10_000_000,
        factor in 1i64..5,
    ) {
        let a = scrobble_artist(listeners, playcount);
        let scaled = scrobble_artist(listeners * factor, playcount * factor);
        prop_assert!((a.likeness() - scaled.likeness()).abs() < 1e-9);
    }

    /// `artist_reason_scrobble` never returns a reason when every individual
    /// rule it dispatches to returns false.
    #[test]
    fn no_reason_returned_when_all_sub_rules_pass(
        listeners in 3_000i64..150_000,
        playcount in 30_000i64..1_500_000,
    ) {
        let t = ArtistThresholds::from_bands(NicheLevel::Moderately.bands());
        let a = scrobble_artist(listeners, playcount);
        let reason = artist_reason_scrobble(&a, &t, "k-pop");
        let expected_none = !too_popular_scrobble(&a, &t)
            && !too_unknown_scrobble(&a, &t)
            && a.likeness() >= t.likeness_min;
        if expected_none {
            prop_assert_eq!(reason, None);
        }
    }
}
