//! GenreCatalog (SPEC_FULL.md §4.2, C2).
//!
//! A compile-time static table bridging the two genre taxonomies the pipeline
//! has to reconcile: the streaming service's "seed genre" list and the
//! scrobble/metadata service tag vocabularies. Per §9's design note, this is
//! never guessed at runtime — it is a fixed table constructed once.

use std::sync::OnceLock;

/// One row of the genre table: the same conceptual genre, spelled the way
/// each of the three services spells it. `streaming_name` is `None` when the
/// genre is not one of the streaming service's recommendation seed genres.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenreRow {
    pub streaming_name: Option<&'static str>,
    pub metadata_name: &'static str,
    pub scrobble_name: &'static str,
}

impl GenreRow {
    /// Primary name: streaming name if present, else metadata name (§4.2 invariant).
    pub fn primary_name(&self) -> &'static str {
        self.streaming_name.unwrap_or(self.metadata_name)
    }
}

/// The service a genre name is expressed in, for `GenreCatalog::convert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenreService {
    Streaming,
    Metadata,
    Scrobble,
}

const TABLE: &[GenreRow] = &[
    GenreRow { streaming_name: Some("k-pop"), metadata_name: "k-pop", scrobble_name: "k-pop" },
    GenreRow { streaming_name: Some("j-pop"), metadata_name: "j-pop", scrobble_name: "j-pop" },
    GenreRow { streaming_name: Some("city-pop"), metadata_name: "city pop", scrobble_name: "city pop" },
    GenreRow { streaming_name: Some("shoegaze"), metadata_name: "shoegaze", scrobble_name: "shoegaze" },
    GenreRow { streaming_name: Some("dream-pop"), metadata_name: "dream pop", scrobble_name: "dream pop" },
    GenreRow { streaming_name: Some("math-rock"), metadata_name: "math rock", scrobble_name: "math rock" },
    GenreRow { streaming_name: Some("post-rock"), metadata_name: "post-rock", scrobble_name: "post rock" },
    GenreRow { streaming_name: Some("synth-pop"), metadata_name: "synthpop", scrobble_name: "synthpop" },
    GenreRow { streaming_name: Some("vaporwave"), metadata_name: "vaporwave", scrobble_name: "vaporwave" },
    GenreRow { streaming_name: Some("afrobeat"), metadata_name: "afrobeat", scrobble_name: "afrobeat" },
    GenreRow { streaming_name: Some("bossanova"), metadata_name: "bossa nova", scrobble_name: "bossa nova" },
    GenreRow { streaming_name: Some("flamenco"), metadata_name: "flamenco", scrobble_name: "flamenco" },
    GenreRow { streaming_name: Some("grunge"), metadata_name: "grunge", scrobble_name: "grunge" },
    GenreRow { streaming_name: Some("idm"), metadata_name: "IDM", scrobble_name: "idm" },
    GenreRow { streaming_name: None, metadata_name: "dungeon synth", scrobble_name: "dungeon synth" },
    GenreRow { streaming_name: None, metadata_name: "witch house", scrobble_name: "witch house" },
    GenreRow { streaming_name: None, metadata_name: "sadcore", scrobble_name: "sadcore" },
];

/// Canonical list of genres and cross-service name mapping.
///
/// Constructed once behind a process-wide `OnceLock` and never mutated
/// thereafter (§4.2). Stateless otherwise, so `GenreCatalog::global()` is the
/// only constructor the pipeline needs.
pub struct GenreCatalog {
    rows: &'static [GenreRow],
}

static CATALOG: OnceLock<GenreCatalog> = OnceLock::new();

impl GenreCatalog {
    /// The process-wide singleton instance, built lazily on first access.
    pub fn global() -> &'static GenreCatalog {
        CATALOG.get_or_init(|| GenreCatalog { rows: TABLE })
    }

    pub fn is_streaming_seed(&self, name: &str) -> bool {
        self.rows
            .iter()
            .any(|row| row.streaming_name == Some(name))
    }

    /// Converts `name` from `from` to `to`. Returns `None` if `name` does not
    /// match any row in `from`'s column, or if the target column is absent
    /// for that row (e.g. converting a non-seed genre to streaming).
    pub fn convert(&self, from: GenreService, to: GenreService, name: &str) -> Option<&'static str> {
        let row = self.rows.iter().find(|row| match from {
            GenreService::Streaming => row.streaming_name == Some(name),
            GenreService::Metadata => row.metadata_name == name,
            GenreService::Scrobble => row.scrobble_name == name,
        })?;

        match to {
            GenreService::Streaming => row.streaming_name,
            GenreService::Metadata => Some(row.metadata_name),
            GenreService::Scrobble => Some(row.scrobble_name),
        }
    }

    /// The primary name per row, preferring streaming name, falling back to
    /// metadata name (§4.2).
    pub fn all_supported(&self) -> Vec<&'static str> {
        self.rows.iter().map(GenreRow::primary_name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_row_has_a_primary_name() {
        for row in TABLE {
            assert!(!row.primary_name().is_empty());
        }
    }

    #[test]
    fn at_most_one_row_matches_a_name_in_any_column() {
        for row in TABLE {
            let matches = TABLE
                .iter()
                .filter(|r| r.metadata_name == row.metadata_name)
                .count();
            assert_eq!(matches, 1, "duplicate metadata_name {}", row.metadata_name);
        }
    }

    #[test]
    fn streaming_seed_detection() {
        let catalog = GenreCatalog::global();
        assert!(catalog.is_streaming_seed("k-pop"));
        assert!(!catalog.is_streaming_seed("dungeon synth"));
    }

    #[test]
    fn convert_bridges_metadata_to_scrobble() {
        let catalog = GenreCatalog::global();
        let converted = catalog.convert(GenreService::Metadata, GenreService::Scrobble, "city pop");
        assert_eq!(converted, Some("city pop"));
    }

    #[test]
    fn convert_returns_none_for_non_seed_to_streaming() {
        let catalog = GenreCatalog::global();
        let converted = catalog.convert(GenreService::Metadata, GenreService::Streaming, "dungeon synth");
        assert_eq!(converted, None);
    }

    #[test]
    fn all_supported_prefers_streaming_name() {
        let catalog = GenreCatalog::global();
        assert!(catalog.all_supported().contains(&"k-pop"));
        assert!(catalog.all_supported().contains(&"dungeon synth"));
    }
}
