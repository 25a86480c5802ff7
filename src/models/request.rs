//! Request params, bands, and stats (SPEC_FULL.md §3, §4.5, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::models::genre::GenreCatalog;

/// Coarse three-valued popularity band requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NicheLevel {
    Very,
    Moderately,
    OnlyKinda,
}

impl NicheLevel {
    /// Stable key text used in `ExclusionKey` (SPEC_FULL.md §3) and persisted column values.
    pub fn as_key_str(&self) -> &'static str {
        match self {
            NicheLevel::Very => "very",
            NicheLevel::Moderately => "moderately",
            NicheLevel::OnlyKinda => "only_kinda",
        }
    }
}

/// Inclusive numeric band for one of the scrobble/streaming popularity axes.
#[derive(Debug, Clone, Copy)]
pub struct Band {
    pub min: i64,
    pub max: i64,
}

impl Band {
    pub fn contains(&self, value: i64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// The three popularity bands (listeners, playcount, followers) for a niche level.
/// Values are the hard-coded table in SPEC_FULL.md §4.5.
#[derive(Debug, Clone, Copy)]
pub struct NicheBands {
    pub listeners: Band,
    pub playcount: Band,
    pub followers: Band,
}

impl NicheLevel {
    pub fn bands(&self) -> NicheBands {
        match self {
            NicheLevel::Very => NicheBands {
                listeners: Band { min: 1_000, max: 50_000 },
                playcount: Band { min: 10_000, max: 500_000 },
                followers: Band { min: 100, max: 5_000 },
            },
            NicheLevel::Moderately => NicheBands {
                listeners: Band { min: 3_000, max: 150_000 },
                playcount: Band { min: 30_000, max: 1_500_000 },
                followers: Band { min: 1_000, max: 15_000 },
            },
            NicheLevel::OnlyKinda => NicheBands {
                listeners: Band { min: 9_000, max: 450_000 },
                playcount: Band { min: 90_000, max: 4_500_000 },
                followers: Band { min: 10_000, max: 45_000 },
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Any,
    English,
    Other,
}

impl Language {
    /// Stable key text used in `ExclusionKey` (SPEC_FULL.md §3) and persisted column values.
    pub fn as_key_str(&self) -> &'static str {
        match self {
            Language::Any => "any",
            Language::English => "english",
            Language::Other => "other",
        }
    }
}

/// Hard defaults from SPEC_FULL.md §4.5.
pub const LIKENESS_MIN_DEFAULT: f64 = 3.5;
pub const PLAYLIST_MIN_LENGTH: usize = 20;
pub const PLAYLIST_MAX_LENGTH: usize = 60;
pub const MIN_SONGS_FOR_PLAYLIST_GEN: usize = 4;

/// Request parameters supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestParams {
    pub genre: String,
    pub language: Language,
    pub niche_level: NicheLevel,
    pub min_release_year: i32,
    pub min_track_seconds: i32,
    pub max_track_seconds: i32,
    pub public: bool,
}

/// Mutable running statistics updated as the finder selects tracks (§4.7).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestStats {
    pub percent_artists_valid: Option<f64>,
    pub average_artist_followers: Option<f64>,
}

/// Persisted request record (`requests` collection, §6).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlaylistRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(json)]
    pub params: sqlx::types::Json<RequestParams>,
    #[sqlx(json)]
    pub stats: sqlx::types::Json<RequestStats>,
    pub generated_playlist: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlaylistRequest {
    /// Validates `params.genre` against the catalog and constructs an
    /// in-memory handle. Persisting it is the caller's (`request_service`)
    /// responsibility; this constructor never writes to the database.
    pub fn create(user_id: Uuid, params: RequestParams, catalog: &GenreCatalog) -> Result<Self, ValidationError> {
        if !catalog.all_supported().iter().any(|g| g == &params.genre) {
            return Err(ValidationError(format!("unknown genre '{}'", params.genre)));
        }
        if params.min_track_seconds > params.max_track_seconds {
            return Err(ValidationError(
                "min_track_seconds must not exceed max_track_seconds".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            params: sqlx::types::Json(params),
            stats: sqlx::types::Json(RequestStats::default()),
            generated_playlist: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Running-mean update of `average_artist_followers`, per the one
    /// authoritative formula in SPEC_FULL.md §4.7/§9:
    /// `new_mean = (old_mean * prev_n + x) / (prev_n + 1)`.
    pub fn update_stats(
        &mut self,
        new_artist_followers: Option<f64>,
        new_valid_percent: Option<f64>,
        previous_count: u64,
    ) {
        if let Some(followers) = new_artist_followers {
            let old_mean = self.stats.average_artist_followers.unwrap_or(0.0);
            let new_mean = (old_mean * previous_count as f64 + followers) / (previous_count as f64 + 1.0);
            self.stats.average_artist_followers = Some(new_mean);
        }
        if let Some(percent) = new_valid_percent {
            self.stats.percent_artists_valid = Some(percent);
        }
        self.updated_at = Utc::now();
    }

    pub fn niche_bands(&self) -> NicheBands {
        self.params.niche_level.bands()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_mean_matches_arithmetic_mean_of_equal_values() {
        let mut req = PlaylistRequest {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            params: sqlx::types::Json(RequestParams {
                genre: "k-pop".to_string(),
                language: Language::Any,
                niche_level: NicheLevel::Moderately,
                min_release_year: 0,
                min_track_seconds: 120,
                max_track_seconds: 600,
                public: true,
            }),
            stats: sqlx::types::Json(RequestStats::default()),
            generated_playlist: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        for n in 0..5u64 {
            req.update_stats(Some(1000.0), None, n);
        }

        assert_eq!(req.stats.average_artist_followers, Some(1000.0));
    }

    #[test]
    fn niche_bands_match_spec_table() {
        let bands = NicheLevel::Very.bands();
        assert_eq!(bands.listeners.min, 1_000);
        assert_eq!(bands.listeners.max, 50_000);
        assert_eq!(bands.followers.min, 100);
        assert_eq!(bands.followers.max, 5_000);
    }
}
