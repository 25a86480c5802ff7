//! Playlist lifecycle record (SPEC_FULL.md §3, §4.7, C7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Persisted record backing the `playlists` collection (§6).
///
/// Invariant (§3): `generated_length` equals the number of tracks currently
/// in the playlist on the streaming service, best-effort, updated on every
/// add/remove.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Playlist {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: String,
    pub streaming_playlist_id: String,
    pub streaming_url: String,
    pub generated_length: i32,
    pub time_to_generate_minutes: Option<f64>,
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public playlist metadata (§6): exact name/description format.
pub fn playlist_name(genre: &str) -> String {
    format!("Niche {genre} Songs")
}

pub const PLAYLIST_DESCRIPTION: &str = "Courtesy of the niche app :) (http://niche-app.net)";

impl Playlist {
    pub fn new(
        user_id: Uuid,
        genre: &str,
        streaming_playlist_id: String,
        streaming_url: String,
        generated_length: i32,
        time_to_generate_minutes: Option<f64>,
        request_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: playlist_name(genre),
            description: PLAYLIST_DESCRIPTION.to_string(),
            streaming_playlist_id,
            streaming_url,
            generated_length,
            time_to_generate_minutes,
            request_id,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_name_matches_spec_format() {
        assert_eq!(playlist_name("k-pop"), "Niche k-pop Songs");
    }

    #[test]
    fn description_matches_spec_exact_string() {
        assert_eq!(
            PLAYLIST_DESCRIPTION,
            "Courtesy of the niche app :) (http://niche-app.net)"
        );
    }
}
