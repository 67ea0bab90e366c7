use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::{Artist, Track};

/// An album from the catalog. First seen as a stub (from an artist's album
/// listing or a track's embedded album reference); enriched fields arrive on
/// the later batched album fetch, which is why album upserts update all
/// columns instead of doing nothing on conflict.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Album {
    pub spotify_id: String,
    pub name: String,
    pub album_type: String,
    pub image_url: String,
    pub total_tracks: i64,
    pub release_date: String,
    pub release_date_precision: String,
    pub popularity: i64,

    #[serde(skip)]
    pub artists: Vec<Artist>,
    #[serde(skip)]
    pub tracks: Vec<Track>,

    pub fetched_tracks_at: Option<NaiveDateTime>,
    pub failed_tracks_at: Option<NaiveDateTime>,
}

impl Album {
    pub fn stub(spotify_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            spotify_id: spotify_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}
