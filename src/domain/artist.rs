use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// An artist found through the catalog's genre search, or created as a stub
/// when a track or album arrives carrying an artist we have not seen yet (in
/// that case only `spotify_id` and `name` are known).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Artist {
    pub spotify_id: String,
    pub name: String,
    pub image_url: String,
    pub followers: i64,
    pub popularity: i64,

    pub genres: Vec<String>,

    pub fetched_tracks_at: Option<NaiveDateTime>,
    pub failed_tracks_at: Option<NaiveDateTime>,
    pub fetched_albums_at: Option<NaiveDateTime>,
    pub failed_albums_at: Option<NaiveDateTime>,
}

impl Artist {
    /// A stub carrying only identity, for incidental creation from embedded
    /// track or album artist lists.
    pub fn stub(spotify_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            spotify_id: spotify_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}
