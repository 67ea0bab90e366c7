use serde::Deserialize;

use crate::domain::{Album, Artist, Track};

/* Wire shapes for the catalog's JSON responses. Every field is defaulted:
 * the remote omits keys freely and a missing field must never fail a whole
 * batch. */

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub items: Vec<T>,
    #[serde(default)]
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct GenreSearchResponse {
    #[serde(default)]
    pub artists: Page<ArtistItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArtistItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageItem>,
    #[serde(default)]
    pub followers: FollowersItem,
    #[serde(default)]
    pub popularity: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImageItem {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct FollowersItem {
    #[serde(default)]
    pub total: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct SimpleArtistItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct TopTracksResponse {
    #[serde(default)]
    pub tracks: Vec<TrackItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TrackItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub popularity: i64,
    #[serde(default)]
    pub disc_number: i64,
    #[serde(default)]
    pub track_number: i64,
    #[serde(default)]
    pub album: Option<AlbumItem>,
    #[serde(default)]
    pub artists: Vec<SimpleArtistItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlbumItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub album_type: String,
    #[serde(default)]
    pub images: Vec<ImageItem>,
    #[serde(default)]
    pub total_tracks: i64,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub release_date_precision: String,
    #[serde(default)]
    pub popularity: i64,
    #[serde(default)]
    pub artists: Vec<SimpleArtistItem>,
    #[serde(default)]
    pub tracks: Option<Page<TrackItem>>,
}

#[derive(Debug, Deserialize)]
pub struct AlbumsResponse {
    #[serde(default)]
    pub albums: Vec<AlbumItem>,
}

#[derive(Debug, Deserialize)]
pub struct AudioFeaturesResponse {
    /// The remote pads this array with `null` for ids it has no analysis
    /// for; those entries are dropped during conversion.
    #[serde(default)]
    pub audio_features: Vec<Option<AudioFeaturesItem>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AudioFeaturesItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub key: i64,
    #[serde(default)]
    pub mode: i64,
    #[serde(default)]
    pub tempo: f64,
    #[serde(default)]
    pub time_signature: i64,
    #[serde(default)]
    pub acousticness: f64,
    #[serde(default)]
    pub danceability: f64,
    #[serde(default)]
    pub energy: f64,
    #[serde(default)]
    pub instrumentalness: f64,
    #[serde(default)]
    pub liveness: f64,
    #[serde(default)]
    pub loudness: f64,
    #[serde(default)]
    pub speechiness: f64,
    #[serde(default)]
    pub valence: f64,
}

impl ArtistItem {
    /// Converts into a domain artist, tagging it with the genre the search
    /// was for when the remote's own genre list omits it.
    pub fn into_artist(self, searched_genre: &str) -> Artist {
        let image_url = widest_image(&self.images);
        let mut genres = self.genres;
        if !genres.iter().any(|genre| genre == searched_genre) {
            genres.push(searched_genre.to_string());
        }

        Artist {
            spotify_id: self.id,
            name: self.name,
            image_url,
            followers: self.followers.total,
            popularity: self.popularity,
            genres,
            ..Artist::default()
        }
    }
}

impl TrackItem {
    pub fn into_track(self) -> Track {
        let (album_spotify_id, album_name) = match &self.album {
            Some(album) => (album.id.clone(), album.name.clone()),
            None => (String::new(), String::new()),
        };
        self.into_track_of(&album_spotify_id, &album_name)
    }

    /// For tracks embedded in an album payload, which carry no album object
    /// of their own.
    pub fn into_track_of(self, album_spotify_id: &str, album_name: &str) -> Track {
        Track {
            spotify_id: self.id,
            name: self.name,
            popularity: self.popularity,
            album_spotify_id: album_spotify_id.to_string(),
            album_name: album_name.to_string(),
            disc_number: self.disc_number,
            track_number: self.track_number,
            artists: self
                .artists
                .into_iter()
                .map(|artist| Artist::stub(artist.id, artist.name))
                .collect(),
            ..Track::default()
        }
    }
}

impl AlbumItem {
    /// Converts into a domain album without touching the embedded track
    /// page; the client assembles tracks separately because they may span
    /// extra pages.
    pub fn into_album(self) -> Album {
        Album {
            spotify_id: self.id,
            name: self.name,
            album_type: self.album_type,
            image_url: widest_image(&self.images),
            total_tracks: self.total_tracks,
            release_date: self.release_date,
            release_date_precision: self.release_date_precision,
            popularity: self.popularity,
            artists: self
                .artists
                .into_iter()
                .map(|artist| Artist::stub(artist.id, artist.name))
                .collect(),
            tracks: Vec::new(),
            ..Album::default()
        }
    }
}

impl AudioFeaturesItem {
    pub fn into_track(self) -> Track {
        Track {
            spotify_id: self.id,
            key: self.key,
            mode: self.mode,
            tempo: self.tempo,
            time_signature: self.time_signature,
            acousticness: self.acousticness,
            danceability: self.danceability,
            energy: self.energy,
            instrumentalness: self.instrumentalness,
            liveness: self.liveness,
            loudness: self.loudness,
            speechiness: self.speechiness,
            valence: self.valence,
            ..Track::default()
        }
    }
}

fn widest_image(images: &[ImageItem]) -> String {
    images
        .iter()
        .max_by_key(|image| image.width)
        .map(|image| image.url.clone())
        .unwrap_or_default()
}
