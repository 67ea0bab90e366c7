use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::{Artist, Vector};

/// The seven audio-feature axes that form a track's similarity vector.
/// `loudness` (dB), `tempo` (BPM) and the integer trio are stored but do not
/// participate in distance queries.
pub const FEATURE_AXES: [&str; 7] = [
    "acousticness",
    "danceability",
    "energy",
    "instrumentalness",
    "liveness",
    "speechiness",
    "valence",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Track {
    pub spotify_id: String,
    pub name: String,
    pub popularity: i64,

    pub album_spotify_id: String,
    pub album_name: String,
    pub disc_number: i64,
    pub track_number: i64,

    #[serde(skip)]
    pub artists: Vec<Artist>,

    pub fetched_analysis_at: Option<NaiveDateTime>,
    pub failed_analysis_at: Option<NaiveDateTime>,
    pub indexed_search_at: Option<NaiveDateTime>,

    pub key: i64,
    pub mode: i64,
    pub tempo: f64,
    pub time_signature: i64,

    pub acousticness: f64,
    pub danceability: f64,
    pub energy: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub loudness: f64,
    pub speechiness: f64,
    pub valence: f64,
}

impl Track {
    /// The track's feature vector. Empty until an analysis has actually been
    /// fetched, so consumers never read zero-initialized feature columns as
    /// real data.
    pub fn vector(&self) -> Vector {
        if self.fetched_analysis_at.is_none() {
            return Vector::new();
        }
        Vector::from([
            ("acousticness", self.acousticness),
            ("danceability", self.danceability),
            ("energy", self.energy),
            ("instrumentalness", self.instrumentalness),
            ("liveness", self.liveness),
            ("speechiness", self.speechiness),
            ("valence", self.valence),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_empty_before_analysis() {
        let track = Track {
            spotify_id: "t1".into(),
            name: "song".into(),
            energy: 0.9,
            ..Track::default()
        };
        assert!(track.vector().is_empty());
    }

    #[test]
    fn test_vector_present_after_analysis() {
        let track = Track {
            spotify_id: "t1".into(),
            name: "song".into(),
            energy: 0.9,
            valence: 0.3,
            fetched_analysis_at: Some(chrono::Local::now().naive_local()),
            ..Track::default()
        };
        let vector = track.vector();
        assert_eq!(vector.len(), 7);
        assert_eq!(vector.get("energy"), Some(0.9));
        assert_eq!(vector.get("valence"), Some(0.3));
    }
}
