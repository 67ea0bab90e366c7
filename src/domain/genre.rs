use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A genre extracted from the seed visualization. The six numeric channels
/// are normalized into `[0, 1]` against the min/max observed across the whole
/// seed set, and are never mutated after insert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Genre {
    /// like "pop"
    pub name: String,

    /// like "3nzVSyaYk0KNrahyNQS0Ur"
    pub key: String,

    /// Like `Budapest Chorus "Let the Light Shine on Me"`.
    ///
    /// Not parsed into artist/track: quote marks within artist and track
    /// names are not guaranteed to be matched properly.
    pub example: String,

    pub energy: f64,
    pub dynamic_variation: f64,
    pub instrumentalness: f64,
    pub organicness: f64,
    pub bounciness: f64,
    pub popularity: f64,

    pub fetched_artists_at: Option<NaiveDateTime>,
    pub failed_artists_at: Option<NaiveDateTime>,
}
