pub mod album;
pub mod artist;
pub mod genre;
pub mod track;
pub mod vector;

pub use album::Album;
pub use artist::Artist;
pub use genre::Genre;
pub use track::Track;
pub use vector::Vector;

/* Validation failures are non-retryable: the offending record can never be
 * persisted, so callers abort instead of retrying. */
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Genre name cannot be an empty string.")]
    GenreNameIsEmpty,

    #[error("Artist spotify id cannot be an empty string.")]
    ArtistIdIsEmpty,

    #[error("Album spotify id cannot be an empty string.")]
    AlbumIdIsEmpty,

    #[error("Track spotify id cannot be an empty string.")]
    TrackIdIsEmpty,

    #[error("Genre name in artist genre list cannot be an empty string.")]
    ArtistGenreIsEmpty,
}
