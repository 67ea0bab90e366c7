pub mod engine;
pub mod workers;

pub use engine::{build_engine, Engine, PipelineConfig};

use crate::catalog::CatalogError;
use crate::repository::RepositoryError;
use crate::seed::SeedError;

/// The fetch phases a pipeline run can be restricted to. `track_analysis`
/// brings the search indexer along, the way the full pipeline wires them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum WorkerKind {
    #[value(name = "genres")]
    Genres,
    #[value(name = "genre_artists")]
    GenreArtists,
    #[value(name = "artist_tracks")]
    ArtistTracks,
    #[value(name = "artist_albums")]
    ArtistAlbums,
    #[value(name = "album_tracks")]
    AlbumTracks,
    #[value(name = "track_analysis")]
    TrackAnalysis,
    #[value(name = "album_tracks_refetch")]
    AlbumTracksRefetch,
}

impl WorkerKind {
    pub fn all() -> Vec<WorkerKind> {
        vec![
            WorkerKind::Genres,
            WorkerKind::GenreArtists,
            WorkerKind::ArtistTracks,
            WorkerKind::ArtistAlbums,
            WorkerKind::AlbumTracks,
            WorkerKind::TrackAnalysis,
            WorkerKind::AlbumTracksRefetch,
        ]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Not an anomaly: the shared context was canceled and the worker bailed
    /// at its next checkpoint. The message names the checkpoint for the
    /// error chain.
    #[error("canceled: {0}")]
    Canceled(String),

    #[error(transparent)]
    Repository(RepositoryError),

    #[error(transparent)]
    Catalog(CatalogError),

    #[error(transparent)]
    Seed(#[from] SeedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, WorkerError::Canceled(_))
    }
}

impl From<RepositoryError> for WorkerError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Canceled => WorkerError::Canceled("store operation".into()),
            other => WorkerError::Repository(other),
        }
    }
}

impl From<CatalogError> for WorkerError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Canceled => WorkerError::Canceled("catalog fetch".into()),
            other => WorkerError::Catalog(other),
        }
    }
}
