pub mod albums_repo;
pub mod artists_repo;
pub mod genres_repo;
pub mod progress;
pub mod queries;
pub mod search_repo;
pub mod tracks_repo;

pub use albums_repo::SqliteAlbumsRepository;
pub use artists_repo::SqliteArtistsRepository;
pub use genres_repo::SqliteGenresRepository;
pub use progress::Progress;
pub use search_repo::SqliteSearchRepository;
pub use tracks_repo::SqliteTracksRepository;

use std::path::Path;

use chrono::Local;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::domain::{Album, Artist, Genre, Track, ValidationError};

/* Database related errors */
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity fields validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("canceled")]
    Canceled,

    #[error("No track found for '{0}'.")]
    TrackNotFound(String),

    #[error("Unknown resolve command '{0}'. Expected 'q' or 'id'.")]
    UnknownResolveCommand(String),

    #[error("Unknown feature axis '{0}'.")]
    UnknownAxis(String),

    #[error("No rows was returned by a query that expected to return at least one row.")]
    RowNotFound,

    #[error("Database connection error: {0}")]
    ConnectionError(String),

    #[error("Failed to decode database row: {0}")]
    RowDecodingError(String),

    #[error("A constraint was violated: {description}")]
    ConstraintViolation { description: String },

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Database error: {0}")]
    GenericDatabaseError(#[from] sqlx::Error),
}

impl RepositoryError {
    pub fn from_sqlx_error(sqlx_error: sqlx::Error) -> Self {
        match &sqlx_error {
            sqlx::Error::RowNotFound => Self::RowNotFound,
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                Self::ConnectionError(sqlx_error.to_string())
            }
            sqlx::Error::Decode(decode_err) => Self::RowDecodingError(decode_err.to_string()),
            sqlx::Error::Database(db_error) => {
                if let Some(error_code) = db_error.code() {
                    let code_str = error_code.as_ref();

                    // SQLite constraint violation codes: 19 (general), 2067
                    // (unique), 1555 (primary key), 787 (foreign key).
                    if ["19", "2067", "1555", "787"].contains(&code_str) {
                        return Self::ConstraintViolation {
                            description: db_error.message().to_string(),
                        };
                    }
                }

                Self::GenericDatabaseError(sqlx_error)
            }

            _ => Self::GenericDatabaseError(sqlx_error),
        }
    }
}

/// Returns early with `RepositoryError::Canceled` when the token has been
/// canceled. Multi-statement writes call this between statements so a
/// canceled pipeline never commits a partial batch.
pub(crate) fn check_canceled(ctx: &CancellationToken) -> Result<(), RepositoryError> {
    if ctx.is_cancelled() {
        return Err(RepositoryError::Canceled);
    }
    Ok(())
}

/// The store façade over the sqlite file.
///
/// Two logical connections: a read-only pool that may be queried
/// concurrently, and a single-connection read-write pool serialized further
/// by a process-wide write lock held for the whole duration of each write
/// operation, multi-statement transactions included. The underlying store
/// permits one concurrent writer; manufacturing the single-writer invariant
/// up front avoids spurious busy/locked errors when many workers converge.
pub struct Store {
    ro: SqlitePool,
    rw: SqlitePool,
    write_lock: Mutex<()>,

    genres: SqliteGenresRepository,
    artists: SqliteArtistsRepository,
    albums: SqliteAlbumsRepository,
    tracks: SqliteTracksRepository,
    search: SqliteSearchRepository,
}

impl Store {
    /// Opens (creating if missing) and migrates the database file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let rw_options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);

        let rw = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(rw_options)
            .await?;

        sqlx::migrate!("./migrations").run(&rw).await?;

        let ro_options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .read_only(true);

        let ro = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(ro_options)
            .await?;

        Ok(Self {
            ro,
            rw,
            write_lock: Mutex::new(()),
            genres: SqliteGenresRepository::new(),
            artists: SqliteArtistsRepository::new(),
            albums: SqliteAlbumsRepository::new(),
            tracks: SqliteTracksRepository::new(),
            search: SqliteSearchRepository::new(),
        })
    }

    pub(crate) fn read_pool(&self) -> &SqlitePool {
        &self.ro
    }

    pub(crate) fn genres_repo(&self) -> &SqliteGenresRepository {
        &self.genres
    }

    pub(crate) fn artists_repo(&self) -> &SqliteArtistsRepository {
        &self.artists
    }

    pub(crate) fn albums_repo(&self) -> &SqliteAlbumsRepository {
        &self.albums
    }

    pub(crate) fn tracks_repo(&self) -> &SqliteTracksRepository {
        &self.tracks
    }

    pub(crate) fn search_repo(&self) -> &SqliteSearchRepository {
        &self.search
    }

    /* Inserts. All are idempotent: upsert-on-conflict-do-nothing, except
     * albums, whose enriched fields arrive on later fetches and therefore
     * update all columns on conflict. */

    pub async fn insert_genre(&self, genre: &Genre) -> Result<(), RepositoryError> {
        if genre.name.is_empty() {
            return Err(ValidationError::GenreNameIsEmpty.into());
        }

        let _guard = self.write_lock.lock().await;
        self.genres.insert(&self.rw, genre).await
    }

    /// Inserts the artist, its genre associations, and its bounding box in
    /// genre space, all in one transaction.
    pub async fn insert_artist(
        &self,
        ctx: &CancellationToken,
        artist: &Artist,
    ) -> Result<(), RepositoryError> {
        if artist.spotify_id.is_empty() {
            return Err(ValidationError::ArtistIdIsEmpty.into());
        }
        if artist.genres.iter().any(|genre| genre.is_empty()) {
            return Err(ValidationError::ArtistGenreIsEmpty.into());
        }

        let _guard = self.write_lock.lock().await;
        let mut tx = self.rw.begin().await?;
        self.artists.insert_full(&mut tx, ctx, artist).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Upserts the album and its artist associations in one transaction.
    pub async fn insert_album(
        &self,
        ctx: &CancellationToken,
        album: &Album,
    ) -> Result<(), RepositoryError> {
        if album.spotify_id.is_empty() {
            return Err(ValidationError::AlbumIdIsEmpty.into());
        }
        if album.artists.iter().any(|artist| artist.spotify_id.is_empty()) {
            return Err(ValidationError::ArtistIdIsEmpty.into());
        }

        let _guard = self.write_lock.lock().await;
        let mut tx = self.rw.begin().await?;
        self.albums.upsert_full(&mut tx, ctx, album).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Inserts the track, a stub for its album, and its artist stubs and
    /// associations, all in one transaction.
    pub async fn insert_track(
        &self,
        ctx: &CancellationToken,
        track: &Track,
    ) -> Result<(), RepositoryError> {
        if track.spotify_id.is_empty() {
            return Err(ValidationError::TrackIdIsEmpty.into());
        }
        if track.artists.iter().any(|artist| artist.spotify_id.is_empty()) {
            return Err(ValidationError::ArtistIdIsEmpty.into());
        }

        let _guard = self.write_lock.lock().await;
        let mut tx = self.rw.begin().await?;
        self.tracks.insert_full(&mut tx, ctx, track).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Update-only: writes the analysis feature columns and stamps
    /// `fetched_analysis_at`. Never creates a track.
    pub async fn add_track_analysis(&self, track: &Track) -> Result<(), RepositoryError> {
        if track.spotify_id.is_empty() {
            return Err(ValidationError::TrackIdIsEmpty.into());
        }

        let _guard = self.write_lock.lock().await;
        self.tracks.add_analysis(&self.rw, track).await
    }

    /// Full-field upsert of refetched albums with their embedded tracks and
    /// artists. One transaction per call.
    pub async fn populate_albums(
        &self,
        ctx: &CancellationToken,
        albums: &[Album],
    ) -> Result<(), RepositoryError> {
        for album in albums {
            if album.spotify_id.is_empty() {
                return Err(ValidationError::AlbumIdIsEmpty.into());
            }
            if album.artists.iter().any(|artist| artist.spotify_id.is_empty()) {
                return Err(ValidationError::ArtistIdIsEmpty.into());
            }
            for track in &album.tracks {
                if track.spotify_id.is_empty() {
                    return Err(ValidationError::TrackIdIsEmpty.into());
                }
                if track.artists.iter().any(|artist| artist.spotify_id.is_empty()) {
                    return Err(ValidationError::ArtistIdIsEmpty.into());
                }
            }
        }

        let _guard = self.write_lock.lock().await;
        let mut tx = self.rw.begin().await?;
        for album in albums {
            check_canceled(ctx)?;
            self.albums.upsert_full(&mut tx, ctx, album).await?;
            for track in &album.tracks {
                check_canceled(ctx)?;
                self.tracks.insert_full(&mut tx, ctx, track).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /* Marking operations: each sets a single timestamp column. Once set it
     * is never cleared by normal workers; refetch workers may re-set the
     * failed marker. */

    pub async fn mark_genre_fetched(&self, name: &str) -> Result<(), RepositoryError> {
        if name.is_empty() {
            return Err(ValidationError::GenreNameIsEmpty.into());
        }
        let _guard = self.write_lock.lock().await;
        self.genres
            .mark(&self.rw, name, "fetched_artists_at", Local::now().naive_local())
            .await
    }

    pub async fn mark_genre_failed(&self, name: &str) -> Result<(), RepositoryError> {
        if name.is_empty() {
            return Err(ValidationError::GenreNameIsEmpty.into());
        }
        let _guard = self.write_lock.lock().await;
        self.genres
            .mark(&self.rw, name, "failed_artists_at", Local::now().naive_local())
            .await
    }

    pub async fn mark_artist_fetched(&self, spotify_id: &str) -> Result<(), RepositoryError> {
        if spotify_id.is_empty() {
            return Err(ValidationError::ArtistIdIsEmpty.into());
        }
        let _guard = self.write_lock.lock().await;
        self.artists
            .mark(&self.rw, spotify_id, "fetched_tracks_at", Local::now().naive_local())
            .await
    }

    pub async fn mark_artist_failed(&self, spotify_id: &str) -> Result<(), RepositoryError> {
        if spotify_id.is_empty() {
            return Err(ValidationError::ArtistIdIsEmpty.into());
        }
        let _guard = self.write_lock.lock().await;
        self.artists
            .mark(&self.rw, spotify_id, "failed_tracks_at", Local::now().naive_local())
            .await
    }

    pub async fn mark_artist_albums_fetched(&self, spotify_id: &str) -> Result<(), RepositoryError> {
        if spotify_id.is_empty() {
            return Err(ValidationError::ArtistIdIsEmpty.into());
        }
        let _guard = self.write_lock.lock().await;
        self.artists
            .mark(&self.rw, spotify_id, "fetched_albums_at", Local::now().naive_local())
            .await
    }

    pub async fn mark_artist_albums_failed(&self, spotify_id: &str) -> Result<(), RepositoryError> {
        if spotify_id.is_empty() {
            return Err(ValidationError::ArtistIdIsEmpty.into());
        }
        let _guard = self.write_lock.lock().await;
        self.artists
            .mark(&self.rw, spotify_id, "failed_albums_at", Local::now().naive_local())
            .await
    }

    pub async fn mark_album_tracks_fetched(&self, spotify_id: &str) -> Result<(), RepositoryError> {
        if spotify_id.is_empty() {
            return Err(ValidationError::AlbumIdIsEmpty.into());
        }
        let _guard = self.write_lock.lock().await;
        self.albums
            .mark(&self.rw, spotify_id, "fetched_tracks_at", Local::now().naive_local())
            .await
    }

    pub async fn mark_albums_tracks_failed(&self, spotify_ids: &[String]) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock().await;
        self.albums
            .mark_all(&self.rw, spotify_ids, "failed_tracks_at", Local::now().naive_local())
            .await
    }

    pub async fn mark_track_analysis_failed(&self, spotify_ids: &[String]) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock().await;
        self.tracks
            .mark_analysis_failed(&self.rw, spotify_ids, Local::now().naive_local())
            .await
    }

    /* Work-queue predicate reads. The database is the work queue: a worker
     * only loads a batch when there is provably work to do. */

    pub async fn get_genres_to_fetch_artists(&self, limit: i64) -> Result<Vec<String>, RepositoryError> {
        self.genres.to_fetch_artists(&self.ro, limit).await
    }

    pub async fn get_artists_to_fetch_tracks(&self, limit: i64) -> Result<Vec<String>, RepositoryError> {
        self.artists.to_fetch_tracks(&self.ro, limit).await
    }

    pub async fn get_artists_to_fetch_albums(&self, limit: i64) -> Result<Vec<String>, RepositoryError> {
        self.artists.to_fetch_albums(&self.ro, limit).await
    }

    pub async fn get_albums_to_fetch_tracks(&self, limit: i64) -> Result<Vec<String>, RepositoryError> {
        self.albums.to_fetch_tracks(&self.ro, limit).await
    }

    pub async fn get_albums_to_refetch_tracks(&self, limit: i64) -> Result<Vec<String>, RepositoryError> {
        self.albums.to_refetch_tracks(&self.ro, limit).await
    }

    pub async fn get_tracks_to_fetch_analysis(&self, limit: i64) -> Result<Vec<String>, RepositoryError> {
        self.tracks.to_fetch_analysis(&self.ro, limit).await
    }
}
