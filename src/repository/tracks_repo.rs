use chrono::{Local, NaiveDateTime};
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite, SqliteConnection};
use tokio_util::sync::CancellationToken;

use crate::domain::track::FEATURE_AXES;
use crate::domain::{Track, Vector};
use super::{check_canceled, RepositoryError};

#[derive(FromRow)]
struct DbTrack {
    spotify_id: String,
    name: String,
    popularity: i64,
    album_spotify_id: String,
    album_name: String,
    disc_number: i64,
    track_number: i64,
    fetched_analysis_at: Option<NaiveDateTime>,
    failed_analysis_at: Option<NaiveDateTime>,
    indexed_search_at: Option<NaiveDateTime>,
    key: i64,
    mode: i64,
    tempo: f64,
    time_signature: i64,
    acousticness: f64,
    danceability: f64,
    energy: f64,
    instrumentalness: f64,
    liveness: f64,
    loudness: f64,
    speechiness: f64,
    valence: f64,
}

impl From<DbTrack> for Track {
    fn from(row: DbTrack) -> Self {
        Self {
            spotify_id: row.spotify_id,
            name: row.name,
            popularity: row.popularity,
            album_spotify_id: row.album_spotify_id,
            album_name: row.album_name,
            disc_number: row.disc_number,
            track_number: row.track_number,
            artists: Vec::new(),
            fetched_analysis_at: row.fetched_analysis_at,
            failed_analysis_at: row.failed_analysis_at,
            indexed_search_at: row.indexed_search_at,
            key: row.key,
            mode: row.mode,
            tempo: row.tempo,
            time_signature: row.time_signature,
            acousticness: row.acousticness,
            danceability: row.danceability,
            energy: row.energy,
            instrumentalness: row.instrumentalness,
            liveness: row.liveness,
            loudness: row.loudness,
            speechiness: row.speechiness,
            valence: row.valence,
        }
    }
}

const SELECT_COLUMNS: &str = "spotify_id, name, popularity,
    album_spotify_id, album_name, disc_number, track_number,
    fetched_analysis_at, failed_analysis_at, indexed_search_at,
    key, mode, tempo, time_signature,
    acousticness, danceability, energy, instrumentalness,
    liveness, loudness, speechiness, valence";

/// Maps a vector axis onto its tracks column, rejecting anything outside the
/// fixed feature set before it can reach interpolated SQL.
fn feature_column(axis: &str) -> Result<&'static str, RepositoryError> {
    FEATURE_AXES
        .iter()
        .find(|known| **known == axis)
        .copied()
        .ok_or_else(|| RepositoryError::UnknownAxis(axis.to_string()))
}

pub struct SqliteTracksRepository;

impl SqliteTracksRepository {
    pub fn new() -> Self {
        Self {}
    }

    /// Inserts the track, an identity stub for its album (so downstream
    /// album workers see work), and its artist stubs and associations. The
    /// caller supplies the transaction.
    pub async fn insert_full(
        &self,
        conn: &mut SqliteConnection,
        ctx: &CancellationToken,
        track: &Track,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO tracks(spotify_id, name, popularity,
                album_spotify_id, album_name, disc_number, track_number)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (spotify_id) DO NOTHING;",
        )
        .bind(&track.spotify_id)
        .bind(&track.name)
        .bind(track.popularity)
        .bind(&track.album_spotify_id)
        .bind(&track.album_name)
        .bind(track.disc_number)
        .bind(track.track_number)
        .execute(&mut *conn)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        check_canceled(ctx)?;

        if !track.album_spotify_id.is_empty() {
            sqlx::query(
                "INSERT INTO albums(spotify_id, name)
                VALUES (?, ?)
                ON CONFLICT (spotify_id) DO NOTHING;",
            )
            .bind(&track.album_spotify_id)
            .bind(&track.album_name)
            .execute(&mut *conn)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

            check_canceled(ctx)?;

            sqlx::query(
                "INSERT INTO album_tracks(album_spotify_id, track_spotify_id)
                VALUES (?, ?)
                ON CONFLICT (album_spotify_id, track_spotify_id) DO NOTHING;",
            )
            .bind(&track.album_spotify_id)
            .bind(&track.spotify_id)
            .execute(&mut *conn)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

            check_canceled(ctx)?;
        }

        for artist in &track.artists {
            check_canceled(ctx)?;

            sqlx::query(
                "INSERT INTO artists(spotify_id, name)
                VALUES (?, ?)
                ON CONFLICT (spotify_id) DO NOTHING;",
            )
            .bind(&artist.spotify_id)
            .bind(&artist.name)
            .execute(&mut *conn)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

            sqlx::query(
                "INSERT INTO track_artists(track_spotify_id, artist_spotify_id)
                VALUES (?, ?)
                ON CONFLICT (track_spotify_id, artist_spotify_id) DO NOTHING;",
            )
            .bind(&track.spotify_id)
            .bind(&artist.spotify_id)
            .execute(&mut *conn)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;
        }

        Ok(())
    }

    /// Writes the analysis feature columns and stamps `fetched_analysis_at`.
    /// Update-only: a track that was never inserted stays absent.
    pub async fn add_analysis<'e, E>(&self, executor: E, track: &Track) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "UPDATE tracks SET
                fetched_analysis_at = ?,
                key = ?, mode = ?, tempo = ?, time_signature = ?,
                acousticness = ?, danceability = ?, energy = ?,
                instrumentalness = ?, liveness = ?, loudness = ?,
                speechiness = ?, valence = ?
            WHERE spotify_id = ?;",
        )
        .bind(Local::now().naive_local())
        .bind(track.key)
        .bind(track.mode)
        .bind(track.tempo)
        .bind(track.time_signature)
        .bind(track.acousticness)
        .bind(track.danceability)
        .bind(track.energy)
        .bind(track.instrumentalness)
        .bind(track.liveness)
        .bind(track.loudness)
        .bind(track.speechiness)
        .bind(track.valence)
        .bind(&track.spotify_id)
        .execute(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        Ok(())
    }

    pub(super) async fn mark_analysis_failed<'e, E>(
        &self,
        executor: E,
        spotify_ids: &[String],
        at: NaiveDateTime,
    ) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if spotify_ids.is_empty() {
            return Ok(());
        }

        let mut qbuilder: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE tracks SET failed_analysis_at = ");
        qbuilder.push_bind(at);
        qbuilder.push(" WHERE spotify_id IN (");
        let mut separated = qbuilder.separated(", ");
        for spotify_id in spotify_ids {
            separated.push_bind(spotify_id);
        }
        separated.push_unseparated(");");

        qbuilder
            .build()
            .execute(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(())
    }

    pub(super) async fn mark_indexed<'e, E>(
        &self,
        executor: E,
        spotify_ids: &[String],
        at: NaiveDateTime,
    ) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if spotify_ids.is_empty() {
            return Ok(());
        }

        let mut qbuilder: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE tracks SET indexed_search_at = ");
        qbuilder.push_bind(at);
        qbuilder.push(" WHERE spotify_id IN (");
        let mut separated = qbuilder.separated(", ");
        for spotify_id in spotify_ids {
            separated.push_bind(spotify_id);
        }
        separated.push_unseparated(");");

        qbuilder
            .build()
            .execute(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(())
    }

    pub async fn by_id<'e, E>(&self, executor: E, spotify_id: &str) -> Result<Option<Track>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, DbTrack>(&format!(
            "SELECT {SELECT_COLUMNS} FROM tracks WHERE spotify_id = ? LIMIT 1;"
        ))
        .bind(spotify_id)
        .fetch_optional(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        Ok(row.map(Track::from))
    }

    pub async fn artist_ids_of<'e, E>(&self, executor: E, spotify_id: &str) -> Result<Vec<String>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, String>(
            "SELECT artist_spotify_id FROM track_artists WHERE track_spotify_id = ?;",
        )
        .bind(spotify_id)
        .fetch_all(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)
    }

    /// Excludes tracks whose analysis already succeeded or already failed;
    /// failure is terminal for the analysis phase.
    pub async fn to_fetch_analysis<'e, E>(&self, executor: E, limit: i64) -> Result<Vec<String>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, String>(
            "SELECT spotify_id FROM tracks
            WHERE fetched_analysis_at IS NULL AND failed_analysis_at IS NULL
            LIMIT ?;",
        )
        .bind(limit)
        .fetch_all(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)
    }

    pub async fn ids_to_index<'e, E>(&self, executor: E, limit: i64) -> Result<Vec<String>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, String>(
            "SELECT spotify_id FROM tracks WHERE indexed_search_at IS NULL LIMIT ?;",
        )
        .bind(limit)
        .fetch_all(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)
    }

    /// One pass of the expanding-ε search: analysis-complete tracks whose
    /// every queried axis is within ±ε of the input, ordered by squared
    /// Euclidean distance over those axes. Squared distance orders the same
    /// as distance, and keeps the expression inside stock SQLite arithmetic.
    pub async fn nearest_ids<'e, E>(
        &self,
        executor: E,
        input: &Vector,
        epsilon: f64,
        count: i64,
    ) -> Result<Vec<String>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let mut qbuilder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT spotify_id FROM tracks WHERE fetched_analysis_at IS NOT NULL",
        );

        for (axis, value) in input.iter() {
            let column = feature_column(axis)?;
            qbuilder.push(format!(" AND {column} BETWEEN "));
            qbuilder.push_bind(value - epsilon);
            qbuilder.push(" AND ");
            qbuilder.push_bind(value + epsilon);
        }

        qbuilder.push(" ORDER BY (");
        let mut first = true;
        for (axis, value) in input.iter() {
            let column = feature_column(axis)?;
            if !first {
                qbuilder.push(" + ");
            }
            first = false;
            qbuilder.push(format!("({column} - "));
            qbuilder.push_bind(value);
            qbuilder.push(format!(") * ({column} - "));
            qbuilder.push_bind(value);
            qbuilder.push(")");
        }
        qbuilder.push(") ASC LIMIT ");
        qbuilder.push_bind(count);
        qbuilder.push(";");

        let rows = qbuilder
            .build_query_scalar::<String>()
            .fetch_all(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(rows)
    }

    pub async fn count_known<'e, E>(&self, executor: E) -> Result<i64, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>("SELECT count(*) FROM tracks;")
            .fetch_one(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)
    }

    pub async fn count_with_fetched_analysis<'e, E>(&self, executor: E) -> Result<i64, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM tracks WHERE fetched_analysis_at IS NOT NULL;",
        )
        .fetch_one(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)
    }

    pub async fn count_indexed<'e, E>(&self, executor: E) -> Result<i64, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM tracks WHERE indexed_search_at IS NOT NULL;",
        )
        .fetch_one(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Artist;
    use crate::repository::test_helpers::{prepare_store, TestSetupError};

    fn track(id: &str) -> Track {
        Track {
            spotify_id: id.into(),
            name: format!("track {id}"),
            popularity: 10,
            album_spotify_id: "album-1".into(),
            album_name: "First Pressing".into(),
            disc_number: 1,
            track_number: 1,
            artists: vec![Artist::stub("artist-1", "The Testers")],
            ..Track::default()
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_and_creates_stubs() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;
        let ctx = CancellationToken::new();

        store.insert_track(&ctx, &track("track-1")).await?;
        store.insert_track(&ctx, &track("track-1")).await?;

        let repo = SqliteTracksRepository::new();
        assert_eq!(repo.count_known(store.read_pool()).await?, 1);

        // album stub and artist stub both landed
        assert_eq!(store.get_albums_to_fetch_tracks(10).await?, vec!["album-1"]);
        assert_eq!(store.get_artists_to_fetch_tracks(10).await?, vec!["artist-1"]);
        assert_eq!(
            repo.artist_ids_of(store.read_pool(), "track-1").await?,
            vec!["artist-1"]
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_analysis_is_update_only() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;
        let ctx = CancellationToken::new();

        let mut analyzed = track("track-1");
        analyzed.energy = 0.9;
        analyzed.tempo = 120.0;

        // no insert has happened: nothing to update, nothing created
        store.add_track_analysis(&analyzed).await?;
        let repo = SqliteTracksRepository::new();
        assert_eq!(repo.count_known(store.read_pool()).await?, 0);

        store.insert_track(&ctx, &track("track-1")).await?;
        store.add_track_analysis(&analyzed).await?;

        let fetched = repo.by_id(store.read_pool(), "track-1").await?.unwrap();
        assert!(fetched.fetched_analysis_at.is_some());
        assert_eq!(fetched.energy, 0.9);
        assert_eq!(fetched.tempo, 120.0);
        assert_eq!(fetched.vector().get("energy"), Some(0.9));

        Ok(())
    }

    #[tokio::test]
    async fn test_analysis_queue_excludes_failed_and_fetched() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;
        let ctx = CancellationToken::new();

        store.insert_track(&ctx, &track("track-1")).await?;
        store.insert_track(&ctx, &track("track-2")).await?;
        store.insert_track(&ctx, &track("track-3")).await?;

        store.add_track_analysis(&track("track-1")).await?;
        store.mark_track_analysis_failed(&["track-2".into()]).await?;

        assert_eq!(
            store.get_tracks_to_fetch_analysis(10).await?,
            vec!["track-3"]
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_nearest_ids_orders_by_distance() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;
        let ctx = CancellationToken::new();

        for (id, energy) in [("track-1", 0.1), ("track-2", 0.5), ("track-3", 0.55)] {
            store.insert_track(&ctx, &track(id)).await?;
            let mut analyzed = track(id);
            analyzed.energy = energy;
            store.add_track_analysis(&analyzed).await?;
        }

        let repo = SqliteTracksRepository::new();
        let input = Vector::from([("energy", 0.5)]);

        let ids = repo.nearest_ids(store.read_pool(), &input, 0.1, 2).await?;
        assert_eq!(ids, vec!["track-2", "track-3"]);

        // a tight epsilon excludes the far track entirely
        let ids = repo.nearest_ids(store.read_pool(), &input, 0.01, 3).await?;
        assert_eq!(ids, vec!["track-2"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_nearest_ids_rejects_unknown_axis() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;

        let repo = SqliteTracksRepository::new();
        let input = Vector::from([("loudness; DROP TABLE tracks", 0.5)]);

        let result = repo.nearest_ids(store.read_pool(), &input, 0.1, 1).await;
        assert!(matches!(result, Err(RepositoryError::UnknownAxis(_))));

        Ok(())
    }
}
