use chrono::NaiveDateTime;
use sqlx::{Executor, FromRow, QueryBuilder, Row, Sqlite, SqliteConnection};
use tokio_util::sync::CancellationToken;

use crate::domain::Artist;
use super::{check_canceled, RepositoryError};

#[derive(FromRow)]
struct DbArtist {
    spotify_id: String,
    name: String,
    image_url: String,
    followers: i64,
    popularity: i64,
    fetched_tracks_at: Option<NaiveDateTime>,
    failed_tracks_at: Option<NaiveDateTime>,
    fetched_albums_at: Option<NaiveDateTime>,
    failed_albums_at: Option<NaiveDateTime>,
}

impl From<DbArtist> for Artist {
    fn from(row: DbArtist) -> Self {
        Self {
            spotify_id: row.spotify_id,
            name: row.name,
            image_url: row.image_url,
            followers: row.followers,
            popularity: row.popularity,
            genres: Vec::new(),
            fetched_tracks_at: row.fetched_tracks_at,
            failed_tracks_at: row.failed_tracks_at,
            fetched_albums_at: row.fetched_albums_at,
            failed_albums_at: row.failed_albums_at,
        }
    }
}

const SELECT_COLUMNS: &str = "spotify_id, name, image_url, followers, popularity,
    fetched_tracks_at, failed_tracks_at, fetched_albums_at, failed_albums_at";

pub struct SqliteArtistsRepository;

impl SqliteArtistsRepository {
    pub fn new() -> Self {
        Self {}
    }

    /// Inserts the artist row, its bounding box over its genres in the five
    /// normalized genre dimensions, and one `artist_genres` row per genre.
    /// The caller supplies the transaction; everything lands or nothing does.
    pub async fn insert_full(
        &self,
        conn: &mut SqliteConnection,
        ctx: &CancellationToken,
        artist: &Artist,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO artists(spotify_id, name, image_url, followers, popularity)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (spotify_id) DO NOTHING;",
        )
        .bind(&artist.spotify_id)
        .bind(&artist.name)
        .bind(&artist.image_url)
        .bind(artist.followers)
        .bind(artist.popularity)
        .execute(&mut *conn)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        check_canceled(ctx)?;

        if !artist.genres.is_empty() {
            self.index_genre_bounds(&mut *conn, artist).await?;
            check_canceled(ctx)?;
        }

        for genre in &artist.genres {
            check_canceled(ctx)?;

            sqlx::query(
                "INSERT INTO artist_genres(artist_spotify_id, genre_name)
                VALUES (?, ?)
                ON CONFLICT (artist_spotify_id, genre_name) DO NOTHING;",
            )
            .bind(&artist.spotify_id)
            .bind(genre)
            .execute(&mut *conn)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;
        }

        Ok(())
    }

    /// Computes the artist's min/max bounds across its genres' five channels
    /// and stores them in the rtree, keyed by the artist row's rowid.
    async fn index_genre_bounds(
        &self,
        conn: &mut SqliteConnection,
        artist: &Artist,
    ) -> Result<(), RepositoryError> {
        let rowid = sqlx::query_scalar::<_, i64>(
            "SELECT rowid FROM artists WHERE spotify_id = ?;",
        )
        .bind(&artist.spotify_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        let mut qbuilder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT min(energy), max(energy),
                min(dynamic_variation), max(dynamic_variation),
                min(instrumentalness), max(instrumentalness),
                min(organicness), max(organicness),
                min(bounciness), max(bounciness)
            FROM genres WHERE name IN (",
        );
        let mut separated = qbuilder.separated(", ");
        for genre in &artist.genres {
            separated.push_bind(genre);
        }
        separated.push_unseparated(");");

        let row = qbuilder
            .build()
            .fetch_one(&mut *conn)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        let mut bounds = [0.0_f64; 10];
        for (i, bound) in bounds.iter_mut().enumerate() {
            *bound = row
                .try_get::<Option<f64>, _>(i)
                .map_err(RepositoryError::from_sqlx_error)?
                .unwrap_or(0.0);
        }

        let mut insert: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT OR IGNORE INTO artists_rtree VALUES (");
        let mut separated = insert.separated(", ");
        separated.push_bind(rowid);
        for bound in bounds {
            separated.push_bind(bound);
        }
        separated.push_unseparated(");");

        insert
            .build()
            .execute(&mut *conn)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(())
    }

    pub async fn by_id<'e, E>(&self, executor: E, spotify_id: &str) -> Result<Option<Artist>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, DbArtist>(&format!(
            "SELECT {SELECT_COLUMNS} FROM artists WHERE spotify_id = ? LIMIT 1;"
        ))
        .bind(spotify_id)
        .fetch_optional(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        Ok(row.map(Artist::from))
    }

    pub async fn genres_of<'e, E>(&self, executor: E, spotify_id: &str) -> Result<Vec<String>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, String>(
            "SELECT genre_name FROM artist_genres WHERE artist_spotify_id = ?;",
        )
        .bind(spotify_id)
        .fetch_all(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)
    }

    pub(super) async fn mark<'e, E>(
        &self,
        executor: E,
        spotify_id: &str,
        column: &'static str,
        at: NaiveDateTime,
    ) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(&format!("UPDATE artists SET {column} = ? WHERE spotify_id = ?;"))
            .bind(at)
            .bind(spotify_id)
            .execute(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(())
    }

    pub async fn to_fetch_tracks<'e, E>(&self, executor: E, limit: i64) -> Result<Vec<String>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, String>(
            "SELECT spotify_id FROM artists
            WHERE fetched_tracks_at IS NULL AND failed_tracks_at IS NULL
            LIMIT ?;",
        )
        .bind(limit)
        .fetch_all(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)
    }

    pub async fn to_fetch_albums<'e, E>(&self, executor: E, limit: i64) -> Result<Vec<String>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, String>(
            "SELECT spotify_id FROM artists
            WHERE fetched_albums_at IS NULL AND failed_albums_at IS NULL
            LIMIT ?;",
        )
        .bind(limit)
        .fetch_all(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)
    }

    pub async fn count_known<'e, E>(&self, executor: E) -> Result<i64, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>("SELECT count(*) FROM artists;")
            .fetch_one(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)
    }

    pub async fn count_with_fetched_tracks<'e, E>(&self, executor: E) -> Result<i64, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM artists WHERE fetched_tracks_at IS NOT NULL;",
        )
        .fetch_one(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)
    }

    pub async fn count_with_fetched_albums<'e, E>(&self, executor: E) -> Result<i64, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM artists WHERE fetched_albums_at IS NOT NULL;",
        )
        .fetch_one(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)
    }

    pub async fn count_done<'e, E>(&self, executor: E) -> Result<i64, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM artists
            WHERE fetched_tracks_at IS NOT NULL AND fetched_albums_at IS NOT NULL;",
        )
        .fetch_one(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)
    }
}
