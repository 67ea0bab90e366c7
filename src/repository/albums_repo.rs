use chrono::NaiveDateTime;
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite, SqliteConnection};
use tokio_util::sync::CancellationToken;

use crate::domain::Album;
use super::{check_canceled, RepositoryError};

#[derive(FromRow)]
struct DbAlbum {
    spotify_id: String,
    name: String,
    album_type: String,
    image_url: String,
    total_tracks: i64,
    release_date: String,
    release_date_precision: String,
    popularity: i64,
    fetched_tracks_at: Option<NaiveDateTime>,
    failed_tracks_at: Option<NaiveDateTime>,
}

impl From<DbAlbum> for Album {
    fn from(row: DbAlbum) -> Self {
        Self {
            spotify_id: row.spotify_id,
            name: row.name,
            album_type: row.album_type,
            image_url: row.image_url,
            total_tracks: row.total_tracks,
            release_date: row.release_date,
            release_date_precision: row.release_date_precision,
            popularity: row.popularity,
            artists: Vec::new(),
            tracks: Vec::new(),
            fetched_tracks_at: row.fetched_tracks_at,
            failed_tracks_at: row.failed_tracks_at,
        }
    }
}

pub struct SqliteAlbumsRepository;

impl SqliteAlbumsRepository {
    pub fn new() -> Self {
        Self {}
    }

    /// Upserts the album and its artist associations. Albums update all
    /// descriptive columns on conflict because the full record only arrives
    /// on the later batched album fetch; the timestamp columns are left
    /// untouched.
    pub async fn upsert_full(
        &self,
        conn: &mut SqliteConnection,
        ctx: &CancellationToken,
        album: &Album,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO albums(spotify_id, name, album_type, image_url,
                total_tracks, release_date, release_date_precision, popularity)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (spotify_id) DO UPDATE SET
                name = excluded.name,
                album_type = excluded.album_type,
                image_url = excluded.image_url,
                total_tracks = excluded.total_tracks,
                release_date = excluded.release_date,
                release_date_precision = excluded.release_date_precision,
                popularity = excluded.popularity;",
        )
        .bind(&album.spotify_id)
        .bind(&album.name)
        .bind(&album.album_type)
        .bind(&album.image_url)
        .bind(album.total_tracks)
        .bind(&album.release_date)
        .bind(&album.release_date_precision)
        .bind(album.popularity)
        .execute(&mut *conn)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        for artist in &album.artists {
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
                "INSERT INTO album_artists(album_spotify_id, artist_spotify_id)
                VALUES (?, ?)
                ON CONFLICT (album_spotify_id, artist_spotify_id) DO NOTHING;",
            )
            .bind(&album.spotify_id)
            .bind(&artist.spotify_id)
            .execute(&mut *conn)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;
        }

        Ok(())
    }

    /// Inserts an identity-only stub so downstream workers see album work.
    /// Never overwrites an enriched record.
    pub async fn insert_stub<'e, E>(
        &self,
        executor: E,
        spotify_id: &str,
        name: &str,
    ) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT INTO albums(spotify_id, name)
            VALUES (?, ?)
            ON CONFLICT (spotify_id) DO NOTHING;",
        )
        .bind(spotify_id)
        .bind(name)
        .execute(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        Ok(())
    }

    pub async fn by_id<'e, E>(&self, executor: E, spotify_id: &str) -> Result<Option<Album>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, DbAlbum>(
            "SELECT spotify_id, name, album_type, image_url,
                total_tracks, release_date, release_date_precision, popularity,
                fetched_tracks_at, failed_tracks_at
            FROM albums
            WHERE spotify_id = ?
            LIMIT 1;",
        )
        .bind(spotify_id)
        .fetch_optional(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        Ok(row.map(Album::from))
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
        sqlx::query(&format!("UPDATE albums SET {column} = ? WHERE spotify_id = ?;"))
            .bind(at)
            .bind(spotify_id)
            .execute(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(())
    }

    pub(super) async fn mark_all<'e, E>(
        &self,
        executor: E,
        spotify_ids: &[String],
        column: &'static str,
        at: NaiveDateTime,
    ) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if spotify_ids.is_empty() {
            return Ok(());
        }

        let mut qbuilder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("UPDATE albums SET {column} = "));
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

    pub async fn to_fetch_tracks<'e, E>(&self, executor: E, limit: i64) -> Result<Vec<String>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, String>(
            "SELECT spotify_id FROM albums
            WHERE fetched_tracks_at IS NULL AND failed_tracks_at IS NULL
            LIMIT ?;",
        )
        .bind(limit)
        .fetch_all(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)
    }

    /// Albums whose first fetch was marked done but produced no track rows,
    /// even though the catalog claims the album has tracks. A first fetch
    /// that returned empty results is indistinguishable in the marked state
    /// from a fetch that returned zero legitimately, so these are refetched
    /// through the full-album endpoint.
    pub async fn to_refetch_tracks<'e, E>(&self, executor: E, limit: i64) -> Result<Vec<String>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, String>(
            "SELECT spotify_id FROM albums
            WHERE fetched_tracks_at IS NOT NULL
              AND failed_tracks_at IS NULL
              AND total_tracks > 0
              AND NOT EXISTS (
                  SELECT 1 FROM album_tracks
                  WHERE album_tracks.album_spotify_id = albums.spotify_id
              )
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
        sqlx::query_scalar::<_, i64>("SELECT count(*) FROM albums;")
            .fetch_one(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)
    }

    pub async fn count_with_fetched_tracks<'e, E>(&self, executor: E) -> Result<i64, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM albums WHERE fetched_tracks_at IS NOT NULL;",
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

    fn album() -> Album {
        Album {
            spotify_id: "album-1".into(),
            name: "First Pressing".into(),
            album_type: "album".into(),
            image_url: "https://images.example/album-1".into(),
            total_tracks: 10,
            release_date: "2001-04-01".into(),
            release_date_precision: "day".into(),
            popularity: 44,
            artists: vec![Artist::stub("artist-1", "The Testers")],
            ..Album::default()
        }
    }

    #[tokio::test]
    async fn test_upsert_enriches_stub() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;
        let ctx = CancellationToken::new();

        let repo = SqliteAlbumsRepository::new();

        // a track fetch saw the album first and left a stub behind
        store
            .insert_track(
                &ctx,
                &crate::domain::Track {
                    spotify_id: "track-1".into(),
                    name: "Opener".into(),
                    album_spotify_id: "album-1".into(),
                    album_name: "First Pressing".into(),
                    ..crate::domain::Track::default()
                },
            )
            .await?;

        let stub = repo.by_id(store.read_pool(), "album-1").await?.unwrap();
        assert_eq!(stub.total_tracks, 0);

        store.insert_album(&ctx, &album()).await?;

        let enriched = repo.by_id(store.read_pool(), "album-1").await?.unwrap();
        assert_eq!(enriched.total_tracks, 10);
        assert_eq!(enriched.release_date, "2001-04-01");

        Ok(())
    }

    #[tokio::test]
    async fn test_stub_does_not_clobber_enriched_record() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;
        let ctx = CancellationToken::new();

        let repo = SqliteAlbumsRepository::new();

        store.insert_album(&ctx, &album()).await?;

        // the stub path runs as part of track insertion
        store
            .insert_track(
                &ctx,
                &crate::domain::Track {
                    spotify_id: "track-1".into(),
                    name: "Opener".into(),
                    album_spotify_id: "album-1".into(),
                    album_name: "First Pressing".into(),
                    ..crate::domain::Track::default()
                },
            )
            .await?;

        let enriched = repo.by_id(store.read_pool(), "album-1").await?.unwrap();
        assert_eq!(enriched.total_tracks, 10);

        Ok(())
    }

    #[tokio::test]
    async fn test_refetch_predicate() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;
        let ctx = CancellationToken::new();

        store.insert_album(&ctx, &album()).await?;

        // unfetched albums are not refetch candidates
        assert!(store.get_albums_to_refetch_tracks(10).await?.is_empty());
        assert_eq!(store.get_albums_to_fetch_tracks(10).await?, vec!["album-1"]);

        // fetched, claims 10 tracks, but no album_tracks rows landed
        store.mark_album_tracks_fetched("album-1").await?;
        assert_eq!(store.get_albums_to_refetch_tracks(10).await?, vec!["album-1"]);

        // once a track is associated the album is no longer a candidate
        store
            .insert_track(
                &ctx,
                &crate::domain::Track {
                    spotify_id: "track-1".into(),
                    name: "Opener".into(),
                    album_spotify_id: "album-1".into(),
                    album_name: "First Pressing".into(),
                    ..crate::domain::Track::default()
                },
            )
            .await?;
        assert!(store.get_albums_to_refetch_tracks(10).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_mark_all_failed() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;
        let ctx = CancellationToken::new();

        let mut second = album();
        second.spotify_id = "album-2".into();

        store.insert_album(&ctx, &album()).await?;
        store.insert_album(&ctx, &second).await?;

        store
            .mark_albums_tracks_failed(&["album-1".into(), "album-2".into()])
            .await?;

        assert!(store.get_albums_to_fetch_tracks(10).await?.is_empty());

        Ok(())
    }
}
