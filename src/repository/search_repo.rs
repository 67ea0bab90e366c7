use sqlx::{Executor, QueryBuilder, Sqlite};

use crate::domain::Track;
use super::RepositoryError;

/// Full-text view over concatenated track, album, and artist names.
pub struct SqliteSearchRepository;

impl SqliteSearchRepository {
    pub fn new() -> Self {
        Self {}
    }

    /// The string the full-text index stores for a track: track name, album
    /// name, then each artist name, newline-joined.
    pub fn content_for(track: &Track) -> String {
        let mut content = vec![track.name.as_str(), track.album_name.as_str()];
        for artist in &track.artists {
            content.push(artist.name.as_str());
        }
        content.join("\n")
    }

    pub async fn insert_all<'e, E>(&self, executor: E, tracks: &[Track]) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if tracks.is_empty() {
            return Ok(());
        }

        let mut qbuilder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO tracks_search(track_spotify_id, content) ");
        qbuilder.push_values(tracks.iter(), |mut b, track| {
            b.push_bind(&track.spotify_id)
                .push_bind(Self::content_for(track));
        });

        qbuilder
            .build()
            .execute(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(())
    }

    pub async fn matching_ids<'e, E>(
        &self,
        executor: E,
        query: &str,
        limit: i64,
    ) -> Result<Vec<String>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, String>(
            "SELECT track_spotify_id FROM tracks_search
            WHERE content MATCH ?
            ORDER BY rank
            LIMIT ?;",
        )
        .bind(query)
        .bind(limit)
        .fetch_all(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)
    }
}
