use chrono::NaiveDateTime;
use sqlx::{Executor, FromRow, Sqlite};

use crate::domain::Genre;
use super::RepositoryError;

#[derive(FromRow)]
struct DbGenre {
    name: String,
    key: String,
    example: String,
    energy: f64,
    dynamic_variation: f64,
    instrumentalness: f64,
    organicness: f64,
    bounciness: f64,
    popularity: f64,
    fetched_artists_at: Option<NaiveDateTime>,
    failed_artists_at: Option<NaiveDateTime>,
}

impl From<DbGenre> for Genre {
    fn from(row: DbGenre) -> Self {
        Self {
            name: row.name,
            key: row.key,
            example: row.example,
            energy: row.energy,
            dynamic_variation: row.dynamic_variation,
            instrumentalness: row.instrumentalness,
            organicness: row.organicness,
            bounciness: row.bounciness,
            popularity: row.popularity,
            fetched_artists_at: row.fetched_artists_at,
            failed_artists_at: row.failed_artists_at,
        }
    }
}

pub struct SqliteGenresRepository;

impl SqliteGenresRepository {
    pub fn new() -> Self {
        Self {}
    }

    pub async fn insert<'e, E>(&self, executor: E, genre: &Genre) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT INTO genres(name, key, example,
                energy, dynamic_variation, instrumentalness,
                organicness, bounciness, popularity)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (name) DO NOTHING;",
        )
        .bind(&genre.name)
        .bind(&genre.key)
        .bind(&genre.example)
        .bind(genre.energy)
        .bind(genre.dynamic_variation)
        .bind(genre.instrumentalness)
        .bind(genre.organicness)
        .bind(genre.bounciness)
        .bind(genre.popularity)
        .execute(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        Ok(())
    }

    pub async fn by_name<'e, E>(&self, executor: E, name: &str) -> Result<Option<Genre>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, DbGenre>(
            "SELECT name, key, example,
                energy, dynamic_variation, instrumentalness,
                organicness, bounciness, popularity,
                fetched_artists_at, failed_artists_at
            FROM genres
            WHERE name = ?
            LIMIT 1;",
        )
        .bind(name)
        .fetch_optional(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)?;

        Ok(row.map(Genre::from))
    }

    pub(super) async fn mark<'e, E>(
        &self,
        executor: E,
        name: &str,
        column: &'static str,
        at: NaiveDateTime,
    ) -> Result<(), RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(&format!("UPDATE genres SET {column} = ? WHERE name = ?;"))
            .bind(at)
            .bind(name)
            .execute(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)?;

        Ok(())
    }

    pub async fn to_fetch_artists<'e, E>(&self, executor: E, limit: i64) -> Result<Vec<String>, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, String>(
            "SELECT name FROM genres
            WHERE fetched_artists_at IS NULL AND failed_artists_at IS NULL
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
        sqlx::query_scalar::<_, i64>("SELECT count(*) FROM genres;")
            .fetch_one(executor)
            .await
            .map_err(RepositoryError::from_sqlx_error)
    }

    pub async fn count_with_fetched_artists<'e, E>(&self, executor: E) -> Result<i64, RepositoryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM genres WHERE fetched_artists_at IS NOT NULL;",
        )
        .fetch_one(executor)
        .await
        .map_err(RepositoryError::from_sqlx_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_helpers::{prepare_store, TestSetupError};

    fn pop() -> Genre {
        Genre {
            name: "pop".into(),
            key: "3nzVSyaYk0KNrahyNQS0Ur".into(),
            example: "example track".into(),
            energy: 0.5,
            dynamic_variation: 0.25,
            instrumentalness: 0.1,
            organicness: 0.75,
            bounciness: 0.6,
            popularity: 0.99,
            ..Genre::default()
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;

        store.insert_genre(&pop()).await?;
        store.insert_genre(&pop()).await?;

        let repo = SqliteGenresRepository::new();
        assert_eq!(repo.count_known(store.read_pool()).await?, 1);

        let fetched = repo.by_name(store.read_pool(), "pop").await?.unwrap();
        assert_eq!(fetched.energy, 0.5);
        assert!(fetched.fetched_artists_at.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_empty_name_fails_validation() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;

        let mut genre = pop();
        genre.name = String::new();

        let result = store.insert_genre(&genre).await;
        assert!(matches!(result, Err(RepositoryError::Validation(_))));

        let repo = SqliteGenresRepository::new();
        assert_eq!(repo.count_known(store.read_pool()).await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_marking_fetched_is_monotonic() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;

        store.insert_genre(&pop()).await?;
        assert_eq!(store.get_genres_to_fetch_artists(10).await?, vec!["pop"]);

        store.mark_genre_fetched("pop").await?;
        assert!(store.get_genres_to_fetch_artists(10).await?.is_empty());

        // a repeated seed insert does not resurrect the work item
        store.insert_genre(&pop()).await?;
        assert!(store.get_genres_to_fetch_artists(10).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_failed_genres_leave_the_queue() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;

        store.insert_genre(&pop()).await?;
        store.mark_genre_failed("pop").await?;
        assert!(store.get_genres_to_fetch_artists(10).await?.is_empty());

        Ok(())
    }
}
