use tokio_util::sync::CancellationToken;

use super::{check_canceled, RepositoryError, Store};

/// A snapshot of how far the pipeline has gotten, read entirely off the
/// read-only handle. Consumed by the reporter worker and the progress
/// command.
#[derive(Debug, Default, Clone, Copy)]
pub struct Progress {
    pub genres_known: i64,
    pub genres_with_fetched_artists: i64,

    pub artists_known: i64,
    pub artists_with_fetched_tracks: i64,
    pub artists_with_fetched_albums: i64,
    pub artists_done: i64,

    pub albums_known: i64,
    pub albums_with_fetched_tracks: i64,

    pub tracks_known: i64,
    pub tracks_with_fetched_analysis: i64,
    pub tracks_indexed: i64,
}

impl Store {
    pub async fn progress(&self, ctx: &CancellationToken) -> Result<Progress, RepositoryError> {
        let mut progress = Progress::default();

        progress.genres_known = self.genres_repo().count_known(self.read_pool()).await?;
        check_canceled(ctx)?;
        progress.genres_with_fetched_artists = self
            .genres_repo()
            .count_with_fetched_artists(self.read_pool())
            .await?;
        check_canceled(ctx)?;

        progress.artists_known = self.artists_repo().count_known(self.read_pool()).await?;
        check_canceled(ctx)?;
        progress.artists_with_fetched_tracks = self
            .artists_repo()
            .count_with_fetched_tracks(self.read_pool())
            .await?;
        check_canceled(ctx)?;
        progress.artists_with_fetched_albums = self
            .artists_repo()
            .count_with_fetched_albums(self.read_pool())
            .await?;
        check_canceled(ctx)?;
        progress.artists_done = self.artists_repo().count_done(self.read_pool()).await?;
        check_canceled(ctx)?;

        progress.albums_known = self.albums_repo().count_known(self.read_pool()).await?;
        check_canceled(ctx)?;
        progress.albums_with_fetched_tracks = self
            .albums_repo()
            .count_with_fetched_tracks(self.read_pool())
            .await?;
        check_canceled(ctx)?;

        progress.tracks_known = self.tracks_repo().count_known(self.read_pool()).await?;
        check_canceled(ctx)?;
        progress.tracks_with_fetched_analysis = self
            .tracks_repo()
            .count_with_fetched_analysis(self.read_pool())
            .await?;
        check_canceled(ctx)?;
        progress.tracks_indexed = self.tracks_repo().count_indexed(self.read_pool()).await?;

        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use crate::domain::{Artist, Genre, Track};
    use crate::repository::test_helpers::{prepare_store, TestSetupError};

    #[tokio::test]
    async fn test_progress_counts() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;
        let ctx = CancellationToken::new();

        store
            .insert_genre(&Genre {
                name: "pop".into(),
                ..Genre::default()
            })
            .await?;
        store
            .insert_artist(&ctx, &Artist::stub("artist-1", "The Testers"))
            .await?;
        store
            .insert_track(
                &ctx,
                &Track {
                    spotify_id: "track-1".into(),
                    name: "Opener".into(),
                    album_spotify_id: "album-1".into(),
                    album_name: "First Pressing".into(),
                    ..Track::default()
                },
            )
            .await?;

        store.mark_genre_fetched("pop").await?;
        store.mark_artist_fetched("artist-1").await?;

        let progress = store.progress(&ctx).await?;
        assert_eq!(progress.genres_known, 1);
        assert_eq!(progress.genres_with_fetched_artists, 1);
        assert_eq!(progress.artists_known, 1);
        assert_eq!(progress.artists_with_fetched_tracks, 1);
        assert_eq!(progress.artists_with_fetched_albums, 0);
        assert_eq!(progress.artists_done, 0);
        assert_eq!(progress.albums_known, 1);
        assert_eq!(progress.tracks_known, 1);
        assert_eq!(progress.tracks_with_fetched_analysis, 0);
        assert_eq!(progress.tracks_indexed, 0);

        Ok(())
    }
}
