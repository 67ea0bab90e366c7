use std::collections::HashMap;

use chrono::Local;
use tokio_util::sync::CancellationToken;

use crate::domain::{Artist, Track, Vector};
use super::{check_canceled, RepositoryError, Store};

/// Once ε is past this the bounding box covers the whole `[0, 1]` axis range
/// from any center, so further doubling cannot surface new rows.
const MAX_EPSILON: f64 = 2.0;

impl Store {
    /// The track with its artists (each carrying their genres) hydrated.
    pub async fn get_track(
        &self,
        ctx: &CancellationToken,
        spotify_id: &str,
    ) -> Result<Track, RepositoryError> {
        let mut track = self
            .tracks_repo()
            .by_id(self.read_pool(), spotify_id)
            .await?
            .ok_or_else(|| RepositoryError::TrackNotFound(spotify_id.to_string()))?;

        check_canceled(ctx)?;

        let artist_ids = self
            .tracks_repo()
            .artist_ids_of(self.read_pool(), spotify_id)
            .await?;

        let mut artist_cache: HashMap<String, Artist> = HashMap::new();
        for artist_id in artist_ids {
            check_canceled(ctx)?;

            if let Some(artist) = artist_cache.get(&artist_id) {
                track.artists.push(artist.clone());
                continue;
            }
            let artist = self.get_artist(&artist_id).await?;
            artist_cache.insert(artist_id, artist.clone());
            track.artists.push(artist);
        }

        Ok(track)
    }

    /// The artist with its genre names hydrated.
    pub async fn get_artist(&self, spotify_id: &str) -> Result<Artist, RepositoryError> {
        let mut artist = self
            .artists_repo()
            .by_id(self.read_pool(), spotify_id)
            .await?
            .ok_or(RepositoryError::RowNotFound)?;

        artist.genres = self
            .artists_repo()
            .genres_of(self.read_pool(), spotify_id)
            .await?;

        Ok(artist)
    }

    /// Full-text search over the materialized track/album/artist-name view.
    pub async fn search(
        &self,
        ctx: &CancellationToken,
        query: &str,
        limit: i64,
    ) -> Result<Vec<Track>, RepositoryError> {
        let ids = self
            .search_repo()
            .matching_ids(self.read_pool(), query, limit)
            .await?;

        let mut tracks = Vec::with_capacity(ids.len());
        for id in ids {
            check_canceled(ctx)?;
            tracks.push(self.get_track(ctx, &id).await?);
        }
        Ok(tracks)
    }

    /// Expanding-ε k-nearest search.
    ///
    /// Starts with ε = 0.01 and doubles until the bounding-box prefilter
    /// admits `count` rows. The doubling bounds the number of passes while
    /// keeping the prefilter selective enough that the distance sort stays
    /// cheap. When fewer than `count` analysis-complete tracks exist at all,
    /// the loop stops once ε covers the whole axis range.
    pub async fn nearest_tracks(
        &self,
        ctx: &CancellationToken,
        count: i64,
        input: &Vector,
    ) -> Result<Vec<Track>, RepositoryError> {
        let mut epsilon = 0.01;
        let ids = loop {
            check_canceled(ctx)?;

            let ids = self
                .tracks_repo()
                .nearest_ids(self.read_pool(), input, epsilon, count)
                .await?;

            if ids.len() as i64 == count || epsilon > MAX_EPSILON {
                break ids;
            }
            epsilon *= 2.0;
        };

        let mut tracks = Vec::with_capacity(ids.len());
        for id in ids {
            check_canceled(ctx)?;
            tracks.push(self.get_track(ctx, &id).await?);
        }
        Ok(tracks)
    }

    /// Resolves user input to a track: `q:<query>` searches and takes the
    /// top hit, `id:<id>` and bare input look up by id.
    pub async fn resolve(
        &self,
        ctx: &CancellationToken,
        input: &str,
    ) -> Result<Track, RepositoryError> {
        let Some((cmd, arg)) = input.split_once(':') else {
            return self.get_track(ctx, input).await;
        };

        match cmd {
            "q" => {
                let tracks = self.search(ctx, arg, 1).await?;
                tracks
                    .into_iter()
                    .next()
                    .ok_or_else(|| RepositoryError::TrackNotFound(arg.to_string()))
            }
            "id" => self.get_track(ctx, arg).await,
            other => Err(RepositoryError::UnknownResolveCommand(other.to_string())),
        }
    }

    /// Tracks still missing from the search view, artists hydrated so the
    /// indexer can materialize their content strings.
    pub async fn get_tracks_to_index(
        &self,
        ctx: &CancellationToken,
        limit: i64,
    ) -> Result<Vec<Track>, RepositoryError> {
        let ids = self
            .tracks_repo()
            .ids_to_index(self.read_pool(), limit)
            .await?;

        let mut tracks = Vec::with_capacity(ids.len());
        for id in ids {
            check_canceled(ctx)?;
            tracks.push(self.get_track(ctx, &id).await?);
        }
        Ok(tracks)
    }

    /// Writes the batch into the search view and stamps `indexed_search_at`,
    /// all in one transaction.
    pub async fn index_tracks(
        &self,
        ctx: &CancellationToken,
        tracks: &[Track],
    ) -> Result<(), RepositoryError> {
        let ids: Vec<String> = tracks.iter().map(|track| track.spotify_id.clone()).collect();

        let _guard = self.write_lock.lock().await;
        let mut tx = self.rw.begin().await?;

        self.search.insert_all(&mut *tx, tracks).await?;
        check_canceled(ctx)?;
        self.tracks
            .mark_indexed(&mut *tx, &ids, Local::now().naive_local())
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_helpers::{prepare_store, TestSetupError};

    async fn seed_track(
        store: &Store,
        ctx: &CancellationToken,
        id: &str,
        name: &str,
        energy: f64,
    ) -> Result<(), TestSetupError> {
        let track = Track {
            spotify_id: id.into(),
            name: name.into(),
            album_spotify_id: "album-1".into(),
            album_name: "First Pressing".into(),
            artists: vec![Artist::stub("artist-1", "The Testers")],
            ..Track::default()
        };
        store.insert_track(ctx, &track).await?;

        let mut analyzed = track.clone();
        analyzed.energy = energy;
        analyzed.valence = 0.5;
        store.add_track_analysis(&analyzed).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_index_then_search_then_resolve() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;
        let ctx = CancellationToken::new();

        seed_track(&store, &ctx, "track-1", "Blue Monday", 0.8).await?;
        seed_track(&store, &ctx, "track-2", "Sunday Morning", 0.2).await?;

        let todo = store.get_tracks_to_index(&ctx, 10).await?;
        assert_eq!(todo.len(), 2);
        store.index_tracks(&ctx, &todo).await?;

        // indexing is monotonic: nothing left to do
        assert!(store.get_tracks_to_index(&ctx, 10).await?.is_empty());

        let hits = store.search(&ctx, "monday", 5).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].spotify_id, "track-1");
        assert_eq!(hits[0].artists.len(), 1);
        assert_eq!(hits[0].artists[0].name, "The Testers");

        let resolved = store.resolve(&ctx, "q:monday").await?;
        assert_eq!(resolved.spotify_id, "track-1");

        let resolved = store.resolve(&ctx, "id:track-2").await?;
        assert_eq!(resolved.spotify_id, "track-2");

        let resolved = store.resolve(&ctx, "track-2").await?;
        assert_eq!(resolved.spotify_id, "track-2");

        let err = store.resolve(&ctx, "nope:track-2").await;
        assert!(matches!(err, Err(RepositoryError::UnknownResolveCommand(_))));

        Ok(())
    }

    #[tokio::test]
    async fn test_nearest_tracks_expands_epsilon() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;
        let ctx = CancellationToken::new();

        // far enough from the probe that the initial ε misses them all
        seed_track(&store, &ctx, "track-1", "one", 0.9).await?;
        seed_track(&store, &ctx, "track-2", "two", 0.85).await?;

        let input = Vector::from([("energy", 0.1)]);
        let tracks = store.nearest_tracks(&ctx, 2, &input).await?;
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].spotify_id, "track-2");

        Ok(())
    }

    #[tokio::test]
    async fn test_path_interpolation_walks_monotonically() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;
        let ctx = CancellationToken::new();

        // a ladder of tracks along the energy axis
        for (i, energy) in [0.1, 0.3, 0.5, 0.7, 0.9].iter().enumerate() {
            seed_track(&store, &ctx, &format!("track-{i}"), &format!("rung {i}"), *energy).await?;
        }

        let from = store.resolve(&ctx, "id:track-0").await?;
        let to = store.resolve(&ctx, "id:track-4").await?;

        let from_vector = from.vector();
        let delta = from_vector.delta(&to.vector());
        let points = from_vector.path(&delta, 4);
        assert_eq!(points.len(), 4);

        let mut last_energy = from.energy;
        for point in &points {
            let nearest = store.nearest_tracks(&ctx, 1, point).await?;
            assert_eq!(nearest.len(), 1);
            assert!(nearest[0].energy >= last_energy);
            last_energy = nearest[0].energy;
        }

        // the final step lands on the destination track
        let nearest = store.nearest_tracks(&ctx, 1, points.last().unwrap()).await?;
        assert_eq!(nearest[0].spotify_id, "track-4");

        Ok(())
    }

    #[tokio::test]
    async fn test_nearest_tracks_terminates_with_sparse_store() -> Result<(), TestSetupError> {
        let (store, _dir) = prepare_store().await?;
        let ctx = CancellationToken::new();

        seed_track(&store, &ctx, "track-1", "only", 0.5).await?;

        // asking for more neighbors than exist must not loop forever
        let input = Vector::from([("energy", 0.5)]);
        let tracks = store.nearest_tracks(&ctx, 5, &input).await?;
        assert_eq!(tracks.len(), 1);

        Ok(())
    }
}
