use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::catalog::SpotifyClient;
use crate::repository::Store;
use crate::seed;
use super::WorkerError;

/// Albums are fetched in batches of exactly 20 (the batch endpoint's cap);
/// analyses in batches of exactly 100. A worker whose predicate cannot fill
/// its batch retires instead of issuing an inefficient small request; the
/// scheduler revives it once enough upstream work has piled up.
pub(crate) const ALBUM_BATCH: i64 = 20;
pub(crate) const ANALYSIS_BATCH: i64 = 100;

fn checkpoint(ctx: &CancellationToken, what: &str) -> Result<(), WorkerError> {
    if ctx.is_cancelled() {
        return Err(WorkerError::Canceled(what.to_string()));
    }
    Ok(())
}

async fn emit(events: &mpsc::Sender<()>) {
    // the dispatcher going away just means nobody is listening anymore
    let _ = events.send(()).await;
}

/// Seeds the genres table from the external visualization, then retires.
pub(crate) async fn run_genres_fetcher(
    ctx: CancellationToken,
    store: Arc<Store>,
    seed_url: String,
    events: mpsc::Sender<()>,
) -> Result<(), WorkerError> {
    let genres = seed::all_genres(&seed_url).await?;
    if genres.is_empty() {
        return Ok(());
    }

    for genre in &genres {
        checkpoint(&ctx, "genre seed insert")?;
        store.insert_genre(genre).await?;
    }

    info!("[genres] seeded {} genres", genres.len());
    emit(&events).await;

    Ok(())
}

/// One genre at a time: search its artists, insert them, mark the genre.
pub(crate) async fn run_genre_artists_fetcher(
    ctx: CancellationToken,
    store: Arc<Store>,
    client: Arc<SpotifyClient>,
    events: mpsc::Sender<()>,
) -> Result<(), WorkerError> {
    loop {
        checkpoint(&ctx, "genre artists batch")?;

        let genres = store.get_genres_to_fetch_artists(1).await?;
        let Some(genre_name) = genres.into_iter().next() else {
            return Ok(());
        };

        let artists = match client.fetch_genre(&ctx, &genre_name).await {
            Ok(artists) => artists,
            Err(err) if err.is_upstream() => {
                warn!("[genre_artists] upstream failure for '{genre_name}': {err}");
                store.mark_genre_failed(&genre_name).await?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        if artists.is_empty() {
            warn!("[genre_artists] no artists for genre '{genre_name}'");
            store.mark_genre_failed(&genre_name).await?;
            continue;
        }

        for artist in &artists {
            checkpoint(&ctx, "genre artist insert")?;
            store.insert_artist(&ctx, artist).await?;
        }

        store.mark_genre_fetched(&genre_name).await?;
        info!("[genre_artists] fetched {} artists for genre {genre_name}", artists.len());

        emit(&events).await;
    }
}

/// One artist at a time: its top tracks, inserted with their album stubs so
/// downstream album workers see the work.
pub(crate) async fn run_artist_tracks_fetcher(
    ctx: CancellationToken,
    store: Arc<Store>,
    client: Arc<SpotifyClient>,
    events: mpsc::Sender<()>,
) -> Result<(), WorkerError> {
    loop {
        checkpoint(&ctx, "artist tracks batch")?;

        let artists = store.get_artists_to_fetch_tracks(1).await?;
        let Some(artist_id) = artists.into_iter().next() else {
            return Ok(());
        };

        let tracks = match client.fetch_artist_tracks(&ctx, &artist_id).await {
            Ok(tracks) => tracks,
            Err(err) if err.is_upstream() => {
                warn!("[artist_tracks] upstream failure for '{artist_id}': {err}");
                store.mark_artist_failed(&artist_id).await?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        if tracks.is_empty() {
            info!("[artist_tracks] no tracks for artist '{artist_id}'");
        }

        for track in &tracks {
            checkpoint(&ctx, "artist track insert")?;
            store.insert_track(&ctx, track).await?;
        }

        store.mark_artist_fetched(&artist_id).await?;
        info!("[artist_tracks] fetched {} tracks for artist {artist_id}", tracks.len());

        emit(&events).await;
    }
}

/// One artist at a time: its albums and singles, inserted as stubs for the
/// album_tracks worker to enrich.
pub(crate) async fn run_artist_albums_fetcher(
    ctx: CancellationToken,
    store: Arc<Store>,
    client: Arc<SpotifyClient>,
    events: mpsc::Sender<()>,
) -> Result<(), WorkerError> {
    loop {
        checkpoint(&ctx, "artist albums batch")?;

        let artists = store.get_artists_to_fetch_albums(1).await?;
        let Some(artist_id) = artists.into_iter().next() else {
            return Ok(());
        };

        let albums = match client.fetch_artist_albums(&ctx, &artist_id).await {
            Ok(albums) => albums,
            Err(err) if err.is_upstream() => {
                warn!("[artist_albums] upstream failure for '{artist_id}': {err}");
                store.mark_artist_albums_failed(&artist_id).await?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        for album in &albums {
            checkpoint(&ctx, "artist album insert")?;
            store.insert_album(&ctx, album).await?;
        }

        store.mark_artist_albums_fetched(&artist_id).await?;
        info!("[artist_albums] fetched {} albums for artist {artist_id}", albums.len());

        emit(&events).await;
    }
}

/// Exactly 20 albums per request. Retires on an underfull batch; the
/// scheduler retriggers it once upstream discovery fills the queue again.
pub(crate) async fn run_album_tracks_fetcher(
    ctx: CancellationToken,
    store: Arc<Store>,
    client: Arc<SpotifyClient>,
    events: mpsc::Sender<()>,
) -> Result<(), WorkerError> {
    loop {
        checkpoint(&ctx, "album tracks batch")?;

        let album_ids = store.get_albums_to_fetch_tracks(ALBUM_BATCH).await?;
        if album_ids.is_empty() || (album_ids.len() as i64) < ALBUM_BATCH {
            return Ok(());
        }

        let albums = match client.fetch_albums(&ctx, &album_ids).await {
            Ok(albums) => albums,
            Err(err) if err.is_upstream() => {
                warn!("[album_tracks] upstream failure for batch of {}: {err}", album_ids.len());
                store.mark_albums_tracks_failed(&album_ids).await?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let track_count: usize = albums.iter().map(|album| album.tracks.len()).sum();
        store.populate_albums(&ctx, &albums).await?;

        for album_id in &album_ids {
            checkpoint(&ctx, "album tracks mark")?;
            store.mark_album_tracks_fetched(album_id).await?;
        }

        info!("[album_tracks] fetched {track_count} tracks from {} albums", album_ids.len());

        emit(&events).await;
    }
}

/// Same shape as album_tracks, but over the refetch predicate: albums whose
/// first fetch was recorded but left no track rows behind.
pub(crate) async fn run_album_tracks_refetcher(
    ctx: CancellationToken,
    store: Arc<Store>,
    client: Arc<SpotifyClient>,
    events: mpsc::Sender<()>,
) -> Result<(), WorkerError> {
    loop {
        checkpoint(&ctx, "album tracks refetch batch")?;

        let album_ids = store.get_albums_to_refetch_tracks(ALBUM_BATCH).await?;
        if album_ids.is_empty() || (album_ids.len() as i64) < ALBUM_BATCH {
            return Ok(());
        }

        let albums = match client.fetch_albums(&ctx, &album_ids).await {
            Ok(albums) => albums,
            Err(err) if err.is_upstream() => {
                warn!("[album_tracks_refetch] failed to fetch {} albums: {err}", album_ids.len());
                store.mark_albums_tracks_failed(&album_ids).await?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        store.populate_albums(&ctx, &albums).await?;

        info!("[album_tracks_refetch] repopulated {} albums", albums.len());

        emit(&events).await;
    }
}

/// Exactly 100 analyses per request. Ids missing from the response are
/// marked failed; an entry that comes back with an empty id is upstream
/// corruption and panics after dumping the batch for post-mortem.
pub(crate) async fn run_track_analysis_fetcher(
    ctx: CancellationToken,
    store: Arc<Store>,
    client: Arc<SpotifyClient>,
    events: mpsc::Sender<()>,
) -> Result<(), WorkerError> {
    loop {
        checkpoint(&ctx, "track analysis batch")?;

        let track_ids = store.get_tracks_to_fetch_analysis(ANALYSIS_BATCH).await?;
        if track_ids.is_empty() || (track_ids.len() as i64) < ANALYSIS_BATCH {
            return Ok(());
        }

        let analyses = match client.fetch_track_analyses(&ctx, &track_ids).await {
            Ok(analyses) => analyses,
            Err(err) if err.is_upstream() => {
                warn!("[track_analysis] upstream failure for batch of {}: {err}", track_ids.len());
                store.mark_track_analysis_failed(&track_ids).await?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        if analyses.iter().any(|analysis| analysis.spotify_id.is_empty()) {
            let dump = serde_json::to_string(&analyses).unwrap_or_else(|err| err.to_string());
            panic!("track analysis entry with empty id; batch dump: {dump}");
        }

        if analyses.len() < track_ids.len() {
            let got: HashSet<&str> = analyses
                .iter()
                .map(|analysis| analysis.spotify_id.as_str())
                .collect();
            let failed: Vec<String> = track_ids
                .iter()
                .filter(|id| !got.contains(id.as_str()))
                .cloned()
                .collect();
            warn!("[track_analysis] {} of {} analyses missing", failed.len(), track_ids.len());
            store.mark_track_analysis_failed(&failed).await?;
        }

        for analysis in &analyses {
            checkpoint(&ctx, "track analysis insert")?;
            store.add_track_analysis(analysis).await?;
        }

        info!("[track_analysis] fetched {} track analyses", analyses.len());

        emit(&events).await;
    }
}

/// Pulls tracks missing from the search view, materializes their content
/// strings, writes the batch. No upstream call.
pub(crate) async fn run_indexer(
    ctx: CancellationToken,
    store: Arc<Store>,
    batch_size: i64,
    events: mpsc::Sender<()>,
) -> Result<(), WorkerError> {
    loop {
        checkpoint(&ctx, "indexer batch")?;

        let todo = store.get_tracks_to_index(&ctx, batch_size).await?;
        if todo.is_empty() {
            return Ok(());
        }

        store.index_tracks(&ctx, &todo).await?;

        emit(&events).await;
    }
}

/// Never retires: writes a TSV row of progress counts on a fixed tick until
/// canceled.
pub(crate) async fn run_reporter(
    ctx: CancellationToken,
    store: Arc<Store>,
    log_path: PathBuf,
    interval: Duration,
    events: mpsc::Sender<()>,
) -> Result<(), WorkerError> {
    let mut logfile = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let mut tick = tokio::time::interval(interval);
    // the first tick of an interval is immediate; consume it so the loop
    // below writes once per period
    tick.tick().await;

    loop {
        let progress = store.progress(&ctx).await?;

        writeln!(
            logfile,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            progress.tracks_known,
            progress.tracks_with_fetched_analysis,
            progress.artists_known,
            progress.artists_done,
            progress.albums_known,
            progress.albums_with_fetched_tracks,
            progress.tracks_indexed,
            progress.artists_with_fetched_albums,
            progress.artists_with_fetched_tracks,
        )?;

        emit(&events).await;

        tokio::select! {
            _ = ctx.cancelled() => return Err(WorkerError::Canceled("reporter tick".into())),
            _ = tick.tick() => {}
        }
    }
}
