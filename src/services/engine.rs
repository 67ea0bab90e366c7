use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::catalog::SpotifyClient;
use crate::repository::Store;
use super::{workers, WorkerError, WorkerKind};

type WorkerFuture = BoxFuture<'static, Result<(), WorkerError>>;
type WorkerFactory =
    Arc<dyn Fn(CancellationToken, mpsc::Sender<()>) -> WorkerFuture + Send + Sync>;

struct WorkerSlot {
    factory: WorkerFactory,
    is_running: bool,
}

struct BatchReport {
    name: &'static str,
    duration: Duration,
}

/// The scheduler: owns a name-keyed map of workers, launches them all
/// concurrently, routes per-batch completion events, and retriggers
/// downstream workers that may have retired while upstream work was still
/// landing.
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    workers: Mutex<HashMap<&'static str, WorkerSlot>>,
    first_error: Mutex<Option<WorkerError>>,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EngineInner {
                workers: Mutex::new(HashMap::new()),
                first_error: Mutex::new(None),
            }),
        }
    }

    pub fn add<F>(&self, name: &'static str, factory: F)
    where
        F: Fn(CancellationToken, mpsc::Sender<()>) -> WorkerFuture + Send + Sync + 'static,
    {
        self.inner.workers.lock().unwrap().insert(
            name,
            WorkerSlot {
                factory: Arc::new(factory),
                is_running: false,
            },
        );
    }

    /// Runs every registered worker to completion.
    ///
    /// The first worker to fail with a real error cancels the shared
    /// context; the rest observe it at their next checkpoint and drain. That
    /// first error is returned. Retirement and cancellation are not errors.
    pub async fn run(&self, parent: &CancellationToken) -> Result<(), WorkerError> {
        let ctx = parent.child_token();
        let tracker = TaskTracker::new();
        let (events_tx, mut events_rx) = mpsc::channel::<BatchReport>(64);

        let names: Vec<&'static str> = self.inner.workers.lock().unwrap().keys().copied().collect();
        for name in names {
            self.inner.launch(name, &ctx, &tracker, &events_tx);
        }
        tracker.close();

        let wait = tracker.wait();
        tokio::pin!(wait);

        // dispatcher: route batch-completion events to their retrigger
        // targets until every worker (reporter included) has exited. Biased
        // toward events so a queued completion retriggers its target before
        // the drained tracker can end the run.
        loop {
            tokio::select! {
                biased;
                Some(report) = events_rx.recv() => {
                    debug!("batch ({:?}):\t{}", report.duration, report.name);
                    let downstream = match report.name {
                        "genres" => "genre_artists",
                        "artist_tracks" => "track_analysis",
                        "artist_albums" => "album_tracks",
                        "album_tracks" => "track_analysis",
                        "track_analysis" => "indexer",
                        _ => continue,
                    };
                    self.inner.retrigger(downstream, &ctx, &tracker, &events_tx);
                }
                _ = &mut wait => break,
            }
        }

        if let Some(err) = self.inner.first_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(())
    }

    #[cfg(test)]
    fn is_running(&self, name: &str) -> bool {
        self.inner
            .workers
            .lock()
            .unwrap()
            .get(name)
            .map(|slot| slot.is_running)
            .unwrap_or(false)
    }
}

impl EngineInner {
    /// Relaunches a retired worker. A no-op when the worker is still running
    /// or was never registered, which makes duplicate retriggers harmless.
    fn retrigger(
        self: &Arc<Self>,
        name: &'static str,
        ctx: &CancellationToken,
        tracker: &TaskTracker,
        events_tx: &mpsc::Sender<BatchReport>,
    ) {
        {
            let workers = self.workers.lock().unwrap();
            match workers.get(name) {
                Some(slot) if slot.is_running => return,
                Some(_) => {}
                None => return,
            }
        }

        self.launch(name, ctx, tracker, events_tx);
    }

    fn launch(
        self: &Arc<Self>,
        name: &'static str,
        ctx: &CancellationToken,
        tracker: &TaskTracker,
        events_tx: &mpsc::Sender<BatchReport>,
    ) {
        let factory = {
            let mut workers = self.workers.lock().unwrap();
            let Some(slot) = workers.get_mut(name) else {
                return;
            };
            slot.is_running = true;
            Arc::clone(&slot.factory)
        };

        // bridge per-batch pings into shared events carrying the batch
        // duration since the previous one
        let (worker_tx, mut worker_rx) = mpsc::channel::<()>(16);
        let shared_tx = events_tx.clone();
        tracker.spawn(async move {
            let mut start = Instant::now();
            while worker_rx.recv().await.is_some() {
                let duration = start.elapsed();
                start = Instant::now();
                let _ = shared_tx.send(BatchReport { name, duration }).await;
            }
        });

        let engine = Arc::clone(self);
        let ctx = ctx.clone();
        let future = factory(ctx.clone(), worker_tx);
        tracker.spawn(async move {
            match future.await {
                Ok(()) => info!("worker retired:\t{name}"),
                Err(err) if err.is_cancellation() => debug!("worker canceled:\t{name}"),
                Err(err) => {
                    error!("error:\t{name}\t{err}");
                    let mut first_error = engine.first_error.lock().unwrap();
                    if first_error.is_none() {
                        *first_error = Some(err);
                    }
                    drop(first_error);
                    ctx.cancel();
                }
            }

            if let Some(slot) = engine.workers.lock().unwrap().get_mut(name) {
                slot.is_running = false;
            }
        });
    }
}

/// Everything a pipeline run needs besides the store and the client.
pub struct PipelineConfig {
    pub workers: Vec<WorkerKind>,
    pub seed_url: String,
    pub indexer_batch: i64,
    pub with_reporter: bool,
    pub reporter_path: PathBuf,
    pub reporter_interval: Duration,
}

/// Wires the requested worker set into an engine. `track_analysis` brings
/// the indexer along; the reporter is added when asked for (the fetch
/// command always asks; tests usually do not, so their pipelines can drain
/// and exit).
pub fn build_engine(
    store: Arc<Store>,
    client: Arc<SpotifyClient>,
    config: PipelineConfig,
) -> Engine {
    let engine = Engine::new();

    for kind in &config.workers {
        match kind {
            WorkerKind::Genres => {
                let store = Arc::clone(&store);
                let seed_url = config.seed_url.clone();
                engine.add("genres", move |ctx, events| {
                    Box::pin(workers::run_genres_fetcher(
                        ctx,
                        Arc::clone(&store),
                        seed_url.clone(),
                        events,
                    ))
                });
            }
            WorkerKind::GenreArtists => {
                let store = Arc::clone(&store);
                let client = Arc::clone(&client);
                engine.add("genre_artists", move |ctx, events| {
                    Box::pin(workers::run_genre_artists_fetcher(
                        ctx,
                        Arc::clone(&store),
                        Arc::clone(&client),
                        events,
                    ))
                });
            }
            WorkerKind::ArtistTracks => {
                let store = Arc::clone(&store);
                let client = Arc::clone(&client);
                engine.add("artist_tracks", move |ctx, events| {
                    Box::pin(workers::run_artist_tracks_fetcher(
                        ctx,
                        Arc::clone(&store),
                        Arc::clone(&client),
                        events,
                    ))
                });
            }
            WorkerKind::ArtistAlbums => {
                let store = Arc::clone(&store);
                let client = Arc::clone(&client);
                engine.add("artist_albums", move |ctx, events| {
                    Box::pin(workers::run_artist_albums_fetcher(
                        ctx,
                        Arc::clone(&store),
                        Arc::clone(&client),
                        events,
                    ))
                });
            }
            WorkerKind::AlbumTracks => {
                let store = Arc::clone(&store);
                let client = Arc::clone(&client);
                engine.add("album_tracks", move |ctx, events| {
                    Box::pin(workers::run_album_tracks_fetcher(
                        ctx,
                        Arc::clone(&store),
                        Arc::clone(&client),
                        events,
                    ))
                });
            }
            WorkerKind::TrackAnalysis => {
                let analysis_store = Arc::clone(&store);
                let analysis_client = Arc::clone(&client);
                engine.add("track_analysis", move |ctx, events| {
                    Box::pin(workers::run_track_analysis_fetcher(
                        ctx,
                        Arc::clone(&analysis_store),
                        Arc::clone(&analysis_client),
                        events,
                    ))
                });

                let indexer_store = Arc::clone(&store);
                let batch = config.indexer_batch;
                engine.add("indexer", move |ctx, events| {
                    Box::pin(workers::run_indexer(
                        ctx,
                        Arc::clone(&indexer_store),
                        batch,
                        events,
                    ))
                });
            }
            WorkerKind::AlbumTracksRefetch => {
                let store = Arc::clone(&store);
                let client = Arc::clone(&client);
                engine.add("album_tracks_refetch", move |ctx, events| {
                    Box::pin(workers::run_album_tracks_refetcher(
                        ctx,
                        Arc::clone(&store),
                        Arc::clone(&client),
                        events,
                    ))
                });
            }
        }
    }

    if config.with_reporter {
        let store = Arc::clone(&store);
        let path = config.reporter_path.clone();
        let interval = config.reporter_interval;
        engine.add("reporter", move |ctx, events| {
            Box::pin(workers::run_reporter(
                ctx,
                Arc::clone(&store),
                path.clone(),
                interval,
                events,
            ))
        });
    }

    engine
}
