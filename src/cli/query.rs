use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::domain::{Track, Vector};
use crate::repository::Store;

const TRACK_HEADER: [&str; 11] = [
    "artists",
    "album",
    "track",
    "spotify_id",
    "acousticness",
    "danceability",
    "energy",
    "instrumentalness",
    "liveness",
    "speechiness",
    "valence",
];

fn track_row(track: &Track) -> String {
    let artists = track
        .artists
        .iter()
        .map(|artist| artist.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    [
        artists,
        track.album_name.clone(),
        track.name.clone(),
        track.spotify_id.clone(),
        format!("{:.6}", track.acousticness),
        format!("{:.6}", track.danceability),
        format!("{:.6}", track.energy),
        format!("{:.6}", track.instrumentalness),
        format!("{:.6}", track.liveness),
        format!("{:.6}", track.speechiness),
        format!("{:.6}", track.valence),
    ]
    .join("\t")
}

pub async fn search(
    ctx: &CancellationToken,
    store: Arc<Store>,
    query: &[String],
    count: i64,
) -> anyhow::Result<()> {
    let query = query.join(" ");
    let tracks = store.search(ctx, &query, count).await?;

    if tracks.is_empty() {
        println!("no results for '{query}'");
        return Ok(());
    }

    println!("{}", TRACK_HEADER.join("\t"));
    for track in &tracks {
        println!("{}", track_row(track));
    }

    Ok(())
}

pub async fn find(
    ctx: &CancellationToken,
    store: Arc<Store>,
    count: i64,
    input: Vector,
) -> anyhow::Result<()> {
    let tracks = store.nearest_tracks(ctx, count, &input).await?;

    if count == 1 && !tracks.is_empty() {
        println!("{}", serde_json::to_string_pretty(&tracks[0])?);
    } else {
        println!("{}", serde_json::to_string_pretty(&tracks)?);
    }

    Ok(())
}

pub async fn neighbors(
    ctx: &CancellationToken,
    store: Arc<Store>,
    query: &[String],
    count: i64,
) -> anyhow::Result<()> {
    let query = query.join(" ");
    let track = store.resolve(ctx, &format!("q:{query}")).await?;
    let target = track.vector();

    // the track itself is its own nearest neighbor, so ask for one extra
    let tracks = store.nearest_tracks(ctx, count + 1, &target).await?;

    println!("{}\tdistance", TRACK_HEADER.join("\t"));
    for track in &tracks {
        println!("{}\t{:.6}", track_row(track), target.distance(&track.vector()));
    }

    Ok(())
}

pub async fn path(
    ctx: &CancellationToken,
    store: Arc<Store>,
    from: &str,
    to: &str,
    steps: usize,
) -> anyhow::Result<()> {
    let from_track = store.resolve(ctx, from).await?;
    let to_track = store.resolve(ctx, to).await?;

    let from_vector = from_track.vector();
    let delta = from_vector.delta(&to_track.vector());
    let points = from_vector.path(&delta, steps);

    println!("{}\tdistance", TRACK_HEADER.join("\t"));
    println!("{}\t{:.6}", track_row(&from_track), 0.0);

    for point in &points {
        let results = store.nearest_tracks(ctx, 1, point).await?;
        let Some(track) = results.first() else {
            anyhow::bail!("no track found near path point");
        };
        println!("{}\t{:.6}", track_row(track), point.distance(&track.vector()));
    }

    Ok(())
}
