use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::repository::Store;

fn percentage(done: i64, of: i64) -> f64 {
    if of == 0 {
        return 0.0;
    }
    100.0 * done as f64 / of as f64
}

pub async fn run(ctx: &CancellationToken, store: Arc<Store>) -> anyhow::Result<()> {
    let progress = store.progress(ctx).await?;

    println!("GENRES");
    println!("  {}\tknown", progress.genres_known);
    println!(
        "  {}\tfetched artists ({:.2}%)",
        progress.genres_with_fetched_artists,
        percentage(progress.genres_with_fetched_artists, progress.genres_known)
    );
    println!();

    println!("ARTISTS");
    println!("  {}\tknown", progress.artists_known);
    println!(
        "  {}\tfetched top tracks ({:.2}%)",
        progress.artists_with_fetched_tracks,
        percentage(progress.artists_with_fetched_tracks, progress.artists_known)
    );
    println!(
        "  {}\tfetched albums ({:.2}%)",
        progress.artists_with_fetched_albums,
        percentage(progress.artists_with_fetched_albums, progress.artists_known)
    );
    println!();

    println!("ALBUMS");
    println!("  {}\tknown", progress.albums_known);
    println!(
        "  {}\tfetched tracks ({:.2}%)",
        progress.albums_with_fetched_tracks,
        percentage(progress.albums_with_fetched_tracks, progress.albums_known)
    );
    println!();

    println!("TRACKS");
    println!("  {}\tknown", progress.tracks_known);
    println!(
        "  {}\tfetched analysis ({:.2}%)",
        progress.tracks_with_fetched_analysis,
        percentage(progress.tracks_with_fetched_analysis, progress.tracks_known)
    );
    println!(
        "  {}\tindexed ({:.2}%)",
        progress.tracks_indexed,
        percentage(progress.tracks_indexed, progress.tracks_known)
    );

    Ok(())
}
