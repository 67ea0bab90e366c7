use std::sync::Arc;

use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use genregraph::cli::{self, Cli, Command};
use genregraph::domain::Vector;
use genregraph::repository::Store;
use genregraph::utils::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Cli::parse();
    let config = Config::new(args.dbfile.clone());

    let ctx = CancellationToken::new();
    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt; draining");
                ctx.cancel();
            } else {
                warn!("failed to install interrupt handler");
            }
        });
    }

    let store = Arc::new(Store::open(&config.db_file).await?);

    match args.command {
        Command::Fetch { workers } => cli::fetch::run(&ctx, store, &config, workers).await,

        Command::Search { query, count } => cli::query::search(&ctx, store, &query, count).await,

        Command::Find {
            count,
            acousticness,
            danceability,
            energy,
            instrumentalness,
            liveness,
            speechiness,
            valence,
        } => {
            // an axis left at -1 is excluded from the query
            let mut input = Vector::new();
            for (axis, value) in [
                ("acousticness", acousticness),
                ("danceability", danceability),
                ("energy", energy),
                ("instrumentalness", instrumentalness),
                ("liveness", liveness),
                ("speechiness", speechiness),
                ("valence", valence),
            ] {
                if value >= 0.0 {
                    input.set(axis, value);
                }
            }
            cli::query::find(&ctx, store, count, input).await
        }

        Command::Neighbors { query, count } => {
            cli::query::neighbors(&ctx, store, &query, count).await
        }

        Command::Path { from, to, steps } => {
            cli::query::path(&ctx, store, &from, &to, steps).await
        }

        Command::Progress => cli::progress::run(&ctx, store).await,

        Command::Serve { port } => cli::serve::run(&ctx, store, port).await,
    }
}
