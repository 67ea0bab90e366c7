pub mod fetch;
pub mod progress;
pub mod query;
pub mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::services::WorkerKind;

#[derive(Parser)]
#[command(name = "genregraph", about = "populate and query a music-metadata graph")]
pub struct Cli {
    /// path to database file
    #[arg(long, global = true, default_value = "genres.db")]
    pub dbfile: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// fetch data from the catalog to populate the database
    ///
    /// requires SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET
    Fetch {
        /// which workers to run (default: all)
        #[arg(long, value_delimiter = ',')]
        workers: Option<Vec<WorkerKind>>,
    },

    /// search the database for a track
    Search {
        /// matched against track, album, and artist names
        query: Vec<String>,

        /// number of tracks to return
        #[arg(long, default_value_t = 1)]
        count: i64,
    },

    /// find tracks matching a feature vector
    Find {
        /// number of tracks to return
        #[arg(long, default_value_t = 1)]
        count: i64,

        #[arg(long, default_value_t = -1.0)]
        acousticness: f64,
        #[arg(long, default_value_t = -1.0)]
        danceability: f64,
        #[arg(long, default_value_t = -1.0)]
        energy: f64,
        #[arg(long, default_value_t = -1.0)]
        instrumentalness: f64,
        #[arg(long, default_value_t = -1.0)]
        liveness: f64,
        #[arg(long, default_value_t = -1.0)]
        speechiness: f64,
        #[arg(long, default_value_t = -1.0)]
        valence: f64,
    },

    /// return tracks similar to the given track
    Neighbors {
        /// matched against track, album, and artist names
        query: Vec<String>,

        /// number of tracks to return
        #[arg(long, default_value_t = 5)]
        count: i64,
    },

    /// create a playlist along a linear path between two tracks
    Path {
        /// query for the starting track ("q:<text>", "id:<id>", or a raw id)
        #[arg(long)]
        from: String,

        /// query for the ending track
        #[arg(long)]
        to: String,

        /// number of steps on the path
        #[arg(long, default_value_t = 5)]
        steps: usize,
    },

    /// report progress from the fetcher
    Progress,

    /// run a web server
    Serve {
        /// http port
        #[arg(long, default_value_t = 9999)]
        port: u16,
    },
}
