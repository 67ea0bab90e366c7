use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::CatalogConfig;
use crate::seed;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("must set SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET")]
    MissingCredentials,
}

/// Everything the process needs to know about its environment. The database
/// file comes from the CLI; the rest are fixed relative paths the way the
/// persisted-state layout documents them.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_file: PathBuf,
    pub cache_dir: PathBuf,
    pub marker_file: PathBuf,
    pub reporter_log: PathBuf,
    pub seed_url: String,
    pub request_delay: Duration,
    pub reporter_interval: Duration,
    pub indexer_batch: i64,
}

impl Config {
    pub fn new(db_file: PathBuf) -> Self {
        Self {
            db_file,
            cache_dir: PathBuf::from("cache"),
            marker_file: PathBuf::from("next-req"),
            reporter_log: PathBuf::from("log.tsv"),
            seed_url: seed::DEFAULT_SEED_URL.to_string(),
            request_delay: Duration::from_secs(1),
            reporter_interval: Duration::from_secs(600),
            indexer_batch: 10,
        }
    }

    /// The catalog client's slice of the config. Fails before any I/O when
    /// the credential environment variables are absent.
    pub fn catalog_config(&self) -> Result<CatalogConfig, ConfigError> {
        let client_id = std::env::var("SPOTIFY_CLIENT_ID").unwrap_or_default();
        let client_secret = std::env::var("SPOTIFY_CLIENT_SECRET").unwrap_or_default();
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }

        let mut catalog = CatalogConfig::new(client_id, client_secret);
        catalog.cache_dir = self.cache_dir.clone();
        catalog.marker_file = self.marker_file.clone();
        catalog.request_delay = self.request_delay;
        Ok(catalog)
    }
}
