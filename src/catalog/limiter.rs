use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::info;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum LimiterError {
    #[error("canceled")]
    Canceled,

    #[error("Failed to read or write the marker file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse the persisted marker timestamp: {0}")]
    ParseTime(#[from] chrono::ParseError),

    #[error("Failed to parse Retry-After seconds '{0}'.")]
    ParseSeconds(String),
}

/// Single-token rate limiter: no request before `next_at`.
///
/// A penalty window imposed by the remote (429 Retry-After) is persisted to a
/// small marker file so a restarted process keeps honoring it. The limiter is
/// only touched while the catalog client's request mutex is held, so the
/// inner lock is never contended; it exists to keep the type `Sync`.
pub struct RateLimiter {
    marker_path: PathBuf,
    delay: Duration,
    next_at: Mutex<Option<DateTime<Local>>>,
}

impl RateLimiter {
    /// Creates the limiter, restoring a persisted `next_at` if a marker file
    /// from an earlier run is present.
    pub fn new(marker_path: impl Into<PathBuf>, delay: Duration) -> Result<Self, LimiterError> {
        let limiter = Self {
            marker_path: marker_path.into(),
            delay,
            next_at: Mutex::new(None),
        };
        limiter.load()?;
        Ok(limiter)
    }

    fn load(&self) -> Result<(), LimiterError> {
        let contents = match std::fs::read_to_string(&self.marker_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let parsed = DateTime::parse_from_rfc3339(contents.trim())?;
        *self.next_at.lock().unwrap() = Some(parsed.with_timezone(&Local));
        Ok(())
    }

    /// Sleeps until `next_at`, or returns immediately when it has already
    /// passed. Cancellation wins the race and leaves `next_at` untouched.
    /// After a non-trivial wait (over a second) the marker file is removed.
    pub async fn wait(&self, ctx: &CancellationToken) -> Result<(), LimiterError> {
        let next_at = *self.next_at.lock().unwrap();
        let Some(next_at) = next_at else {
            return Ok(());
        };

        let remaining = (next_at - Local::now()).to_std().unwrap_or(Duration::ZERO);
        if remaining > Duration::from_secs(1) {
            info!("waiting {}s until {}", remaining.as_secs(), next_at.format("%H:%M:%S"));
        }

        if !remaining.is_zero() {
            tokio::select! {
                _ = ctx.cancelled() => return Err(LimiterError::Canceled),
                _ = tokio::time::sleep(remaining) => {}
            }
        }

        if remaining > Duration::from_secs(1) {
            match std::fs::remove_file(&self.marker_path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }

    /// Starts the configured steady-state delay window.
    pub fn delay(&self) {
        self.delay_by(self.delay);
    }

    pub fn delay_by(&self, duration: Duration) {
        let duration = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        *self.next_at.lock().unwrap() = Some(Local::now() + duration);
    }

    /// Applies a remote-imposed penalty of `seconds_str` seconds (empty
    /// defaults to 60) plus one, and persists it so restarts pick up the
    /// window.
    pub fn set_next_at(&self, seconds_str: &str) -> Result<(), LimiterError> {
        let seconds_str = if seconds_str.is_empty() { "60" } else { seconds_str };
        let seconds: i64 = seconds_str
            .parse()
            .map_err(|_| LimiterError::ParseSeconds(seconds_str.to_string()))?;

        let next_at = Local::now() + chrono::Duration::seconds(seconds + 1);
        *self.next_at.lock().unwrap() = Some(next_at);

        std::fs::write(&self.marker_path, next_at.to_rfc3339())?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn next_at(&self) -> Option<DateTime<Local>> {
        *self.next_at.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[tokio::test]
    async fn test_wait_returns_immediately_without_window() {
        let dir = tempfile::tempdir().unwrap();
        let limiter = RateLimiter::new(dir.path().join("next-req"), Duration::from_secs(1)).unwrap();

        let started = Instant::now();
        limiter.wait(&CancellationToken::new()).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_wait_honors_delay_window() {
        let dir = tempfile::tempdir().unwrap();
        let limiter = RateLimiter::new(dir.path().join("next-req"), Duration::from_millis(200)).unwrap();

        limiter.delay();

        let started = Instant::now();
        limiter.wait(&CancellationToken::new()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_cancellation_wins_and_keeps_next_at() {
        let dir = tempfile::tempdir().unwrap();
        let limiter = RateLimiter::new(dir.path().join("next-req"), Duration::from_secs(1)).unwrap();

        limiter.delay_by(Duration::from_secs(60));
        let before = limiter.next_at();

        let ctx = CancellationToken::new();
        ctx.cancel();

        let result = limiter.wait(&ctx).await;
        assert!(matches!(result, Err(LimiterError::Canceled)));
        assert_eq!(limiter.next_at(), before);
    }

    #[tokio::test]
    async fn test_penalty_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("next-req");

        let limiter = RateLimiter::new(&marker, Duration::from_secs(1)).unwrap();
        limiter.set_next_at("120").unwrap();
        assert!(marker.exists());

        // a fresh limiter over the same marker restores the window
        let restarted = RateLimiter::new(&marker, Duration::from_secs(1)).unwrap();
        let restored = restarted.next_at().expect("restored next_at");
        assert!(restored > Local::now() + chrono::Duration::seconds(60));
    }

    #[tokio::test]
    async fn test_marker_removed_after_long_wait() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("next-req");

        let limiter = RateLimiter::new(&marker, Duration::from_secs(1)).unwrap();
        limiter.set_next_at("1").unwrap();
        assert!(marker.exists());

        limiter.wait(&CancellationToken::new()).await.unwrap();
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_empty_retry_after_defaults_to_sixty() {
        let dir = tempfile::tempdir().unwrap();
        let limiter = RateLimiter::new(dir.path().join("next-req"), Duration::from_secs(1)).unwrap();

        limiter.set_next_at("").unwrap();
        let next_at = limiter.next_at().expect("next_at");
        assert!(next_at > Local::now() + chrono::Duration::seconds(55));
    }
}
