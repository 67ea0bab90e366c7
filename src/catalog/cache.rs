use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to read cache file: {0}")]
    Read(std::io::Error),

    #[error("Failed to write cache file: {0}")]
    Write(std::io::Error),
}

/// Content-addressed read-through cache, keyed by the full request URL.
///
/// Hits bypass rate limiting entirely, which is what makes the pipeline
/// resumable from a partial crash without re-spending remote quota. There is
/// no eviction: the dataset fits and resumability is worth the disk.
pub struct ReadThrough {
    dir: PathBuf,
    prefix: String,
}

impl ReadThrough {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// The cached body for `key`, or `None` on a miss. A miss is an expected
    /// outcome, not an error condition.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(body) => Ok(Some(body)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(CacheError::Read(err)),
        }
    }

    /// Stores `body` under `key`, replacing any previous entry atomically:
    /// the bytes land in a temp file in the final directory, then are renamed
    /// over the destination.
    pub fn set(&self, key: &str, body: &[u8]) -> Result<(), CacheError> {
        let path = self.path_for(key);
        let parent = path.parent().expect("cache paths always have a parent");
        std::fs::create_dir_all(parent).map_err(CacheError::Write)?;

        let temp = tempfile::NamedTempFile::new_in(parent).map_err(CacheError::Write)?;
        std::fs::write(temp.path(), body).map_err(CacheError::Write)?;
        temp.persist(&path)
            .map_err(|err| CacheError::Write(err.error))?;

        Ok(())
    }

    /// `{dir}/{prefix}{hash[0..2]}/{hash[2..4]}/{hash[4..]}` where `hash` is
    /// the hex sha256 of the key.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        Path::new(&self.dir)
            .join(format!("{}{}", self.prefix, &hash[0..2]))
            .join(&hash[2..4])
            .join(&hash[4..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_after_set_replays_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ReadThrough::new(dir.path(), "resp-");

        let key = "https://api.example/v1/search?q=pop&offset=0";
        assert_eq!(cache.get(key).unwrap(), None);

        let body = b"{\"artists\": {\"items\": []}}";
        cache.set(key, body).unwrap();
        assert_eq!(cache.get(key).unwrap().as_deref(), Some(body.as_slice()));
    }

    #[test]
    fn test_path_is_deterministic_in_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ReadThrough::new(dir.path(), "resp-");

        // sha256("key") well-known digest
        let expected = "2c70e12b7a0646f92279f427c7b38e7334d8e5389cff167a1dc30e73f826b683";
        let path = cache.path_for("key");
        let suffix: PathBuf = [
            &format!("resp-{}", &expected[0..2]),
            &expected[2..4],
            &expected[4..],
        ]
        .iter()
        .collect();
        assert!(path.ends_with(&suffix));
    }

    #[test]
    fn test_second_set_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ReadThrough::new(dir.path(), "resp-");

        cache.set("key", b"first").unwrap();
        cache.set("key", b"second").unwrap();
        assert_eq!(cache.get("key").unwrap().as_deref(), Some(b"second".as_slice()));
    }
}
