//! Content-addressed clip cache on the local filesystem.
//!
//! Each clip lives at `<cache_dir>/<fingerprint>.<ext>`. Writes go to a
//! temporary file in the same directory and are renamed into place, so a
//! reader sees either no file or a complete one.

use crate::error::CacheWriteError;
use chrono::{DateTime, Utc};
use herald_types::{AudioClip, AudioFormat, CacheKey};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A clip that has been published to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedClip {
    pub key: CacheKey,
    pub path: PathBuf,
    pub format: AudioFormat,
    pub created_at: DateTime<Utc>,
}

impl CachedClip {
    /// File name relative to the cache directory.
    pub fn file_name(&self) -> String {
        file_name(&self.key, self.format)
    }
}

fn file_name(key: &CacheKey, format: AudioFormat) -> String {
    format!("{}.{}", key.as_str(), format.extension())
}

#[derive(Debug, Clone)]
pub struct AudioCache {
    dir: PathBuf,
}

impl AudioCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the stored clip for `key` if a readable file exists.
    ///
    /// I/O errors other than "not found" are logged and reported as a miss
    /// so the caller resynthesizes instead of failing.
    pub async fn lookup(&self, key: &CacheKey) -> Option<CachedClip> {
        for format in AudioFormat::ALL {
            let path = self.dir.join(file_name(key, format));
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => {
                    let created_at = meta
                        .modified()
                        .map(DateTime::<Utc>::from)
                        .unwrap_or_else(|_| Utc::now());
                    return Some(CachedClip {
                        key: key.clone(),
                        path,
                        format,
                        created_at,
                    });
                }
                Ok(_) => {
                    tracing::warn!(path = %path.display(), "cache entry is not a regular file, ignoring");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), "cache lookup failed, treating as miss: {}", e);
                }
            }
        }
        None
    }

    /// Persists `clip` under `key` and returns its handle.
    ///
    /// Storing the same key twice is safe; the last writer wins and no
    /// partially written file is ever visible at the final path.
    pub async fn store(&self, key: &CacheKey, clip: &AudioClip) -> Result<CachedClip, CacheWriteError> {
        let dir = self.dir.clone();
        let path = dir.join(file_name(key, clip.format));
        let bytes = clip.bytes.clone();
        let target = path.clone();

        tokio::task::spawn_blocking(move || -> Result<(), CacheWriteError> {
            std::fs::create_dir_all(&dir)?;
            let mut tmp = tempfile::Builder::new()
                .prefix(".partial-")
                .tempfile_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target)?;
            Ok(())
        })
        .await
        .map_err(|e| CacheWriteError::Join(e.to_string()))??;

        tracing::debug!(key = %key, path = %path.display(), "stored clip in cache");

        Ok(CachedClip {
            key: key.clone(),
            path,
            format: clip.format,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_types::{AnnouncementRequest, Priority};
    use std::sync::Arc;

    fn key(text: &str) -> CacheKey {
        AnnouncementRequest::new(text, "en", false, Priority::Normal)
            .unwrap()
            .cache_key()
    }

    #[tokio::test]
    async fn lookup_misses_on_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(dir.path());
        assert!(cache.lookup(&key("hello")).await.is_none());
    }

    #[tokio::test]
    async fn store_then_lookup_hits() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(dir.path());
        let k = key("hello");

        let stored = cache
            .store(&k, &AudioClip::new(vec![1, 2, 3], AudioFormat::Mp3))
            .await
            .unwrap();
        assert_eq!(stored.file_name(), format!("{}.mp3", k));
        assert_eq!(std::fs::read(&stored.path).unwrap(), vec![1, 2, 3]);

        let found = cache.lookup(&k).await.unwrap();
        assert_eq!(found.path, stored.path);
        assert_eq!(found.format, AudioFormat::Mp3);
    }

    #[tokio::test]
    async fn store_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(dir.path().join("nested/cache"));
        let k = key("nested");
        cache
            .store(&k, &AudioClip::new(vec![9], AudioFormat::Wav))
            .await
            .unwrap();
        assert!(cache.lookup(&k).await.is_some());
    }

    #[tokio::test]
    async fn storing_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(dir.path());
        let k = key("twice");
        let clip = AudioClip::new(vec![7; 64], AudioFormat::Wav);

        cache.store(&k, &clip).await.unwrap();
        let second = cache.store(&k, &clip).await.unwrap();
        assert_eq!(std::fs::read(&second.path).unwrap(), clip.bytes);

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temporary files must not be left behind");
    }

    #[tokio::test]
    async fn removed_file_becomes_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(dir.path());
        let k = key("evicted");
        let stored = cache
            .store(&k, &AudioClip::new(vec![1], AudioFormat::Mp3))
            .await
            .unwrap();
        std::fs::remove_file(&stored.path).unwrap();
        assert!(cache.lookup(&k).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_readers_never_see_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(AudioCache::new(dir.path()));
        let k = key("race");
        let payload = vec![0xAB; 256 * 1024];

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let k = k.clone();
                let clip = AudioClip::new(payload.clone(), AudioFormat::Wav);
                tokio::spawn(async move { cache.store(&k, &clip).await.map(|_| ()) })
            })
            .collect();

        let reader = {
            let cache = cache.clone();
            let k = k.clone();
            let expected = payload.len();
            tokio::spawn(async move {
                for _ in 0..200 {
                    if let Some(found) = cache.lookup(&k).await {
                        let bytes = tokio::fs::read(&found.path).await.unwrap();
                        assert_eq!(bytes.len(), expected);
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        for writer in writers {
            writer.await.unwrap().unwrap();
        }
        reader.await.unwrap();
    }
}
