//! Count-bounded cache area for recordings and reply audio.

use crate::error::VoxResult;
use crate::log_debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

const RECORDING_PREFIX: &str = "rec-";
const REPLY_PREFIX: &str = "reply-";

#[derive(Debug, Clone)]
pub struct AudioCache {
    dir: PathBuf,
    max_files: usize,
}

impl AudioCache {
    pub fn new(dir: impl Into<PathBuf>, max_files: usize) -> Self {
        Self {
            dir: dir.into(),
            max_files: max_files.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> VoxResult<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Fresh path for a recording clip.
    pub fn recording_path(&self) -> PathBuf {
        self.dir
            .join(format!("{RECORDING_PREFIX}{}.wav", Uuid::new_v4()))
    }

    /// Fresh path for reply audio with the given extension.
    pub fn reply_path(&self, extension: &str) -> PathBuf {
        self.dir
            .join(format!("{REPLY_PREFIX}{}.{extension}", Uuid::new_v4()))
    }

    /// Write reply bytes into the cache, then trim it.
    pub fn store_reply(&self, bytes: &[u8], extension: &str) -> VoxResult<PathBuf> {
        self.ensure_dir()?;
        let path = self.reply_path(extension);
        fs::write(&path, bytes)?;
        self.evict()?;
        Ok(path)
    }

    /// Cached audio files, oldest first.
    pub fn files(&self) -> VoxResult<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let owned = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(RECORDING_PREFIX) || n.starts_with(REPLY_PREFIX));
            if !owned || !path.is_file() {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((modified, path));
        }
        files.sort();
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    /// Delete the oldest files beyond the limit. Returns how many were removed.
    pub fn evict(&self) -> VoxResult<usize> {
        let files = self.files()?;
        let excess = files.len().saturating_sub(self.max_files);
        let mut removed = 0;
        for path in files.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => log_debug(&format!(
                    "cache eviction failed for {}: {err}",
                    path.display()
                )),
            }
        }
        if removed > 0 {
            tracing::debug!(target: "voxorb::upload", removed, "evicted cached audio");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn touch(path: &Path, age_secs: u64) {
        let file = File::create(path).unwrap();
        let when = SystemTime::now() - Duration::from_secs(age_secs);
        file.set_modified(when).unwrap();
    }

    #[test]
    fn evicts_oldest_beyond_limit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(dir.path(), 2);
        touch(&dir.path().join("rec-old.wav"), 300);
        touch(&dir.path().join("reply-mid.mp3"), 200);
        touch(&dir.path().join("rec-new.wav"), 100);
        touch(&dir.path().join("notes.txt"), 999);

        assert_eq!(cache.evict().unwrap(), 1);
        assert!(!dir.path().join("rec-old.wav").exists());
        assert!(dir.path().join("reply-mid.mp3").exists());
        assert!(dir.path().join("notes.txt").exists(), "foreign files are left alone");
    }

    #[test]
    fn store_reply_keeps_cache_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(dir.path().join("audio"), 3);
        let mut last = PathBuf::new();
        for i in 0..6u8 {
            last = cache.store_reply(&[i; 8], "wav").unwrap();
        }
        assert!(cache.files().unwrap().len() <= 3);
        assert!(last.exists());
        assert_eq!(fs::read(&last).unwrap(), vec![5u8; 8]);
    }

    #[test]
    fn missing_dir_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(dir.path().join("nope"), 4);
        assert!(cache.files().unwrap().is_empty());
        assert_eq!(cache.evict().unwrap(), 0);
    }

    #[test]
    fn generated_paths_are_unique() {
        let cache = AudioCache::new("/tmp/voxorb-test", 4);
        assert_ne!(cache.recording_path(), cache.recording_path());
        assert!(cache.reply_path("mp3").to_string_lossy().ends_with(".mp3"));
    }
}
