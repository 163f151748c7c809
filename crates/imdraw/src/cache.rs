//! Modification-time keyed resource caching
//!
//! Shader modules and textures are cached by source path. A lookup reloads the
//! resource only when the file's mtime is strictly newer than the cached one,
//! which is what makes on-disk edits show up without restarting the process.
//! Entries live until renderer teardown; they are replaced on invalidation,
//! never evicted on access.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use crate::error::{DrawError, DrawResult};

struct CacheEntry<T> {
    resource: T,
    modified: SystemTime,
}

/// Whether the on-disk timestamp invalidates the cached one
///
/// Strictly newer only: an equal timestamp keeps the cached resource.
pub fn is_stale(cached: SystemTime, on_disk: SystemTime) -> bool {
    on_disk > cached
}

/// Cache of GPU resources keyed by source file path and modification time
pub struct FileCache<T> {
    entries: HashMap<PathBuf, CacheEntry<T>>,
}

impl<T> FileCache<T> {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Resolve `path` to its cached resource, loading when absent or stale
    ///
    /// On a stale entry the timestamp is advanced even if the reload fails, and
    /// the previous resource stays in place; a broken file mid-edit keeps the
    /// last good GPU object. A first-time load failure has nothing to fall back
    /// to and is propagated.
    pub fn resolve<F>(&mut self, path: &Path, load: F) -> DrawResult<&T>
    where
        F: FnOnce(&Path) -> DrawResult<T>,
    {
        let metadata = std::fs::metadata(path).map_err(|source| DrawError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let modified = metadata.modified().map_err(|source| DrawError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match self.entries.get_mut(path) {
            Some(entry) if !is_stale(entry.modified, modified) => {}
            Some(entry) => {
                entry.modified = modified;
                match load(path) {
                    Ok(resource) => {
                        log::debug!("reloaded {:?}", path);
                        entry.resource = resource;
                    }
                    Err(err) => {
                        log::warn!("reload of {:?} failed, keeping cached copy: {}", path, err);
                    }
                }
            }
            None => {
                let resource = load(path)?;
                log::debug!("loaded {:?}", path);
                self.entries.insert(
                    path.to_path_buf(),
                    CacheEntry { resource, modified },
                );
            }
        }

        Ok(&self.entries[path].resource)
    }

    /// Peek at the cached resource for `path` without touching the filesystem
    pub fn get(&self, path: &Path) -> Option<&T> {
        self.entries.get(path).map(|entry| &entry.resource)
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for FileCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    fn scratch_file(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("imdraw-cache-test-{}", name));
        fs::write(&path, b"contents").unwrap();
        path
    }

    fn bump_mtime(path: &Path) {
        // Coarse filesystems round mtimes; set one explicitly in the future
        let future = SystemTime::now() + Duration::from_secs(5);
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(future).unwrap();
    }

    #[test]
    fn test_same_path_twice_loads_once() {
        let path = scratch_file("load-once");
        let mut cache = FileCache::new();
        let mut loads = 0;

        let first = *cache
            .resolve(&path, |_| {
                loads += 1;
                Ok(41)
            })
            .unwrap();
        let second = *cache
            .resolve(&path, |_| {
                loads += 1;
                Ok(99)
            })
            .unwrap();

        assert_eq!(first, 41);
        assert_eq!(second, 41);
        assert_eq!(loads, 1);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_newer_mtime_forces_exactly_one_reload() {
        let path = scratch_file("reload");
        let mut cache = FileCache::new();

        assert_eq!(*cache.resolve(&path, |_| Ok(1)).unwrap(), 1);

        bump_mtime(&path);
        assert_eq!(*cache.resolve(&path, |_| Ok(2)).unwrap(), 2);
        // Same timestamp again: no further reload
        assert_eq!(*cache.resolve(&path, |_| Ok(3)).unwrap(), 2);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_failed_reload_keeps_previous_resource() {
        let path = scratch_file("keep-on-failure");
        let mut cache = FileCache::new();

        assert_eq!(*cache.resolve(&path, |_| Ok(7)).unwrap(), 7);

        bump_mtime(&path);
        let value = *cache
            .resolve(&path, |p| {
                Err(DrawError::Io {
                    path: p.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "mid-edit"),
                })
            })
            .unwrap();
        assert_eq!(value, 7);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_first_load_failure_is_fatal() {
        let path = scratch_file("first-failure");
        let mut cache: FileCache<u32> = FileCache::new();

        let result = cache.resolve(&path, |p| {
            Err(DrawError::Io {
                path: p.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            })
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let mut cache: FileCache<u32> = FileCache::new();
        let result = cache.resolve(Path::new("/definitely/not/here.spv"), |_| Ok(0));
        assert!(matches!(result, Err(DrawError::Io { .. })));
    }

    #[test]
    fn test_staleness_is_strictly_newer() {
        let now = SystemTime::now();
        assert!(!is_stale(now, now));
        assert!(!is_stale(now, now - Duration::from_secs(1)));
        assert!(is_stale(now, now + Duration::from_secs(1)));
    }
}
