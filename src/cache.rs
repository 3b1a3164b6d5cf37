use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::dependency::Dependencies;
use crate::error::{Result, TemplateError};

pub const CACHE_EXTENSION: &str = "view";

/// Compiled-artifact store keyed by a hash of the logical template name.
#[derive(Debug, Clone)]
pub struct ViewCache {
    cache_dir: PathBuf,
}

impl ViewCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn compute_hash(name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Where the compiled artifact for `name` lives (whether or not it exists yet).
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", Self::compute_hash(name), CACHE_EXTENSION))
    }

    pub fn get(&self, name: &str) -> Option<String> {
        let cache_path = self.path_for(name);
        match fs::read_to_string(&cache_path) {
            Ok(data) => Some(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(name, error = %e, "unreadable cache entry, recompiling");
                None
            }
        }
    }

    pub fn set(&self, name: &str, compiled: &str) -> Result<PathBuf> {
        let cache_path = self.path_for(name);
        write_atomic(&cache_path, compiled.as_bytes())
            .map_err(|e| TemplateError::io(&cache_path, e))?;
        Ok(cache_path)
    }

    /// An entry is fresh when it exists and nothing it was built from was
    /// modified after it was written.
    pub fn is_fresh(&self, name: &str, source: &Path, dependencies: &Dependencies) -> bool {
        let Some(compiled_at) = modified(&self.path_for(name)) else {
            return false;
        };

        std::iter::once(source)
            .chain(dependencies.keys().map(PathBuf::as_path))
            .all(|path| match modified(path) {
                Some(changed_at) => changed_at <= compiled_at,
                None => false,
            })
    }

    /// Remove every compiled entry, returning how many were deleted.
    pub fn clear(&self) -> Result<usize> {
        if !self.cache_dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in WalkDir::new(&self.cache_dir).max_depth(1).into_iter().flatten() {
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == CACHE_EXTENSION) {
                fs::remove_file(path).map_err(|e| TemplateError::io(path, e))?;
                removed += 1;
            }
        }

        tracing::debug!(removed, dir = %self.cache_dir.display(), "cleared view cache");
        Ok(removed)
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Replace `path` with `content` in one step: readers see the old file or the
/// new one, never a partial write.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.flush()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_path_is_keyed_by_name_hash() {
        let cache = ViewCache::new("/tmp/views");
        let path = cache.path_for("home");
        assert_eq!(path.parent().unwrap(), Path::new("/tmp/views"));
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("{}.view", ViewCache::compute_hash("home"))
        );
        assert_ne!(cache.path_for("home"), cache.path_for("about"));
    }

    #[test]
    fn test_set_replaces_content() {
        let dir = TempDir::new().unwrap();
        let cache = ViewCache::new(dir.path().join("cache"));

        assert!(cache.get("home").is_none());
        cache.set("home", "first").unwrap();
        cache.set("home", "second").unwrap();
        assert_eq!(cache.get("home").as_deref(), Some("second"));
    }

    #[test]
    fn test_freshness_tracks_dependencies() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("home.html");
        let partial = dir.path().join("nav.html");
        fs::write(&source, "home").unwrap();
        fs::write(&partial, "nav").unwrap();

        let cache = ViewCache::new(dir.path().join("cache"));
        let mut deps = Dependencies::new();
        deps.insert(partial.clone(), 1);

        assert!(!cache.is_fresh("home", &source, &deps));

        std::thread::sleep(Duration::from_millis(20));
        cache.set("home", "compiled").unwrap();
        assert!(cache.is_fresh("home", &source, &deps));

        let file = fs::OpenOptions::new().write(true).open(&partial).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();
        assert!(!cache.is_fresh("home", &source, &deps));
    }

    #[test]
    fn test_missing_dependency_is_stale() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("home.html");
        fs::write(&source, "home").unwrap();

        let cache = ViewCache::new(dir.path().join("cache"));
        cache.set("home", "compiled").unwrap();

        let mut deps = Dependencies::new();
        deps.insert(dir.path().join("deleted.html"), 1);
        assert!(!cache.is_fresh("home", &source, &deps));
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let cache = ViewCache::new(dir.path());
        cache.set("a", "1").unwrap();
        cache.set("b", "2").unwrap();
        fs::write(dir.path().join("dependencies.json"), "{}").unwrap();

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.get("a").is_none());
        assert!(dir.path().join("dependencies.json").exists());
    }
}
