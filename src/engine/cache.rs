//! Digest Cache
//!
//! The `{task -> digest}` mapping persisted between invocations at
//! `<spokfile dir>/.spok/cache.json`. The `.spok` directory carries a
//! `.gitignore` containing `*` and an empty `CACHEDIR.TAG` marker so the
//! cache never pollutes version control or backups.

use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CACHE_DIR: &str = ".spok";
pub const CACHE_FILE: &str = "cache.json";

/// Digest value for a task that has never been hashed.
pub const EMPTY_DIGEST: &str = "";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Could not access cache at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed cache file {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The in-memory digest store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cache {
    entries: IndexMap<String, String>,
}

impl Cache {
    /// Location of the cache file for a spokfile directory.
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(CACHE_DIR).join(CACHE_FILE)
    }

    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    pub fn get(&self, task: &str) -> Option<&str> {
        self.entries.get(task).map(String::as_str)
    }

    pub fn set(&mut self, task: &str, digest: &str) {
        self.entries.insert(task.to_string(), digest.to_string());
    }

    pub fn contains(&self, task: &str) -> bool {
        self.entries.contains_key(task)
    }

    /// Create the `.spok` directory and its support files, and write a
    /// cache seeded with every known task mapped to the empty digest.
    pub fn init<'a>(
        dir: &Path,
        tasks: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, CacheError> {
        let cache_dir = dir.join(CACHE_DIR);
        std::fs::create_dir_all(&cache_dir).map_err(|source| CacheError::Io {
            path: cache_dir.clone(),
            source,
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&cache_dir, std::fs::Permissions::from_mode(0o755))
                .map_err(|source| CacheError::Io {
                    path: cache_dir.clone(),
                    source,
                })?;
        }

        write_support_file(&cache_dir.join(".gitignore"), b"*\n")?;
        write_support_file(&cache_dir.join("CACHEDIR.TAG"), b"")?;

        let mut cache = Cache::default();
        for task in tasks {
            cache.set(task, EMPTY_DIGEST);
        }
        cache.dump(&cache_dir.join(CACHE_FILE))?;
        log::debug!("initialised cache in {:?}", cache_dir);
        Ok(cache)
    }

    /// Read and parse the cache file. A missing file is an error; callers
    /// decide when to `init` instead.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| CacheError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Persist as two-space-indented JSON via a temp file plus rename, so
    /// a crash mid-write never leaves a truncated cache behind.
    pub fn dump(&self, path: &Path) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut buf = Vec::new();
        let fmt = serde_json::ser::PrettyFormatter::with_indent(b"  ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
        self.serialize(&mut ser).map_err(|source| CacheError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        buf.push(b'\n');

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &buf).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}

fn write_support_file(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    std::fs::write(path, contents).map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })
}
