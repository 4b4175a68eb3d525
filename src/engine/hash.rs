//! Fingerprint Hashing
//!
//! Computes a single hex SHA-256 over a set of files that depends on each
//! file's contents and absolute path but not on the order of the input
//! list. Files are hashed by a bounded pool of worker threads; the reducer
//! sorts the per-file `digest ∥ path` items before the final hash, which
//! makes the result order-independent without ordered I/O.

use std::io;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Sentinel digest returned by `AlwaysRun`. Never a valid hex digest, so
/// it never compares equal to a cached entry.
pub const DIFFERENT: &str = "DIFFERENT";

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Could not hash {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Anything that can fingerprint a set of files.
pub trait Hasher: Send + Sync {
    fn hash(&self, files: &[PathBuf]) -> Result<String, HashError>;
}

/// The real hasher: a parallel content+path SHA-256 reduction.
#[derive(Debug, Default)]
pub struct ParallelHasher;

/// A hasher whose digest compares unequal to every cached digest, forcing
/// every task to run.
#[derive(Debug, Default)]
pub struct AlwaysRun;

impl Hasher for AlwaysRun {
    fn hash(&self, _files: &[PathBuf]) -> Result<String, HashError> {
        Ok(DIFFERENT.to_string())
    }
}

impl Hasher for ParallelHasher {
    fn hash(&self, files: &[PathBuf]) -> Result<String, HashError> {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(files.len());

        let mut items: Vec<Vec<u8>> = Vec::with_capacity(files.len());
        let mut first_error: Option<HashError> = None;

        if workers > 0 {
            let (job_tx, job_rx) = mpsc::channel::<PathBuf>();
            let job_rx = Arc::new(Mutex::new(job_rx));
            let (result_tx, result_rx) =
                mpsc::channel::<Result<Option<(PathBuf, [u8; 32])>, HashError>>();

            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                let job_rx = Arc::clone(&job_rx);
                let result_tx = result_tx.clone();
                handles.push(thread::spawn(move || loop {
                    let job = match job_rx.lock() {
                        Ok(rx) => rx.recv(),
                        Err(_) => break,
                    };
                    match job {
                        Ok(path) => {
                            if result_tx.send(hash_file(&path)).is_err() {
                                break;
                            }
                        }
                        // dispatcher hung up, no more jobs
                        Err(_) => break,
                    }
                }));
            }
            drop(result_tx);

            for path in files {
                // receiver outlives every sender here
                let _ = job_tx.send(path.clone());
            }
            drop(job_tx);

            for result in result_rx {
                match result {
                    Ok(Some((path, digest))) => {
                        let mut item = digest.to_vec();
                        item.extend_from_slice(path.to_string_lossy().as_bytes());
                        items.push(item);
                    }
                    Ok(None) => {} // directory, skipped
                    Err(err) => {
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                }
            }
            for handle in handles {
                let _ = handle.join();
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        items.sort();
        let mut hasher = Sha256::new();
        for item in &items {
            hasher.update(item);
        }
        Ok(to_hex(&hasher.finalize()))
    }
}

/// Stream one file through SHA-256. Directories are skipped, not errors.
fn hash_file(path: &Path) -> Result<Option<(PathBuf, [u8; 32])>, HashError> {
    if path.is_dir() {
        return Ok(None);
    }
    let file = std::fs::File::open(path).map_err(|source| HashError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = io::BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|source| HashError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Some((path.to_path_buf(), hasher.finalize().into())))
}

fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_always_run_digest() {
        assert_eq!(AlwaysRun.hash(&[]).unwrap(), DIFFERENT);
    }

    #[test]
    fn test_hash_order_independent() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        fs::write(&a, "aaa").unwrap();
        fs::write(&b, "bbb").unwrap();

        let hasher = ParallelHasher;
        let forwards = hasher.hash(&[a.clone(), b.clone()]).unwrap();
        let backwards = hasher.hash(&[b, a]).unwrap();
        assert_eq!(forwards, backwards);
    }

    #[test]
    fn test_hash_sensitive_to_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.txt");
        fs::write(&a, "one").unwrap();

        let hasher = ParallelHasher;
        let before = hasher.hash(std::slice::from_ref(&a)).unwrap();
        fs::write(&a, "two").unwrap();
        let after = hasher.hash(std::slice::from_ref(&a)).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_hash_sensitive_to_path() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        fs::write(&a, "same").unwrap();
        fs::write(&b, "same").unwrap();

        let hasher = ParallelHasher;
        assert_ne!(
            hasher.hash(std::slice::from_ref(&a)).unwrap(),
            hasher.hash(std::slice::from_ref(&b)).unwrap()
        );
    }

    #[test]
    fn test_hash_skips_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.txt");
        fs::write(&a, "x").unwrap();
        let sub = tmp.path().join("sub");
        fs::create_dir(&sub).unwrap();

        let hasher = ParallelHasher;
        let without = hasher.hash(std::slice::from_ref(&a)).unwrap();
        let with = hasher.hash(&[a, sub]).unwrap();
        assert_eq!(without, with);
    }

    #[test]
    fn test_hash_missing_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let hasher = ParallelHasher;
        let err = hasher.hash(&[tmp.path().join("nope.txt")]).unwrap_err();
        assert!(matches!(err, HashError::Io { .. }));
    }

    #[test]
    fn test_hash_empty_set_is_stable() {
        let hasher = ParallelHasher;
        assert_eq!(hasher.hash(&[]).unwrap(), hasher.hash(&[]).unwrap());
        assert_ne!(hasher.hash(&[]).unwrap(), DIFFERENT);
    }

    #[test]
    fn test_hex_encoding() {
        assert_eq!(to_hex(&[0x00, 0xff, 0x10]), "00ff10");
    }

    #[test]
    fn test_hash_is_lowercase_hex() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.txt");
        fs::write(&a, "x").unwrap();
        let digest = ParallelHasher.hash(&[a]).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
